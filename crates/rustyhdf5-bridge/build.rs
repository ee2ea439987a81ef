//! Expose the version of the linked HDF5 library to the `native` backend.
//!
//! `hdf5-metno-sys` publishes one `version_<major>_<minor>_<micro>` key per
//! release the library satisfies, which cargo hands to dependents as
//! `DEP_HDF5_VERSION_*`. Without the `native` feature none are set.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=DEP_HDF5_VERSION_1_12_0");
    println!("cargo:rustc-check-cfg=cfg(hdf5_1_12)");
    if env::var_os("DEP_HDF5_VERSION_1_12_0").is_some() {
        println!("cargo:rustc-cfg=hdf5_1_12");
    }
}
