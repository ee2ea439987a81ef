//! HDF5 file signature detection.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Offsets where the signature may appear: 0, then 512, 1024, 2048, ...
fn candidate_offsets() -> impl Iterator<Item = u64> {
    std::iter::once(0).chain(std::iter::successors(Some(512u64), |o| o.checked_mul(2)))
}

/// Search an in-memory buffer for the signature.
pub fn find_signature(data: &[u8]) -> Option<usize> {
    candidate_offsets()
        .map(|o| o as usize)
        .take_while(|&o| o + 8 <= data.len())
        .find(|&o| data[o..o + 8] == HDF5_SIGNATURE)
}

/// Whether the file at `path` carries the HDF5 signature. Only reads the
/// candidate offsets; unreadable files are not HDF5 files.
pub fn is_hdf5_file(path: impl AsRef<Path>) -> bool {
    let Ok(mut file) = File::open(path.as_ref()) else {
        return false;
    };
    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(_) => return false,
    };
    let mut buf = [0u8; 8];
    for offset in candidate_offsets().take_while(|&o| o + 8 <= len) {
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return false;
        }
        match file.read_exact(&mut buf) {
            Ok(()) if buf == HDF5_SIGNATURE => return true,
            Ok(()) => {}
            Err(_) => return false,
        }
    }
    false
}
