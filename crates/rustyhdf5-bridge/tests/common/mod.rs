//! Shared fixtures for the bridge integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::rc::Rc;

use ndarray::{Array, IxDyn, ShapeBuilder};
use rustyhdf5_bridge::handle::{
    AttrHandle, DatasetHandle, FileHandle, GroupHandle, ObjectHandle, SpaceHandle, TypeHandle,
};
use rustyhdf5_bridge::storage::memory::{Datatype, MemoryStorage};
use rustyhdf5_bridge::storage::{FileMode, Hid, NativeType, Storage, StringPadding};
use rustyhdf5_bridge::{Bridge, BridgeConfig, HostArray, RecordingDiagnostics};

pub const SAMPLE: &str = "sample.h5";

pub fn bridge() -> (Bridge<MemoryStorage>, Rc<RecordingDiagnostics>) {
    bridge_with(BridgeConfig::default())
}

pub fn bridge_with(config: BridgeConfig) -> (Bridge<MemoryStorage>, Rc<RecordingDiagnostics>) {
    let sink = Rc::new(RecordingDiagnostics::new());
    let bridge = Bridge::new(MemoryStorage::new())
        .with_config(config)
        .with_diagnostics(Rc::clone(&sink));
    (bridge, sink)
}

/// Run `f` with `location` opened read-write inside `path`.
pub fn with_object<R>(storage: &MemoryStorage, path: &str, location: &str, f: impl FnOnce(Hid) -> R) -> R {
    let file = FileHandle::acquire(storage, storage.file_open(Path::new(path), FileMode::ReadWrite)).unwrap();
    let object = ObjectHandle::acquire(storage, storage.object_open(file.get(), location)).unwrap();
    f(object.get())
}

/// Attach an attribute over `dims` (empty for a scalar) holding `bytes`.
pub fn put_attr(storage: &MemoryStorage, object: Hid, name: &str, datatype: Datatype, dims: &[u64], bytes: &[u8]) {
    let t = TypeHandle::new(storage, storage.register_type(datatype));
    let space = if dims.is_empty() {
        storage.space_scalar()
    } else {
        storage.space_simple(dims, None)
    };
    let space = SpaceHandle::acquire(storage, space).unwrap();
    let attr = AttrHandle::acquire(storage, storage.attr_create(object, name, t.get(), space.get())).unwrap();
    storage.attr_write(attr.get(), t.get(), bytes).unwrap();
}

/// Host array of shape (20, 10) whose storage element (r, c) is `100 r + c`.
pub fn grid() -> HostArray {
    HostArray::from(Array::from_shape_fn(IxDyn(&[20, 10]).f(), |ix| {
        (100 * ix[1] + ix[0]) as f64
    }))
}

/// A file with a numeric grid, a string dataset, and a group carrying attributes.
///
/// ```text
/// /grid           f64, storage (10, 20)
/// /title          fixed string "tomography"
/// /meta           group
///   @gain         f32 scalar 1.5
///   @label        fixed string "stage A"
///   @volume       rank-5 u8
/// ```
pub fn sample(bridge: &Bridge<MemoryStorage>) {
    assert!(bridge.create_dataset(SAMPLE, "/grid", &grid()));
    let storage = bridge.storage();

    with_object(storage, SAMPLE, "/", |root| {
        let t = TypeHandle::new(storage, storage.register_type(Datatype::fixed_string(10, StringPadding::NullPad)));
        let s = SpaceHandle::acquire(storage, storage.space_scalar()).unwrap();
        let ds = DatasetHandle::acquire(storage, storage.dataset_create(root, "title", t.get(), s.get(), -1)).unwrap();
        storage.dataset_write(ds.get(), t.get(), b"tomography").unwrap();
        GroupHandle::acquire(storage, storage.group_create(root, "meta")).unwrap();
    });

    with_object(storage, SAMPLE, "/meta", |meta| {
        put_attr(storage, meta, "gain", Datatype::Float { size: 4 }, &[], &1.5f32.to_ne_bytes());
        put_attr(storage, meta, "label", Datatype::fixed_string(7, StringPadding::NullPad), &[], b"stage A");
        put_attr(storage, meta, "volume", Datatype::native(NativeType::UInt8), &[1, 1, 1, 2, 2], &[1, 2, 3, 4]);
    });
    assert_eq!(storage.open_handles(), 0);
}
