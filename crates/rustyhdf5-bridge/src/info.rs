//! Recursive description of a file's object hierarchy.

use indexmap::IndexMap;

use crate::config::BridgeConfig;
use crate::dims::{to_host_order, StorageOrder};
use crate::error::{Result, StorageResultExt};
use crate::handle::{ObjectHandle, PlistHandle, SpaceHandle, TypeHandle};
use crate::storage::{Hid, Layout, LinkTarget, ObjectKind, SpaceClass, Storage, TypeClass, UNLIMITED};
use crate::types::{storage_type_to_host, ElementType};
use crate::value::Value;

/// One node of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    /// Absolute name, e.g. `/group/data`.
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group { contents: Vec<ObjectInfo> },
    Dataset(DatasetInfo),
    NamedDatatype,
    SoftLink { path: String },
    ExternalLink { file: String, path: String, flags: u32 },
    /// Unclassified, unreadable, or beyond the depth limit.
    Unknown,
}

/// Dataspace of a dataset. Extents are in host order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceInfo {
    Scalar,
    Simple { size: Vec<u64>, max_size: Vec<u64> },
    /// Null or otherwise unclassified.
    Other,
}

impl SpaceInfo {
    pub fn rank(&self) -> Option<usize> {
        match self {
            SpaceInfo::Scalar => Some(0),
            SpaceInfo::Simple { size, .. } => Some(size.len()),
            SpaceInfo::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub space: SpaceInfo,
    pub type_class: TypeClass,
    /// Host element type, when the storage type maps onto one.
    pub element: Option<ElementType>,
    /// Chunk extent in host order, for chunked datasets.
    pub chunk: Option<Vec<u64>>,
}

/// Join a parent name and a link name with exactly one `/`.
fn full_name(parent: &str, name: &str) -> String {
    let mut full = parent.to_string();
    if !full.ends_with('/') {
        full.push('/');
    }
    full.push_str(name.trim_start_matches('/'));
    full
}

fn host_extent(dims: Vec<u64>) -> Vec<u64> {
    to_host_order(StorageOrder::new(dims)).into_inner()
}

/// Describe the object at `location` (relative to the root of `file`) and,
/// for groups, everything below it.
pub fn describe(
    storage: &dyn Storage,
    file: Hid,
    location: &str,
    config: &BridgeConfig,
) -> Result<ObjectInfo> {
    let object = ObjectHandle::acquire(storage, storage.object_open(file, location))
        .open_context(location)?;
    let name = full_name("", location);
    let kind = inspect(storage, object.get(), &name, 0, config)?;
    Ok(ObjectInfo { name, kind })
}

fn inspect(
    storage: &dyn Storage,
    object: Hid,
    name: &str,
    depth: usize,
    config: &BridgeConfig,
) -> Result<NodeKind> {
    let kind = storage.object_kind(object).io_context("query object kind")?;
    Ok(match kind {
        ObjectKind::Group => {
            let names = storage.link_names(object).io_context("list group")?;
            let contents = names
                .iter()
                .map(|child| child_info(storage, object, name, child, depth + 1, config))
                .collect();
            NodeKind::Group { contents }
        }
        ObjectKind::Dataset => NodeKind::Dataset(dataset_info(storage, object, config)?),
        ObjectKind::NamedDatatype => NodeKind::NamedDatatype,
        ObjectKind::Unknown => NodeKind::Unknown,
    })
}

fn child_info(
    storage: &dyn Storage,
    group: Hid,
    parent: &str,
    link: &str,
    depth: usize,
    config: &BridgeConfig,
) -> ObjectInfo {
    let name = full_name(parent, link);
    let kind = if depth > config.max_depth {
        tracing::debug!(%name, depth, "hierarchy depth limit reached");
        NodeKind::Unknown
    } else {
        link_kind(storage, group, link, &name, depth, config).unwrap_or_else(|err| {
            tracing::debug!(%name, error = %err, "object not inspected");
            NodeKind::Unknown
        })
    };
    ObjectInfo { name, kind }
}

fn link_kind(
    storage: &dyn Storage,
    group: Hid,
    link: &str,
    name: &str,
    depth: usize,
    config: &BridgeConfig,
) -> Result<NodeKind> {
    match storage.link_target(group, link).io_context("query link")? {
        LinkTarget::Hard => {
            let object = ObjectHandle::acquire(storage, storage.object_open(group, link))
                .open_context(name)?;
            inspect(storage, object.get(), name, depth, config)
        }
        LinkTarget::Soft { target } => Ok(NodeKind::SoftLink { path: target }),
        LinkTarget::External { file, path, flags } => {
            Ok(NodeKind::ExternalLink { file, path, flags })
        }
    }
}

fn dataset_info(storage: &dyn Storage, dataset: Hid, config: &BridgeConfig) -> Result<DatasetInfo> {
    let space = SpaceHandle::acquire(storage, storage.dataset_space(dataset))
        .io_context("get dataset dataspace")?;
    let space = match storage.space_class(space.get()).io_context("query dataspace class")? {
        SpaceClass::Scalar => SpaceInfo::Scalar,
        SpaceClass::Simple => {
            let extent = storage.space_extent(space.get()).io_context("query dataspace extent")?;
            SpaceInfo::Simple {
                size: host_extent(extent.dims),
                max_size: host_extent(extent.max_dims),
            }
        }
        SpaceClass::Null => SpaceInfo::Other,
    };

    let datatype = TypeHandle::acquire(storage, storage.dataset_type(dataset))
        .io_context("get dataset type")?;
    let type_class = storage.type_class(datatype.get()).io_context("query type class")?;
    let element = storage_type_to_host(storage, datatype.get(), config)
        .ok()
        .map(|(element, _)| element);

    let chunk = match space.rank() {
        Some(rank) if rank > 0 => chunk_extent(storage, dataset),
        _ => None,
    };

    Ok(DatasetInfo {
        space,
        type_class,
        element,
        chunk,
    })
}

fn chunk_extent(storage: &dyn Storage, dataset: Hid) -> Option<Vec<u64>> {
    let plist = PlistHandle::acquire(storage, storage.dataset_create_plist(dataset)).ok()?;
    if storage.plist_layout(plist.get()).ok()? != Layout::Chunked {
        return None;
    }
    storage.plist_chunk(plist.get()).ok().map(host_extent)
}

fn extent_value(extent: &[u64]) -> Value {
    Value::List(
        extent
            .iter()
            .map(|&n| Value::Int(if n == UNLIMITED { -1 } else { n as i64 }))
            .collect(),
    )
}

impl ObjectInfo {
    /// Type label used in the metadata tree.
    pub fn type_label(&self) -> &'static str {
        match self.kind {
            NodeKind::Group { .. } => "Group",
            NodeKind::Dataset(_) => "DataSet",
            NodeKind::NamedDatatype => "NamedDataType",
            NodeKind::SoftLink { .. } => "SoftLink",
            NodeKind::ExternalLink { .. } => "ExternalLink",
            NodeKind::Unknown => "Unknown",
        }
    }

    /// Find a descendant by absolute name.
    pub fn find(&self, name: &str) -> Option<&ObjectInfo> {
        if self.name == name {
            return Some(self);
        }
        match &self.kind {
            NodeKind::Group { contents } => contents.iter().find_map(|child| child.find(name)),
            _ => None,
        }
    }

    /// The metadata tree handed to the host.
    pub fn to_value(&self) -> Value {
        let mut tags = IndexMap::new();
        tags.insert("Name".to_string(), Value::from(self.name.as_str()));
        tags.insert("Type".to_string(), Value::from(self.type_label()));
        match &self.kind {
            NodeKind::Group { contents } => {
                tags.insert(
                    "Contents".to_string(),
                    Value::List(contents.iter().map(ObjectInfo::to_value).collect()),
                );
            }
            NodeKind::Dataset(info) => {
                match &info.space {
                    SpaceInfo::Scalar => {
                        tags.insert("Rank".to_string(), Value::Int(0));
                        tags.insert("DataSpaceClass".to_string(), Value::from("SCALAR"));
                    }
                    SpaceInfo::Simple { size, max_size } => {
                        tags.insert("Rank".to_string(), Value::Int(size.len() as i64));
                        tags.insert("DataSpaceClass".to_string(), Value::from("SIMPLE"));
                        tags.insert("Size".to_string(), extent_value(size));
                        tags.insert("MaxSize".to_string(), extent_value(max_size));
                    }
                    SpaceInfo::Other => {
                        tags.insert("DataSpaceClass".to_string(), Value::from("Unknown"));
                    }
                }
                tags.insert(
                    "DataTypeClass".to_string(),
                    Value::from(info.type_class.label()),
                );
                if let Some(element) = info.element {
                    tags.insert("DataType".to_string(), Value::Int(element.code()));
                }
                if let Some(chunk) = &info.chunk {
                    tags.insert("ChunkSize".to_string(), extent_value(chunk));
                }
            }
            NodeKind::SoftLink { path } => {
                tags.insert("Path".to_string(), Value::from(path.as_str()));
            }
            NodeKind::ExternalLink { file, path, flags } => {
                tags.insert("Filename".to_string(), Value::from(file.as_str()));
                tags.insert("Path".to_string(), Value::from(path.as_str()));
                tags.insert("Flags".to_string(), Value::UInt(*flags));
            }
            NodeKind::NamedDatatype | NodeKind::Unknown => {}
        }
        Value::Group(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{DatasetHandle, FileHandle, GroupHandle};
    use crate::storage::memory::{Datatype, MemoryStorage};
    use crate::storage::NativeType;
    use std::path::Path;

    fn sample(storage: &MemoryStorage) -> FileHandle<'_> {
        let file = FileHandle::acquire(storage, storage.file_create(Path::new("tree.h5"))).unwrap();
        GroupHandle::acquire(storage, storage.group_create(file.get(), "/scan")).unwrap();

        let t = TypeHandle::acquire(storage, storage.type_native(NativeType::UInt16)).unwrap();
        let s = SpaceHandle::acquire(storage, storage.space_simple(&[4, 3], Some(&[UNLIMITED, 3]))).unwrap();
        let dcpl = PlistHandle::acquire(storage, storage.plist_dataset_create()).unwrap();
        storage.plist_set_chunk(dcpl.get(), &[2, 3]).unwrap();
        DatasetHandle::acquire(storage, storage.dataset_create(file.get(), "/scan/image", t.get(), s.get(), dcpl.get())).unwrap();

        let scalar = SpaceHandle::acquire(storage, storage.space_scalar()).unwrap();
        DatasetHandle::acquire(storage, storage.dataset_create(file.get(), "/value", t.get(), scalar.get(), -1)).unwrap();

        let opaque = TypeHandle::new(storage, storage.register_type(Datatype::Opaque { size: 4, tag: "blob".into() }));
        let s1 = SpaceHandle::acquire(storage, storage.space_simple(&[2], None)).unwrap();
        DatasetHandle::acquire(storage, storage.dataset_create(file.get(), "/scan/raw", opaque.get(), s1.get(), -1)).unwrap();

        storage.link_create_soft(file.get(), "/latest", "/scan/image").unwrap();
        storage.link_create_external(file.get(), "/calib", "other.h5", "/gain").unwrap();
        storage.commit_type(file.get(), "/pixel", t.get()).unwrap();
        file
    }

    #[test]
    fn describes_whole_file() {
        let storage = MemoryStorage::new();
        let file = sample(&storage);
        let root = describe(&storage, file.get(), "/", &BridgeConfig::default()).unwrap();
        assert_eq!(root.name, "/");
        assert_eq!(root.type_label(), "Group");

        let NodeKind::Group { contents } = &root.kind else {
            panic!("root is not a group");
        };
        let names: Vec<_> = contents.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["/calib", "/latest", "/pixel", "/scan", "/value"]);

        let image = root.find("/scan/image").unwrap();
        let NodeKind::Dataset(info) = &image.kind else {
            panic!("not a dataset");
        };
        assert_eq!(
            info.space,
            SpaceInfo::Simple {
                size: vec![3, 4],
                max_size: vec![3, UNLIMITED],
            }
        );
        assert_eq!(info.element, Some(ElementType::UInt16));
        assert_eq!(info.chunk, Some(vec![3, 2]));

        let raw = root.find("/scan/raw").unwrap();
        let NodeKind::Dataset(info) = &raw.kind else {
            panic!("not a dataset");
        };
        assert_eq!(info.type_class, TypeClass::Opaque);
        assert_eq!(info.element, None);
        assert_eq!(info.chunk, None);

        assert_eq!(root.find("/pixel").unwrap().kind, NodeKind::NamedDatatype);
        assert_eq!(
            root.find("/latest").unwrap().kind,
            NodeKind::SoftLink { path: "/scan/image".into() }
        );
        assert_eq!(storage.open_handles(), 1);
    }

    #[test]
    fn metadata_tree_keys() {
        let storage = MemoryStorage::new();
        let file = sample(&storage);
        let root = describe(&storage, file.get(), "/", &BridgeConfig::default()).unwrap();

        let image = root.find("/scan/image").unwrap().to_value();
        assert_eq!(image.get("Type").and_then(Value::as_str), Some("DataSet"));
        assert_eq!(image.get("Rank").and_then(Value::as_i64), Some(2));
        assert_eq!(image.get("DataSpaceClass").and_then(Value::as_str), Some("SIMPLE"));
        assert_eq!(image.get("DataTypeClass").and_then(Value::as_str), Some("INTEGER"));
        assert_eq!(image.get("DataType").and_then(Value::as_i64), Some(10));
        assert_eq!(
            image.get("MaxSize"),
            Some(&Value::List(vec![Value::Int(3), Value::Int(-1)]))
        );
        assert_eq!(
            image.get("ChunkSize"),
            Some(&Value::List(vec![Value::Int(3), Value::Int(2)]))
        );

        let value = root.find("/value").unwrap().to_value();
        assert_eq!(value.get("Rank").and_then(Value::as_i64), Some(0));
        assert_eq!(value.get("DataSpaceClass").and_then(Value::as_str), Some("SCALAR"));
        assert!(value.get("Size").is_none());
        assert!(value.get("ChunkSize").is_none());

        let calib = root.find("/calib").unwrap().to_value();
        assert_eq!(calib.get("Type").and_then(Value::as_str), Some("ExternalLink"));
        assert_eq!(calib.get("Filename").and_then(Value::as_str), Some("other.h5"));
        assert_eq!(calib.get("Path").and_then(Value::as_str), Some("/gain"));
        assert_eq!(calib.get("Flags"), Some(&Value::UInt(0)));

        let tree = root.to_value();
        assert_eq!(tree.get("Contents").and_then(Value::as_list).map(<[Value]>::len), Some(5));
    }

    #[test]
    fn sub_location_names() {
        let storage = MemoryStorage::new();
        let file = sample(&storage);
        let scan = describe(&storage, file.get(), "scan", &BridgeConfig::default()).unwrap();
        assert_eq!(scan.name, "/scan");
        assert!(scan.find("/scan/image").is_some());
        assert!(describe(&storage, file.get(), "/missing", &BridgeConfig::default()).is_err());
    }

    #[test]
    fn unreadable_children_are_unknown() {
        let storage = MemoryStorage::new();
        let file = sample(&storage);
        storage.fail_on("dataset_type");
        let root = describe(&storage, file.get(), "/", &BridgeConfig::default()).unwrap();
        assert_eq!(root.find("/scan/image").unwrap().kind, NodeKind::Unknown);
        assert_eq!(root.find("/value").unwrap().type_label(), "Unknown");
        assert_eq!(root.find("/pixel").unwrap().kind, NodeKind::NamedDatatype);
        assert_eq!(storage.open_handles(), 1);
    }

    #[test]
    fn hard_link_cycle_stops_at_depth_limit() {
        let storage = MemoryStorage::new();
        let file = FileHandle::acquire(&storage, storage.file_create(Path::new("loop.h5"))).unwrap();
        let group = GroupHandle::acquire(&storage, storage.group_create(file.get(), "/a")).unwrap();
        storage.link_create_hard(group.get(), file.get(), "/a/again").unwrap();

        let config = BridgeConfig::default().with_max_depth(3);
        let root = describe(&storage, file.get(), "/", &config).unwrap();
        let deepest = root.find("/a/again/again/again").unwrap();
        assert_eq!(deepest.kind, NodeKind::Unknown);
        assert!(root.find("/a/again/again/again/again").is_none());
        drop(group);
        assert_eq!(storage.open_handles(), 1);
    }

    #[test]
    fn joins_names_with_single_slash() {
        assert_eq!(full_name("", "/"), "/");
        assert_eq!(full_name("", "a/b"), "/a/b");
        assert_eq!(full_name("/", "x"), "/x");
        assert_eq!(full_name("/a", "x"), "/a/x");
    }
}
