//! In-process storage library.
//!
//! [`MemoryStorage`] keeps a volume of named files in memory and serves them
//! through the same identifier-based API as the HDF5 C library: a handle
//! table, name-ordered links and attributes, soft and external links, file
//! and memory datatype conversion, and hyperslab selections.
//!
//! It also counts open identifiers and can be told to fail specific
//! operations, which makes resource and error-path behaviour observable:
//!
//! ```
//! use rustyhdf5_bridge::storage::memory::MemoryStorage;
//! use rustyhdf5_bridge::storage::Storage;
//!
//! let storage = MemoryStorage::new();
//! storage.fail_on("dataset_read");
//! assert_eq!(storage.open_handles(), 0);
//! ```

pub mod dataspace;
pub mod datatype;
mod tree;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub use dataspace::{Dataspace, Selection};
pub use datatype::{CompoundMember, Datatype};

use self::datatype::{check_conversion, convert_element};
use self::tree::{split_parent, FileImage, Link, Node, Payload, StoredAttribute, ROOT};
use super::{
    CharacterSet, Extent, FileMode, HandleKind, Hid, Layout, LinkTarget, NativeType, ObjectKind,
    SpaceClass, Storage, StorageResult, StringPadding, StringSize, TypeClass,
};
use crate::error::StorageError;

/// Soft and external link hops allowed while resolving one path.
const MAX_LINK_HOPS: usize = 16;

type Volume = HashMap<PathBuf, FileImage>;

#[derive(Debug, Clone, PartialEq)]
struct ObjectRef {
    file: PathBuf,
    node: usize,
}

#[derive(Debug, Clone, Default)]
struct CreateProps {
    chunk: Option<Vec<u64>>,
}

#[derive(Debug)]
enum Entry {
    File {
        path: PathBuf,
        writable: bool,
    },
    Object {
        kind: ObjectKind,
        target: ObjectRef,
        writable: bool,
    },
    Attribute {
        target: ObjectRef,
        name: String,
        writable: bool,
    },
    Datatype(Datatype),
    Dataspace(Dataspace),
    PropertyList(CreateProps),
}

#[derive(Debug)]
struct HandleTable {
    next: Hid,
    entries: HashMap<Hid, Entry>,
}

/// In-process storage library.
#[derive(Debug)]
pub struct MemoryStorage {
    files: RefCell<Volume>,
    table: RefCell<HandleTable>,
    faults: RefCell<HashSet<String>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            files: RefCell::new(HashMap::new()),
            table: RefCell::new(HandleTable {
                // 0 stays unused, it is the "default property list" value in HDF5.
                next: 1,
                entries: HashMap::new(),
            }),
            faults: RefCell::new(HashSet::new()),
        }
    }

    /// Number of identifiers currently open.
    pub fn open_handles(&self) -> usize {
        self.table.borrow().entries.len()
    }

    /// Make every later call of the named trait method fail with
    /// [`StorageError::Library`]. `close` cannot be failed.
    pub fn fail_on(&self, operation: &str) {
        self.faults.borrow_mut().insert(operation.to_string());
    }

    pub fn clear_faults(&self) {
        self.faults.borrow_mut().clear();
    }

    pub fn contains_file(&self, path: impl AsRef<Path>) -> bool {
        self.files.borrow().contains_key(path.as_ref())
    }

    /// Register an arbitrary datatype descriptor and return an identifier for it.
    pub fn register_type(&self, datatype: Datatype) -> Hid {
        self.insert(Entry::Datatype(datatype))
    }

    /// Register an arbitrary dataspace and return an identifier for it.
    pub fn register_space(&self, space: Dataspace) -> Hid {
        self.insert(Entry::Dataspace(space))
    }

    /// Store a named datatype at `path`.
    pub fn commit_type(&self, loc: Hid, path: &str, datatype: Hid) -> StorageResult<()> {
        let datatype = self.datatype(datatype)?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let mut files = self.files.borrow_mut();
        let image = image_mut(&mut files, &parent.file)?;
        let node = image.push(Node::NamedType {
            datatype,
            attrs: Default::default(),
        });
        link_into(image, &parent, leaf, Link::Hard(node))
    }

    /// Add a hard link at `path` to the object `target`.
    pub fn link_create_hard(&self, target: Hid, loc: Hid, path: &str) -> StorageResult<()> {
        let (object, _) = self.location(target)?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        if object.file != parent.file {
            return Err(StorageError::InvalidArgument(
                "hard links cannot cross files".into(),
            ));
        }
        let mut files = self.files.borrow_mut();
        let image = image_mut(&mut files, &parent.file)?;
        link_into(image, &parent, leaf, Link::Hard(object.node))
    }

    // ---- internals ----

    fn check(&self, operation: &'static str) -> StorageResult<()> {
        if self.faults.borrow().contains(operation) {
            Err(StorageError::Library(operation))
        } else {
            Ok(())
        }
    }

    fn insert(&self, entry: Entry) -> Hid {
        let mut table = self.table.borrow_mut();
        let id = table.next;
        table.next += 1;
        table.entries.insert(id, entry);
        id
    }

    /// The object an identifier designates and whether it may be modified.
    /// File identifiers designate their root group.
    fn location(&self, id: Hid) -> StorageResult<(ObjectRef, bool)> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::File { path, writable }) => Ok((
                ObjectRef {
                    file: path.clone(),
                    node: ROOT,
                },
                *writable,
            )),
            Some(Entry::Object {
                target, writable, ..
            }) => Ok((target.clone(), *writable)),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "location",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn writable_location(&self, id: Hid) -> StorageResult<ObjectRef> {
        match self.location(id)? {
            (target, true) => Ok(target),
            (_, false) => Err(StorageError::ReadOnly),
        }
    }

    fn attribute(&self, id: Hid) -> StorageResult<(ObjectRef, String, bool)> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::Attribute {
                target,
                name,
                writable,
            }) => Ok((target.clone(), name.clone(), *writable)),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "attribute",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn datatype(&self, id: Hid) -> StorageResult<Datatype> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::Datatype(datatype)) => Ok(datatype.clone()),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "datatype",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn dataspace(&self, id: Hid) -> StorageResult<Dataspace> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::Dataspace(space)) => Ok(space.clone()),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "dataspace",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn plist(&self, id: Hid) -> StorageResult<CreateProps> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::PropertyList(props)) => Ok(props.clone()),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "property list",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn with_entry_mut<R>(
        &self,
        id: Hid,
        f: impl FnOnce(&mut Entry) -> StorageResult<R>,
    ) -> StorageResult<R> {
        match self.table.borrow_mut().entries.get_mut(&id) {
            Some(entry) => f(entry),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn dataset_ref(&self, id: Hid) -> StorageResult<(ObjectRef, bool)> {
        match self.table.borrow().entries.get(&id) {
            Some(Entry::Object {
                kind: ObjectKind::Dataset,
                target,
                writable,
            }) => Ok((target.clone(), *writable)),
            Some(_) => Err(StorageError::WrongKind {
                id,
                expected: "dataset",
            }),
            None => Err(StorageError::InvalidHandle(id)),
        }
    }

    fn resolve(&self, from: &ObjectRef, path: &str) -> StorageResult<ObjectRef> {
        resolve_in(&self.files.borrow(), from, path, 0)
    }

    fn writable_parent<'p>(&self, loc: Hid, path: &'p str) -> StorageResult<(ObjectRef, &'p str)> {
        let from = self.writable_location(loc)?;
        let (parent, leaf) = split_parent(path)
            .ok_or_else(|| StorageError::InvalidArgument(format!("no link name in '{path}'")))?;
        let parent = self.resolve(&from, parent)?;
        Ok((parent, leaf))
    }

    fn open_object(&self, target: ObjectRef, writable: bool) -> StorageResult<Hid> {
        let kind = node(&self.files.borrow(), &target)?.kind();
        Ok(self.insert(Entry::Object {
            kind,
            target,
            writable,
        }))
    }

    fn stored_attribute<R>(
        &self,
        target: &ObjectRef,
        name: &str,
        f: impl FnOnce(&StoredAttribute) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let files = self.files.borrow();
        let attr = node(&files, target)?
            .attrs()
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        f(attr)
    }
}

fn image_mut<'v>(files: &'v mut Volume, file: &Path) -> StorageResult<&'v mut FileImage> {
    files
        .get_mut(file)
        .ok_or_else(|| StorageError::NotFound(file.display().to_string()))
}

fn node<'v>(files: &'v Volume, target: &ObjectRef) -> StorageResult<&'v Node> {
    files
        .get(&target.file)
        .and_then(|image| image.nodes.get(target.node))
        .ok_or_else(|| StorageError::NotFound(target.file.display().to_string()))
}

fn node_mut<'v>(files: &'v mut Volume, target: &ObjectRef) -> StorageResult<&'v mut Node> {
    image_mut(files, &target.file)?
        .nodes
        .get_mut(target.node)
        .ok_or_else(|| StorageError::NotFound(target.file.display().to_string()))
}

fn link_into(image: &mut FileImage, parent: &ObjectRef, leaf: &str, link: Link) -> StorageResult<()> {
    let links = image
        .nodes
        .get_mut(parent.node)
        .and_then(Node::links_mut)
        .ok_or_else(|| StorageError::InvalidArgument("parent is not a group".into()))?;
    if links.contains_key(leaf) {
        return Err(StorageError::AlreadyExists(leaf.to_string()));
    }
    links.insert(leaf.to_string(), link);
    Ok(())
}

fn external_file(referrer: &Path, file: &str) -> PathBuf {
    let direct = PathBuf::from(file);
    if direct.is_absolute() {
        return direct;
    }
    match referrer.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => direct,
    }
}

fn resolve_in(files: &Volume, from: &ObjectRef, path: &str, hops: usize) -> StorageResult<ObjectRef> {
    let not_found = || StorageError::NotFound(path.to_string());
    if hops > MAX_LINK_HOPS {
        return Err(not_found());
    }
    let mut current = if path.starts_with('/') {
        ObjectRef {
            file: from.file.clone(),
            node: ROOT,
        }
    } else {
        from.clone()
    };
    for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        let link = node(files, &current)?
            .links()
            .and_then(|links| links.get(component))
            .ok_or_else(not_found)?;
        current = match link {
            Link::Hard(index) => ObjectRef {
                file: current.file.clone(),
                node: *index,
            },
            Link::Soft(target) => resolve_in(files, &current, target, hops + 1)?,
            Link::External { file, path } => {
                let root = ObjectRef {
                    file: external_file(&current.file, file),
                    node: ROOT,
                };
                if !files.contains_key(&root.file) {
                    return Err(not_found());
                }
                resolve_in(files, &root, path, hops + 1)?
            }
        };
    }
    Ok(current)
}

/// Convert `count` elements, mapping source element `pairs[i].0` to destination `pairs[i].1`.
fn convert_elements(
    src: &Datatype,
    from: &[u8],
    dst: &Datatype,
    to: &mut [u8],
    pairs: impl Iterator<Item = (usize, usize)>,
) -> StorageResult<()> {
    check_conversion(src, dst)?;
    let (ss, ds) = (src.size(), dst.size());
    for (s, d) in pairs {
        convert_element(
            src,
            &from[s * ss..(s + 1) * ss],
            dst,
            &mut to[d * ds..(d + 1) * ds],
        )?;
    }
    Ok(())
}

fn expect_len(buf: usize, expected: usize) -> StorageResult<()> {
    if buf == expected {
        Ok(())
    } else {
        Err(StorageError::BufferSize {
            expected,
            actual: buf,
        })
    }
}

fn var_strings(stored: &Datatype, mem: &Datatype, data: &Payload) -> StorageResult<Vec<Vec<u8>>> {
    check_conversion(stored, mem)?;
    match data {
        Payload::Strings(values) if mem.is_variable_string() => Ok(values.clone()),
        _ => Err(StorageError::Conversion {
            from: "stored data".into(),
            to: "variable-length strings".into(),
        }),
    }
}

impl Storage for MemoryStorage {
    fn file_open(&self, path: &Path, mode: FileMode) -> StorageResult<Hid> {
        self.check("file_open")?;
        if !self.contains_file(path) {
            return Err(StorageError::FileOpen(path.display().to_string()));
        }
        Ok(self.insert(Entry::File {
            path: path.to_path_buf(),
            writable: mode == FileMode::ReadWrite,
        }))
    }

    fn file_create(&self, path: &Path) -> StorageResult<Hid> {
        self.check("file_create")?;
        if self.contains_file(path) {
            return Err(StorageError::FileExists(path.display().to_string()));
        }
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), FileImage::new());
        Ok(self.insert(Entry::File {
            path: path.to_path_buf(),
            writable: true,
        }))
    }

    fn close(&self, kind: HandleKind, id: Hid) -> StorageResult<()> {
        let mut table = self.table.borrow_mut();
        let entry = table
            .entries
            .get(&id)
            .ok_or(StorageError::InvalidHandle(id))?;
        let matches = match (kind, entry) {
            (HandleKind::File, Entry::File { .. }) => true,
            (HandleKind::Object, Entry::Object { .. }) => true,
            (HandleKind::Group, Entry::Object { kind, .. }) => *kind == ObjectKind::Group,
            (HandleKind::Dataset, Entry::Object { kind, .. }) => *kind == ObjectKind::Dataset,
            (HandleKind::Attribute, Entry::Attribute { .. }) => true,
            (HandleKind::Datatype, Entry::Datatype(_)) => true,
            (HandleKind::Dataspace, Entry::Dataspace(_)) => true,
            (HandleKind::PropertyList, Entry::PropertyList(_)) => true,
            _ => false,
        };
        if !matches {
            return Err(StorageError::WrongKind {
                id,
                expected: match kind {
                    HandleKind::File => "file",
                    HandleKind::Group => "group",
                    HandleKind::Dataset => "dataset",
                    HandleKind::Attribute => "attribute",
                    HandleKind::Datatype => "datatype",
                    HandleKind::Dataspace => "dataspace",
                    HandleKind::PropertyList => "property list",
                    HandleKind::Object => "object",
                },
            });
        }
        table.entries.remove(&id);
        Ok(())
    }

    fn object_open(&self, loc: Hid, path: &str) -> StorageResult<Hid> {
        self.check("object_open")?;
        let (from, writable) = self.location(loc)?;
        let target = self.resolve(&from, path)?;
        self.open_object(target, writable)
    }

    fn object_kind(&self, object: Hid) -> StorageResult<ObjectKind> {
        self.check("object_kind")?;
        let (target, _) = self.location(object)?;
        Ok(node(&self.files.borrow(), &target)?.kind())
    }

    fn link_exists(&self, loc: Hid, path: &str) -> StorageResult<bool> {
        self.check("link_exists")?;
        let (from, _) = self.location(loc)?;
        if path.trim_matches('/').is_empty() && path.starts_with('/') {
            return Ok(true);
        }
        let Some((parent, leaf)) = split_parent(path) else {
            return Err(StorageError::InvalidArgument(format!("no link name in '{path}'")));
        };
        let parent = match self.resolve(&from, parent) {
            Ok(parent) => parent,
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        let files = self.files.borrow();
        Ok(node(&files, &parent)?
            .links()
            .is_some_and(|links| links.contains_key(leaf)))
    }

    fn link_delete(&self, loc: Hid, path: &str) -> StorageResult<()> {
        self.check("link_delete")?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let mut files = self.files.borrow_mut();
        node_mut(&mut files, &parent)?
            .links_mut()
            .and_then(|links| links.remove(leaf))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn link_names(&self, group: Hid) -> StorageResult<Vec<String>> {
        self.check("link_names")?;
        let (target, _) = self.location(group)?;
        let files = self.files.borrow();
        node(&files, &target)?
            .links()
            .map(|links| links.keys().cloned().collect())
            .ok_or(StorageError::WrongKind {
                id: group,
                expected: "group",
            })
    }

    fn link_target(&self, group: Hid, name: &str) -> StorageResult<LinkTarget> {
        self.check("link_target")?;
        let (target, _) = self.location(group)?;
        let files = self.files.borrow();
        let link = node(&files, &target)?
            .links()
            .and_then(|links| links.get(name))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(match link {
            Link::Hard(_) => LinkTarget::Hard,
            Link::Soft(target) => LinkTarget::Soft {
                target: target.clone(),
            },
            Link::External { file, path } => LinkTarget::External {
                file: file.clone(),
                path: path.clone(),
                flags: 0,
            },
        })
    }

    fn link_create_soft(&self, loc: Hid, path: &str, target: &str) -> StorageResult<()> {
        self.check("link_create_soft")?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let mut files = self.files.borrow_mut();
        let image = image_mut(&mut files, &parent.file)?;
        link_into(image, &parent, leaf, Link::Soft(target.to_string()))
    }

    fn link_create_external(
        &self,
        loc: Hid,
        path: &str,
        file: &str,
        object: &str,
    ) -> StorageResult<()> {
        self.check("link_create_external")?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let mut files = self.files.borrow_mut();
        let image = image_mut(&mut files, &parent.file)?;
        let link = Link::External {
            file: file.to_string(),
            path: object.to_string(),
        };
        link_into(image, &parent, leaf, link)
    }

    fn group_create(&self, loc: Hid, path: &str) -> StorageResult<Hid> {
        self.check("group_create")?;
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let target = {
            let mut files = self.files.borrow_mut();
            let image = image_mut(&mut files, &parent.file)?;
            let index = image.push(Node::empty_group());
            link_into(image, &parent, leaf, Link::Hard(index))?;
            ObjectRef {
                file: parent.file.clone(),
                node: index,
            }
        };
        self.open_object(target, true)
    }

    fn dataset_create(
        &self,
        loc: Hid,
        path: &str,
        datatype: Hid,
        space: Hid,
        dcpl: Hid,
    ) -> StorageResult<Hid> {
        self.check("dataset_create")?;
        let datatype = self.datatype(datatype)?;
        let mut space = self.dataspace(space)?;
        space.selection = Selection::All;
        let chunk = if dcpl >= 0 {
            self.plist(dcpl)?.chunk
        } else {
            None
        };
        match &chunk {
            Some(chunk) if chunk.len() != space.rank() => {
                return Err(StorageError::InvalidArgument(format!(
                    "chunk rank {} does not match dataspace rank {}",
                    chunk.len(),
                    space.rank()
                )));
            }
            None if space.max_dims.iter().zip(&space.dims).any(|(m, d)| m != d) => {
                return Err(StorageError::InvalidArgument(
                    "extendible dataspaces need a chunked layout".into(),
                ));
            }
            _ => {}
        }
        let (parent, leaf) = self.writable_parent(loc, path)?;
        let target = {
            let mut files = self.files.borrow_mut();
            let image = image_mut(&mut files, &parent.file)?;
            let data = Payload::zeroed(&datatype, space.num_elements() as usize);
            let index = image.push(Node::Dataset {
                datatype,
                space,
                chunk,
                data,
                attrs: Default::default(),
            });
            link_into(image, &parent, leaf, Link::Hard(index))?;
            ObjectRef {
                file: parent.file.clone(),
                node: index,
            }
        };
        self.open_object(target, true)
    }

    fn dataset_type(&self, dataset: Hid) -> StorageResult<Hid> {
        self.check("dataset_type")?;
        let (target, _) = self.dataset_ref(dataset)?;
        let datatype = match node(&self.files.borrow(), &target)? {
            Node::Dataset { datatype, .. } => datatype.clone(),
            _ => return Err(StorageError::WrongKind { id: dataset, expected: "dataset" }),
        };
        Ok(self.insert(Entry::Datatype(datatype)))
    }

    fn dataset_space(&self, dataset: Hid) -> StorageResult<Hid> {
        self.check("dataset_space")?;
        let (target, _) = self.dataset_ref(dataset)?;
        let space = match node(&self.files.borrow(), &target)? {
            Node::Dataset { space, .. } => space.clone(),
            _ => return Err(StorageError::WrongKind { id: dataset, expected: "dataset" }),
        };
        Ok(self.insert(Entry::Dataspace(space)))
    }

    fn dataset_create_plist(&self, dataset: Hid) -> StorageResult<Hid> {
        self.check("dataset_create_plist")?;
        let (target, _) = self.dataset_ref(dataset)?;
        let chunk = match node(&self.files.borrow(), &target)? {
            Node::Dataset { chunk, .. } => chunk.clone(),
            _ => return Err(StorageError::WrongKind { id: dataset, expected: "dataset" }),
        };
        Ok(self.insert(Entry::PropertyList(CreateProps { chunk })))
    }

    fn dataset_read(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Option<Hid>,
        file_space: Option<Hid>,
        buf: &mut [u8],
    ) -> StorageResult<()> {
        self.check("dataset_read")?;
        let mem = self.datatype(mem_type)?;
        let (target, _) = self.dataset_ref(dataset)?;
        let file_selection = file_space.map(|id| self.dataspace(id)).transpose()?;
        let mem_selection = mem_space.map(|id| self.dataspace(id)).transpose()?;

        let files = self.files.borrow();
        let Node::Dataset {
            datatype,
            space,
            data,
            ..
        } = node(&files, &target)?
        else {
            return Err(StorageError::WrongKind { id: dataset, expected: "dataset" });
        };

        let file_space = match file_selection {
            Some(selected) if selected.dims != space.dims => {
                return Err(StorageError::InvalidArgument(
                    "file dataspace does not match the dataset extent".into(),
                ));
            }
            Some(selected) => selected,
            None => space.clone(),
        };
        let mem_space = mem_selection.unwrap_or_else(|| file_space.clone());

        let file_points = file_space.selected_indices();
        let mem_points = mem_space.selected_indices();
        if file_points.len() != mem_points.len() {
            return Err(StorageError::SelectionMismatch {
                file: file_points.len() as u64,
                memory: mem_points.len() as u64,
            });
        }
        expect_len(buf.len(), mem_space.num_elements() as usize * mem.size())?;

        match data {
            Payload::Bytes(bytes) => convert_elements(
                datatype,
                bytes,
                &mem,
                buf,
                file_points.into_iter().zip(mem_points),
            ),
            Payload::Strings(_) => Err(StorageError::Conversion {
                from: "variable-length string".into(),
                to: "fixed-size memory buffer".into(),
            }),
        }
    }

    fn dataset_read_var_strings(&self, dataset: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>> {
        self.check("dataset_read")?;
        let mem = self.datatype(mem_type)?;
        let (target, _) = self.dataset_ref(dataset)?;
        let files = self.files.borrow();
        match node(&files, &target)? {
            Node::Dataset { datatype, data, .. } => var_strings(datatype, &mem, data),
            _ => Err(StorageError::WrongKind { id: dataset, expected: "dataset" }),
        }
    }

    fn dataset_write(&self, dataset: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()> {
        self.check("dataset_write")?;
        let mem = self.datatype(mem_type)?;
        let (target, writable) = self.dataset_ref(dataset)?;
        if !writable {
            return Err(StorageError::ReadOnly);
        }
        let mut files = self.files.borrow_mut();
        let Node::Dataset {
            datatype,
            space,
            data,
            ..
        } = node_mut(&mut files, &target)?
        else {
            return Err(StorageError::WrongKind { id: dataset, expected: "dataset" });
        };
        let n = space.num_elements() as usize;
        expect_len(buf.len(), n * mem.size())?;
        match data {
            Payload::Bytes(bytes) => convert_elements(&mem, buf, datatype, bytes, (0..n).map(|i| (i, i))),
            Payload::Strings(_) => Err(StorageError::Conversion {
                from: "fixed-size memory buffer".into(),
                to: "variable-length string".into(),
            }),
        }
    }

    fn type_native(&self, native: NativeType) -> StorageResult<Hid> {
        self.check("type_native")?;
        Ok(self.insert(Entry::Datatype(Datatype::native(native))))
    }

    fn type_string(
        &self,
        size: StringSize,
        padding: StringPadding,
        charset: CharacterSet,
    ) -> StorageResult<Hid> {
        self.check("type_string")?;
        if size == StringSize::Fixed(0) {
            return Err(StorageError::InvalidArgument("string size must be positive".into()));
        }
        Ok(self.insert(Entry::Datatype(Datatype::String {
            size,
            padding,
            charset,
        })))
    }

    fn type_compound(&self, size: usize) -> StorageResult<Hid> {
        self.check("type_compound")?;
        if size == 0 {
            return Err(StorageError::InvalidArgument("compound size must be positive".into()));
        }
        Ok(self.insert(Entry::Datatype(Datatype::Compound {
            size,
            members: Vec::new(),
        })))
    }

    fn type_insert(&self, compound: Hid, name: &str, offset: usize, member: Hid) -> StorageResult<()> {
        self.check("type_insert")?;
        let member = self.datatype(member)?;
        self.with_entry_mut(compound, |entry| match entry {
            Entry::Datatype(Datatype::Compound { size, members }) => {
                if offset + member.size() > *size {
                    return Err(StorageError::InvalidArgument(format!(
                        "member '{name}' does not fit in {size} bytes"
                    )));
                }
                if members.iter().any(|m| m.name == name) {
                    return Err(StorageError::AlreadyExists(name.to_string()));
                }
                members.push(CompoundMember {
                    name: name.to_string(),
                    byte_offset: offset,
                    datatype: member,
                });
                Ok(())
            }
            _ => Err(StorageError::WrongKind {
                id: compound,
                expected: "compound datatype",
            }),
        })
    }

    fn type_class(&self, datatype: Hid) -> StorageResult<TypeClass> {
        self.check("type_class")?;
        Ok(self.datatype(datatype)?.class())
    }

    fn type_size(&self, datatype: Hid) -> StorageResult<usize> {
        self.check("type_size")?;
        Ok(self.datatype(datatype)?.size())
    }

    fn type_is_signed(&self, datatype: Hid) -> StorageResult<bool> {
        self.check("type_is_signed")?;
        match self.datatype(datatype)? {
            Datatype::Integer { signed, .. } => Ok(signed),
            _ => Err(StorageError::WrongKind {
                id: datatype,
                expected: "integer datatype",
            }),
        }
    }

    fn type_is_variable_str(&self, datatype: Hid) -> StorageResult<bool> {
        self.check("type_is_variable_str")?;
        Ok(self.datatype(datatype)?.is_variable_string())
    }

    fn type_member_count(&self, compound: Hid) -> StorageResult<usize> {
        self.check("type_member_count")?;
        match self.datatype(compound)? {
            Datatype::Compound { members, .. } => Ok(members.len()),
            _ => Err(StorageError::WrongKind {
                id: compound,
                expected: "compound datatype",
            }),
        }
    }

    fn type_member_name(&self, compound: Hid, index: usize) -> StorageResult<String> {
        self.check("type_member_name")?;
        member(&self.datatype(compound)?, compound, index).map(|m| m.name.clone())
    }

    fn type_member_class(&self, compound: Hid, index: usize) -> StorageResult<TypeClass> {
        self.check("type_member_class")?;
        member(&self.datatype(compound)?, compound, index).map(|m| m.datatype.class())
    }

    fn space_scalar(&self) -> StorageResult<Hid> {
        self.check("space_scalar")?;
        Ok(self.insert(Entry::Dataspace(Dataspace::scalar())))
    }

    fn space_simple(&self, dims: &[u64], max_dims: Option<&[u64]>) -> StorageResult<Hid> {
        self.check("space_simple")?;
        let space = Dataspace::simple(dims, max_dims)?;
        Ok(self.insert(Entry::Dataspace(space)))
    }

    fn space_class(&self, space: Hid) -> StorageResult<SpaceClass> {
        self.check("space_class")?;
        Ok(self.dataspace(space)?.class)
    }

    fn space_extent(&self, space: Hid) -> StorageResult<Extent> {
        self.check("space_extent")?;
        let space = self.dataspace(space)?;
        Ok(Extent {
            dims: space.dims,
            max_dims: space.max_dims,
        })
    }

    fn space_select_hyperslab(
        &self,
        space: Hid,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
    ) -> StorageResult<()> {
        self.check("space_select_hyperslab")?;
        self.with_entry_mut(space, |entry| match entry {
            Entry::Dataspace(dataspace) => dataspace.select_hyperslab(start, stride, count),
            _ => Err(StorageError::WrongKind {
                id: space,
                expected: "dataspace",
            }),
        })
    }

    fn space_selected_points(&self, space: Hid) -> StorageResult<u64> {
        self.check("space_selected_points")?;
        Ok(self.dataspace(space)?.selected_points())
    }

    fn attr_names(&self, object: Hid) -> StorageResult<Vec<String>> {
        self.check("attr_names")?;
        let (target, _) = self.location(object)?;
        let files = self.files.borrow();
        Ok(node(&files, &target)?.attrs().keys().cloned().collect())
    }

    fn attr_open(&self, object: Hid, name: &str) -> StorageResult<Hid> {
        self.check("attr_open")?;
        let (target, writable) = self.location(object)?;
        if !node(&self.files.borrow(), &target)?.attrs().contains_key(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(self.insert(Entry::Attribute {
            target,
            name: name.to_string(),
            writable,
        }))
    }

    fn attr_exists(&self, object: Hid, name: &str) -> StorageResult<bool> {
        self.check("attr_exists")?;
        let (target, _) = self.location(object)?;
        let files = self.files.borrow();
        Ok(node(&files, &target)?.attrs().contains_key(name))
    }

    fn attr_delete(&self, object: Hid, name: &str) -> StorageResult<()> {
        self.check("attr_delete")?;
        let target = self.writable_location(object)?;
        let mut files = self.files.borrow_mut();
        node_mut(&mut files, &target)?
            .attrs_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn attr_create(&self, object: Hid, name: &str, datatype: Hid, space: Hid) -> StorageResult<Hid> {
        self.check("attr_create")?;
        let datatype = self.datatype(datatype)?;
        let mut space = self.dataspace(space)?;
        space.selection = Selection::All;
        let target = self.writable_location(object)?;
        {
            let mut files = self.files.borrow_mut();
            let attrs = node_mut(&mut files, &target)?.attrs_mut();
            if attrs.contains_key(name) {
                return Err(StorageError::AlreadyExists(name.to_string()));
            }
            let data = Payload::zeroed(&datatype, space.num_elements() as usize);
            attrs.insert(
                name.to_string(),
                StoredAttribute {
                    datatype,
                    space,
                    data,
                },
            );
        }
        Ok(self.insert(Entry::Attribute {
            target,
            name: name.to_string(),
            writable: true,
        }))
    }

    fn attr_type(&self, attr: Hid) -> StorageResult<Hid> {
        self.check("attr_type")?;
        let (target, name, _) = self.attribute(attr)?;
        let datatype = self.stored_attribute(&target, &name, |a| Ok(a.datatype.clone()))?;
        Ok(self.insert(Entry::Datatype(datatype)))
    }

    fn attr_space(&self, attr: Hid) -> StorageResult<Hid> {
        self.check("attr_space")?;
        let (target, name, _) = self.attribute(attr)?;
        let space = self.stored_attribute(&target, &name, |a| Ok(a.space.clone()))?;
        Ok(self.insert(Entry::Dataspace(space)))
    }

    fn attr_read(&self, attr: Hid, mem_type: Hid, buf: &mut [u8]) -> StorageResult<()> {
        self.check("attr_read")?;
        let mem = self.datatype(mem_type)?;
        let (target, name, _) = self.attribute(attr)?;
        self.stored_attribute(&target, &name, |stored| {
            let n = stored.space.num_elements() as usize;
            expect_len(buf.len(), n * mem.size())?;
            match &stored.data {
                Payload::Bytes(bytes) => convert_elements(
                    &stored.datatype,
                    bytes,
                    &mem,
                    buf,
                    (0..n).map(|i| (i, i)),
                ),
                Payload::Strings(_) => Err(StorageError::Conversion {
                    from: "variable-length string".into(),
                    to: "fixed-size memory buffer".into(),
                }),
            }
        })
    }

    fn attr_read_var_strings(&self, attr: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>> {
        self.check("attr_read")?;
        let mem = self.datatype(mem_type)?;
        let (target, name, _) = self.attribute(attr)?;
        self.stored_attribute(&target, &name, |stored| {
            var_strings(&stored.datatype, &mem, &stored.data)
        })
    }

    fn attr_write(&self, attr: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()> {
        self.check("attr_write")?;
        let mem = self.datatype(mem_type)?;
        let (target, name, writable) = self.attribute(attr)?;
        if !writable {
            return Err(StorageError::ReadOnly);
        }
        let mut files = self.files.borrow_mut();
        let stored = node_mut(&mut files, &target)?
            .attrs_mut()
            .get_mut(&name)
            .ok_or_else(|| StorageError::NotFound(name.clone()))?;
        let n = stored.space.num_elements() as usize;
        expect_len(buf.len(), n * mem.size())?;
        match &mut stored.data {
            Payload::Bytes(bytes) => convert_elements(
                &mem,
                buf,
                &stored.datatype,
                bytes,
                (0..n).map(|i| (i, i)),
            ),
            Payload::Strings(_) => Err(StorageError::Conversion {
                from: "fixed-size memory buffer".into(),
                to: "variable-length string".into(),
            }),
        }
    }

    fn attr_write_var_strings(&self, attr: Hid, mem_type: Hid, values: &[&str]) -> StorageResult<()> {
        self.check("attr_write")?;
        let mem = self.datatype(mem_type)?;
        let (target, name, writable) = self.attribute(attr)?;
        if !writable {
            return Err(StorageError::ReadOnly);
        }
        let mut files = self.files.borrow_mut();
        let stored = node_mut(&mut files, &target)?
            .attrs_mut()
            .get_mut(&name)
            .ok_or_else(|| StorageError::NotFound(name.clone()))?;
        check_conversion(&mem, &stored.datatype)?;
        if !mem.is_variable_string() {
            return Err(StorageError::Conversion {
                from: "strings".into(),
                to: "fixed-size attribute".into(),
            });
        }
        expect_len(values.len(), stored.space.num_elements() as usize)?;
        stored.data = Payload::Strings(values.iter().map(|v| v.as_bytes().to_vec()).collect());
        Ok(())
    }

    fn plist_dataset_create(&self) -> StorageResult<Hid> {
        self.check("plist_dataset_create")?;
        Ok(self.insert(Entry::PropertyList(CreateProps::default())))
    }

    fn plist_set_chunk(&self, plist: Hid, dims: &[u64]) -> StorageResult<()> {
        self.check("plist_set_chunk")?;
        if dims.is_empty() || dims.contains(&0) {
            return Err(StorageError::InvalidArgument(
                "chunk dimensions must be positive".into(),
            ));
        }
        self.with_entry_mut(plist, |entry| match entry {
            Entry::PropertyList(props) => {
                props.chunk = Some(dims.to_vec());
                Ok(())
            }
            _ => Err(StorageError::WrongKind {
                id: plist,
                expected: "property list",
            }),
        })
    }

    fn plist_layout(&self, plist: Hid) -> StorageResult<Layout> {
        self.check("plist_layout")?;
        Ok(match self.plist(plist)?.chunk {
            Some(_) => Layout::Chunked,
            None => Layout::Contiguous,
        })
    }

    fn plist_chunk(&self, plist: Hid) -> StorageResult<Vec<u64>> {
        self.check("plist_chunk")?;
        self.plist(plist)?
            .chunk
            .ok_or_else(|| StorageError::InvalidArgument("layout is not chunked".into()))
    }
}

fn member(datatype: &Datatype, id: Hid, index: usize) -> StorageResult<&CompoundMember> {
    match datatype {
        Datatype::Compound { members, .. } => members.get(index).ok_or_else(|| {
            StorageError::InvalidArgument(format!("compound has no member {index}"))
        }),
        _ => Err(StorageError::WrongKind {
            id,
            expected: "compound datatype",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(storage: &MemoryStorage) -> Hid {
        storage.file_create(Path::new("test.h5")).unwrap()
    }

    fn f32_dataset(storage: &MemoryStorage, file: Hid, path: &str, dims: &[u64]) -> Hid {
        let t = storage.type_native(NativeType::Float).unwrap();
        let s = storage.space_simple(dims, None).unwrap();
        let ds = storage.dataset_create(file, path, t, s, -1).unwrap();
        storage.close(HandleKind::Datatype, t).unwrap();
        storage.close(HandleKind::Dataspace, s).unwrap();
        ds
    }

    #[test]
    fn create_and_reopen_file() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        assert!(storage.file_create(Path::new("test.h5")).is_err());
        storage.close(HandleKind::File, file).unwrap();
        let again = storage
            .file_open(Path::new("test.h5"), FileMode::ReadOnly)
            .unwrap();
        storage.close(HandleKind::File, again).unwrap();
        assert!(storage
            .file_open(Path::new("missing.h5"), FileMode::ReadOnly)
            .is_err());
        assert_eq!(storage.open_handles(), 0);
    }

    #[test]
    fn close_checks_kind() {
        let storage = MemoryStorage::new();
        let t = storage.type_native(NativeType::Int8).unwrap();
        assert!(matches!(
            storage.close(HandleKind::Dataspace, t),
            Err(StorageError::WrongKind { .. })
        ));
        storage.close(HandleKind::Datatype, t).unwrap();
        assert!(matches!(
            storage.close(HandleKind::Datatype, t),
            Err(StorageError::InvalidHandle(_))
        ));
    }

    #[test]
    fn links_are_name_ordered() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        for name in ["zeta", "Alpha", "beta"] {
            let g = storage.group_create(file, name).unwrap();
            storage.close(HandleKind::Group, g).unwrap();
        }
        assert_eq!(storage.link_names(file).unwrap(), vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn nested_paths_and_missing_parents() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let g = storage.group_create(file, "/a").unwrap();
        let ds = f32_dataset(&storage, file, "/a/data", &[2]);
        assert!(storage.link_exists(file, "/a/data").unwrap());
        assert!(storage.link_exists(g, "data").unwrap());
        assert!(!storage.link_exists(file, "/missing/data").unwrap());
        assert!(storage.link_exists(file, "/").unwrap());
        assert!(storage.group_create(file, "/missing/child").is_err());
        storage.close(HandleKind::Dataset, ds).unwrap();
        storage.close(HandleKind::Group, g).unwrap();
    }

    #[test]
    fn soft_and_external_links_resolve() {
        let storage = MemoryStorage::new();
        let other = storage.file_create(Path::new("other.h5")).unwrap();
        let target = f32_dataset(&storage, other, "/payload", &[3]);
        let file = new_file(&storage);
        storage.link_create_soft(file, "/alias", "/real").unwrap();
        let real = storage.group_create(file, "/real").unwrap();
        storage
            .link_create_external(file, "/ext", "other.h5", "/payload")
            .unwrap();

        let alias = storage.object_open(file, "/alias").unwrap();
        assert_eq!(storage.object_kind(alias).unwrap(), ObjectKind::Group);
        let ext = storage.object_open(file, "/ext").unwrap();
        assert_eq!(storage.object_kind(ext).unwrap(), ObjectKind::Dataset);
        assert_eq!(
            storage.link_target(file, "ext").unwrap(),
            LinkTarget::External {
                file: "other.h5".into(),
                path: "/payload".into(),
                flags: 0
            }
        );
        for (kind, id) in [
            (HandleKind::Object, alias),
            (HandleKind::Object, ext),
            (HandleKind::Group, real),
            (HandleKind::Dataset, target),
            (HandleKind::File, other),
            (HandleKind::File, file),
        ] {
            storage.close(kind, id).unwrap();
        }
        assert_eq!(storage.open_handles(), 0);
    }

    #[test]
    fn soft_link_cycle_terminates() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        storage.link_create_soft(file, "/a", "/b").unwrap();
        storage.link_create_soft(file, "/b", "/a").unwrap();
        assert!(matches!(
            storage.object_open(file, "/a"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn hyperslab_read_converts() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let ds = f32_dataset(&storage, file, "d", &[4, 5]);
        let t = storage.type_native(NativeType::Float).unwrap();
        let values: Vec<f32> = (0..20).map(|v| v as f32).collect();
        storage
            .dataset_write(ds, t, bytemuck::cast_slice(&values))
            .unwrap();

        let fs = storage.dataset_space(ds).unwrap();
        storage
            .space_select_hyperslab(fs, &[1, 0], &[2, 2], &[2, 3])
            .unwrap();
        let ms = storage.space_simple(&[2, 3], None).unwrap();
        let out_type = storage.type_native(NativeType::Int16).unwrap();
        let mut out = vec![0i16; 6];
        storage
            .dataset_read(ds, out_type, Some(ms), Some(fs), bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        assert_eq!(out, vec![5, 7, 9, 15, 17, 19]);
    }

    #[test]
    fn selection_mismatch_reported() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let ds = f32_dataset(&storage, file, "d", &[4]);
        let t = storage.type_native(NativeType::Float).unwrap();
        let ms = storage.space_simple(&[3], None).unwrap();
        let mut buf = vec![0u8; 12];
        assert!(matches!(
            storage.dataset_read(ds, t, Some(ms), None, &mut buf),
            Err(StorageError::SelectionMismatch { file: 4, memory: 3 })
        ));
    }

    #[test]
    fn read_only_rejects_writes() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let ds = f32_dataset(&storage, file, "d", &[2]);
        storage.close(HandleKind::Dataset, ds).unwrap();
        let ro = storage
            .file_open(Path::new("test.h5"), FileMode::ReadOnly)
            .unwrap();
        let ds = storage.object_open(ro, "d").unwrap();
        let t = storage.type_native(NativeType::Float).unwrap();
        assert_eq!(
            storage.dataset_write(ds, t, &[0u8; 8]),
            Err(StorageError::ReadOnly)
        );
        assert_eq!(storage.link_delete(ro, "d"), Err(StorageError::ReadOnly));
        assert_eq!(storage.attr_delete(ro, "x"), Err(StorageError::ReadOnly));
    }

    #[test]
    fn attributes_round_trip_and_order() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let t = storage.type_native(NativeType::Int32).unwrap();
        let s = storage.space_scalar().unwrap();
        for name in ["b", "a"] {
            let a = storage.attr_create(file, name, t, s).unwrap();
            storage.attr_write(a, t, &7i32.to_ne_bytes()).unwrap();
            storage.close(HandleKind::Attribute, a).unwrap();
        }
        assert_eq!(storage.attr_names(file).unwrap(), vec!["a", "b"]);
        assert!(matches!(
            storage.attr_create(file, "a", t, s),
            Err(StorageError::AlreadyExists(_))
        ));
        let a = storage.attr_open(file, "b").unwrap();
        let wide = storage.type_native(NativeType::Int64).unwrap();
        let mut out = [0u8; 8];
        storage.attr_read(a, wide, &mut out).unwrap();
        assert_eq!(i64::from_ne_bytes(out), 7);
        storage.attr_delete(file, "a").unwrap();
        assert!(!storage.attr_exists(file, "a").unwrap());
    }

    #[test]
    fn variable_strings_need_variable_memory_type() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let vt = storage.register_type(Datatype::variable_string());
        let s = storage.space_simple(&[2], None).unwrap();
        let a = storage.attr_create(file, "names", vt, s).unwrap();
        storage.attr_write_var_strings(a, vt, &["x", "yz"]).unwrap();
        assert_eq!(
            storage.attr_read_var_strings(a, vt).unwrap(),
            vec![b"x".to_vec(), b"yz".to_vec()]
        );
        let fixed = storage
            .type_string(StringSize::Fixed(4), StringPadding::NullTerminate, CharacterSet::Utf8)
            .unwrap();
        let mut buf = [0u8; 8];
        assert!(storage.attr_read(a, fixed, &mut buf).is_err());
    }

    #[test]
    fn chunked_layout_and_extendible_space() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let t = storage.type_native(NativeType::Double).unwrap();
        let s = storage
            .space_simple(&[4, 6], Some(&[super::super::UNLIMITED, 6]))
            .unwrap();
        assert!(storage.dataset_create(file, "d", t, s, -1).is_err());
        let p = storage.plist_dataset_create().unwrap();
        assert!(storage.plist_chunk(p).is_err());
        storage.plist_set_chunk(p, &[2, 3]).unwrap();
        let ds = storage.dataset_create(file, "d", t, s, p).unwrap();
        let dcpl = storage.dataset_create_plist(ds).unwrap();
        assert_eq!(storage.plist_layout(dcpl).unwrap(), Layout::Chunked);
        assert_eq!(storage.plist_chunk(dcpl).unwrap(), vec![2, 3]);
    }

    #[test]
    fn compound_insert_checks_bounds() {
        let storage = MemoryStorage::new();
        let c = storage.type_compound(8).unwrap();
        let f = storage.type_native(NativeType::Float).unwrap();
        storage.type_insert(c, "r", 0, f).unwrap();
        assert!(storage.type_insert(c, "r", 4, f).is_err());
        assert!(storage.type_insert(c, "i", 6, f).is_err());
        storage.type_insert(c, "i", 4, f).unwrap();
        assert_eq!(storage.type_member_count(c).unwrap(), 2);
        assert_eq!(storage.type_member_name(c, 1).unwrap(), "i");
        assert_eq!(storage.type_member_class(c, 0).unwrap(), TypeClass::Float);
        assert!(storage.type_member_name(c, 2).is_err());
    }

    #[test]
    fn injected_faults() {
        let storage = MemoryStorage::new();
        storage.fail_on("type_native");
        assert_eq!(
            storage.type_native(NativeType::Float),
            Err(StorageError::Library("type_native"))
        );
        storage.clear_faults();
        assert!(storage.type_native(NativeType::Float).is_ok());
    }
}
