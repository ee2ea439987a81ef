//! Handle-based storage library interface.
//!
//! The bridge never touches file bytes itself. Every operation goes through a
//! [`Storage`] implementation that hands out raw integer identifiers, exactly
//! like the HDF5 C API. Identifiers are wrapped in [`Handle`](crate::handle::Handle)s
//! as soon as they are acquired.
//!
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryStorage`]: an in-process store, always available.
//! - `native::NativeStorage`: the system HDF5 library (feature `native`).

pub mod memory;
#[cfg(feature = "native")]
pub mod native;

use std::fmt;
use std::path::Path;

use crate::error::StorageError;

/// Raw library identifier.
pub type Hid = i64;

/// Identifier value that never refers to an open resource.
pub const INVALID_HID: Hid = -1;

/// Extent value meaning "no upper bound".
pub const UNLIMITED: u64 = u64::MAX;

/// Result of a storage call.
pub type StorageResult<T> = Result<T, StorageError>;

/// File access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    ReadOnly,
    ReadWrite,
}

/// The kind of resource an identifier refers to; selects the release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    File,
    Group,
    Dataset,
    Attribute,
    Datatype,
    Dataspace,
    PropertyList,
    /// Any object opened by path; released with the generic object close.
    Object,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::File => "file",
            HandleKind::Group => "group",
            HandleKind::Dataset => "dataset",
            HandleKind::Attribute => "attribute",
            HandleKind::Datatype => "datatype",
            HandleKind::Dataspace => "dataspace",
            HandleKind::PropertyList => "property list",
            HandleKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Kind of object a hard link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Group,
    Dataset,
    NamedDatatype,
    Unknown,
}

/// Datatype class of a type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Float,
    Time,
    String,
    BitField,
    Opaque,
    Compound,
    Reference,
    Enum,
    VarLen,
    Array,
}

impl TypeClass {
    /// Name reported in object metadata trees.
    pub fn label(self) -> &'static str {
        match self {
            TypeClass::Integer => "INTEGER",
            TypeClass::Float => "FLOAT",
            TypeClass::String => "STRING",
            TypeClass::BitField => "BITFIELD",
            TypeClass::Opaque => "OPAQUE",
            TypeClass::Compound => "COMPOUND",
            TypeClass::Reference => "REFERENCE",
            TypeClass::Enum => "ENUM",
            TypeClass::VarLen => "VLEN",
            TypeClass::Array => "ARRAY",
            TypeClass::Time => "Unknown",
        }
    }
}

/// Predefined in-memory numeric types of the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
}

impl NativeType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            NativeType::Int8 | NativeType::UInt8 => 1,
            NativeType::Int16 | NativeType::UInt16 => 2,
            NativeType::Int32 | NativeType::UInt32 | NativeType::Float => 4,
            NativeType::Int64 | NativeType::UInt64 | NativeType::Double => 8,
        }
    }
}

/// Declared length of a string type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringSize {
    Fixed(usize),
    Variable,
}

/// How fixed-length strings fill unused bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set of a string type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// Dataspace class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceClass {
    Scalar,
    Simple,
    Null,
}

/// Current and maximum extent of a dataspace, in storage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    pub dims: Vec<u64>,
    /// [`UNLIMITED`] marks an axis without an upper bound.
    pub max_dims: Vec<u64>,
}

impl Extent {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn num_elements(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// Storage layout recorded in a dataset creation property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Compact,
    Contiguous,
    Chunked,
    Virtual,
}

/// What a link inside a group points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Hard link to an object in the same file.
    Hard,
    /// Soft link holding a path in the same file.
    Soft { target: String },
    /// Link to an object in another file.
    External {
        file: String,
        path: String,
        flags: u32,
    },
}

/// Handle-based storage library.
///
/// Every method that returns a [`Hid`] transfers ownership of a new identifier to
/// the caller, who must eventually pass it to [`Storage::close`]. Paths are
/// `/`-separated; a leading `/` starts at the root group of the file that `loc`
/// belongs to.
pub trait Storage {
    // ---- Files ----

    fn file_open(&self, path: &Path, mode: FileMode) -> StorageResult<Hid>;
    /// Create a new file, failing if one exists.
    fn file_create(&self, path: &Path) -> StorageResult<Hid>;
    /// Release an identifier of the given kind.
    fn close(&self, kind: HandleKind, id: Hid) -> StorageResult<()>;

    // ---- Objects and links ----

    fn object_open(&self, loc: Hid, path: &str) -> StorageResult<Hid>;
    fn object_kind(&self, object: Hid) -> StorageResult<ObjectKind>;
    /// Whether the final link of `path` exists. Missing intermediate groups yield `false`.
    fn link_exists(&self, loc: Hid, path: &str) -> StorageResult<bool>;
    fn link_delete(&self, loc: Hid, path: &str) -> StorageResult<()>;
    /// Link names of a group in ascending name order.
    fn link_names(&self, group: Hid) -> StorageResult<Vec<String>>;
    fn link_target(&self, group: Hid, name: &str) -> StorageResult<LinkTarget>;
    fn link_create_soft(&self, loc: Hid, path: &str, target: &str) -> StorageResult<()>;
    fn link_create_external(
        &self,
        loc: Hid,
        path: &str,
        file: &str,
        object: &str,
    ) -> StorageResult<()>;
    fn group_create(&self, loc: Hid, path: &str) -> StorageResult<Hid>;

    // ---- Datasets ----

    /// Create a dataset. `dcpl` may be [`INVALID_HID`] for default creation properties.
    fn dataset_create(
        &self,
        loc: Hid,
        path: &str,
        datatype: Hid,
        space: Hid,
        dcpl: Hid,
    ) -> StorageResult<Hid>;
    fn dataset_type(&self, dataset: Hid) -> StorageResult<Hid>;
    fn dataset_space(&self, dataset: Hid) -> StorageResult<Hid>;
    fn dataset_create_plist(&self, dataset: Hid) -> StorageResult<Hid>;
    /// Read into `buf`, converting to `mem_type`. `None` spaces select everything.
    fn dataset_read(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Option<Hid>,
        file_space: Option<Hid>,
        buf: &mut [u8],
    ) -> StorageResult<()>;
    /// Read every element of a variable-length string dataset. Library-owned
    /// memory is released before returning.
    fn dataset_read_var_strings(&self, dataset: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>>;
    /// Write every element from `buf`, interpreted as `mem_type`.
    fn dataset_write(&self, dataset: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()>;

    // ---- Datatypes ----

    fn type_native(&self, native: NativeType) -> StorageResult<Hid>;
    fn type_string(
        &self,
        size: StringSize,
        padding: StringPadding,
        charset: CharacterSet,
    ) -> StorageResult<Hid>;
    /// Empty compound of `size` bytes.
    fn type_compound(&self, size: usize) -> StorageResult<Hid>;
    fn type_insert(&self, compound: Hid, name: &str, offset: usize, member: Hid)
        -> StorageResult<()>;
    fn type_class(&self, datatype: Hid) -> StorageResult<TypeClass>;
    fn type_size(&self, datatype: Hid) -> StorageResult<usize>;
    fn type_is_signed(&self, datatype: Hid) -> StorageResult<bool>;
    fn type_is_variable_str(&self, datatype: Hid) -> StorageResult<bool>;
    fn type_member_count(&self, compound: Hid) -> StorageResult<usize>;
    fn type_member_name(&self, compound: Hid, index: usize) -> StorageResult<String>;
    fn type_member_class(&self, compound: Hid, index: usize) -> StorageResult<TypeClass>;

    // ---- Dataspaces ----

    fn space_scalar(&self) -> StorageResult<Hid>;
    /// Simple dataspace; `max_dims` defaults to `dims`.
    fn space_simple(&self, dims: &[u64], max_dims: Option<&[u64]>) -> StorageResult<Hid>;
    fn space_class(&self, space: Hid) -> StorageResult<SpaceClass>;
    fn space_extent(&self, space: Hid) -> StorageResult<Extent>;
    /// Replace the selection with a regular hyperslab (block size 1).
    fn space_select_hyperslab(
        &self,
        space: Hid,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
    ) -> StorageResult<()>;
    fn space_selected_points(&self, space: Hid) -> StorageResult<u64>;

    // ---- Attributes ----

    /// Attribute names of an object in ascending name order.
    fn attr_names(&self, object: Hid) -> StorageResult<Vec<String>>;
    fn attr_open(&self, object: Hid, name: &str) -> StorageResult<Hid>;
    fn attr_exists(&self, object: Hid, name: &str) -> StorageResult<bool>;
    fn attr_delete(&self, object: Hid, name: &str) -> StorageResult<()>;
    fn attr_create(&self, object: Hid, name: &str, datatype: Hid, space: Hid)
        -> StorageResult<Hid>;
    fn attr_type(&self, attr: Hid) -> StorageResult<Hid>;
    fn attr_space(&self, attr: Hid) -> StorageResult<Hid>;
    fn attr_read(&self, attr: Hid, mem_type: Hid, buf: &mut [u8]) -> StorageResult<()>;
    fn attr_read_var_strings(&self, attr: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>>;
    fn attr_write(&self, attr: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()>;
    fn attr_write_var_strings(&self, attr: Hid, mem_type: Hid, values: &[&str])
        -> StorageResult<()>;

    // ---- Property lists ----

    fn plist_dataset_create(&self) -> StorageResult<Hid>;
    fn plist_set_chunk(&self, plist: Hid, dims: &[u64]) -> StorageResult<()>;
    fn plist_layout(&self, plist: Hid) -> StorageResult<Layout>;
    /// Chunk extent in storage order; fails unless the layout is chunked.
    fn plist_chunk(&self, plist: Hid) -> StorageResult<Vec<u64>>;
}
