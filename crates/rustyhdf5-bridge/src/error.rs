//! Error types for the bridge and for the storage layer beneath it.

use thiserror::Error;

use crate::storage::Hid;

/// Errors reported by a [`Storage`](crate::storage::Storage) implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// The file could not be opened.
    #[error("cannot open file '{0}'")]
    FileOpen(String),
    /// The file could not be created because it already exists.
    #[error("file '{0}' already exists")]
    FileExists(String),
    /// No object or link exists at the given path.
    #[error("'{0}' not found")]
    NotFound(String),
    /// A link or attribute with this name already exists.
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    /// The identifier is not open.
    #[error("invalid identifier {0}")]
    InvalidHandle(Hid),
    /// The identifier refers to a different kind of resource.
    #[error("identifier {id} is not a {expected}")]
    WrongKind {
        /// Raw identifier.
        id: Hid,
        /// Kind the operation needed.
        expected: &'static str,
    },
    /// A write was attempted through a read-only file.
    #[error("file is opened read-only")]
    ReadOnly,
    /// The library has no conversion between the two types.
    #[error("no conversion from {from} to {to}")]
    Conversion {
        /// Source type description.
        from: String,
        /// Destination type description.
        to: String,
    },
    /// File and memory selections do not select the same number of points.
    #[error("file selection has {file} points, memory selection has {memory}")]
    SelectionMismatch {
        /// Points selected in the file dataspace.
        file: u64,
        /// Points selected in the memory dataspace.
        memory: u64,
    },
    /// A caller-supplied buffer has the wrong length.
    #[error("buffer holds {actual} bytes, transfer needs {expected}")]
    BufferSize {
        /// Required byte count.
        expected: usize,
        /// Supplied byte count.
        actual: usize,
    },
    /// An argument was rejected by the library.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The library reported a failure without further detail.
    #[error("{0} failed")]
    Library(&'static str),
}

/// Broad category of an [`Error`], used by hosts to decide how loudly to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file or object could not be opened.
    Open,
    /// The data has a type, rank or shape the bridge does not handle.
    Unsupported,
    /// Caller input was malformed.
    Validation,
    /// A read, write or metadata query failed after opening succeeded.
    Io,
}

/// Errors returned by bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A file or object could not be opened.
    #[error("cannot open '{target}': {source}")]
    Open {
        /// File path or location path that failed to open.
        target: String,
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },
    /// Unsupported storage type class, rank or element count.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Malformed caller input, detected before any storage read.
    #[error("invalid argument: {0}")]
    Validation(String),
    /// Storage failure during a read, write or query.
    #[error("{operation}: {source}")]
    Io {
        /// The storage call that failed.
        operation: &'static str,
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },
}

impl Error {
    /// Create an [`Error::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Create an [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } => ErrorKind::Open,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Attach bridge error context to storage results.
pub trait StorageResultExt<T> {
    /// Map a failure to [`Error::Open`] for `target`.
    fn open_context(self, target: &str) -> Result<T>;
    /// Map a failure to [`Error::Io`] for `operation`.
    fn io_context(self, operation: &'static str) -> Result<T>;
}

impl<T> StorageResultExt<T> for std::result::Result<T, StorageError> {
    fn open_context(self, target: &str) -> Result<T> {
        self.map_err(|source| Error::Open {
            target: target.to_string(),
            source,
        })
    }

    fn io_context(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| Error::Io { operation, source })
    }
}
