//! Host-facing operations.
//!
//! Every operation names a file by path and an object by `/`-separated
//! location, opens what it needs, and releases everything before returning.
//! The plain methods report failure as `None`/`false` plus one diagnostic
//! line; the `try_*` methods return the typed [`Error`].

use std::path::Path;

use crate::attr::{decode_attributes, read_attribute_array};
use crate::config::BridgeConfig;
use crate::dataset::{
    check_writable, create_empty, read_full, read_slice, read_string, write_full, SliceRequest,
};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{Error, ErrorKind, Result, StorageResultExt};
use crate::handle::{AttrHandle, FileHandle, ObjectHandle};
use crate::host::HostArray;
use crate::info::describe;
use crate::signature::is_hdf5_file;
use crate::storage::{FileMode, ObjectKind, Storage};
use crate::value::Value;

/// Crate version reported to hosts.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Stateless front end over a [`Storage`] backend.
pub struct Bridge<S: Storage> {
    storage: S,
    config: BridgeConfig,
    diagnostics: Box<dyn Diagnostics>,
}

impl<S: Storage> Bridge<S> {
    pub fn new(storage: S) -> Self {
        Bridge {
            storage,
            config: BridgeConfig::default(),
            diagnostics: Box::new(TracingDiagnostics),
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the sink that receives failure reports.
    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn version(&self) -> &'static str {
        version()
    }

    // ---- plumbing ----

    fn report<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let message = format!("{operation}: {err}");
                match err.kind() {
                    ErrorKind::Validation => self.diagnostics.debug(&message),
                    _ => self.diagnostics.warning(&message),
                }
                None
            }
        }
    }

    fn open(&self, path: &Path, mode: FileMode) -> Result<FileHandle<'_>> {
        FileHandle::acquire(&self.storage, self.storage.file_open(path, mode))
            .open_context(&path.display().to_string())
    }

    fn open_or_create(&self, path: &Path) -> Result<FileHandle<'_>> {
        match self.storage.file_open(path, FileMode::ReadWrite) {
            Ok(id) => Ok(FileHandle::new(&self.storage, id)),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "creating file");
                FileHandle::acquire(&self.storage, self.storage.file_create(path))
                    .open_context(&path.display().to_string())
            }
        }
    }

    fn open_object<'s>(&'s self, file: &FileHandle<'s>, location: &str) -> Result<ObjectHandle<'s>> {
        ObjectHandle::acquire(&self.storage, self.storage.object_open(file.get(), location))
            .open_context(location)
    }

    fn open_dataset<'s>(&'s self, file: &FileHandle<'s>, location: &str) -> Result<ObjectHandle<'s>> {
        let object = self.open_object(file, location)?;
        match self
            .storage
            .object_kind(object.get())
            .io_context("query object kind")?
        {
            ObjectKind::Dataset => Ok(object),
            _ => Err(Error::unsupported(format!("'{location}' is not a dataset"))),
        }
    }

    // ---- files and links ----

    /// Whether `path` carries the storage signature. Opens no handles.
    pub fn is_storage_file(&self, path: impl AsRef<Path>) -> bool {
        is_hdf5_file(path)
    }

    pub fn try_info(&self, path: impl AsRef<Path>, location: Option<&str>) -> Result<Value> {
        let path = path.as_ref();
        let location = location.unwrap_or("/");
        let _span = tracing::debug_span!("info", path = %path.display(), location).entered();
        let file = self.open(path, FileMode::ReadOnly)?;
        Ok(describe(&self.storage, file.get(), location, &self.config)?.to_value())
    }

    /// Metadata tree of `location`, or of the root group when `None`.
    pub fn info(&self, path: impl AsRef<Path>, location: Option<&str>) -> Option<Value> {
        self.report("info", self.try_info(path, location))
    }

    pub fn try_exists(&self, path: impl AsRef<Path>, location: &str) -> Result<bool> {
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        self.storage
            .link_exists(file.get(), location)
            .io_context("check link")
    }

    pub fn exists(&self, path: impl AsRef<Path>, location: &str) -> bool {
        self.report("exists", self.try_exists(path, location))
            .unwrap_or(false)
    }

    pub fn try_delete(&self, path: impl AsRef<Path>, location: &str) -> Result<()> {
        let file = self.open(path.as_ref(), FileMode::ReadWrite)?;
        self.storage
            .link_delete(file.get(), location)
            .io_context("delete link")
    }

    /// Remove the link at `location`.
    pub fn delete(&self, path: impl AsRef<Path>, location: &str) -> bool {
        self.report("delete", self.try_delete(path, location)).is_some()
    }

    // ---- attributes ----

    pub fn try_read_attributes(&self, path: impl AsRef<Path>, location: &str) -> Result<Value> {
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        let object = self.open_object(&file, location)?;
        decode_attributes(
            &self.storage,
            object.get(),
            &self.config,
            self.diagnostics.as_ref(),
        )
    }

    /// All decodable attributes of the object at `location`, by name.
    pub fn read_attributes(&self, path: impl AsRef<Path>, location: &str) -> Option<Value> {
        self.report("read_attributes", self.try_read_attributes(path, location))
    }

    pub fn try_read_attribute_array(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        name: &str,
    ) -> Result<HostArray> {
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        let object = self.open_object(&file, location)?;
        let attr = AttrHandle::acquire(&self.storage, self.storage.attr_open(object.get(), name))
            .open_context(name)?;
        read_attribute_array(&self.storage, attr.get(), &self.config)
    }

    pub fn read_attribute_array(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        name: &str,
    ) -> Option<HostArray> {
        self.report(
            "read_attribute_array",
            self.try_read_attribute_array(path, location, name),
        )
    }

    pub fn try_attribute_exists(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        name: &str,
    ) -> Result<bool> {
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        let object = self.open_object(&file, location)?;
        self.storage
            .attr_exists(object.get(), name)
            .io_context("check attribute")
    }

    pub fn attribute_exists(&self, path: impl AsRef<Path>, location: &str, name: &str) -> bool {
        self.report(
            "attribute_exists",
            self.try_attribute_exists(path, location, name),
        )
        .unwrap_or(false)
    }

    pub fn try_delete_attribute(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        name: &str,
    ) -> Result<()> {
        let file = self.open(path.as_ref(), FileMode::ReadWrite)?;
        let object = self.open_object(&file, location)?;
        self.storage
            .attr_delete(object.get(), name)
            .io_context("delete attribute")
    }

    pub fn delete_attribute(&self, path: impl AsRef<Path>, location: &str, name: &str) -> bool {
        self.report(
            "delete_attribute",
            self.try_delete_attribute(path, location, name),
        )
        .is_some()
    }

    // ---- datasets ----

    pub fn try_create_dataset(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        array: &HostArray,
    ) -> Result<()> {
        let path = path.as_ref();
        let _span = tracing::debug_span!("create_dataset", path = %path.display(), location).entered();
        check_writable(array)?;
        let file = self.open_or_create(path)?;
        write_full(&self.storage, file.get(), location, array, &self.config)
    }

    /// Write `array` as a new dataset, creating the file if needed.
    pub fn create_dataset(&self, path: impl AsRef<Path>, location: &str, array: &HostArray) -> bool {
        self.report("create_dataset", self.try_create_dataset(path, location, array))
            .is_some()
    }

    pub fn try_create_dataset_simple(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        code: i64,
        shape: &[u64],
    ) -> Result<()> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(Error::validation(format!("invalid dataset shape {shape:?}")));
        }
        let file = self.open_or_create(path.as_ref())?;
        create_empty(&self.storage, file.get(), location, code, shape, &self.config)
    }

    /// Create an uninitialised dataset of element type `code` and host-order `shape`.
    pub fn create_dataset_simple(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        code: i64,
        shape: &[u64],
    ) -> bool {
        self.report(
            "create_dataset_simple",
            self.try_create_dataset_simple(path, location, code, shape),
        )
        .is_some()
    }

    pub fn try_read_dataset(&self, path: impl AsRef<Path>, location: &str) -> Result<HostArray> {
        let path = path.as_ref();
        let _span = tracing::debug_span!("read_dataset", path = %path.display(), location).entered();
        let file = self.open(path, FileMode::ReadOnly)?;
        let dataset = self.open_dataset(&file, location)?;
        read_full(&self.storage, dataset.get(), &self.config)
    }

    pub fn read_dataset(&self, path: impl AsRef<Path>, location: &str) -> Option<HostArray> {
        self.report("read_dataset", self.try_read_dataset(path, location))
    }

    pub fn try_read_dataset_slice(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        request: &SliceRequest,
    ) -> Result<HostArray> {
        request.validate()?;
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        let dataset = self.open_dataset(&file, location)?;
        read_slice(&self.storage, dataset.get(), request, &self.config)
    }

    pub fn read_dataset_slice(
        &self,
        path: impl AsRef<Path>,
        location: &str,
        request: &SliceRequest,
    ) -> Option<HostArray> {
        self.report(
            "read_dataset_slice",
            self.try_read_dataset_slice(path, location, request),
        )
    }

    pub fn try_read_string_dataset(&self, path: impl AsRef<Path>, location: &str) -> Result<String> {
        let file = self.open(path.as_ref(), FileMode::ReadOnly)?;
        let dataset = self.open_dataset(&file, location)?;
        read_string(&self.storage, dataset.get())
    }

    pub fn read_string_dataset(&self, path: impl AsRef<Path>, location: &str) -> Option<String> {
        self.report(
            "read_string_dataset",
            self.try_read_string_dataset(path, location),
        )
    }
}
