//! Move-only owners of storage identifiers.
//!
//! A [`Handle`] owns exactly one identifier and releases it through the
//! storage library when dropped. The kind marker picks the release call, so a
//! dataspace is never closed as a datatype.

use std::fmt;
use std::marker::PhantomData;

use crate::error::StorageError;
use crate::storage::{HandleKind, Hid, Storage, INVALID_HID};

/// Marker trait tying a handle type to its release call.
pub trait Kind {
    const KIND: HandleKind;
}

/// Kind markers.
pub mod kind {
    use super::Kind;
    use crate::storage::HandleKind;

    macro_rules! kinds {
        ($($name:ident),* $(,)?) => {
            $(
                #[derive(Debug)]
                pub enum $name {}

                impl Kind for $name {
                    const KIND: HandleKind = HandleKind::$name;
                }
            )*
        };
    }

    kinds!(File, Group, Dataset, Attribute, Datatype, Dataspace, PropertyList, Object);
}

pub type FileHandle<'s> = Handle<'s, kind::File>;
pub type GroupHandle<'s> = Handle<'s, kind::Group>;
pub type DatasetHandle<'s> = Handle<'s, kind::Dataset>;
pub type AttrHandle<'s> = Handle<'s, kind::Attribute>;
pub type TypeHandle<'s> = Handle<'s, kind::Datatype>;
pub type SpaceHandle<'s> = Handle<'s, kind::Dataspace>;
pub type PlistHandle<'s> = Handle<'s, kind::PropertyList>;
pub type ObjectHandle<'s> = Handle<'s, kind::Object>;

/// Owner of one storage identifier of kind `K`.
pub struct Handle<'s, K: Kind> {
    id: Hid,
    storage: &'s dyn Storage,
    _kind: PhantomData<K>,
}

impl<'s, K: Kind> Handle<'s, K> {
    /// Take ownership of `id`. A negative id gives an invalid handle.
    pub fn new(storage: &'s dyn Storage, id: Hid) -> Self {
        Handle {
            id: if id < 0 { INVALID_HID } else { id },
            storage,
            _kind: PhantomData,
        }
    }

    /// A handle that owns nothing.
    pub fn invalid(storage: &'s dyn Storage) -> Self {
        Self::new(storage, INVALID_HID)
    }

    /// Wrap the identifier returned by a storage call.
    pub fn acquire(
        storage: &'s dyn Storage,
        id: Result<Hid, StorageError>,
    ) -> Result<Self, StorageError> {
        id.map(|id| Self::new(storage, id))
    }

    pub fn valid(&self) -> bool {
        self.id >= 0
    }

    /// The raw identifier, still owned by this handle.
    pub fn get(&self) -> Hid {
        self.id
    }

    /// Give up ownership without closing. The handle becomes invalid.
    pub fn release(&mut self) -> Hid {
        std::mem::replace(&mut self.id, INVALID_HID)
    }

    /// Close the current identifier, if any, and take ownership of `id`.
    pub fn reset(&mut self, id: Hid) {
        self.close_current();
        self.id = if id < 0 { INVALID_HID } else { id };
    }

    /// Consume the handle and return the identifier without closing it.
    pub fn into_raw(mut self) -> Hid {
        self.release()
    }

    fn close_current(&mut self) {
        if self.valid() {
            let id = self.release();
            let kind = K::KIND;
            if let Err(err) = self.storage.close(kind, id) {
                tracing::warn!(%kind, id, error = %err, "failed to release handle");
            }
        }
    }
}

impl<K: Kind> Drop for Handle<'_, K> {
    fn drop(&mut self) {
        self.close_current();
    }
}

impl<K: Kind> fmt::Debug for Handle<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &K::KIND)
            .field("id", &self.id)
            .finish()
    }
}
