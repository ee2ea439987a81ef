//! Marshal HDF5 groups, datasets and attributes to and from host arrays.
//!
//! Storage lists axes row-major (slowest first); the host keeps its arrays
//! column-major (fastest first). Every shape, offset and count crossing the
//! boundary is reversed, so whole datasets move as one contiguous buffer.
//!
//! # Round trip
//!
//! ```
//! use ndarray::{Array, IxDyn, ShapeBuilder};
//! use rustyhdf5_bridge::storage::memory::MemoryStorage;
//! use rustyhdf5_bridge::{Bridge, HostArray};
//!
//! let bridge = Bridge::new(MemoryStorage::new());
//! let image = Array::from_shape_fn(IxDyn(&[4, 3]).f(), |ix| (ix[0] + 10 * ix[1]) as f32);
//! assert!(bridge.create_dataset("scan.h5", "/image", &HostArray::from(image.clone())));
//!
//! let back = bridge.read_dataset("scan.h5", "/image").unwrap();
//! assert_eq!(back, HostArray::from(image));
//! ```
//!
//! # Slices and metadata
//!
//! ```
//! use rustyhdf5_bridge::storage::memory::MemoryStorage;
//! use rustyhdf5_bridge::{Bridge, ElementType, SliceAxis, SliceRequest};
//!
//! let bridge = Bridge::new(MemoryStorage::new());
//! assert!(bridge.create_dataset_simple("cube.h5", "/cube", ElementType::Int16.code(), &[8, 6, 4]));
//!
//! // Host axis 0 held at 2, all of axis 1, axis 2 from 1 to 2.
//! let request = SliceRequest::new(
//!     vec![2, 0, 1],
//!     vec![SliceAxis::new(1, 6, 1), SliceAxis::new(2, 2, 1)],
//! );
//! let plane = bridge.read_dataset_slice("cube.h5", "/cube", &request).unwrap();
//! assert_eq!(plane.shape(), &[6, 2]);
//!
//! let info = bridge.info("cube.h5", None).unwrap();
//! assert_eq!(info.get("Type").and_then(|t| t.as_str()), Some("Group"));
//! ```

pub mod attr;
pub mod bridge;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod dims;
pub mod error;
pub mod handle;
pub mod host;
pub mod info;
pub mod signature;
pub mod storage;
mod text;
pub mod types;
pub mod value;

pub use bridge::{version, Bridge};
pub use config::{BridgeConfig, ComplexNames};
pub use dataset::{SliceAxis, SliceRequest};
pub use diagnostics::{Diagnostics, RecordingDiagnostics, Severity, TracingDiagnostics};
pub use dims::{HostOrder, StorageOrder};
pub use error::{Error, ErrorKind, Result, StorageError};
pub use host::HostArray;
pub use info::{NodeKind, ObjectInfo};
pub use types::ElementType;
pub use value::{ComplexWidth, Value};

// Host arrays are ndarray arrays of num-complex elements.
pub use ndarray;
pub use num_complex;
