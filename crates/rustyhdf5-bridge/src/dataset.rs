//! Whole-dataset and hyperslab transfers between datasets and host arrays.

use crate::attr::MAX_RANK;
use crate::config::BridgeConfig;
use crate::dims::{storage_axis, to_host_order, to_storage_order, HostOrder, StorageOrder};
use crate::error::{Error, Result, StorageResultExt};
use crate::handle::{DatasetHandle, SpaceHandle, TypeHandle};
use crate::host::HostArray;
use crate::storage::{Extent, Hid, SpaceClass, Storage, TypeClass, INVALID_HID};
use crate::text::{read_strings, Source};
use crate::types::{host_code_to_storage, host_type_to_storage, storage_type_to_host};

/// Most axes a slice request may name.
pub const MAX_SLICE_AXES: usize = 3;

/// One host axis taking part in a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAxis {
    /// Host-order axis index.
    pub axis: usize,
    /// Number of elements taken along the axis.
    pub count: u64,
    /// Step between taken elements.
    pub stride: u64,
}

impl SliceAxis {
    pub fn new(axis: usize, count: u64, stride: u64) -> Self {
        SliceAxis {
            axis,
            count,
            stride,
        }
    }
}

/// A strided sub-block of a dataset, described in host order.
///
/// Axes that are not named are held at their offset with a count of one and
/// do not appear in the result. The result has one axis per named axis, in
/// the order given.
///
/// ```
/// use rustyhdf5_bridge::dataset::{SliceAxis, SliceRequest};
///
/// // Host axis 0 from offset 5, three elements with stride 2; host axis 1 fixed at 4.
/// let request = SliceRequest::new(vec![5, 4], vec![SliceAxis::new(0, 3, 2)]);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    offset: HostOrder<u64>,
    axes: Vec<SliceAxis>,
}

/// Storage-order hyperslab derived from a [`SliceRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hyperslab {
    pub start: StorageOrder<u64>,
    pub stride: StorageOrder<u64>,
    pub count: StorageOrder<u64>,
    /// Shape of the memory buffer, storage order.
    pub memory: StorageOrder<u64>,
    /// Shape of the resulting host array.
    pub output: HostOrder<u64>,
}

impl SliceRequest {
    /// `offset` holds one host-order start index per dataset axis.
    pub fn new(offset: Vec<u64>, axes: Vec<SliceAxis>) -> Self {
        SliceRequest {
            offset: HostOrder::new(offset),
            axes,
        }
    }

    /// Build from parallel axis, count and stride lists.
    pub fn from_parts(offset: &[u64], axes: &[usize], counts: &[u64], strides: &[u64]) -> Result<Self> {
        if axes.len() != counts.len() || axes.len() != strides.len() {
            return Err(Error::validation(format!(
                "{} axes, {} counts and {} strides given",
                axes.len(),
                counts.len(),
                strides.len()
            )));
        }
        let axes = axes
            .iter()
            .zip(counts)
            .zip(strides)
            .map(|((&axis, &count), &stride)| SliceAxis::new(axis, count, stride))
            .collect();
        Ok(Self::new(offset.to_vec(), axes))
    }

    pub fn offset(&self) -> &[u64] {
        &self.offset
    }

    pub fn axes(&self) -> &[SliceAxis] {
        &self.axes
    }

    /// Checks that need no knowledge of the dataset.
    pub fn validate(&self) -> Result<()> {
        if self.axes.is_empty() || self.axes.len() > MAX_SLICE_AXES {
            return Err(Error::validation(format!(
                "a slice names 1 to {MAX_SLICE_AXES} axes, got {}",
                self.axes.len()
            )));
        }
        if self.axes.windows(2).any(|w| w[0].axis >= w[1].axis) {
            return Err(Error::validation("slice axes must be strictly increasing"));
        }
        if let Some(a) = self.axes.iter().find(|a| a.count == 0) {
            return Err(Error::validation(format!("zero count on axis {}", a.axis)));
        }
        if let Some(a) = self.axes.iter().find(|a| a.stride == 0) {
            return Err(Error::validation(format!("zero stride on axis {}", a.axis)));
        }
        Ok(())
    }

    /// Resolve against a dataset extent (storage order).
    pub(crate) fn hyperslab(&self, extent: &StorageOrder<u64>) -> Result<Hyperslab> {
        let rank = extent.len();
        if self.offset.len() != rank {
            return Err(Error::validation(format!(
                "offset has {} entries, dataset has rank {rank}",
                self.offset.len()
            )));
        }
        if let Some(a) = self.axes.iter().find(|a| a.axis >= rank) {
            return Err(Error::validation(format!(
                "axis {} out of range for rank {rank}",
                a.axis
            )));
        }

        let mut count = vec![1u64; rank];
        let mut stride = vec![1u64; rank];
        for a in &self.axes {
            count[a.axis] = a.count;
            stride[a.axis] = a.stride;
        }
        let host_extent = to_host_order(extent.clone());
        for a in 0..rank {
            let last = (count[a] - 1)
                .checked_mul(stride[a])
                .and_then(|span| span.checked_add(self.offset[a]));
            if !matches!(last, Some(last) if last < host_extent[a]) {
                return Err(Error::validation(format!(
                    "selection on host axis {a} (storage axis {}) exceeds extent {}",
                    storage_axis(a, rank),
                    host_extent[a]
                )));
            }
        }

        let output: HostOrder<u64> = self.axes.iter().map(|a| a.count).collect();
        Ok(Hyperslab {
            start: to_storage_order(self.offset.clone()),
            stride: to_storage_order(HostOrder::new(stride)),
            count: to_storage_order(HostOrder::new(count)),
            memory: to_storage_order(output.clone()),
            output,
        })
    }
}

/// Extent of a dataspace, rejecting null spaces and ranks above [`MAX_RANK`].
/// Scalars report the extent `[1]`.
fn readable_extent(storage: &dyn Storage, space: Hid) -> Result<StorageOrder<u64>> {
    let class = storage.space_class(space).io_context("query dataspace class")?;
    match class {
        SpaceClass::Null => Err(Error::unsupported("dataset has a null dataspace")),
        SpaceClass::Scalar => Ok(StorageOrder::new(vec![1])),
        SpaceClass::Simple => {
            let Extent { dims, .. } = storage.space_extent(space).io_context("query dataspace extent")?;
            if dims.len() > MAX_RANK {
                return Err(Error::unsupported(format!(
                    "dataset rank {} exceeds {MAX_RANK}",
                    dims.len()
                )));
            }
            Ok(StorageOrder::new(dims))
        }
    }
}

fn host_shape(shape: HostOrder<u64>) -> Vec<usize> {
    shape.iter().map(|&n| n as usize).collect()
}

fn read_into(
    storage: &dyn Storage,
    dataset: Hid,
    memory: Hid,
    mem_space: Option<Hid>,
    file_space: Option<Hid>,
    array: &mut HostArray,
) -> Result<()> {
    let buf = array
        .column_major_bytes_mut()
        .ok_or_else(|| Error::unsupported("host array is not contiguous"))?;
    storage
        .dataset_read(dataset, memory, mem_space, file_space, buf)
        .io_context("read dataset")
}

/// Create dataset `name` under `loc` from a host array and write all of it.
pub fn write_full(
    storage: &dyn Storage,
    loc: Hid,
    name: &str,
    array: &HostArray,
    config: &BridgeConfig,
) -> Result<()> {
    check_writable(array)?;
    let datatype = host_type_to_storage(storage, array.element_type(), config)?;
    let shape = array.storage_shape();
    let space = SpaceHandle::acquire(storage, storage.space_simple(&shape, None))
        .io_context("create dataspace")?;
    let dataset = DatasetHandle::acquire(
        storage,
        storage.dataset_create(loc, name, datatype.get(), space.get(), INVALID_HID),
    )
    .io_context("create dataset")?;
    storage
        .dataset_write(dataset.get(), datatype.get(), &array.column_major_bytes())
        .io_context("write dataset")
}

/// Reject arrays whose shape [`read_full`] could not read back.
pub(crate) fn check_writable(array: &HostArray) -> Result<()> {
    let rank = array.shape().len();
    if rank == 0 {
        return Err(Error::validation("cannot write a zero-dimensional array"));
    }
    if rank > MAX_RANK {
        return Err(Error::unsupported(format!("array rank {rank} exceeds {MAX_RANK}")));
    }
    if let Some(axis) = array.shape().iter().position(|&n| n == 0) {
        return Err(Error::validation(format!("extent of axis {axis} is zero")));
    }
    Ok(())
}

/// Create an empty dataset from a host element code and a host-order shape.
pub fn create_empty(
    storage: &dyn Storage,
    loc: Hid,
    name: &str,
    code: i64,
    shape: &[u64],
    config: &BridgeConfig,
) -> Result<()> {
    if shape.is_empty() {
        return Err(Error::validation("dataset shape is empty"));
    }
    if let Some(axis) = shape.iter().position(|&n| n == 0) {
        return Err(Error::validation(format!("extent of axis {axis} is zero")));
    }
    let datatype = host_code_to_storage(storage, code, config);
    if !datatype.valid() {
        return Err(Error::unsupported(format!("element type code {code}")));
    }
    let dims = to_storage_order(HostOrder::from(shape));
    let space = SpaceHandle::acquire(storage, storage.space_simple(&dims, None))
        .io_context("create dataspace")?;
    DatasetHandle::acquire(
        storage,
        storage.dataset_create(loc, name, datatype.get(), space.get(), INVALID_HID),
    )
    .io_context("create dataset")?;
    Ok(())
}

/// Read a whole dataset into a host array. Scalar datasets give shape `[1]`.
pub fn read_full(storage: &dyn Storage, dataset: Hid, config: &BridgeConfig) -> Result<HostArray> {
    let space = SpaceHandle::acquire(storage, storage.dataset_space(dataset))
        .io_context("get dataset dataspace")?;
    let extent = readable_extent(storage, space.get())?;
    let datatype = TypeHandle::acquire(storage, storage.dataset_type(dataset))
        .io_context("get dataset type")?;
    let (element, memory) = storage_type_to_host(storage, datatype.get(), config)?;

    let mut array = HostArray::zeros(element, &host_shape(to_host_order(extent)));
    read_into(storage, dataset, memory.get(), None, None, &mut array)?;
    Ok(array)
}

/// Read the sub-block described by `request`.
pub fn read_slice(
    storage: &dyn Storage,
    dataset: Hid,
    request: &SliceRequest,
    config: &BridgeConfig,
) -> Result<HostArray> {
    request.validate()?;
    let file_space = SpaceHandle::acquire(storage, storage.dataset_space(dataset))
        .io_context("get dataset dataspace")?;
    if storage
        .space_class(file_space.get())
        .io_context("query dataspace class")?
        != SpaceClass::Simple
    {
        return Err(Error::unsupported("slices need a simple dataspace"));
    }
    let extent = readable_extent(storage, file_space.get())?;
    let slab = request.hyperslab(&extent)?;

    let datatype = TypeHandle::acquire(storage, storage.dataset_type(dataset))
        .io_context("get dataset type")?;
    let (element, memory) = storage_type_to_host(storage, datatype.get(), config)?;

    storage
        .space_select_hyperslab(file_space.get(), &slab.start, &slab.stride, &slab.count)
        .io_context("select hyperslab")?;
    let mem_space = SpaceHandle::acquire(storage, storage.space_simple(&slab.memory, None))
        .io_context("create memory dataspace")?;

    let mut array = HostArray::zeros(element, &host_shape(slab.output));
    read_into(
        storage,
        dataset,
        memory.get(),
        Some(mem_space.get()),
        Some(file_space.get()),
        &mut array,
    )?;
    Ok(array)
}

/// Read a dataset holding exactly one string.
pub fn read_string(storage: &dyn Storage, dataset: Hid) -> Result<String> {
    let datatype = TypeHandle::acquire(storage, storage.dataset_type(dataset))
        .io_context("get dataset type")?;
    let class = storage.type_class(datatype.get()).io_context("query type class")?;
    if class != TypeClass::String {
        return Err(Error::unsupported(format!(
            "{} dataset is not a string",
            class.label()
        )));
    }
    let space = SpaceHandle::acquire(storage, storage.dataset_space(dataset))
        .io_context("get dataset dataspace")?;
    let points = storage
        .space_selected_points(space.get())
        .io_context("count dataset elements")?;
    if points != 1 {
        return Err(Error::unsupported(format!(
            "string dataset holds {points} elements, expected 1"
        )));
    }
    read_strings(storage, Source::Dataset(dataset), datatype.get(), 1)?
        .pop()
        .ok_or_else(|| Error::unsupported("string dataset is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handle::{FileHandle, ObjectHandle};
    use crate::storage::memory::{Datatype, MemoryStorage};
    use crate::storage::{HandleKind, StringPadding};
    use crate::types::ElementType;
    use ndarray::{Array, IxDyn, ShapeBuilder};
    use std::path::Path;

    fn open<'s>(storage: &'s MemoryStorage, file: &FileHandle<'s>, path: &str) -> ObjectHandle<'s> {
        ObjectHandle::acquire(storage, storage.object_open(file.get(), path)).unwrap()
    }

    fn new_file(storage: &MemoryStorage) -> FileHandle<'_> {
        FileHandle::acquire(storage, storage.file_create(Path::new("data.h5"))).unwrap()
    }

    #[test]
    fn full_round_trip_is_bit_identical() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        let arr = Array::from_shape_fn(IxDyn(&[2, 3, 4]).f(), |ix| {
            (ix[0] * 100 + ix[1] * 10 + ix[2]) as f32 + 0.5
        });
        let host = HostArray::from(arr);
        write_full(&storage, file.get(), "cube", &host, &config).unwrap();

        let ds = open(&storage, &file, "cube");
        let space = storage.dataset_space(ds.get()).unwrap();
        assert_eq!(storage.space_extent(space).unwrap().dims, vec![4, 3, 2]);
        storage.close(HandleKind::Dataspace, space).unwrap();

        let back = read_full(&storage, ds.get(), &config).unwrap();
        assert_eq!(back.shape(), &[2, 3, 4]);
        assert_eq!(back, host);
        assert_eq!(back.column_major_bytes(), host.column_major_bytes());
    }

    #[test]
    fn row_major_host_input_keeps_logical_values() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        let arr = Array::from_shape_fn(IxDyn(&[3, 2]), |ix| (ix[0] + 10 * ix[1]) as i16);
        let host = HostArray::from(arr);
        write_full(&storage, file.get(), "m", &host, &config).unwrap();
        let ds = open(&storage, &file, "m");
        assert_eq!(read_full(&storage, ds.get(), &config).unwrap(), host);
    }

    fn grid(storage: &MemoryStorage, file: &FileHandle<'_>) {
        // storage (10, 20), element (r, c) = 100 r + c
        let values: Vec<f64> = (0..10)
            .flat_map(|r| (0..20).map(move |c| (100 * r + c) as f64))
            .collect();
        let t = TypeHandle::acquire(storage, storage.type_native(crate::storage::NativeType::Double)).unwrap();
        let s = SpaceHandle::acquire(storage, storage.space_simple(&[10, 20], None)).unwrap();
        let ds = DatasetHandle::acquire(storage, storage.dataset_create(file.get(), "grid", t.get(), s.get(), -1)).unwrap();
        storage.dataset_write(ds.get(), t.get(), bytemuck::cast_slice(&values)).unwrap();
    }

    #[test]
    fn slice_along_host_axis() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        grid(&storage, &file);
        let ds = open(&storage, &file, "grid");
        let request = SliceRequest::new(vec![5, 4], vec![SliceAxis::new(0, 3, 2)]);
        let out = read_slice(&storage, ds.get(), &request, &BridgeConfig::default()).unwrap();
        assert_eq!(out.shape(), &[3]);
        match out {
            HostArray::Float64(arr) => {
                assert_eq!(arr.iter().copied().collect::<Vec<_>>(), vec![405.0, 407.0, 409.0])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slice_two_axes_keeps_host_layout() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        grid(&storage, &file);
        let ds = open(&storage, &file, "grid");
        let request = SliceRequest::new(
            vec![1, 2],
            vec![SliceAxis::new(0, 2, 3), SliceAxis::new(1, 3, 1)],
        );
        let out = read_slice(&storage, ds.get(), &request, &BridgeConfig::default()).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        match out {
            HostArray::Float64(arr) => {
                // host (x, y) = storage (2 + y, 1 + 3x)
                assert_eq!(arr[[0, 0]], 201.0);
                assert_eq!(arr[[1, 0]], 204.0);
                assert_eq!(arr[[1, 2]], 404.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn structural_errors_precede_storage_calls() {
        let storage = MemoryStorage::new();
        storage.fail_on("dataset_space");
        let request = SliceRequest::new(
            vec![0, 0],
            vec![SliceAxis::new(1, 1, 1), SliceAxis::new(0, 1, 1)],
        );
        let err = read_slice(&storage, 12345, &request, &BridgeConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        for bad in [
            SliceRequest::new(vec![0], vec![]),
            SliceRequest::new(vec![0; 4], (0..4).map(|a| SliceAxis::new(a, 1, 1)).collect()),
            SliceRequest::new(vec![0], vec![SliceAxis::new(0, 0, 1)]),
            SliceRequest::new(vec![0], vec![SliceAxis::new(0, 1, 0)]),
            SliceRequest::new(vec![0, 0], vec![SliceAxis::new(1, 1, 1), SliceAxis::new(1, 1, 1)]),
        ] {
            assert_eq!(bad.validate().unwrap_err().kind(), ErrorKind::Validation);
        }
        assert!(SliceRequest::from_parts(&[0], &[0], &[1, 2], &[1]).is_err());
    }

    #[test]
    fn extent_errors_are_validation() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        grid(&storage, &file);
        let ds = open(&storage, &file, "grid");
        let config = BridgeConfig::default();
        for request in [
            SliceRequest::new(vec![5], vec![SliceAxis::new(0, 1, 1)]),
            SliceRequest::new(vec![0, 0], vec![SliceAxis::new(2, 1, 1)]),
            SliceRequest::new(vec![18, 0], vec![SliceAxis::new(0, 2, 2)]),
            SliceRequest::new(vec![0, 10], vec![SliceAxis::new(0, 1, 1)]),
        ] {
            let err = read_slice(&storage, ds.get(), &request, &config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{request:?}");
        }
        assert_eq!(storage.open_handles(), 2);
    }

    #[test]
    fn create_empty_checks_shape_and_code() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        let kind = |r: Result<()>| r.unwrap_err().kind();
        assert_eq!(kind(create_empty(&storage, file.get(), "a", 2, &[], &config)), ErrorKind::Validation);
        assert_eq!(kind(create_empty(&storage, file.get(), "a", 2, &[3, 0], &config)), ErrorKind::Validation);
        assert_eq!(kind(create_empty(&storage, file.get(), "a", 99, &[3], &config)), ErrorKind::Unsupported);

        create_empty(&storage, file.get(), "img", ElementType::UInt16.code(), &[4, 3], &config).unwrap();
        let ds = open(&storage, &file, "img");
        let space = SpaceHandle::acquire(&storage, storage.dataset_space(ds.get())).unwrap();
        assert_eq!(storage.space_extent(space.get()).unwrap().dims, vec![3, 4]);
        let out = read_full(&storage, ds.get(), &config).unwrap();
        assert_eq!(out.element_type(), ElementType::UInt16);
        assert_eq!(out.shape(), &[4, 3]);
    }

    #[test]
    fn write_full_rejects_unreadable_ranks() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        storage.fail_on("type_native");
        storage.fail_on("space_simple");
        let write = |shape: &[usize]| {
            let array = HostArray::zeros(ElementType::Float32, shape);
            write_full(&storage, file.get(), "w", &array, &config)
                .unwrap_err()
                .kind()
        };
        assert_eq!(write(&[]), ErrorKind::Validation);
        assert_eq!(write(&[4, 0]), ErrorKind::Validation);
        assert_eq!(write(&[1, 1, 1, 1, 2]), ErrorKind::Unsupported);
        storage.clear_faults();

        let array = HostArray::zeros(ElementType::Float32, &[1, 1, 1, 2]);
        write_full(&storage, file.get(), "r4", &array, &config).unwrap();
        let ds = open(&storage, &file, "r4");
        assert_eq!(read_full(&storage, ds.get(), &config).unwrap(), array);
        assert!(!storage.link_exists(file.get(), "w").unwrap());
    }

    #[test]
    fn three_byte_integers_read_as_int32() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        let packed = TypeHandle::new(&storage, storage.register_type(Datatype::Integer { size: 3, signed: true }));
        let wide = TypeHandle::new(&storage, storage.register_type(Datatype::Integer { size: 4, signed: true }));
        let space = SpaceHandle::acquire(&storage, storage.space_simple(&[3], None)).unwrap();
        let ds = DatasetHandle::acquire(&storage, storage.dataset_create(file.get(), "i24", packed.get(), space.get(), -1)).unwrap();
        let values = [-8_388_608i32, -1, 8_388_607];
        storage.dataset_write(ds.get(), wide.get(), bytemuck::cast_slice(&values)).unwrap();

        match read_full(&storage, ds.get(), &config).unwrap() {
            HostArray::Int32(out) => assert_eq!(out.iter().copied().collect::<Vec<_>>(), values),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scalar_and_high_rank_datasets() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let file = new_file(&storage);
        let t = TypeHandle::new(&storage, storage.register_type(Datatype::Float { size: 8 }));
        let scalar = SpaceHandle::acquire(&storage, storage.space_scalar()).unwrap();
        DatasetHandle::acquire(&storage, storage.dataset_create(file.get(), "s", t.get(), scalar.get(), -1)).unwrap();
        let rank5 = SpaceHandle::acquire(&storage, storage.space_simple(&[1, 1, 1, 1, 2], None)).unwrap();
        DatasetHandle::acquire(&storage, storage.dataset_create(file.get(), "r5", t.get(), rank5.get(), -1)).unwrap();

        let ds = open(&storage, &file, "s");
        assert_eq!(read_full(&storage, ds.get(), &config).unwrap().shape(), &[1]);
        let ds = open(&storage, &file, "r5");
        assert_eq!(read_full(&storage, ds.get(), &config).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn single_string_dataset() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        let t = TypeHandle::new(&storage, storage.register_type(Datatype::fixed_string(8, StringPadding::NullPad)));
        let s = SpaceHandle::acquire(&storage, storage.space_scalar()).unwrap();
        let ds = DatasetHandle::acquire(&storage, storage.dataset_create(file.get(), "title", t.get(), s.get(), -1)).unwrap();
        storage.dataset_write(ds.get(), t.get(), b"spectrum").unwrap();
        assert_eq!(read_string(&storage, ds.get()).unwrap(), "spectrum");

        let many = SpaceHandle::acquire(&storage, storage.space_simple(&[2], None)).unwrap();
        DatasetHandle::acquire(&storage, storage.dataset_create(file.get(), "pair", t.get(), many.get(), -1)).unwrap();
        let pair = open(&storage, &file, "pair");
        assert_eq!(read_string(&storage, pair.get()).unwrap_err().kind(), ErrorKind::Unsupported);

        grid(&storage, &file);
        let numeric = open(&storage, &file, "grid");
        assert_eq!(read_string(&storage, numeric.get()).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn failed_reads_release_everything() {
        let storage = MemoryStorage::new();
        let file = new_file(&storage);
        grid(&storage, &file);
        let ds = open(&storage, &file, "grid");
        let request = SliceRequest::new(vec![0, 0], vec![SliceAxis::new(0, 4, 1)]);
        for op in ["dataset_read", "dataset_type", "space_simple", "space_select_hyperslab"] {
            storage.fail_on(op);
            let err = read_slice(&storage, ds.get(), &request, &BridgeConfig::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io, "{op}");
            assert_eq!(storage.open_handles(), 2, "{op}");
            storage.clear_faults();
        }
    }
}
