//! Attribute decoding.
//!
//! Attributes decode into [`Value`] trees: scalars become a single leaf,
//! arrays of rank 1 to 4 become nested lists, and everything else is
//! reported as unsupported so the caller can skip it. Whole attribute sets
//! decode best-effort.

use bytemuck::{Pod, Zeroable};
use indexmap::IndexMap;
use num_complex::{Complex32, Complex64};

use crate::config::BridgeConfig;
use crate::diagnostics::Diagnostics;
use crate::dims::{to_host_order, StorageOrder};
use crate::error::{Error, Result, StorageResultExt};
use crate::handle::{AttrHandle, SpaceHandle, TypeHandle};
use crate::host::HostArray;
use crate::storage::{Hid, NativeType, SpaceClass, Storage, TypeClass};
use crate::text::{read_strings, Source};
use crate::types::{compatible_complex_type, storage_type_to_host};
use crate::value::{nest, ComplexWidth, Value};

/// Highest rank decoded into nested lists or host arrays.
pub const MAX_RANK: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Scalar,
    Array,
}

fn attribute_shape(storage: &dyn Storage, attr: Hid) -> Result<(SpaceClass, Vec<u64>)> {
    let space = SpaceHandle::acquire(storage, storage.attr_space(attr))
        .io_context("get attribute dataspace")?;
    let class = storage
        .space_class(space.get())
        .io_context("query dataspace class")?;
    let extent = storage
        .space_extent(space.get())
        .io_context("query dataspace extent")?;
    Ok((class, extent.dims))
}

fn read_native<T: Pod>(
    storage: &dyn Storage,
    attr: Hid,
    native: NativeType,
    count: usize,
) -> Result<Vec<T>> {
    let memory = TypeHandle::acquire(storage, storage.type_native(native))
        .io_context("create memory type")?;
    let mut data = vec![T::zeroed(); count];
    storage
        .attr_read(attr, memory.get(), bytemuck::cast_slice_mut(&mut data))
        .io_context("read attribute")?;
    Ok(data)
}

fn read_leaves(
    storage: &dyn Storage,
    attr: Hid,
    datatype: Hid,
    count: usize,
    arity: Arity,
) -> Result<Vec<Value>> {
    let class = storage
        .type_class(datatype)
        .io_context("query attribute type class")?;
    match class {
        TypeClass::Float => {
            if storage.type_size(datatype).io_context("query type size")? <= 4 {
                let data: Vec<f32> = read_native(storage, attr, NativeType::Float, count)?;
                Ok(data.into_iter().map(Value::Float32).collect())
            } else {
                let data: Vec<f64> = read_native(storage, attr, NativeType::Double, count)?;
                Ok(data.into_iter().map(Value::Float64).collect())
            }
        }
        TypeClass::Integer => {
            if storage.type_is_signed(datatype).io_context("query sign")? {
                let data: Vec<i64> = read_native(storage, attr, NativeType::Int64, count)?;
                Ok(data.into_iter().map(Value::Int).collect())
            } else {
                let data: Vec<u32> = read_native(storage, attr, NativeType::UInt32, count)?;
                Ok(data.into_iter().map(Value::UInt).collect())
            }
        }
        TypeClass::String => Ok(read_strings(storage, Source::Attribute(attr), datatype, count)?
            .into_iter()
            .map(Value::Text)
            .collect()),
        TypeClass::Compound => {
            let memory = compatible_complex_type(storage, datatype)?
                .ok_or_else(|| Error::unsupported("compound attribute is not a complex number"))?;
            let size = storage.type_size(memory.get()).io_context("query type size")?;
            if size <= 8 {
                let mut data = vec![Complex32::zeroed(); count];
                storage
                    .attr_read(attr, memory.get(), bytemuck::cast_slice_mut(&mut data))
                    .io_context("read attribute")?;
                // Single-width scalars are widened; array elements keep their width.
                let width = match arity {
                    Arity::Scalar => ComplexWidth::Double,
                    Arity::Array => ComplexWidth::Single,
                };
                Ok(data
                    .into_iter()
                    .map(|c| Value::Complex {
                        value: Complex64::new(f64::from(c.re), f64::from(c.im)),
                        width,
                    })
                    .collect())
            } else {
                let mut data = vec![Complex64::zeroed(); count];
                storage
                    .attr_read(attr, memory.get(), bytemuck::cast_slice_mut(&mut data))
                    .io_context("read attribute")?;
                Ok(data
                    .into_iter()
                    .map(|value| Value::Complex {
                        value,
                        width: ComplexWidth::Double,
                    })
                    .collect())
            }
        }
        other => Err(Error::unsupported(format!(
            "{} attributes are not supported",
            other.label()
        ))),
    }
}

/// Decode one open attribute into a value tree.
pub fn decode_attribute(storage: &dyn Storage, attr: Hid, config: &BridgeConfig) -> Result<Value> {
    let (class, dims) = attribute_shape(storage, attr)?;
    let datatype = TypeHandle::acquire(storage, storage.attr_type(attr))
        .io_context("get attribute type")?;
    match class {
        SpaceClass::Null => Err(Error::unsupported("attribute has a null dataspace")),
        SpaceClass::Scalar => read_leaves(storage, attr, datatype.get(), 1, Arity::Scalar)?
            .pop()
            .ok_or_else(|| Error::unsupported("attribute has no value")),
        SpaceClass::Simple => {
            let count = dims.iter().product::<u64>() as usize;
            if count == 0 {
                return Err(Error::unsupported("attribute has no elements"));
            }
            let is_string = storage
                .type_class(datatype.get())
                .io_context("query attribute type class")?
                == TypeClass::String;
            if config.flat_string_arrays && is_string {
                let leaves = read_leaves(storage, attr, datatype.get(), count, Arity::Array)?;
                return Ok(Value::List(leaves));
            }
            if dims.len() > MAX_RANK {
                return Err(Error::unsupported(format!(
                    "attribute rank {} exceeds {MAX_RANK}",
                    dims.len()
                )));
            }
            let leaves = read_leaves(storage, attr, datatype.get(), count, Arity::Array)?;
            let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
            Ok(nest(leaves, &dims))
        }
    }
}

fn decode_named(
    storage: &dyn Storage,
    object: Hid,
    name: &str,
    config: &BridgeConfig,
) -> Result<Value> {
    let attr = AttrHandle::acquire(storage, storage.attr_open(object, name)).open_context(name)?;
    decode_attribute(storage, attr.get(), config)
}

/// Decode every attribute of an object, in name order.
///
/// Attributes that fail to decode are left out and reported at debug level.
pub fn decode_attributes(
    storage: &dyn Storage,
    object: Hid,
    config: &BridgeConfig,
    diagnostics: &dyn Diagnostics,
) -> Result<Value> {
    let names = storage.attr_names(object).io_context("list attributes")?;
    let mut members = IndexMap::with_capacity(names.len());
    for name in names {
        match decode_named(storage, object, &name, config) {
            Ok(value) => {
                members.insert(name, value);
            }
            Err(err) => {
                tracing::debug!(attribute = %name, error = %err, "skipping attribute");
                diagnostics.debug(&format!("skipping attribute '{name}': {err}"));
            }
        }
    }
    Ok(Value::Group(members))
}

/// Read a numeric or complex attribute as a host array. Scalars give shape `[1]`.
pub fn read_attribute_array(
    storage: &dyn Storage,
    attr: Hid,
    config: &BridgeConfig,
) -> Result<HostArray> {
    let (class, dims) = attribute_shape(storage, attr)?;
    let host_shape: Vec<usize> = match class {
        SpaceClass::Null => return Err(Error::unsupported("attribute has a null dataspace")),
        SpaceClass::Scalar => vec![1],
        SpaceClass::Simple => {
            if dims.len() > MAX_RANK {
                return Err(Error::unsupported(format!(
                    "attribute rank {} exceeds {MAX_RANK}",
                    dims.len()
                )));
            }
            if dims.contains(&0) {
                return Err(Error::unsupported("attribute has no elements"));
            }
            to_host_order(StorageOrder::new(dims))
                .iter()
                .map(|&d| d as usize)
                .collect()
        }
    };
    let datatype = TypeHandle::acquire(storage, storage.attr_type(attr))
        .io_context("get attribute type")?;
    let (element, memory) = storage_type_to_host(storage, datatype.get(), config)?;
    let mut array = HostArray::zeros(element, &host_shape);
    let buf = array
        .column_major_bytes_mut()
        .ok_or_else(|| Error::unsupported("host array is not contiguous"))?;
    storage
        .attr_read(attr, memory.get(), buf)
        .io_context("read attribute")?;
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::error::ErrorKind;
    use crate::storage::memory::{Dataspace, Datatype, MemoryStorage};
    use crate::storage::{HandleKind, StringPadding};
    use std::path::Path;

    struct Fixture {
        storage: MemoryStorage,
        file: Hid,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = MemoryStorage::new();
            let file = storage.file_create(Path::new("attrs.h5")).unwrap();
            Fixture { storage, file }
        }

        /// Create attribute `name` with `datatype` over `dims` (empty = scalar)
        /// and fill it from `bytes` interpreted as `datatype`.
        fn attr(&self, name: &str, datatype: Datatype, dims: &[u64], bytes: &[u8]) {
            let s = &self.storage;
            let t = s.register_type(datatype);
            let sp = if dims.is_empty() {
                s.space_scalar().unwrap()
            } else {
                s.space_simple(dims, None).unwrap()
            };
            let a = s.attr_create(self.file, name, t, sp).unwrap();
            s.attr_write(a, t, bytes).unwrap();
            for (kind, id) in [
                (HandleKind::Attribute, a),
                (HandleKind::Dataspace, sp),
                (HandleKind::Datatype, t),
            ] {
                s.close(kind, id).unwrap();
            }
        }

        fn decode(&self, name: &str, config: &BridgeConfig) -> Result<Value> {
            decode_named(&self.storage, self.file, name, config)
        }
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    #[test]
    fn scalar_numbers() {
        let fx = Fixture::new();
        let config = BridgeConfig::default();
        fx.attr("f", Datatype::Float { size: 4 }, &[], &f32_bytes(&[2.5]));
        fx.attr("d", Datatype::Float { size: 8 }, &[], &(-1.25f64).to_ne_bytes());
        fx.attr("i", Datatype::Integer { size: 2, signed: true }, &[], &(-3i16).to_ne_bytes());
        fx.attr("u", Datatype::Integer { size: 1, signed: false }, &[], &[200]);
        assert_eq!(fx.decode("f", &config).unwrap(), Value::Float32(2.5));
        assert_eq!(fx.decode("d", &config).unwrap(), Value::Float64(-1.25));
        assert_eq!(fx.decode("i", &config).unwrap(), Value::Int(-3));
        assert_eq!(fx.decode("u", &config).unwrap(), Value::UInt(200));
    }

    #[test]
    fn wide_unsigned_saturates_to_u32() {
        let fx = Fixture::new();
        fx.attr(
            "big",
            Datatype::Integer { size: 8, signed: false },
            &[],
            &u64::MAX.to_ne_bytes(),
        );
        assert_eq!(
            fx.decode("big", &BridgeConfig::default()).unwrap(),
            Value::UInt(u32::MAX)
        );
    }

    #[test]
    fn fixed_string_regardless_of_padding() {
        let fx = Fixture::new();
        let config = BridgeConfig::default();
        let text = "héllo".as_bytes();
        fx.attr("exact", Datatype::fixed_string(6, StringPadding::NullPad), &[], text);
        let mut padded = text.to_vec();
        padded.resize(12, 0);
        fx.attr("padded", Datatype::fixed_string(12, StringPadding::NullTerminate), &[], &padded);
        let mut spaced = text.to_vec();
        spaced.resize(9, b' ');
        fx.attr("spaced", Datatype::fixed_string(9, StringPadding::SpacePad), &[], &spaced);
        for name in ["exact", "padded", "spaced"] {
            assert_eq!(fx.decode(name, &config).unwrap(), Value::from("héllo"), "{name}");
        }
    }

    #[test]
    fn variable_string_array_nests() {
        let fx = Fixture::new();
        let s = &fx.storage;
        let t = s.register_type(Datatype::variable_string());
        let sp = s.space_simple(&[2, 2], None).unwrap();
        let a = s.attr_create(fx.file, "names", t, sp).unwrap();
        s.attr_write_var_strings(a, t, &["a", "b", "c", "dé"]).unwrap();
        let v = fx.decode("names", &BridgeConfig::default()).unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::List(vec!["a".into(), "b".into()]),
                Value::List(vec!["c".into(), "dé".into()]),
            ])
        );
        let flat = fx
            .decode("names", &BridgeConfig::default().with_flat_string_arrays(true))
            .unwrap();
        assert_eq!(flat, Value::List(vec!["a".into(), "b".into(), "c".into(), "dé".into()]));
    }

    #[test]
    fn array_nesting_follows_storage_order() {
        let fx = Fixture::new();
        let values: Vec<i32> = (0..6).collect();
        fx.attr(
            "grid",
            Datatype::Integer { size: 4, signed: true },
            &[2, 3],
            bytemuck::cast_slice(&values),
        );
        let v = fx.decode("grid", &BridgeConfig::default()).unwrap();
        let rows = v.as_list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Value::List(vec![Value::Int(3), Value::Int(4), Value::Int(5)]));
    }

    #[test]
    fn complex_scalar_widens_but_array_does_not() {
        let fx = Fixture::new();
        let config = BridgeConfig::default();
        fx.attr("z", Datatype::complex(4, "re", "im"), &[], &f32_bytes(&[1.0, -2.0]));
        fx.attr("zs", Datatype::complex(4, "re", "im"), &[2], &f32_bytes(&[1.0, 2.0, 3.0, 4.0]));
        let mut wide = Vec::new();
        for v in [0.5f64, 0.25] {
            wide.extend_from_slice(&v.to_ne_bytes());
        }
        fx.attr("w", Datatype::complex(8, "Real", "Imag"), &[], &wide);

        assert_eq!(
            fx.decode("z", &config).unwrap(),
            Value::Complex {
                value: Complex64::new(1.0, -2.0),
                width: ComplexWidth::Double
            }
        );
        let zs = fx.decode("zs", &config).unwrap();
        assert_eq!(
            zs.as_list().unwrap()[1],
            Value::Complex {
                value: Complex64::new(3.0, 4.0),
                width: ComplexWidth::Single
            }
        );
        assert_eq!(
            fx.decode("w", &config).unwrap(),
            Value::Complex {
                value: Complex64::new(0.5, 0.25),
                width: ComplexWidth::Double
            }
        );
    }

    #[test]
    fn unsupported_shapes_and_classes() {
        let fx = Fixture::new();
        let config = BridgeConfig::default();
        fx.attr("rank5", Datatype::Float { size: 4 }, &[1, 1, 1, 1, 2], &f32_bytes(&[1.0, 2.0]));
        fx.attr("blob", Datatype::Opaque { size: 2, tag: "x".into() }, &[], &[1, 2]);
        fx.attr("empty", Datatype::Float { size: 4 }, &[0], &[]);
        for name in ["rank5", "blob", "empty"] {
            assert_eq!(fx.decode(name, &config).unwrap_err().kind(), ErrorKind::Unsupported);
        }

        let s = &fx.storage;
        let t = s.register_type(Datatype::Float { size: 4 });
        let sp = s.register_space(Dataspace::null());
        let a = s.attr_create(fx.file, "null", t, sp).unwrap();
        s.close(HandleKind::Attribute, a).unwrap();
        assert_eq!(fx.decode("null", &config).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn attribute_set_skips_failures() {
        let fx = Fixture::new();
        fx.attr("b_ok", Datatype::Integer { size: 4, signed: true }, &[], &7i32.to_ne_bytes());
        fx.attr("a_ok", Datatype::Float { size: 8 }, &[], &1.0f64.to_ne_bytes());
        fx.attr("c_rank5", Datatype::Float { size: 4 }, &[1, 1, 1, 1, 1], &f32_bytes(&[0.0]));
        let diagnostics = RecordingDiagnostics::new();
        let v = decode_attributes(&fx.storage, fx.file, &BridgeConfig::default(), &diagnostics)
            .unwrap();
        let group = v.as_group().unwrap();
        assert_eq!(group.keys().collect::<Vec<_>>(), vec!["a_ok", "b_ok"]);
        assert_eq!(diagnostics.records().len(), 1);
        assert!(diagnostics.warnings().is_empty());
    }

    #[test]
    fn host_array_from_attribute() {
        let fx = Fixture::new();
        let values: Vec<f32> = (0..6).map(|v| v as f32).collect();
        fx.attr("m", Datatype::Float { size: 4 }, &[2, 3], &f32_bytes(&values));
        fx.attr("s", Datatype::Integer { size: 2, signed: false }, &[], &9u16.to_ne_bytes());
        let s = &fx.storage;
        let config = BridgeConfig::default();

        let a = AttrHandle::acquire(s, s.attr_open(fx.file, "m")).unwrap();
        let array = read_attribute_array(s, a.get(), &config).unwrap();
        assert_eq!(array.shape(), &[3, 2]);
        match &array {
            HostArray::Float32(arr) => assert_eq!(arr[[2, 1]], 5.0),
            other => panic!("unexpected {other:?}"),
        }

        let a = AttrHandle::acquire(s, s.attr_open(fx.file, "s")).unwrap();
        let array = read_attribute_array(s, a.get(), &config).unwrap();
        assert_eq!(array.shape(), &[1]);
        assert_eq!(array.element_type(), crate::types::ElementType::UInt16);
    }

    #[test]
    fn failures_release_handles() {
        let fx = Fixture::new();
        fx.attr("x", Datatype::Float { size: 4 }, &[3], &f32_bytes(&[1.0, 2.0, 3.0]));
        let baseline = fx.storage.open_handles();
        for op in ["attr_read", "attr_type", "space_extent", "type_native"] {
            fx.storage.fail_on(op);
            let err = fx.decode("x", &BridgeConfig::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io, "{op}");
            assert_eq!(fx.storage.open_handles(), baseline, "{op}");
            fx.storage.clear_faults();
        }
    }
}
