//! Mapping between storage datatypes and host element types.
//!
//! Every host element type maps to exactly one storage type and back. The
//! reverse direction classifies a storage type descriptor by class, size and
//! sign, and recognizes two-float compounds as complex numbers.

use crate::config::{BridgeConfig, ComplexNames};
use crate::error::{Error, Result, StorageResultExt};
use crate::handle::TypeHandle;
use crate::storage::{Hid, NativeType, Storage, TypeClass};

/// Element type of a host array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Two `f32`, real part first.
    Complex64,
    /// Two `f64`, real part first.
    Complex128,
}

impl ElementType {
    pub const ALL: [ElementType; 12] = [
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Complex64,
        ElementType::Complex128,
    ];

    /// Numeric host code.
    pub fn code(self) -> i64 {
        match self {
            ElementType::Int16 => 1,
            ElementType::Float32 => 2,
            ElementType::Complex64 => 3,
            ElementType::UInt8 => 6,
            ElementType::Int32 => 7,
            ElementType::Int8 => 9,
            ElementType::UInt16 => 10,
            ElementType::UInt32 => 11,
            ElementType::Float64 => 12,
            ElementType::Complex128 => 13,
            ElementType::Int64 => 39,
            ElementType::UInt64 => 40,
        }
    }

    pub fn from_code(code: i64) -> Option<ElementType> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Whether the code lies outside the host's documented set.
    pub fn is_extension(self) -> bool {
        matches!(self, ElementType::Int64 | ElementType::UInt64)
    }

    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
            ElementType::Complex64 => 8,
            ElementType::Complex128 => 16,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, ElementType::Complex64 | ElementType::Complex128)
    }

    /// Native storage type, for the non-complex element types.
    fn native(self) -> Option<NativeType> {
        Some(match self {
            ElementType::Int8 => NativeType::Int8,
            ElementType::Int16 => NativeType::Int16,
            ElementType::Int32 => NativeType::Int32,
            ElementType::Int64 => NativeType::Int64,
            ElementType::UInt8 => NativeType::UInt8,
            ElementType::UInt16 => NativeType::UInt16,
            ElementType::UInt32 => NativeType::UInt32,
            ElementType::UInt64 => NativeType::UInt64,
            ElementType::Float32 => NativeType::Float,
            ElementType::Float64 => NativeType::Double,
            ElementType::Complex64 | ElementType::Complex128 => return None,
        })
    }
}

fn check_extension(element: ElementType, config: &BridgeConfig) -> Result<()> {
    if element.is_extension() && !config.int64_extension {
        Err(Error::unsupported(format!(
            "{element:?} data needs the 64-bit integer extension"
        )))
    } else {
        Ok(())
    }
}

/// Build a complex compound of two native floats named `names`.
pub fn create_complex_type<'s>(
    storage: &'s dyn Storage,
    element: ElementType,
    names: (&str, &str),
) -> Result<TypeHandle<'s>> {
    let float = match element {
        ElementType::Complex64 => NativeType::Float,
        ElementType::Complex128 => NativeType::Double,
        other => {
            return Err(Error::unsupported(format!("{other:?} is not a complex type")));
        }
    };
    let half = float.size();
    let compound = TypeHandle::acquire(storage, storage.type_compound(2 * half))
        .io_context("create compound type")?;
    let member = TypeHandle::acquire(storage, storage.type_native(float))
        .io_context("create member type")?;
    storage
        .type_insert(compound.get(), names.0, 0, member.get())
        .io_context("insert real member")?;
    storage
        .type_insert(compound.get(), names.1, half, member.get())
        .io_context("insert imaginary member")?;
    Ok(compound)
}

/// Recognize a complex-shaped compound and build the matching memory type.
///
/// Returns `Ok(None)` when the compound does not have exactly two float
/// members named like the parts of a complex number.
pub fn compatible_complex_type<'s>(
    storage: &'s dyn Storage,
    datatype: Hid,
) -> Result<Option<TypeHandle<'s>>> {
    if storage.type_class(datatype).io_context("query type class")? != TypeClass::Compound {
        return Ok(None);
    }
    if storage
        .type_member_count(datatype)
        .io_context("query member count")?
        != 2
    {
        return Ok(None);
    }
    for index in 0..2 {
        if storage
            .type_member_class(datatype, index)
            .io_context("query member class")?
            != TypeClass::Float
        {
            return Ok(None);
        }
    }
    let real = storage
        .type_member_name(datatype, 0)
        .io_context("query member name")?;
    let imag = storage
        .type_member_name(datatype, 1)
        .io_context("query member name")?;
    if ComplexNames::recognize(&real, &imag).is_none() {
        return Ok(None);
    }
    let size = storage.type_size(datatype).io_context("query type size")?;
    let element = if size <= 8 {
        ElementType::Complex64
    } else {
        ElementType::Complex128
    };
    create_complex_type(storage, element, (&real, &imag)).map(Some)
}

/// Classify a storage datatype and create the memory type used to read it.
pub fn storage_type_to_host<'s>(
    storage: &'s dyn Storage,
    datatype: Hid,
    config: &BridgeConfig,
) -> Result<(ElementType, TypeHandle<'s>)> {
    let class = storage.type_class(datatype).io_context("query type class")?;
    let element = match class {
        TypeClass::Float => {
            if storage.type_size(datatype).io_context("query type size")? <= 4 {
                ElementType::Float32
            } else {
                ElementType::Float64
            }
        }
        TypeClass::Integer => {
            let size = storage.type_size(datatype).io_context("query type size")?;
            let signed = storage.type_is_signed(datatype).io_context("query sign")?;
            match (size, signed) {
                (1, true) => ElementType::Int8,
                (1, false) => ElementType::UInt8,
                (2, true) => ElementType::Int16,
                (2, false) => ElementType::UInt16,
                (s, true) if s <= 4 => ElementType::Int32,
                (s, false) if s <= 4 => ElementType::UInt32,
                (_, true) => ElementType::Int64,
                (_, false) => ElementType::UInt64,
            }
        }
        TypeClass::Compound => {
            return match compatible_complex_type(storage, datatype)? {
                Some(memory) => {
                    let size = storage.type_size(memory.get()).io_context("query type size")?;
                    let element = if size <= 8 {
                        ElementType::Complex64
                    } else {
                        ElementType::Complex128
                    };
                    Ok((element, memory))
                }
                None => Err(Error::unsupported(
                    "compound type is not a two-float complex number",
                )),
            };
        }
        other => {
            return Err(Error::unsupported(format!(
                "{} data has no host element type",
                other.label()
            )));
        }
    };
    check_extension(element, config)?;
    let memory = host_type_to_storage(storage, element, config)?;
    Ok((element, memory))
}

/// Create the storage datatype for a host element type.
pub fn host_type_to_storage<'s>(
    storage: &'s dyn Storage,
    element: ElementType,
    config: &BridgeConfig,
) -> Result<TypeHandle<'s>> {
    check_extension(element, config)?;
    match element.native() {
        Some(native) => {
            TypeHandle::acquire(storage, storage.type_native(native)).io_context("create native type")
        }
        None => create_complex_type(storage, element, config.complex_names.pair()),
    }
}

/// Create the storage datatype for a raw host code. Unknown or disabled codes
/// give an invalid handle.
pub fn host_code_to_storage<'s>(
    storage: &'s dyn Storage,
    code: i64,
    config: &BridgeConfig,
) -> TypeHandle<'s> {
    ElementType::from_code(code)
        .and_then(|element| host_type_to_storage(storage, element, config).ok())
        .unwrap_or_else(|| TypeHandle::invalid(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::memory::{Datatype, MemoryStorage};
    use crate::storage::StringPadding;

    #[test]
    fn codes_are_unique_and_stable() {
        for element in ElementType::ALL {
            assert_eq!(ElementType::from_code(element.code()), Some(element));
        }
        assert_eq!(ElementType::Float32.code(), 2);
        assert_eq!(ElementType::Complex128.code(), 13);
        assert_eq!(ElementType::from_code(4), None);
        assert!(ElementType::UInt64.is_extension());
        assert!(!ElementType::UInt32.is_extension());
    }

    #[test]
    fn every_element_type_round_trips() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        for element in ElementType::ALL {
            let written = host_type_to_storage(&storage, element, &config).unwrap();
            let (read, memory) = storage_type_to_host(&storage, written.get(), &config).unwrap();
            assert_eq!(read, element);
            assert_eq!(storage.type_size(memory.get()).unwrap(), element.size());
        }
        assert_eq!(storage.open_handles(), 0);
    }

    #[test]
    fn int64_rejected_without_extension() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default().with_int64_extension(false);
        let err = host_type_to_storage(&storage, ElementType::Int64, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let stored = storage.register_type(Datatype::Integer { size: 8, signed: false });
        let err = storage_type_to_host(&storage, stored, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        assert!(!host_code_to_storage(&storage, 39, &config).valid());
        assert!(host_code_to_storage(&storage, 7, &config).valid());
    }

    #[test]
    fn odd_sizes_follow_width_rules() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let half = storage.register_type(Datatype::Float { size: 2 });
        assert_eq!(
            storage_type_to_host(&storage, half, &config).unwrap().0,
            ElementType::Float32
        );
        let three = storage.register_type(Datatype::Integer { size: 3, signed: true });
        assert_eq!(
            storage_type_to_host(&storage, three, &config).unwrap().0,
            ElementType::Int32
        );
    }

    #[test]
    fn complex_names_recognized_in_any_case() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        for (real, imag) in [("r", "i"), ("RE", "Im"), ("Real", "IMAG")] {
            for size in [4, 8] {
                let stored = storage.register_type(Datatype::complex(size, real, imag));
                let (element, memory) = storage_type_to_host(&storage, stored, &config).unwrap();
                let expected = if size == 4 {
                    ElementType::Complex64
                } else {
                    ElementType::Complex128
                };
                assert_eq!(element, expected);
                assert_eq!(storage.type_member_name(memory.get(), 0).unwrap(), real);
                assert_eq!(storage.type_member_name(memory.get(), 1).unwrap(), imag);
            }
        }
    }

    #[test]
    fn non_complex_compounds_rejected() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        let wrong_names = storage.register_type(Datatype::complex(8, "x", "y"));
        assert!(compatible_complex_type(&storage, wrong_names).unwrap().is_none());

        let three = storage.register_type(Datatype::Compound {
            size: 12,
            members: ["r", "i", "j"]
                .iter()
                .enumerate()
                .map(|(n, name)| crate::storage::memory::CompoundMember {
                    name: name.to_string(),
                    byte_offset: 4 * n,
                    datatype: Datatype::Float { size: 4 },
                })
                .collect(),
        });
        assert!(compatible_complex_type(&storage, three).unwrap().is_none());

        let int_members = storage.register_type(Datatype::Compound {
            size: 8,
            members: vec![
                crate::storage::memory::CompoundMember {
                    name: "r".into(),
                    byte_offset: 0,
                    datatype: Datatype::Integer { size: 4, signed: true },
                },
                crate::storage::memory::CompoundMember {
                    name: "i".into(),
                    byte_offset: 4,
                    datatype: Datatype::Integer { size: 4, signed: true },
                },
            ],
        });
        let err = storage_type_to_host(&storage, int_members, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn other_classes_unsupported() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default();
        for datatype in [
            Datatype::fixed_string(4, StringPadding::NullPad),
            Datatype::Opaque { size: 4, tag: "blob".into() },
            Datatype::Reference,
        ] {
            let id = storage.register_type(datatype);
            let err = storage_type_to_host(&storage, id, &config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unsupported);
        }
    }

    #[test]
    fn complex_names_follow_config() {
        let storage = MemoryStorage::new();
        let config = BridgeConfig::default().with_complex_names(ComplexNames::RealImag);
        let t = host_type_to_storage(&storage, ElementType::Complex64, &config).unwrap();
        assert_eq!(storage.type_member_name(t.get(), 0).unwrap(), "real");
        assert_eq!(storage.type_member_name(t.get(), 1).unwrap(), "imag");
        assert_eq!(storage.type_size(t.get()).unwrap(), 8);
    }

    #[test]
    fn failing_storage_leaks_nothing() {
        let storage = MemoryStorage::new();
        storage.fail_on("type_insert");
        let err = create_complex_type(&storage, ElementType::Complex128, ("r", "i")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(storage.open_handles(), 0);
    }
}
