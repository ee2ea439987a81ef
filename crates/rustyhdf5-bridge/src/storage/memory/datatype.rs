//! Datatype descriptors and element conversion for the in-process store.
//!
//! Conversion follows the HDF5 library's rules for the classes the bridge
//! exchanges: integers and floats convert into each other with saturation,
//! fixed-length strings are re-padded, and compounds are matched member by
//! member on name.

use byteorder::{ByteOrder, NativeEndian};
use half::f16;

use crate::error::StorageError;
use crate::storage::{CharacterSet, NativeType, StringPadding, StringSize, TypeClass};

const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// A member of a compound datatype.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    pub name: String,
    /// Byte offset within the compound.
    pub byte_offset: usize,
    pub datatype: Datatype,
}

/// Datatype descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    Integer {
        size: usize,
        signed: bool,
    },
    /// IEEE float of 2, 4 or 8 bytes.
    Float {
        size: usize,
    },
    Time {
        size: usize,
    },
    String {
        size: StringSize,
        padding: StringPadding,
        charset: CharacterSet,
    },
    BitField {
        size: usize,
    },
    Opaque {
        size: usize,
        tag: String,
    },
    Compound {
        size: usize,
        members: Vec<CompoundMember>,
    },
    Reference,
    Enumeration {
        base: Box<Datatype>,
        members: Vec<(String, i64)>,
    },
    VariableLength {
        base: Box<Datatype>,
    },
    Array {
        base: Box<Datatype>,
        dims: Vec<u64>,
    },
}

impl Datatype {
    /// The descriptor of a predefined native type.
    pub fn native(native: NativeType) -> Self {
        match native {
            NativeType::Int8 | NativeType::Int16 | NativeType::Int32 | NativeType::Int64 => {
                Datatype::Integer {
                    size: native.size(),
                    signed: true,
                }
            }
            NativeType::UInt8 | NativeType::UInt16 | NativeType::UInt32 | NativeType::UInt64 => {
                Datatype::Integer {
                    size: native.size(),
                    signed: false,
                }
            }
            NativeType::Float | NativeType::Double => Datatype::Float {
                size: native.size(),
            },
        }
    }

    /// Fixed-length string of `size` bytes.
    pub fn fixed_string(size: usize, padding: StringPadding) -> Self {
        Datatype::String {
            size: StringSize::Fixed(size),
            padding,
            charset: CharacterSet::Utf8,
        }
    }

    pub fn variable_string() -> Self {
        Datatype::String {
            size: StringSize::Variable,
            padding: StringPadding::NullTerminate,
            charset: CharacterSet::Utf8,
        }
    }

    /// Two-float compound laid out like `[re, im]`.
    pub fn complex(float_size: usize, real: &str, imag: &str) -> Self {
        Datatype::Compound {
            size: 2 * float_size,
            members: vec![
                CompoundMember {
                    name: real.to_string(),
                    byte_offset: 0,
                    datatype: Datatype::Float { size: float_size },
                },
                CompoundMember {
                    name: imag.to_string(),
                    byte_offset: float_size,
                    datatype: Datatype::Float { size: float_size },
                },
            ],
        }
    }

    pub fn class(&self) -> TypeClass {
        match self {
            Datatype::Integer { .. } => TypeClass::Integer,
            Datatype::Float { .. } => TypeClass::Float,
            Datatype::Time { .. } => TypeClass::Time,
            Datatype::String { .. } => TypeClass::String,
            Datatype::BitField { .. } => TypeClass::BitField,
            Datatype::Opaque { .. } => TypeClass::Opaque,
            Datatype::Compound { .. } => TypeClass::Compound,
            Datatype::Reference => TypeClass::Reference,
            Datatype::Enumeration { .. } => TypeClass::Enum,
            Datatype::VariableLength { .. } => TypeClass::VarLen,
            Datatype::Array { .. } => TypeClass::Array,
        }
    }

    /// Size in bytes of one element. Variable-length strings report the size of a pointer.
    pub fn size(&self) -> usize {
        match self {
            Datatype::Integer { size, .. }
            | Datatype::Float { size }
            | Datatype::Time { size }
            | Datatype::BitField { size }
            | Datatype::Opaque { size, .. }
            | Datatype::Compound { size, .. } => *size,
            Datatype::String {
                size: StringSize::Fixed(n),
                ..
            } => *n,
            Datatype::String {
                size: StringSize::Variable,
                ..
            } => POINTER_SIZE,
            Datatype::Reference => 8,
            Datatype::Enumeration { base, .. } => base.size(),
            Datatype::VariableLength { .. } => 2 * POINTER_SIZE,
            Datatype::Array { base, dims } => base.size() * dims.iter().product::<u64>() as usize,
        }
    }

    pub fn is_variable_string(&self) -> bool {
        matches!(
            self,
            Datatype::String {
                size: StringSize::Variable,
                ..
            }
        )
    }

    fn describe(&self) -> String {
        match self {
            Datatype::Integer { size, signed } => {
                format!("{}-byte {} integer", size, if *signed { "signed" } else { "unsigned" })
            }
            Datatype::Float { size } => format!("{size}-byte float"),
            Datatype::String {
                size: StringSize::Fixed(n),
                ..
            } => format!("{n}-byte string"),
            Datatype::String { .. } => "variable-length string".to_string(),
            Datatype::Compound { members, .. } => format!("{}-member compound", members.len()),
            other => other.class().label().to_lowercase(),
        }
    }
}

fn conversion_error(src: &Datatype, dst: &Datatype) -> StorageError {
    StorageError::Conversion {
        from: src.describe(),
        to: dst.describe(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i128),
    Float(f64),
}

fn decode_number(datatype: &Datatype, bytes: &[u8]) -> Option<Number> {
    match datatype {
        Datatype::Integer { size, signed } => {
            // Any width from 1 to 8 bytes; odd widths are sign- or zero-extended.
            if !(1..=8).contains(size) {
                return None;
            }
            let v = if *signed {
                NativeEndian::read_int(bytes, *size) as i128
            } else {
                NativeEndian::read_uint(bytes, *size) as i128
            };
            Some(Number::Int(v))
        }
        Datatype::Float { size } => {
            let v = match size {
                2 => f16::from_bits(NativeEndian::read_u16(bytes)).to_f64(),
                4 => NativeEndian::read_f32(bytes) as f64,
                8 => NativeEndian::read_f64(bytes),
                _ => return None,
            };
            Some(Number::Float(v))
        }
        Datatype::Enumeration { base, .. } => decode_number(base, bytes),
        _ => None,
    }
}

fn integer_bounds(size: usize, signed: bool) -> (i128, i128) {
    let bits = 8 * size as u32;
    if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

fn encode_number(datatype: &Datatype, value: Number, out: &mut [u8]) -> Option<()> {
    match datatype {
        Datatype::Integer { size, signed } => {
            if !(1..=8).contains(size) {
                return None;
            }
            let raw = match value {
                Number::Int(v) => v,
                Number::Float(f) if f.is_nan() => 0,
                Number::Float(f) => f.trunc() as i128,
            };
            let (min, max) = integer_bounds(*size, *signed);
            let v = raw.clamp(min, max);
            if *signed {
                NativeEndian::write_int(out, v as i64, *size);
            } else {
                NativeEndian::write_uint(out, v as u64, *size);
            }
            Some(())
        }
        Datatype::Float { size } => {
            let f = match value {
                Number::Int(v) => v as f64,
                Number::Float(f) => f,
            };
            match size {
                2 => NativeEndian::write_u16(out, f16::from_f64(f).to_bits()),
                4 => NativeEndian::write_f32(out, f as f32),
                8 => NativeEndian::write_f64(out, f),
                _ => return None,
            }
            Some(())
        }
        _ => None,
    }
}

/// Meaningful bytes of a stored fixed-length string.
fn fixed_text(padding: StringPadding, bytes: &[u8]) -> &[u8] {
    match padding {
        StringPadding::NullTerminate | StringPadding::NullPad => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            &bytes[..end]
        }
        StringPadding::SpacePad => {
            let end = bytes
                .iter()
                .rposition(|&b| b != b' ' && b != 0)
                .map_or(0, |p| p + 1);
            &bytes[..end]
        }
    }
}

fn write_fixed(padding: StringPadding, text: &[u8], out: &mut [u8]) {
    let fill = if padding == StringPadding::SpacePad { b' ' } else { 0 };
    out.fill(fill);
    let room = match padding {
        StringPadding::NullTerminate => out.len().saturating_sub(1),
        StringPadding::NullPad | StringPadding::SpacePad => out.len(),
    };
    let n = text.len().min(room);
    out[..n].copy_from_slice(&text[..n]);
}

/// Convert one element from `src` to `dst`.
///
/// `from` and `to` must be exactly one element long.
pub(crate) fn convert_element(
    src: &Datatype,
    from: &[u8],
    dst: &Datatype,
    to: &mut [u8],
) -> Result<(), StorageError> {
    if src == dst {
        to.copy_from_slice(from);
        return Ok(());
    }
    match (src, dst) {
        (
            Datatype::String {
                size: StringSize::Fixed(_),
                padding: src_pad,
                ..
            },
            Datatype::String {
                size: StringSize::Fixed(_),
                padding: dst_pad,
                ..
            },
        ) => {
            write_fixed(*dst_pad, fixed_text(*src_pad, from), to);
            Ok(())
        }
        (
            Datatype::Compound {
                members: src_members,
                ..
            },
            Datatype::Compound {
                members: dst_members,
                ..
            },
        ) => {
            to.fill(0);
            for member in dst_members {
                let Some(source) = src_members.iter().find(|m| m.name == member.name) else {
                    continue;
                };
                let from = &from[source.byte_offset..source.byte_offset + source.datatype.size()];
                let to = &mut to[member.byte_offset..member.byte_offset + member.datatype.size()];
                convert_element(&source.datatype, from, &member.datatype, to)?;
            }
            Ok(())
        }
        _ => {
            let value = decode_number(src, from).ok_or_else(|| conversion_error(src, dst))?;
            encode_number(dst, value, to).ok_or_else(|| conversion_error(src, dst))
        }
    }
}

/// Check that a conversion path exists before touching any buffer.
pub(crate) fn check_conversion(src: &Datatype, dst: &Datatype) -> Result<(), StorageError> {
    if src.is_variable_string() || dst.is_variable_string() {
        return if src.is_variable_string() && dst.is_variable_string() {
            Ok(())
        } else {
            Err(conversion_error(src, dst))
        };
    }
    let numeric = |d: &Datatype| {
        matches!(
            d,
            Datatype::Integer { .. } | Datatype::Float { .. } | Datatype::Enumeration { .. }
        )
    };
    let ok = src == dst
        || (numeric(src) && matches!(dst, Datatype::Integer { .. } | Datatype::Float { .. }))
        || (matches!(src, Datatype::String { .. }) && matches!(dst, Datatype::String { .. }))
        || (matches!(src, Datatype::Compound { .. }) && matches!(dst, Datatype::Compound { .. }));
    if ok {
        Ok(())
    } else {
        Err(conversion_error(src, dst))
    }
}
