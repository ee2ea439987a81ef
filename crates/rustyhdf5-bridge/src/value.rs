//! Generic value tree for attributes and object metadata.

use indexmap::IndexMap;
use num_complex::Complex64;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Width a complex value had in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexWidth {
    /// Two 32-bit floats.
    Single,
    /// Two 64-bit floats.
    Double,
}

/// A decoded value.
///
/// Arrays of rank N decode to N nested [`Value::List`]s whose outermost level
/// indexes the slowest-varying storage axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float32(f32),
    Float64(f64),
    /// Any signed integer, widened.
    Int(i64),
    /// Any unsigned integer, read through 32 bits.
    UInt(u32),
    Complex {
        value: Complex64,
        width: ComplexWidth,
    },
    Text(String),
    List(Vec<Value>),
    /// Named members in discovery order.
    Group(IndexMap<String, Value>),
}

impl Value {
    /// Look up a member of a [`Value::Group`].
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Group(members) => members.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Group(members) => Some(members),
            _ => None,
        }
    }

    /// Integer payload of `Int` and `UInt` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Numeric payload of real-valued scalars.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Nesting depth of lists; scalars have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.first().map_or(0, Value::depth),
            _ => 0,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Float32(v) => serializer.serialize_f32(*v),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u32(*v),
            Value::Complex { value, .. } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("re", &value.re)?;
                map.serialize_entry("im", &value.im)?;
                map.end()
            }
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Group(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (k, v) in members {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Nest a flat row-major sequence into lists following `dims`.
///
/// The outermost list indexes `dims[0]`; the last axis varies fastest.
/// `leaves.len()` must equal the product of `dims`, which must be non-empty.
pub(crate) fn nest(leaves: Vec<Value>, dims: &[usize]) -> Value {
    let rank = dims.len();
    debug_assert!(rank > 0);
    debug_assert_eq!(leaves.len(), dims.iter().product::<usize>());

    let mut levels: Vec<Vec<Value>> = (0..rank).map(|_| Vec::new()).collect();
    let mut index = vec![0usize; rank];
    for leaf in leaves {
        levels[rank - 1].push(leaf);
        let mut axis = rank - 1;
        loop {
            index[axis] += 1;
            if index[axis] < dims[axis] || axis == 0 {
                break;
            }
            index[axis] = 0;
            let finished = std::mem::take(&mut levels[axis]);
            levels[axis - 1].push(Value::List(finished));
            axis -= 1;
        }
    }
    Value::List(levels.swap_remove(0))
}
