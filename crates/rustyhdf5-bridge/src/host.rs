//! Host arrays: typed N-dimensional arrays in host (column-major) order.
//!
//! A host array with shape `[n0, n1, ..]` stores element `(i0, i1, ..)` at
//! linear position `i0 + n0 * (i1 + n1 * ..)`. Read back with the shape
//! reversed, that is exactly the row-major layout storage uses, so whole
//! arrays move between the two as one contiguous byte buffer.

use std::borrow::Cow;

use bytemuck::Pod;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use num_complex::{Complex32, Complex64};

use crate::dims::{to_storage_order, HostOrder, StorageOrder};
use crate::types::ElementType;

/// A typed host array. Shapes are in host order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Complex64(ArrayD<Complex32>),
    Complex128(ArrayD<Complex64>),
}

macro_rules! each {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            HostArray::Int8($array) => $body,
            HostArray::Int16($array) => $body,
            HostArray::Int32($array) => $body,
            HostArray::Int64($array) => $body,
            HostArray::UInt8($array) => $body,
            HostArray::UInt16($array) => $body,
            HostArray::UInt32($array) => $body,
            HostArray::UInt64($array) => $body,
            HostArray::Float32($array) => $body,
            HostArray::Float64($array) => $body,
            HostArray::Complex64($array) => $body,
            HostArray::Complex128($array) => $body,
        }
    };
}

fn column_major<A: Clone + Default>(shape: &[usize]) -> ArrayD<A> {
    ArrayD::from_elem(IxDyn(shape).f(), A::default())
}

/// Column-major bytes of an array, borrowed when the array already has that layout.
fn column_major_bytes<A: Pod>(array: &ArrayD<A>) -> Cow<'_, [u8]> {
    let reversed = array.view().reversed_axes();
    match reversed.to_slice() {
        Some(elements) => Cow::Borrowed(bytemuck::cast_slice(elements)),
        None => {
            let elements: Vec<A> = reversed.iter().copied().collect();
            Cow::Owned(bytemuck::cast_slice(&elements).to_vec())
        }
    }
}

fn column_major_bytes_mut<A: Pod>(array: &mut ArrayD<A>) -> Option<&mut [u8]> {
    if !array.view().reversed_axes().is_standard_layout() {
        return None;
    }
    array
        .as_slice_memory_order_mut()
        .map(|elements| bytemuck::cast_slice_mut(elements))
}

impl HostArray {
    /// A zero-filled column-major array.
    pub fn zeros(element: ElementType, shape: &[usize]) -> Self {
        match element {
            ElementType::Int8 => HostArray::Int8(column_major(shape)),
            ElementType::Int16 => HostArray::Int16(column_major(shape)),
            ElementType::Int32 => HostArray::Int32(column_major(shape)),
            ElementType::Int64 => HostArray::Int64(column_major(shape)),
            ElementType::UInt8 => HostArray::UInt8(column_major(shape)),
            ElementType::UInt16 => HostArray::UInt16(column_major(shape)),
            ElementType::UInt32 => HostArray::UInt32(column_major(shape)),
            ElementType::UInt64 => HostArray::UInt64(column_major(shape)),
            ElementType::Float32 => HostArray::Float32(column_major(shape)),
            ElementType::Float64 => HostArray::Float64(column_major(shape)),
            ElementType::Complex64 => HostArray::Complex64(column_major(shape)),
            ElementType::Complex128 => HostArray::Complex128(column_major(shape)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            HostArray::Int8(_) => ElementType::Int8,
            HostArray::Int16(_) => ElementType::Int16,
            HostArray::Int32(_) => ElementType::Int32,
            HostArray::Int64(_) => ElementType::Int64,
            HostArray::UInt8(_) => ElementType::UInt8,
            HostArray::UInt16(_) => ElementType::UInt16,
            HostArray::UInt32(_) => ElementType::UInt32,
            HostArray::UInt64(_) => ElementType::UInt64,
            HostArray::Float32(_) => ElementType::Float32,
            HostArray::Float64(_) => ElementType::Float64,
            HostArray::Complex64(_) => ElementType::Complex64,
            HostArray::Complex128(_) => ElementType::Complex128,
        }
    }

    /// Shape in host order.
    pub fn shape(&self) -> &[usize] {
        each!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        each!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn host_shape(&self) -> HostOrder<u64> {
        self.shape().iter().map(|&n| n as u64).collect()
    }

    /// Shape in storage order.
    pub fn storage_shape(&self) -> StorageOrder<u64> {
        to_storage_order(self.host_shape())
    }

    /// The element bytes in column-major order, ready for a storage write.
    pub fn column_major_bytes(&self) -> Cow<'_, [u8]> {
        each!(self, a => column_major_bytes(a))
    }

    /// Mutable column-major bytes. `None` unless the array is laid out
    /// column-major and contiguous, as arrays from [`HostArray::zeros`] are.
    pub fn column_major_bytes_mut(&mut self) -> Option<&mut [u8]> {
        each!(self, a => column_major_bytes_mut(a))
    }
}

macro_rules! from_array {
    ($($variant:ident($t:ty)),* $(,)?) => {
        $(
            impl From<ArrayD<$t>> for HostArray {
                fn from(array: ArrayD<$t>) -> Self {
                    HostArray::$variant(array)
                }
            }
        )*
    };
}

from_array!(
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Complex64(Complex32),
    Complex128(Complex64),
);
