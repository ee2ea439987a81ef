//! Storage-order and host-order index sequences.
//!
//! Storage lists axes outermost first (row-major); the host lists them
//! innermost first (column-major). The two orders are exact reversals of each
//! other. [`StorageOrder`] and [`HostOrder`] keep the two apart at the type
//! level, and the only way across is [`to_host_order`] / [`to_storage_order`],
//! each of which consumes its input.

use std::ops::Deref;

/// A shape, offset, stride or count vector listed in storage order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageOrder<T>(Vec<T>);

/// A shape, offset, stride or count vector listed in host order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostOrder<T>(Vec<T>);

macro_rules! ordered {
    ($name:ident) => {
        impl<T> $name<T> {
            pub fn new(values: Vec<T>) -> Self {
                $name(values)
            }

            pub fn into_inner(self) -> Vec<T> {
                self.0
            }

            pub fn as_slice(&self) -> &[T] {
                &self.0
            }
        }

        impl<T> Deref for $name<T> {
            type Target = [T];

            fn deref(&self) -> &[T] {
                &self.0
            }
        }

        impl<T> From<Vec<T>> for $name<T> {
            fn from(values: Vec<T>) -> Self {
                $name(values)
            }
        }

        impl<T: Clone> From<&[T]> for $name<T> {
            fn from(values: &[T]) -> Self {
                $name(values.to_vec())
            }
        }

        impl<T> FromIterator<T> for $name<T> {
            fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
                $name(iter.into_iter().collect())
            }
        }
    };
}

ordered!(StorageOrder);
ordered!(HostOrder);

/// Reverse a storage-order vector into host order.
pub fn to_host_order<T>(storage: StorageOrder<T>) -> HostOrder<T> {
    let mut values = storage.0;
    values.reverse();
    HostOrder(values)
}

/// Reverse a host-order vector into storage order.
pub fn to_storage_order<T>(host: HostOrder<T>) -> StorageOrder<T> {
    let mut values = host.0;
    values.reverse();
    StorageOrder(values)
}

/// Storage axis addressed by host axis `host_axis` in a rank-`rank` space.
pub fn storage_axis(host_axis: usize, rank: usize) -> usize {
    rank - 1 - host_axis
}
