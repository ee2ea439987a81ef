//! Dataspaces and hyperslab selections for the in-process store.

use crate::error::StorageError;
use crate::storage::{SpaceClass, UNLIMITED};

/// Elements of a dataspace taking part in a transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every element.
    All,
    /// Regular hyperslab with unit blocks.
    ///
    /// For each dimension `d`, element `start[d] + i * stride[d]` is selected for
    /// `i` in `0..count[d]`.
    Hyperslab {
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
    },
}

impl Selection {
    /// Number of selected elements for a dataspace shape.
    pub fn num_elements(&self, dims: &[u64]) -> u64 {
        match self {
            Selection::All => dims.iter().product(),
            Selection::Hyperslab { count, .. } => count.iter().product(),
        }
    }

    /// Row-major linear offsets of the selected elements, in transfer order.
    pub fn linear_indices(&self, dims: &[u64]) -> Vec<usize> {
        match self {
            Selection::All => (0..self.num_elements(dims) as usize).collect(),
            Selection::Hyperslab {
                start,
                stride,
                count,
            } => {
                let rank = dims.len();
                let total = self.num_elements(dims) as usize;
                let mut out = Vec::with_capacity(total);
                if total == 0 {
                    return out;
                }
                let mut pos = vec![0u64; rank];
                loop {
                    let mut linear = 0u64;
                    for d in 0..rank {
                        linear = linear * dims[d] + start[d] + pos[d] * stride[d];
                    }
                    out.push(linear as usize);

                    let mut d = rank;
                    loop {
                        if d == 0 {
                            return out;
                        }
                        d -= 1;
                        pos[d] += 1;
                        if pos[d] < count[d] {
                            break;
                        }
                        pos[d] = 0;
                    }
                }
            }
        }
    }
}

/// Dataspace with its current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataspace {
    pub class: SpaceClass,
    pub dims: Vec<u64>,
    /// [`UNLIMITED`] marks an unbounded axis.
    pub max_dims: Vec<u64>,
    pub selection: Selection,
}

impl Dataspace {
    pub fn scalar() -> Self {
        Dataspace {
            class: SpaceClass::Scalar,
            dims: Vec::new(),
            max_dims: Vec::new(),
            selection: Selection::All,
        }
    }

    pub fn null() -> Self {
        Dataspace {
            class: SpaceClass::Null,
            dims: Vec::new(),
            max_dims: Vec::new(),
            selection: Selection::All,
        }
    }

    pub fn simple(dims: &[u64], max_dims: Option<&[u64]>) -> Result<Self, StorageError> {
        if dims.is_empty() {
            return Err(StorageError::InvalidArgument(
                "simple dataspace needs at least one dimension".into(),
            ));
        }
        let max_dims = max_dims.unwrap_or(dims).to_vec();
        if max_dims.len() != dims.len() {
            return Err(StorageError::InvalidArgument(format!(
                "maximum extent has rank {}, current extent has rank {}",
                max_dims.len(),
                dims.len()
            )));
        }
        if let Some(d) = (0..dims.len()).find(|&d| max_dims[d] != UNLIMITED && max_dims[d] < dims[d]) {
            return Err(StorageError::InvalidArgument(format!(
                "maximum extent {} is below current extent {} on axis {d}",
                max_dims[d], dims[d]
            )));
        }
        Ok(Dataspace {
            class: SpaceClass::Simple,
            dims: dims.to_vec(),
            max_dims,
            selection: Selection::All,
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Elements in the whole extent.
    pub fn num_elements(&self) -> u64 {
        match self.class {
            SpaceClass::Scalar => 1,
            SpaceClass::Null => 0,
            SpaceClass::Simple => self.dims.iter().product(),
        }
    }

    pub fn selected_points(&self) -> u64 {
        match self.class {
            SpaceClass::Simple => self.selection.num_elements(&self.dims),
            _ => self.num_elements(),
        }
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        match self.class {
            SpaceClass::Simple => self.selection.linear_indices(&self.dims),
            _ => (0..self.num_elements() as usize).collect(),
        }
    }

    /// Replace the selection with a hyperslab. The hyperslab must lie inside the extent.
    pub fn select_hyperslab(
        &mut self,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
    ) -> Result<(), StorageError> {
        let rank = self.rank();
        if self.class != SpaceClass::Simple {
            return Err(StorageError::InvalidArgument(
                "hyperslab selection needs a simple dataspace".into(),
            ));
        }
        if start.len() != rank || stride.len() != rank || count.len() != rank {
            return Err(StorageError::InvalidArgument(format!(
                "hyperslab vectors must have rank {rank}"
            )));
        }
        for d in 0..rank {
            if stride[d] == 0 {
                return Err(StorageError::InvalidArgument(format!("zero stride on axis {d}")));
            }
            if count[d] == 0 {
                continue;
            }
            let last = (count[d] - 1)
                .checked_mul(stride[d])
                .and_then(|span| span.checked_add(start[d]));
            if !matches!(last, Some(last) if last < self.dims[d]) {
                return Err(StorageError::InvalidArgument(format!(
                    "hyperslab exceeds extent {} on axis {d}",
                    self.dims[d]
                )));
            }
        }
        self.selection = Selection::Hyperslab {
            start: start.to_vec(),
            stride: stride.to_vec(),
            count: count.to_vec(),
        };
        Ok(())
    }
}
