//! Tensor shape descriptors
//!
//! A descriptor carries metadata only: dtype, extents and per-axis strides in
//! element units. It never owns or points at data.

use crate::error::{OpError, Result};
use crate::types::DType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<isize>,
}

impl TensorDesc {
    /// Build a descriptor with explicit strides.
    pub fn new(dtype: DType, shape: &[usize], strides: &[isize]) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(OpError::param(
                "strides",
                format!("rank mismatch: shape has {} axes, strides has {}", shape.len(), strides.len()),
            ));
        }
        Ok(Self { dtype, shape: shape.to_vec(), strides: strides.to_vec() })
    }

    /// Build a row-major contiguous descriptor.
    pub fn contiguous(dtype: DType, shape: &[usize]) -> Self {
        Self { dtype, shape: shape.to_vec(), strides: contiguous_strides(shape) }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Extent of `axis`. Panics if `axis >= ndim()`.
    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    /// Stride of `axis` in elements. Panics if `axis >= ndim()`.
    pub fn stride(&self, axis: usize) -> isize {
        self.strides[axis]
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }

    /// Human-readable summary, e.g. `i32[4, 2] strides=[2, 1]`.
    pub fn info(&self) -> String {
        format!("{}{:?} strides={:?}", self.dtype, self.shape, self.strides)
    }
}

/// Row-major strides for `shape`.
pub fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1] as isize;
    }
    strides
}
