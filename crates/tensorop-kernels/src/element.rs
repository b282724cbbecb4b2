//! Floating point element types handled by the dequantization kernels

use half::f16;
use tensorop_common::DType;

/// Scale factor element. The dequantized product is computed in this type's
/// precision before it is converted to the output type.
pub trait ScaleElement: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    /// `q * self`, rounded to this type.
    fn scale(self, q: i8) -> Self;

    fn as_f32(self) -> f32;
}

/// Output element; values arrive as `f32` and are narrowed if needed.
pub trait OutputElement: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn from_f32_lossy(v: f32) -> Self;

    fn widen(self) -> f32;
}

impl ScaleElement for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn scale(self, q: i8) -> Self {
        f32::from(q) * self
    }

    #[inline(always)]
    fn as_f32(self) -> f32 {
        self
    }
}

impl ScaleElement for f16 {
    const DTYPE: DType = DType::F16;

    #[inline(always)]
    fn scale(self, q: i8) -> Self {
        f16::from_f32(f32::from(q)) * self
    }

    #[inline(always)]
    fn as_f32(self) -> f32 {
        self.to_f32()
    }
}

impl OutputElement for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn from_f32_lossy(v: f32) -> Self {
        v
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self
    }
}

impl OutputElement for f16 {
    const DTYPE: DType = DType::F16;

    #[inline(always)]
    fn from_f32_lossy(v: f32) -> Self {
        f16::from_f32(v)
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self.to_f32()
    }
}

/// Read-only floating point buffer of a runtime-selected dtype.
#[derive(Debug, Clone, Copy)]
pub enum FloatSlice<'a> {
    F16(&'a [f16]),
    F32(&'a [f32]),
}

impl FloatSlice<'_> {
    pub fn dtype(&self) -> DType {
        match self {
            FloatSlice::F16(_) => DType::F16,
            FloatSlice::F32(_) => DType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FloatSlice::F16(s) => s.len(),
            FloatSlice::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writable floating point buffer of a runtime-selected dtype.
#[derive(Debug)]
pub enum FloatSliceMut<'a> {
    F16(&'a mut [f16]),
    F32(&'a mut [f32]),
}

impl FloatSliceMut<'_> {
    pub fn dtype(&self) -> DType {
        match self {
            FloatSliceMut::F16(_) => DType::F16,
            FloatSliceMut::F32(_) => DType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FloatSliceMut::F16(s) => s.len(),
            FloatSliceMut::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out as `f32`, widening f16 values exactly.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            FloatSliceMut::F16(s) => s.iter().map(|v| v.to_f32()).collect(),
            FloatSliceMut::F32(s) => s.to_vec(),
        }
    }
}

impl<'a> From<&'a [f16]> for FloatSlice<'a> {
    fn from(s: &'a [f16]) -> Self {
        FloatSlice::F16(s)
    }
}

impl<'a> From<&'a [f32]> for FloatSlice<'a> {
    fn from(s: &'a [f32]) -> Self {
        FloatSlice::F32(s)
    }
}

impl<'a> From<&'a mut [f16]> for FloatSliceMut<'a> {
    fn from(s: &'a mut [f16]) -> Self {
        FloatSliceMut::F16(s)
    }
}

impl<'a> From<&'a mut [f32]> for FloatSliceMut<'a> {
    fn from(s: &'a mut [f32]) -> Self {
        FloatSliceMut::F32(s)
    }
}
