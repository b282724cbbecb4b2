//! Validated metadata for one AWQ dequantization configuration

use super::PACK_FACTOR;
use tensorop_common::{DType, OpError, PackingPolicy, Result, TensorDesc, TensorRole};

/// Shape, dtype and stride facts derived once from the four tensor
/// descriptors. Every backend executes against this value only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwqDequantizeInfo {
    pub zero_type: DType,
    pub scale_type: DType,
    pub data_type: DType,
    /// Consecutive output rows sharing one zero/scale row.
    pub group_size: usize,
    pub n: usize,
    pub m: usize,
    pub m_packed: usize,
    pub zeros_n: usize,
    /// Taken from `scales.shape[1]`.
    pub zeros_m: usize,
    pub zeros_m_packed: usize,
    pub y_row_stride: usize,
    pub qweight_row_stride: usize,
    pub zeros_row_stride: usize,
    pub scales_row_stride: usize,
    spans: BufferSpans,
}

/// Element counts each buffer must hold, checked against `usize` overflow
/// when the info is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferSpans {
    y: usize,
    qweight: usize,
    zeros: usize,
    scales: usize,
    unpacked_zeros: usize,
}

impl AwqDequantizeInfo {
    /// Validate with the strict packing policy.
    pub fn create(
        y: &TensorDesc,
        qweight: &TensorDesc,
        zeros: &TensorDesc,
        scales: &TensorDesc,
        group_size: usize,
    ) -> Result<Self> {
        Self::create_with_policy(y, qweight, zeros, scales, group_size, PackingPolicy::Strict)
    }

    /// Validate the four descriptors. Categories are checked in the order
    /// dtype, rank, shape, group, strides; the first failure is reported.
    pub fn create_with_policy(
        y: &TensorDesc,
        qweight: &TensorDesc,
        zeros: &TensorDesc,
        scales: &TensorDesc,
        group_size: usize,
        packing: PackingPolicy,
    ) -> Result<Self> {
        expect_dtype(TensorRole::QWeight, qweight, &[DType::I32], "i32")?;
        expect_dtype(TensorRole::Zeros, zeros, &[DType::I32], "i32")?;
        expect_dtype(TensorRole::Y, y, &[DType::F16, DType::F32], "f16 or f32")?;
        expect_dtype(TensorRole::Scales, scales, &[DType::F16, DType::F32], "f16 or f32")?;

        for (role, desc) in [
            (TensorRole::Y, y),
            (TensorRole::QWeight, qweight),
            (TensorRole::Zeros, zeros),
            (TensorRole::Scales, scales),
        ] {
            if desc.ndim() != 2 {
                return Err(OpError::shape(format!("{role} must be 2-D, got rank {}", desc.ndim())));
            }
        }

        let (n, m) = (y.dim(0), y.dim(1));
        let zeros_n = zeros.dim(0);
        let zeros_m = scales.dim(1);

        if packing == PackingPolicy::Strict {
            if m % PACK_FACTOR != 0 {
                return Err(OpError::shape(format!("y columns {m} are not a multiple of {PACK_FACTOR}")));
            }
            if zeros_m % PACK_FACTOR != 0 {
                return Err(OpError::shape(format!(
                    "scales columns {zeros_m} are not a multiple of {PACK_FACTOR}"
                )));
            }
        }
        let m_packed = m / PACK_FACTOR;
        let zeros_m_packed = zeros_m / PACK_FACTOR;

        expect_shape(TensorRole::QWeight, qweight, [n, m_packed])?;
        expect_shape(TensorRole::Zeros, zeros, [zeros_n, zeros_m_packed])?;
        expect_shape(TensorRole::Scales, scales, [zeros_n, zeros_m])?;
        if zeros_m != m {
            return Err(OpError::shape(format!("scales columns {zeros_m} do not match y columns {m}")));
        }

        if group_size == 0 {
            return Err(OpError::param("group_size", "must be positive"));
        }
        if n % group_size != 0 {
            return Err(OpError::shape(format!("rows {n} are not divisible by group_size {group_size}")));
        }
        if zeros_n != n / group_size {
            return Err(OpError::shape(format!(
                "expected {} zero/scale rows for {n} rows in groups of {group_size}, got {zeros_n}",
                n / group_size
            )));
        }

        let y_row_stride = row_stride(TensorRole::Y, y)?;
        let scales_row_stride = row_stride(TensorRole::Scales, scales)?;
        let qweight_row_stride = row_stride(TensorRole::QWeight, qweight)?;
        let zeros_row_stride = row_stride(TensorRole::Zeros, zeros)?;

        let spans = BufferSpans {
            y: span(TensorRole::Y, n, m, y_row_stride)?,
            qweight: span(TensorRole::QWeight, n, m_packed, qweight_row_stride)?,
            zeros: span(TensorRole::Zeros, zeros_n, zeros_m_packed, zeros_row_stride)?,
            scales: span(TensorRole::Scales, zeros_n, zeros_m, scales_row_stride)?,
            unpacked_zeros: zeros_n.checked_mul(zeros_m).ok_or_else(|| {
                OpError::shape(format!("{zeros_n} x {zeros_m} unpacked zero points overflow usize"))
            })?,
        };

        Ok(Self {
            zero_type: zeros.dtype(),
            scale_type: scales.dtype(),
            data_type: y.dtype(),
            group_size,
            n,
            m,
            m_packed,
            zeros_n,
            zeros_m,
            zeros_m_packed,
            y_row_stride,
            qweight_row_stride,
            zeros_row_stride,
            scales_row_stride,
            spans,
        })
    }

    /// Output columns the kernel writes. Equal to `m` unless a permissive
    /// policy accepted a column count that is not a multiple of 8.
    pub fn packed_columns(&self) -> usize {
        self.m_packed * PACK_FACTOR
    }

    /// Bytes of unpacked zero points (`zeros_n * zeros_m` as `i8`).
    pub fn unpacked_zeros_len(&self) -> usize {
        self.spans.unpacked_zeros
    }

    /// Minimum element counts of the `y`, `qweight`, `zeros` and `scales`
    /// buffers, honouring row strides.
    pub fn y_len(&self) -> usize {
        self.spans.y
    }

    pub fn qweight_len(&self) -> usize {
        self.spans.qweight
    }

    pub fn zeros_len(&self) -> usize {
        self.spans.zeros
    }

    pub fn scales_len(&self) -> usize {
        self.spans.scales
    }
}

// `(rows - 1) * row_stride + cols`, the elements between the first and last
// addressed element inclusive.
fn span(role: TensorRole, rows: usize, cols: usize, row_stride: usize) -> Result<usize> {
    if rows == 0 || cols == 0 {
        return Ok(0);
    }
    (rows - 1)
        .checked_mul(row_stride)
        .and_then(|outer| outer.checked_add(cols))
        .ok_or_else(|| OpError::strides(role, format!("{rows} rows at stride {row_stride} overflow usize")))
}

fn expect_dtype(role: TensorRole, desc: &TensorDesc, allowed: &[DType], expected: &'static str) -> Result<()> {
    if allowed.contains(&desc.dtype()) {
        Ok(())
    } else {
        Err(OpError::BadTensorDtype { tensor: role, got: desc.dtype(), expected })
    }
}

fn expect_shape(role: TensorRole, desc: &TensorDesc, expected: [usize; 2]) -> Result<()> {
    if desc.shape() == expected.as_slice() {
        Ok(())
    } else {
        Err(OpError::shape(format!("{role} has shape {:?}, expected {:?}", desc.shape(), expected)))
    }
}

// Innermost stride must be 1 and rows may not overlap. A single row never
// steps, so its outer stride is normalised to the row extent.
fn row_stride(role: TensorRole, desc: &TensorDesc) -> Result<usize> {
    let inner = desc.stride(1);
    if inner != 1 {
        return Err(OpError::strides(role, format!("innermost stride must be 1, got {inner}")));
    }
    let (rows, cols) = (desc.dim(0), desc.dim(1));
    if rows <= 1 {
        return Ok(cols);
    }
    let outer = desc.stride(0);
    match usize::try_from(outer) {
        Ok(stride) if stride >= cols => Ok(stride),
        _ => Err(OpError::strides(role, format!("row stride {outer} is smaller than row extent {cols}"))),
    }
}
