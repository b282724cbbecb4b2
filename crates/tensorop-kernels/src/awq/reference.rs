//! Independent golden implementation and tolerance checks
//!
//! Unpacks with plain sequential shifts and applies the AWQ column order as
//! a separate gather, so it shares no code path with the kernels it checks.

use super::unpack::{PACK_FACTOR, REVERSE_ORDER};
use crate::element::ScaleElement;
use tensorop_common::DType;

/// Split every word into its eight nibbles, lowest bits first.
pub fn unpack_sequential(packed: &[i32]) -> Vec<u8> {
    packed
        .iter()
        .flat_map(|&w| (0..PACK_FACTOR).map(move |k| ((w as u32 >> (4 * k)) & 0xF) as u8))
        .collect()
}

/// Gather sequentially unpacked nibbles into AWQ column order.
pub fn reorder(sequential: &[u8]) -> Vec<u8> {
    sequential
        .chunks_exact(PACK_FACTOR)
        .flat_map(|word| REVERSE_ORDER.iter().map(move |&k| word[k]))
        .collect()
}

/// Pack row-major 4-bit values (`cols` a multiple of 8) so that
/// [`reorder`]`(`[`unpack_sequential`]`(..))` returns them unchanged.
pub fn pack(values: &[u8], cols: usize) -> Vec<i32> {
    debug_assert_eq!(cols % PACK_FACTOR, 0);
    values
        .chunks_exact(PACK_FACTOR)
        .map(|chunk| {
            let word = chunk
                .iter()
                .zip(REVERSE_ORDER)
                .fold(0u32, |acc, (&v, k)| acc | (u32::from(v & 0xF) << (4 * k)));
            word as i32
        })
        .collect()
}

/// Dequantize contiguous inputs, returning `n * m` values widened to `f32`.
pub fn dequantize_reference<S: ScaleElement>(
    n: usize,
    m: usize,
    group_size: usize,
    qweight: &[i32],
    zeros: &[i32],
    scales: &[S],
) -> Vec<f32> {
    let weights = reorder(&unpack_sequential(qweight));
    let zero_points = reorder(&unpack_sequential(zeros));

    let mut out = Vec::with_capacity(n * m);
    for i in 0..n {
        let g = i / group_size;
        for j in 0..m {
            let q = weights[i * m + j] as i8 - zero_points[g * m + j] as i8;
            out.push(scales[g * m + j].scale(q).as_f32());
        }
    }
    out
}

/// Absolute and relative tolerance for `|a - e| <= atol + rtol * |e|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerance {
    /// Default tolerance for results stored as `dtype`.
    pub fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F16 | DType::BF16 => Tolerance { atol: 2e-3, rtol: 2e-3 },
            _ => Tolerance { atol: 1e-5, rtol: 1e-5 },
        }
    }
}

/// Outcome of comparing two buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseReport {
    pub compared: usize,
    pub max_abs_err: f64,
    /// First index outside tolerance, or the shorter length on a size mismatch.
    pub first_mismatch: Option<usize>,
}

impl CloseReport {
    pub fn passed(&self) -> bool {
        self.first_mismatch.is_none()
    }
}

pub fn all_close(actual: &[f32], expected: &[f32], tol: Tolerance) -> CloseReport {
    let compared = actual.len().min(expected.len());
    let mut max_abs_err = 0.0f64;
    let mut first_mismatch = (actual.len() != expected.len()).then_some(compared);

    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let (a, e) = (f64::from(a), f64::from(e));
        let err = (a - e).abs();
        if err.is_nan() || err > tol.atol + tol.rtol * e.abs() {
            first_mismatch.get_or_insert(i);
        }
        if err > max_abs_err || err.is_nan() {
            max_abs_err = err;
        }
    }

    CloseReport { compared, max_abs_err, first_mismatch }
}
