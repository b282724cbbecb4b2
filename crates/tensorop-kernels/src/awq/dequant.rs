//! Grouped affine dequantization

use super::info::AwqDequantizeInfo;
use super::unpack::{PACK_FACTOR, unpack_nibble};
use crate::element::{OutputElement, ScaleElement};
use rayon::prelude::*;

/// `y[i, j] = (w[i, j] - z[g, j]) * s[g, j]` with `g = i / group_size`.
///
/// `zeros` holds the unpacked zero points, `zeros_n` rows of `zeros_m`.
/// The product is formed in the scale's precision and then converted to
/// the output type. Output rows are written in parallel.
pub fn dequantize<O, S>(info: &AwqDequantizeInfo, y: &mut [O], qweight: &[i32], zeros: &[i8], scales: &[S])
where
    O: OutputElement,
    S: ScaleElement,
{
    let cols = info.packed_columns();
    if info.n == 0 || cols == 0 {
        return;
    }

    y.par_chunks_mut(info.y_row_stride).take(info.n).enumerate().for_each(|(i, out)| {
        let group = i / info.group_size;
        let q_off = i * info.qweight_row_stride;
        let qrow = &qweight[q_off..q_off + info.m_packed];
        let zrow = &zeros[group * info.zeros_m..group * info.zeros_m + cols];
        let s_off = group * info.scales_row_stride;
        let srow = &scales[s_off..s_off + cols];

        for (p, &word) in qrow.iter().enumerate() {
            let base = p * PACK_FACTOR;
            for c in 0..PACK_FACTOR {
                let j = base + c;
                let q = unpack_nibble(word, c) - zrow[j];
                out[j] = O::from_f32_lossy(srow[j].scale(q).as_f32());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use tensorop_common::{DType, TensorDesc};

    fn info(n: usize, m: usize, g: usize, data: DType, scale: DType) -> AwqDequantizeInfo {
        let zn = n / g;
        AwqDequantizeInfo::create(
            &TensorDesc::contiguous(data, &[n, m]),
            &TensorDesc::contiguous(DType::I32, &[n, m / 8]),
            &TensorDesc::contiguous(DType::I32, &[zn, m / 8]),
            &TensorDesc::contiguous(scale, &[zn, m]),
            g,
        )
        .unwrap()
    }

    #[test]
    fn weight_equal_to_zero_gives_zero() {
        let info = info(2, 8, 2, DType::F32, DType::F32);
        let qweight = [0x3333_3333, 0x3333_3333];
        let zeros = [3i8; 8];
        let scales = [1.5f32; 8];
        let mut y = [f32::NAN; 16];
        dequantize(&info, &mut y, &qweight, &zeros, &scales);
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn f16_output_from_f32_scales() {
        let info = info(1, 8, 1, DType::F16, DType::F32);
        let qweight = [0x7654_3210];
        let zeros = [0i8; 8];
        let scales = [0.5f32; 8];
        let mut y = [f16::ZERO; 8];
        dequantize(&info, &mut y, &qweight, &zeros, &scales);
        let got: Vec<f32> = y.iter().map(|v| v.to_f32()).collect();
        assert_eq!(got, vec![0.0, 2.0, 0.5, 2.5, 1.0, 3.0, 1.5, 3.5]);
    }

    #[test]
    fn negative_results_when_zero_exceeds_weight() {
        let info = info(1, 8, 1, DType::F32, DType::F16);
        let qweight = [0];
        let zeros = [15i8; 8];
        let scales = [f16::from_f32(0.25); 8];
        let mut y = [0.0f32; 8];
        dequantize(&info, &mut y, &qweight, &zeros, &scales);
        assert!(y.iter().all(|&v| v == -3.75));
    }
}
