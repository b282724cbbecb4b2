//! Property tests for `tensorop-kernels`.
//!
//! 1. **unpack_nibble** – agrees with the sequential-shift-then-gather reference.
//! 2. **CPU kernel vs reference** – every dtype pair stays within tolerance on
//!    random problems.
//! 3. **Zero-centred inputs** – weights equal to their zero point give 0.
//! 4. **Group isolation** – rows outside a perturbed group are bit-identical.

use half::f16;
use proptest::prelude::*;
use tensorop_common::{DType, Handle, RuntimeConfig, TensorDesc};
use tensorop_kernels::awq::reference::{Tolerance, all_close, dequantize_reference, pack, reorder, unpack_sequential};
use tensorop_kernels::awq::unpack_nibble;
use tensorop_kernels::{AwqDequantizeDescriptor, FloatSlice, FloatSliceMut, KernelRegistry, Stream};

/// (n, m, group_size, weights, zero points, scales)
type Case = (usize, usize, usize, Vec<u8>, Vec<u8>, Vec<f32>);

fn case() -> impl Strategy<Value = Case> {
    (1usize..4, 1usize..5, 1usize..4).prop_flat_map(|(groups, words, group_size)| {
        let (n, m) = (groups * group_size, words * 8);
        (
            Just(n),
            Just(m),
            Just(group_size),
            proptest::collection::vec(0u8..16, n * m),
            proptest::collection::vec(0u8..16, groups * m),
            proptest::collection::vec(-4.0f32..4.0, groups * m),
        )
    })
}

fn run(
    n: usize,
    m: usize,
    group_size: usize,
    qweight: &[i32],
    zeros: &[i32],
    scales: FloatSlice<'_>,
    data: DType,
) -> Vec<f32> {
    let zn = n / group_size;
    let registry = KernelRegistry::with_default_backends(RuntimeConfig::default());
    let desc = AwqDequantizeDescriptor::create_in(
        &registry,
        &Handle::cpu(),
        &TensorDesc::contiguous(data, &[n, m]),
        &TensorDesc::contiguous(DType::I32, &[n, m / 8]),
        &TensorDesc::contiguous(DType::I32, &[zn, m / 8]),
        &TensorDesc::contiguous(scales.dtype(), &[zn, m]),
        group_size,
    )
    .unwrap();
    let mut ws = vec![0u8; desc.workspace_size()];
    match data {
        DType::F16 => {
            let mut y = vec![f16::ZERO; n * m];
            desc.calculate(&mut ws, FloatSliceMut::F16(&mut y), qweight, zeros, scales, Stream::NULL).unwrap();
            y.iter().map(|v| v.to_f32()).collect()
        }
        _ => {
            let mut y = vec![0.0f32; n * m];
            desc.calculate(&mut ws, FloatSliceMut::F32(&mut y), qweight, zeros, scales, Stream::NULL).unwrap();
            y
        }
    }
}

proptest! {
    #[test]
    fn prop_unpack_nibble_matches_sequential_gather(word in any::<i32>()) {
        let expected = reorder(&unpack_sequential(&[word]));
        for (c, &e) in expected.iter().enumerate() {
            prop_assert_eq!(unpack_nibble(word, c), e as i8, "column {}", c);
        }
    }

    #[test]
    fn prop_kernel_matches_reference((n, m, g, w, z, s) in case()) {
        let (qweight, zeros) = (pack(&w, m), pack(&z, m));
        let s16: Vec<f16> = s.iter().map(|&v| f16::from_f32(v)).collect();
        let expect32 = dequantize_reference(n, m, g, &qweight, &zeros, &s);
        let expect16 = dequantize_reference(n, m, g, &qweight, &zeros, &s16);

        for data in [DType::F16, DType::F32] {
            let tol = Tolerance::for_dtype(data);
            let got = run(n, m, g, &qweight, &zeros, FloatSlice::F32(&s), data);
            let report = all_close(&got, &expect32, tol);
            prop_assert!(report.passed(), "{}<-f32: {:?}", data, report);

            let got = run(n, m, g, &qweight, &zeros, FloatSlice::F16(&s16), data);
            let report = all_close(&got, &expect16, tol);
            prop_assert!(report.passed(), "{}<-f16: {:?}", data, report);
        }
    }

    #[test]
    fn prop_zero_centred_weights_vanish((n, m, g, _w, z, s) in case()) {
        let w: Vec<u8> = (0..n * m).map(|idx| z[(idx / m / g) * m + idx % m]).collect();
        let got = run(n, m, g, &pack(&w, m), &pack(&z, m), FloatSlice::F32(&s), DType::F32);
        prop_assert!(got.iter().all(|&v| v == 0.0), "{:?}", got);
    }

    #[test]
    fn prop_group_perturbation_is_isolated((n, m, g, w, z, s) in case(), bump in 0.125f32..2.0) {
        let groups = n / g;
        let target = groups - 1;
        let mut s2 = s.clone();
        for v in &mut s2[target * m..(target + 1) * m] {
            *v += bump;
        }
        let (qweight, zeros) = (pack(&w, m), pack(&z, m));
        let before = run(n, m, g, &qweight, &zeros, FloatSlice::F32(&s), DType::F32);
        let after = run(n, m, g, &qweight, &zeros, FloatSlice::F32(&s2), DType::F32);
        prop_assert_eq!(&before[..target * g * m], &after[..target * g * m]);
    }
}
