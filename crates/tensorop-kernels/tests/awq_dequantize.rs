//! End-to-end tests for the AWQ dequantization descriptor on the CPU backend.

use half::f16;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tensorop_common::{DType, DeviceType, Handle, OpError, PackingPolicy, RuntimeConfig, Status, TensorDesc};
use tensorop_kernels::awq::reference::{Tolerance, all_close, dequantize_reference, pack};
use tensorop_kernels::awq::{PACK_FACTOR, REVERSE_ORDER};
use tensorop_kernels::{AwqDequantizeDescriptor, FloatSlice, FloatSliceMut, KernelRegistry, ScaleElement, Stream};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Problem {
    n: usize,
    m: usize,
    group_size: usize,
    weights: Vec<u8>,
    zero_points: Vec<u8>,
}

impl Problem {
    fn random(n: usize, m: usize, group_size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weights = (0..n * m).map(|_| rng.gen_range(0..16u8)).collect();
        let zero_points = (0..n / group_size * m).map(|_| rng.gen_range(0..16u8)).collect();
        Self { n, m, group_size, weights, zero_points }
    }

    fn zeros_n(&self) -> usize {
        self.n / self.group_size
    }

    fn qweight(&self) -> Vec<i32> {
        pack(&self.weights, self.m)
    }

    fn zeros(&self) -> Vec<i32> {
        pack(&self.zero_points, self.m)
    }

    fn descs(&self, data: DType, scale: DType) -> [TensorDesc; 4] {
        let (n, m, zn) = (self.n, self.m, self.zeros_n());
        [
            TensorDesc::contiguous(data, &[n, m]),
            TensorDesc::contiguous(DType::I32, &[n, m / PACK_FACTOR]),
            TensorDesc::contiguous(DType::I32, &[zn, m / PACK_FACTOR]),
            TensorDesc::contiguous(scale, &[zn, m]),
        ]
    }

    fn descriptor(&self, data: DType, scale: DType) -> AwqDequantizeDescriptor {
        let d = self.descs(data, scale);
        AwqDequantizeDescriptor::create_in(&registry(), &Handle::cpu(), &d[0], &d[1], &d[2], &d[3], self.group_size)
            .expect("descriptor")
    }

    /// Run with f32 output and the given scales.
    fn run_f32<S: ScaleElement>(&self, scales: &[S]) -> Vec<f32>
    where
        for<'a> FloatSlice<'a>: From<&'a [S]>,
    {
        let desc = self.descriptor(DType::F32, S::DTYPE);
        let mut ws = vec![0u8; desc.workspace_size()];
        let mut y = vec![f32::NAN; self.n * self.m];
        desc.calculate(
            &mut ws,
            FloatSliceMut::from(y.as_mut_slice()),
            &self.qweight(),
            &self.zeros(),
            FloatSlice::from(scales),
            Stream::NULL,
        )
        .expect("calculate");
        y
    }
}

fn registry() -> KernelRegistry {
    KernelRegistry::with_default_backends(RuntimeConfig::default())
}

fn random_scales(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn four_by_sixteen_unit_scales_give_weight_minus_zero() {
    let p = Problem::random(4, 16, 2, 7);
    let desc = p.descriptor(DType::F32, DType::F32);
    assert_eq!(desc.info().zeros_n, 2);
    assert_eq!(desc.info().m_packed, 2);
    assert_eq!(desc.info().zeros_m_packed, 2);
    assert_eq!(desc.workspace_size(), 32);

    let y = p.run_f32(&vec![1.0f32; 2 * 16]);
    assert_eq!(y.len(), 64);
    for i in 0..4 {
        for j in 0..16 {
            let expected = f32::from(p.weights[i * 16 + j]) - f32::from(p.zero_points[(i / 2) * 16 + j]);
            assert_eq!(y[i * 16 + j], expected, "y[{i}, {j}]");
        }
    }
}

#[test]
fn sequential_nibbles_follow_awq_column_order() {
    // One word whose nibble k holds k, zero points of zero.
    let desc = AwqDequantizeDescriptor::create_in(
        &registry(),
        &Handle::cpu(),
        &TensorDesc::contiguous(DType::F32, &[1, 8]),
        &TensorDesc::contiguous(DType::I32, &[1, 1]),
        &TensorDesc::contiguous(DType::I32, &[1, 1]),
        &TensorDesc::contiguous(DType::F32, &[1, 8]),
        1,
    )
    .unwrap();
    let mut ws = vec![0u8; desc.workspace_size()];
    let mut y = [0.0f32; 8];
    desc.calculate(
        &mut ws,
        y.as_mut_slice().into(),
        &[0x7654_3210],
        &[0],
        [1.0f32; 8].as_slice().into(),
        Stream::NULL,
    )
    .unwrap();

    let expected: Vec<f32> = REVERSE_ORDER.iter().map(|&k| k as f32).collect();
    assert_eq!(y.to_vec(), expected);
    assert_eq!(y.to_vec(), vec![0.0, 4.0, 1.0, 5.0, 2.0, 6.0, 3.0, 7.0]);
}

#[test]
fn weights_equal_to_zero_points_dequantize_to_zero() {
    let mut p = Problem::random(8, 32, 4, 11);
    for i in 0..p.n {
        for j in 0..p.m {
            p.weights[i * p.m + j] = p.zero_points[(i / p.group_size) * p.m + j];
        }
    }
    let y = p.run_f32(&random_scales(2 * 32, 3));
    assert!(y.iter().all(|&v| v == 0.0), "{y:?}");
}

#[test]
fn output_is_linear_in_scale() {
    let p = Problem::random(4, 16, 2, 5);
    let scales = random_scales(32, 9);
    let doubled: Vec<f32> = scales.iter().map(|s| s * 2.0).collect();
    let y1 = p.run_f32(&scales);
    let y2 = p.run_f32(&doubled);
    for (a, b) in y1.iter().zip(&y2) {
        assert!((b - 2.0 * a).abs() <= 1e-6, "{b} != 2 * {a}");
    }
}

#[test]
fn changing_one_group_leaves_other_rows_alone() {
    let mut p = Problem::random(6, 16, 2, 21);
    let mut scales = random_scales(3 * 16, 4);
    let before = p.run_f32(&scales);

    // Perturb group 1 only (rows 2 and 3).
    for j in 0..16 {
        scales[16 + j] += 0.5;
        p.zero_points[16 + j] = (p.zero_points[16 + j] + 3) % 16;
    }
    let after = p.run_f32(&scales);

    for i in [0, 1, 4, 5] {
        assert_eq!(&before[i * 16..(i + 1) * 16], &after[i * 16..(i + 1) * 16], "row {i} changed");
    }
    assert_ne!(&before[2 * 16..4 * 16], &after[2 * 16..4 * 16]);
}

#[test]
fn matches_reference_for_every_dtype_pair() {
    let p = Problem::random(16, 64, 4, 99);
    let scales = random_scales(4 * 64, 17);
    let scales_f16: Vec<f16> = scales.iter().map(|&s| f16::from_f32(s)).collect();
    let (qweight, zeros) = (p.qweight(), p.zeros());

    for data in [DType::F16, DType::F32] {
        for scale in [DType::F16, DType::F32] {
            let desc = p.descriptor(data, scale);
            let mut ws = vec![0u8; desc.workspace_size()];
            let mut y16 = vec![f16::ZERO; p.n * p.m];
            let mut y32 = vec![0.0f32; p.n * p.m];
            let y: FloatSliceMut<'_> = match data {
                DType::F16 => y16.as_mut_slice().into(),
                _ => y32.as_mut_slice().into(),
            };
            let (s, expected): (FloatSlice<'_>, Vec<f32>) = match scale {
                DType::F16 => (
                    scales_f16.as_slice().into(),
                    dequantize_reference(p.n, p.m, p.group_size, &qweight, &zeros, &scales_f16),
                ),
                _ => (scales.as_slice().into(), dequantize_reference(p.n, p.m, p.group_size, &qweight, &zeros, &scales)),
            };
            desc.calculate(&mut ws, y, &qweight, &zeros, s, Stream::NULL).unwrap();

            let actual: Vec<f32> = match data {
                DType::F16 => y16.iter().map(|v| v.to_f32()).collect(),
                _ => y32.clone(),
            };
            let report = all_close(&actual, &expected, Tolerance::for_dtype(data));
            assert!(report.passed(), "{data}<-{scale}: {report:?}");
        }
    }
}

#[test]
fn descriptor_is_reusable_and_overwrites_workspace() {
    let p = Problem::random(4, 16, 2, 1);
    let desc = p.descriptor(DType::F32, DType::F32);
    let scales = vec![1.0f32; 32];
    let mut ws = vec![0xFFu8; desc.workspace_size() + 8];
    let mut first = vec![0.0f32; 64];
    let mut second = vec![0.0f32; 64];
    for y in [&mut first, &mut second] {
        desc.calculate(&mut ws, y.as_mut_slice().into(), &p.qweight(), &p.zeros(), scales.as_slice().into(), Stream::NULL)
            .unwrap();
    }
    assert_eq!(first, second);
    // Bytes past the workspace size are not touched.
    assert!(ws[desc.workspace_size()..].iter().all(|&b| b == 0xFF));
}

#[test]
fn shared_descriptor_calculates_concurrently() {
    let p = Problem::random(64, 64, 16, 2024);
    let scales = random_scales(4 * 64, 5);
    let (qweight, zeros) = (p.qweight(), p.zeros());
    let desc = p.descriptor(DType::F32, DType::F32);
    let expected = p.run_f32(&scales);
    let reference = dequantize_reference(p.n, p.m, p.group_size, &qweight, &zeros, &scales);

    let outputs: Vec<Vec<f32>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let mut ws = vec![0u8; desc.workspace_size()];
                    let mut y = vec![f32::NAN; p.n * p.m];
                    for _ in 0..4 {
                        desc.calculate(
                            &mut ws,
                            y.as_mut_slice().into(),
                            &qweight,
                            &zeros,
                            scales.as_slice().into(),
                            Stream::NULL,
                        )
                        .unwrap();
                    }
                    y
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for (i, y) in outputs.iter().enumerate() {
        assert_eq!(y, &expected, "worker {i}");
        let report = all_close(y, &reference, Tolerance::for_dtype(DType::F32));
        assert!(report.passed(), "worker {i}: {report:?}");
    }
}

#[test]
fn strided_rows_are_addressed_by_row_stride() {
    let p = Problem::random(4, 16, 2, 33);
    let contiguous = p.run_f32(&vec![0.25f32; 32]);

    // y rows padded to 24 elements, qweight rows padded to 3 words.
    let y_desc = TensorDesc::new(DType::F32, &[4, 16], &[24, 1]).unwrap();
    let q_desc = TensorDesc::new(DType::I32, &[4, 2], &[3, 1]).unwrap();
    let z_desc = TensorDesc::contiguous(DType::I32, &[2, 2]);
    let s_desc = TensorDesc::contiguous(DType::F32, &[2, 16]);
    let desc = AwqDequantizeDescriptor::create_in(&registry(), &Handle::cpu(), &y_desc, &q_desc, &z_desc, &s_desc, 2)
        .unwrap();

    let packed = p.qweight();
    let mut qweight = vec![-1i32; 3 * 3 + 2];
    for i in 0..4 {
        qweight[i * 3..i * 3 + 2].copy_from_slice(&packed[i * 2..i * 2 + 2]);
    }
    let mut y = vec![f32::NAN; 3 * 24 + 16];
    let mut ws = vec![0u8; desc.workspace_size()];
    desc.calculate(&mut ws, y.as_mut_slice().into(), &qweight, &p.zeros(), [0.25f32; 32].as_slice().into(), Stream::NULL)
        .unwrap();

    for i in 0..4 {
        assert_eq!(&y[i * 24..i * 24 + 16], &contiguous[i * 16..(i + 1) * 16], "row {i}");
        if i < 3 {
            assert!(y[i * 24 + 16..(i + 1) * 24].iter().all(|v| v.is_nan()), "padding of row {i} written");
        }
    }
}

#[test]
fn permissive_policy_writes_only_packed_columns() {
    let registry =
        KernelRegistry::with_default_backends(RuntimeConfig { packing: PackingPolicy::Permissive, ..Default::default() });
    let desc = AwqDequantizeDescriptor::create_in(
        &registry,
        &Handle::cpu(),
        &TensorDesc::contiguous(DType::F32, &[1, 12]),
        &TensorDesc::contiguous(DType::I32, &[1, 1]),
        &TensorDesc::contiguous(DType::I32, &[1, 1]),
        &TensorDesc::contiguous(DType::F32, &[1, 12]),
        1,
    )
    .unwrap();
    let mut ws = vec![0u8; desc.workspace_size()];
    let mut y = [-1.0f32; 12];
    desc.calculate(&mut ws, y.as_mut_slice().into(), &[0x1111_1111], &[0], [1.0f32; 12].as_slice().into(), Stream::NULL)
        .unwrap();
    assert_eq!(&y[..8], &[1.0; 8]);
    assert_eq!(&y[8..], &[-1.0; 4]);
}

#[test]
fn empty_problem_succeeds_without_workspace() {
    let p = Problem { n: 0, m: 16, group_size: 4, weights: vec![], zero_points: vec![] };
    let desc = p.descriptor(DType::F16, DType::F16);
    assert_eq!(desc.workspace_size(), 0);
    let mut y: Vec<f16> = Vec::new();
    desc.calculate(&mut [], y.as_mut_slice().into(), &[], &[], FloatSlice::F16(&[]), Stream::NULL).unwrap();
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

fn create(d: &[TensorDesc; 4], group_size: usize) -> Result<AwqDequantizeDescriptor, OpError> {
    AwqDequantizeDescriptor::create_in(&registry(), &Handle::cpu(), &d[0], &d[1], &d[2], &d[3], group_size)
}

#[test]
fn create_rejects_packed_column_mismatch() {
    let p = Problem::random(4, 16, 2, 0);
    let mut d = p.descs(DType::F32, DType::F32);
    d[1] = TensorDesc::contiguous(DType::I32, &[4, 4]);
    assert_eq!(create(&d, 2).unwrap_err().status(), Status::BadTensorShape);
}

#[test]
fn create_rejects_strided_output_columns() {
    let p = Problem::random(4, 16, 2, 0);
    let mut d = p.descs(DType::F32, DType::F32);
    d[0] = TensorDesc::new(DType::F32, &[4, 16], &[32, 2]).unwrap();
    assert_eq!(create(&d, 2).unwrap_err().status(), Status::BadTensorStrides);
}

#[test]
fn create_rejects_group_not_dividing_rows() {
    let p = Problem::random(4, 16, 2, 0);
    let d = p.descs(DType::F32, DType::F32);
    assert_eq!(create(&d, 3).unwrap_err().status(), Status::BadTensorShape);
}

#[test]
fn create_rejects_unregistered_device() {
    let p = Problem::random(4, 16, 2, 0);
    let d = p.descs(DType::F32, DType::F32);
    let err = AwqDequantizeDescriptor::create_in(
        &registry(),
        &Handle::new(DeviceType::Nvidia, 0),
        &d[0],
        &d[1],
        &d[2],
        &d[3],
        2,
    )
    .unwrap_err();
    assert_eq!(err, OpError::DeviceTypeNotSupported { device: DeviceType::Nvidia });
}

#[test]
fn calculate_rejects_small_workspace() {
    let p = Problem::random(4, 16, 2, 0);
    let desc = p.descriptor(DType::F32, DType::F32);
    let mut ws = vec![0u8; desc.workspace_size() - 1];
    let mut y = vec![0.0f32; 64];
    let err = desc
        .calculate(&mut ws, y.as_mut_slice().into(), &p.qweight(), &p.zeros(), [1.0f32; 32].as_slice().into(), Stream::NULL)
        .unwrap_err();
    assert_eq!(err, OpError::InsufficientWorkspace { required: 32, provided: 31 });
}

#[test]
fn calculate_rejects_mismatched_buffer_dtype() {
    let p = Problem::random(4, 16, 2, 0);
    let desc = p.descriptor(DType::F16, DType::F32);
    let mut ws = vec![0u8; desc.workspace_size()];
    let mut y = vec![0.0f32; 64];
    let err = desc
        .calculate(&mut ws, y.as_mut_slice().into(), &p.qweight(), &p.zeros(), [1.0f32; 32].as_slice().into(), Stream::NULL)
        .unwrap_err();
    assert_eq!(err.status(), Status::BadTensorDtype);
}

#[test]
fn calculate_rejects_short_buffers() {
    let p = Problem::random(4, 16, 2, 0);
    let desc = p.descriptor(DType::F32, DType::F32);
    let mut ws = vec![0u8; desc.workspace_size()];
    let mut y = vec![0.0f32; 63];
    let err = desc
        .calculate(&mut ws, y.as_mut_slice().into(), &p.qweight(), &p.zeros(), [1.0f32; 32].as_slice().into(), Stream::NULL)
        .unwrap_err();
    assert_eq!(err.status(), Status::BadParam);
    insta::assert_snapshot!(err.to_string(), @"invalid argument 'y': buffer holds 63 elements, need 64");
}
