//! Correctness and timing harness for AWQ dequantization
//!
//! Each case goes through the same lifecycle a C caller uses: create a
//! descriptor, query the workspace, execute, compare against the golden
//! answer, then time warm-up and measured iterations.

use half::f16;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tensorop_common::{DType, Handle, OpError, TensorDesc};
use tensorop_kernels::awq::reference::{CloseReport, all_close};
use tensorop_kernels::{AwqDequantizeDescriptor, FloatSlice, FloatSliceMut, KernelRegistry, Stream};
use tracing::{debug, info, warn};

use crate::golden::{CaseSpec, GoldenCase};

/// `(n, m, group_size)` of the built-in suite.
pub const BUILTIN_SHAPES: [(usize, usize, usize); 4] =
    [(64, 64, 64), (128, 2048, 64), (256, 4096, 128), (512, 8192, 256)];

/// Scale and output dtypes exercised by the built-in suite.
pub const BUILTIN_DTYPES: [DType; 2] = [DType::F16, DType::F32];

/// Built-in shapes crossed with every scale/output dtype pairing.
pub fn builtin_cases() -> Vec<CaseSpec> {
    let mut cases = Vec::new();
    for (n, m, g) in BUILTIN_SHAPES {
        for scale in BUILTIN_DTYPES {
            for out in BUILTIN_DTYPES {
                cases.push(CaseSpec::new(n, m, g, scale, out));
            }
        }
    }
    cases
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Passed,
    OpCreationFailed,
    OpExecutionFailed,
    ResultIncorrect,
}

impl Outcome {
    pub fn is_pass(self) -> bool {
        self == Outcome::Passed
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Passed => "PASSED",
            Outcome::OpCreationFailed => "OP_CREATION_FAILED",
            Outcome::OpExecutionFailed => "OP_EXECUTION_FAILED",
            Outcome::ResultIncorrect => "RESULT_INCORRECT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub warmup: usize,
    pub iterations: usize,
    pub mean_us: f64,
    pub min_us: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub spec: CaseSpec,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_abs_err: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

impl CaseReport {
    fn failed(case: &GoldenCase, outcome: Outcome, err: &OpError) -> Self {
        warn!(case = %case.name, %outcome, status = err.status().code(), "{err}");
        Self {
            name: case.name.clone(),
            spec: case.spec,
            outcome,
            backend: None,
            detail: Some(err.to_string()),
            max_abs_err: None,
            timing: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cases: Vec<CaseReport>,
}

impl CheckSummary {
    pub fn from_reports(cases: Vec<CaseReport>) -> Self {
        let passed = cases.iter().filter(|c| c.outcome.is_pass()).count();
        Self { total: cases.len(), passed, failed: cases.len() - passed, cases }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub handle: Handle,
    pub warmup: usize,
    /// Zero skips timing.
    pub iterations: usize,
}

enum ScaleBuffer {
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl ScaleBuffer {
    fn new(dtype: DType, values: &[f32]) -> Result<Self, OpError> {
        match dtype {
            DType::F16 => Ok(Self::F16(values.iter().map(|&v| f16::from_f32(v)).collect())),
            DType::F32 => Ok(Self::F32(values.to_vec())),
            other => Err(OpError::ExecutionFailed { reason: format!("harness has no {other} scale buffer") }),
        }
    }

    fn as_slice(&self) -> FloatSlice<'_> {
        match self {
            Self::F16(v) => FloatSlice::F16(v),
            Self::F32(v) => FloatSlice::F32(v),
        }
    }
}

enum OutputBuffer {
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl OutputBuffer {
    fn new(dtype: DType, len: usize) -> Result<Self, OpError> {
        match dtype {
            DType::F16 => Ok(Self::F16(vec![f16::ZERO; len])),
            DType::F32 => Ok(Self::F32(vec![0.0; len])),
            other => Err(OpError::ExecutionFailed { reason: format!("harness has no {other} output buffer") }),
        }
    }

    fn as_mut_slice(&mut self) -> FloatSliceMut<'_> {
        match self {
            Self::F16(v) => FloatSliceMut::F16(v),
            Self::F32(v) => FloatSliceMut::F32(v),
        }
    }

    fn to_f32_vec(&mut self) -> Vec<f32> {
        self.as_mut_slice().to_f32_vec()
    }
}

struct Prepared {
    desc: AwqDequantizeDescriptor,
    workspace: Vec<u8>,
    scales: ScaleBuffer,
    y: OutputBuffer,
}

impl Prepared {
    fn run(&mut self, case: &GoldenCase) -> Result<(), OpError> {
        self.desc.calculate(
            &mut self.workspace,
            self.y.as_mut_slice(),
            &case.qweight,
            &case.zeros,
            self.scales.as_slice(),
            Stream::NULL,
        )
    }
}

fn create(registry: &KernelRegistry, case: &GoldenCase, handle: &Handle) -> Result<AwqDequantizeDescriptor, OpError> {
    let spec = &case.spec;
    AwqDequantizeDescriptor::create_in(
        registry,
        handle,
        &TensorDesc::contiguous(spec.out_dtype, &[spec.n, spec.m]),
        &TensorDesc::contiguous(DType::I32, &[spec.n, spec.packed_cols()]),
        &TensorDesc::contiguous(DType::I32, &[spec.groups(), spec.packed_cols()]),
        &TensorDesc::contiguous(spec.scale_dtype, &[spec.groups(), spec.m]),
        spec.group_size,
    )
}

fn prepare(desc: AwqDequantizeDescriptor, case: &GoldenCase) -> Result<Prepared, OpError> {
    let spec = &case.spec;
    Ok(Prepared {
        workspace: vec![0u8; desc.workspace_size()],
        scales: ScaleBuffer::new(spec.scale_dtype, &case.scales)?,
        y: OutputBuffer::new(spec.out_dtype, spec.n * spec.m)?,
        desc,
    })
}

fn time(prepared: &mut Prepared, case: &GoldenCase, warmup: usize, iterations: usize) -> Result<Timing, OpError> {
    for _ in 0..warmup {
        prepared.run(case)?;
    }
    let mut total = 0.0f64;
    let mut min = f64::INFINITY;
    for _ in 0..iterations {
        let start = Instant::now();
        prepared.run(case)?;
        let us = start.elapsed().as_secs_f64() * 1e6;
        total += us;
        min = min.min(us);
    }
    Ok(Timing { warmup, iterations, mean_us: total / iterations as f64, min_us: min })
}

fn mismatch_detail(report: &CloseReport, actual: &[f32], expected: &[f32]) -> String {
    match report.first_mismatch {
        Some(i) if i < report.compared => format!(
            "first mismatch at index {i}: got {}, expected {} (max abs err {:.3e})",
            actual[i], expected[i], report.max_abs_err
        ),
        _ => format!("output holds {} values, expected {}", actual.len(), expected.len()),
    }
}

/// Run one case end to end.
pub fn run_case(registry: &KernelRegistry, case: &GoldenCase, options: &RunOptions) -> CaseReport {
    let desc = match create(registry, case, &options.handle) {
        Ok(desc) => desc,
        Err(err) => return CaseReport::failed(case, Outcome::OpCreationFailed, &err),
    };
    let backend = desc.backend_name();
    debug!(case = %case.name, backend, workspace = desc.workspace_size(), "descriptor created");

    let mut prepared = match prepare(desc, case) {
        Ok(prepared) => prepared,
        Err(err) => return CaseReport::failed(case, Outcome::OpExecutionFailed, &err),
    };
    if let Err(err) = prepared.run(case) {
        return CaseReport { backend: Some(backend), ..CaseReport::failed(case, Outcome::OpExecutionFailed, &err) };
    }

    let actual = prepared.y.to_f32_vec();
    let report = all_close(&actual, &case.ans, case.tolerance());
    if !report.passed() {
        let detail = mismatch_detail(&report, &actual, &case.ans);
        warn!(case = %case.name, "{detail}");
        return CaseReport {
            name: case.name.clone(),
            spec: case.spec,
            outcome: Outcome::ResultIncorrect,
            backend: Some(backend),
            detail: Some(detail),
            max_abs_err: Some(report.max_abs_err),
            timing: None,
        };
    }

    let timing = if options.iterations > 0 {
        match time(&mut prepared, case, options.warmup, options.iterations) {
            Ok(timing) => Some(timing),
            Err(err) => {
                return CaseReport {
                    backend: Some(backend),
                    max_abs_err: Some(report.max_abs_err),
                    ..CaseReport::failed(case, Outcome::OpExecutionFailed, &err)
                };
            }
        }
    } else {
        None
    };

    info!(case = %case.name, backend, max_abs_err = report.max_abs_err, "passed");
    CaseReport {
        name: case.name.clone(),
        spec: case.spec,
        outcome: Outcome::Passed,
        backend: Some(backend),
        detail: None,
        max_abs_err: Some(report.max_abs_err),
        timing,
    }
}

pub fn run_all(registry: &KernelRegistry, cases: &[GoldenCase], options: &RunOptions) -> CheckSummary {
    CheckSummary::from_reports(cases.iter().map(|case| run_case(registry, case, options)).collect())
}
