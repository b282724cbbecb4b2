//! Golden case files
//!
//! A golden case carries packed inputs, scales widened to `f32`, and the
//! expected dequantized output, so a case produced on one machine can be
//! replayed against any backend.

use anyhow::{Context, Result, bail, ensure};
use half::f16;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tensorop_common::DType;
use tensorop_kernels::awq::PACK_FACTOR;
use tensorop_kernels::awq::reference::{Tolerance, dequantize_reference, pack};

pub const GOLDEN_FORMAT_VERSION: u32 = 1;

/// Problem shape and dtype pairing of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSpec {
    pub n: usize,
    pub m: usize,
    pub group_size: usize,
    pub scale_dtype: DType,
    pub out_dtype: DType,
}

impl CaseSpec {
    pub fn new(n: usize, m: usize, group_size: usize, scale_dtype: DType, out_dtype: DType) -> Self {
        Self { n, m, group_size, scale_dtype, out_dtype }
    }

    /// Rows of zero points and scales.
    pub fn groups(&self) -> usize {
        self.n / self.group_size
    }

    pub fn packed_cols(&self) -> usize {
        self.m / PACK_FACTOR
    }

    /// Random inputs and their expected output.
    pub fn generate(&self, seed: u64) -> Result<GoldenCase> {
        ensure!(self.group_size > 0, "group_size must be positive");
        ensure!(self.n % self.group_size == 0, "n={} is not a multiple of group_size={}", self.n, self.group_size);
        ensure!(self.m % PACK_FACTOR == 0, "m={} is not a multiple of {PACK_FACTOR}", self.m);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let groups = self.groups();
        let weights: Vec<u8> = (0..self.n * self.m).map(|_| rng.gen_range(0..16)).collect();
        let zero_points: Vec<u8> = (0..groups * self.m).map(|_| rng.gen_range(0..16)).collect();
        let raw_scales: Vec<f32> = (0..groups * self.m).map(|_| rng.gen_range(-0.05f32..0.05)).collect();

        let qweight = pack(&weights, self.m);
        let zeros = pack(&zero_points, self.m);
        let (scales, ans) = match self.scale_dtype {
            DType::F16 => {
                let typed: Vec<f16> = raw_scales.iter().map(|&s| f16::from_f32(s)).collect();
                let ans = dequantize_reference(self.n, self.m, self.group_size, &qweight, &zeros, &typed);
                (typed.iter().map(|s| s.to_f32()).collect(), ans)
            }
            DType::F32 => {
                let ans = dequantize_reference(self.n, self.m, self.group_size, &qweight, &zeros, &raw_scales);
                (raw_scales, ans)
            }
            other => bail!("no reference for {other} scales"),
        };

        Ok(GoldenCase {
            version: GOLDEN_FORMAT_VERSION,
            name: self.to_string(),
            seed: Some(seed),
            spec: *self,
            qweight,
            zeros,
            scales,
            ans,
            atol: None,
            rtol: None,
        })
    }
}

impl fmt::Display for CaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} m={} g={} scales={} y={}",
            self.n, self.m, self.group_size, self.scale_dtype, self.out_dtype
        )
    }
}

/// Serialized reference case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCase {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub spec: CaseSpec,
    pub qweight: Vec<i32>,
    pub zeros: Vec<i32>,
    pub scales: Vec<f32>,
    /// Expected output, row-major `n x m`.
    pub ans: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtol: Option<f64>,
}

impl GoldenCase {
    /// Tolerance stored in the file, else the default for the output dtype.
    pub fn tolerance(&self) -> Tolerance {
        let default = Tolerance::for_dtype(self.spec.out_dtype);
        Tolerance { atol: self.atol.unwrap_or(default.atol), rtol: self.rtol.unwrap_or(default.rtol) }
    }

    /// Check buffer lengths against the declared shape.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.version == GOLDEN_FORMAT_VERSION,
            "unsupported golden format version {} (expected {GOLDEN_FORMAT_VERSION})",
            self.version
        );
        let spec = &self.spec;
        ensure!(spec.group_size > 0, "group_size must be positive");
        let expect = [
            ("qweight", self.qweight.len(), spec.n * spec.packed_cols()),
            ("zeros", self.zeros.len(), spec.groups() * spec.packed_cols()),
            ("scales", self.scales.len(), spec.groups() * spec.m),
            ("ans", self.ans.len(), spec.n * spec.m),
        ];
        for (field, got, need) in expect {
            ensure!(got == need, "'{field}' holds {got} values, shape needs {need}");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read golden file {}", path.display()))?;
        let case: GoldenCase =
            serde_json::from_str(&text).with_context(|| format!("Invalid golden file {}", path.display()))?;
        case.validate().with_context(|| format!("Inconsistent golden file {}", path.display()))?;
        Ok(case)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string(self).context("Failed to serialize golden case")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Expand `paths` into golden files: plain files as given, directories to
/// their `*.json` entries in name order.
pub fn collect_golden_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        bail!("no golden files found");
    }
    Ok(files)
}
