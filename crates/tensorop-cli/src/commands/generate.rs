//! Golden case generation

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tensorop_common::DType;
use tracing::info;

use crate::config::CliConfig;
use crate::golden::CaseSpec;

/// Write a golden case computed with the reference implementation
#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Output JSON file
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Output rows
    #[arg(short, long, default_value = "128", value_name = "N")]
    pub n: usize,

    /// Output columns (multiple of 8)
    #[arg(short, long, default_value = "2048", value_name = "M")]
    pub m: usize,

    /// Rows sharing one zero/scale row
    #[arg(short, long, default_value = "64", value_name = "G")]
    pub group_size: usize,

    /// Scale dtype (f16 or f32)
    #[arg(long, default_value = "f16", value_name = "DTYPE")]
    pub scale_dtype: DType,

    /// Output dtype (f16 or f32)
    #[arg(long, default_value = "f16", value_name = "DTYPE")]
    pub out_dtype: DType,

    /// Random seed (defaults to the config file)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Override the absolute tolerance stored in the file
    #[arg(long, value_name = "ATOL")]
    pub atol: Option<f64>,

    /// Override the relative tolerance stored in the file
    #[arg(long, value_name = "RTOL")]
    pub rtol: Option<f64>,
}

impl GenerateCommand {
    pub fn execute<W: Write>(&self, config: &CliConfig, out: &mut W) -> Result<()> {
        let spec = CaseSpec::new(self.n, self.m, self.group_size, self.scale_dtype, self.out_dtype);
        let seed = self.seed.unwrap_or(config.harness.seed);
        let mut case = spec.generate(seed).with_context(|| format!("Cannot generate case {spec}"))?;
        case.atol = self.atol;
        case.rtol = self.rtol;
        case.save(&self.output)?;

        info!(case = %case.name, seed, path = %self.output.display(), "golden case written");
        writeln!(out, "Wrote {} ({}) to {}", case.name, seed, self.output.display())?;
        Ok(())
    }
}
