//! Correctness check and timing over built-in or golden cases

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::io::Write;
use std::path::PathBuf;
use tensorop_common::{DeviceType, Handle};
use tensorop_kernels::KernelRegistry;
use tracing::info;

use crate::config::CliConfig;
use crate::golden::{GoldenCase, collect_golden_files};
use crate::harness::{CheckSummary, RunOptions, builtin_cases, run_all};
use crate::output::{OutputFormat, write_json};

/// Compare the kernel against reference answers and time it
#[derive(Args, Debug, Default)]
pub struct CheckCommand {
    /// Golden JSON files or directories; built-in cases when omitted
    #[arg(long, value_name = "PATH", num_args = 1..)]
    pub golden: Vec<PathBuf>,

    /// Device to run on
    #[arg(short, long, default_value = "cpu", value_name = "DEVICE")]
    pub device: String,

    /// Device index
    #[arg(long, default_value = "0", value_name = "ID")]
    pub device_id: i32,

    /// Warmup iterations (defaults to the config file)
    #[arg(long, value_name = "N")]
    pub warmup: Option<usize>,

    /// Measured iterations, 0 disables timing (defaults to the config file)
    #[arg(long, value_name = "N")]
    pub iterations: Option<usize>,

    /// Seed for generated built-in inputs (defaults to the config file)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Only run built-in cases whose name contains this text
    #[arg(long, value_name = "TEXT")]
    pub filter: Option<String>,

    /// Output format (text or json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

/// Returned when the run completes but some cases failed.
#[derive(Debug, thiserror::Error)]
#[error("{failed} of {total} cases failed")]
pub struct CheckFailed {
    pub failed: usize,
    pub total: usize,
}

impl CheckCommand {
    fn options(&self, config: &CliConfig) -> Result<RunOptions> {
        let device: DeviceType =
            self.device.parse().map_err(anyhow::Error::msg).context("Invalid --device")?;
        Ok(RunOptions {
            handle: Handle::new(device, self.device_id),
            warmup: self.warmup.unwrap_or(config.harness.warmup),
            iterations: self.iterations.unwrap_or(config.harness.iterations),
        })
    }

    fn load_cases(&self, config: &CliConfig) -> Result<Vec<GoldenCase>> {
        if !self.golden.is_empty() {
            return collect_golden_files(&self.golden)?.iter().map(|path| GoldenCase::load(path)).collect();
        }
        let seed = self.seed.unwrap_or(config.harness.seed);
        builtin_cases()
            .into_iter()
            .filter(|spec| self.filter.as_ref().is_none_or(|f| spec.to_string().contains(f.as_str())))
            .enumerate()
            .map(|(i, spec)| spec.generate(seed.wrapping_add(i as u64)))
            .collect()
    }

    /// Run every case and print the report. Fails with [`CheckFailed`] if
    /// any case did not pass.
    pub fn execute<W: Write>(&self, config: &CliConfig, registry: &KernelRegistry, out: &mut W) -> Result<()> {
        let options = self.options(config)?;
        let cases = self.load_cases(config)?;
        anyhow::ensure!(!cases.is_empty(), "no cases selected");
        info!(cases = cases.len(), device = %options.handle.device, "running awq dequantize check");

        let summary = run_all(registry, &cases, &options);
        match self.format {
            OutputFormat::Json => write_json(out, &summary)?,
            OutputFormat::Text => print_text(out, &summary)?,
        }

        if summary.all_passed() {
            Ok(())
        } else {
            Err(CheckFailed { failed: summary.failed, total: summary.total }.into())
        }
    }
}

fn print_text<W: Write>(out: &mut W, summary: &CheckSummary) -> Result<()> {
    writeln!(out, "{}", style("AWQ dequantize check").bold().cyan())?;
    for case in &summary.cases {
        let outcome = if case.outcome.is_pass() {
            style(case.outcome.to_string()).green()
        } else {
            style(case.outcome.to_string()).red()
        };
        write!(out, "  {:<44} {outcome}", case.name)?;
        if let Some(timing) = &case.timing {
            write!(out, "  mean {:.1}us  min {:.1}us", timing.mean_us, timing.min_us)?;
        }
        writeln!(out)?;
        if let Some(detail) = &case.detail {
            writeln!(out, "      {}", style(detail).dim())?;
        }
    }
    let totals = format!("{} passed, {} failed, {} total", summary.passed, summary.failed, summary.total);
    let totals = if summary.all_passed() { style(totals).green() } else { style(totals).red() };
    writeln!(out, "{totals}")?;
    Ok(())
}
