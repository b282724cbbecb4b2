//! Build, capability and configuration report

use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;
use std::io::Write;
use tensorop_common::{DeviceType, PackingPolicy};
use tensorop_kernels::KernelRegistry;

use crate::config::CliConfig;
use crate::output::{OutputFormat, write_json};

/// Show build, backend and configuration information
#[derive(Args, Debug, Default)]
pub struct InfoCommand {
    /// Output format (text or json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub rustc: &'static str,
    pub target: &'static str,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            rustc: option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
            target: option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
            built_at: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackendReport {
    pub device: DeviceType,
    pub backend: Option<&'static str>,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub build: BuildInfo,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_cores: usize,
    /// Compile-time SIMD level. Informational; kernels do not dispatch on it.
    pub simd: String,
    pub compiled: Vec<DeviceType>,
    pub devices: Vec<BackendReport>,
    pub threads: usize,
    pub packing: PackingPolicy,
}

impl InfoReport {
    pub fn collect(config: &CliConfig, registry: &KernelRegistry) -> Self {
        let caps = registry.capabilities();
        let devices = DeviceType::ALL
            .into_iter()
            .map(|device| {
                let entry = caps.registered.iter().find(|b| b.device == device);
                BackendReport { device, backend: entry.map(|b| b.name), available: caps.supports(device) }
            })
            .collect();
        Self {
            build: BuildInfo::current(),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu_cores: num_cpus::get(),
            simd: caps.simd_level.to_string(),
            compiled: caps.compiled,
            devices,
            threads: config.runtime.effective_threads(),
            packing: config.runtime.packing,
        }
    }
}

impl InfoCommand {
    pub fn execute<W: Write>(&self, config: &CliConfig, registry: &KernelRegistry, out: &mut W) -> Result<()> {
        let report = InfoReport::collect(config, registry);
        match self.format {
            OutputFormat::Json => write_json(out, &report),
            OutputFormat::Text => print_text(out, &report),
        }
    }
}

fn print_text<W: Write>(out: &mut W, report: &InfoReport) -> Result<()> {
    writeln!(out, "{}", style("tensorop").bold().cyan())?;
    writeln!(out)?;

    writeln!(out, "{}", style("Build:").bold())?;
    writeln!(out, "  Version: {}", report.build.version)?;
    writeln!(out, "  Rust: {}", report.build.rustc)?;
    writeln!(out, "  Target: {}", report.build.target)?;
    writeln!(out, "  Built: {}", report.build.built_at)?;
    writeln!(out)?;

    writeln!(out, "{}", style("System:").bold())?;
    writeln!(out, "  OS: {}", report.os)?;
    writeln!(out, "  Architecture: {}", report.arch)?;
    writeln!(out, "  CPU cores: {}", report.cpu_cores)?;
    writeln!(out, "  SIMD: {} (informational, not used for kernel selection)", report.simd)?;
    writeln!(out)?;

    writeln!(out, "{}", style("Backends:").bold())?;
    let compiled: Vec<String> = report.compiled.iter().map(|d| d.to_string()).collect();
    writeln!(out, "  Compiled: {}", if compiled.is_empty() { "none".to_string() } else { compiled.join(", ") })?;
    for entry in &report.devices {
        let status = match (entry.backend, entry.available) {
            (Some(name), true) => style(format!("✓ {name}")).green(),
            (Some(name), false) => style(format!("✗ {name} (unavailable)")).yellow(),
            (None, _) => style("✗ not supported".to_string()).red(),
        };
        writeln!(out, "  {:<10} {}", entry.device, status)?;
    }
    writeln!(out)?;

    writeln!(out, "{}", style("Configuration:").bold())?;
    writeln!(out, "  Threads: {}", report.threads)?;
    let packing = match report.packing {
        PackingPolicy::Strict => "strict",
        PackingPolicy::Permissive => "permissive",
    };
    writeln!(out, "  Packing: {packing}")?;
    Ok(())
}
