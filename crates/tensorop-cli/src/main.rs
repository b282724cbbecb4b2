//! tensorop CLI application
//!
//! Capability report, correctness harness and golden case generation for
//! tensorop operators.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tensorop_common::PackingPolicy;
use tensorop_kernels::KernelRegistry;
use tracing::{debug, error};

use tensorop_cli::commands::{CheckCommand, GenerateCommand, InfoCommand};
use tensorop_cli::commands::check::CheckFailed;
use tensorop_cli::config::{CliConfig, Overrides};
use tensorop_cli::exit::{EXIT_CHECK_FAILED, EXIT_GENERIC_FAIL};

/// tensorop - device-agnostic tensor operator runtime
#[derive(Parser)]
#[command(name = "tensorop")]
#[command(about = "Inspect, check and benchmark tensorop operators")]
#[command(long_about = r#"
tensorop validates operator kernels against reference answers and reports
which backends this build can dispatch to.

Examples:
  # Show compiled backends and configuration
  tensorop info

  # Check the AWQ dequantization kernel on the built-in cases
  tensorop check

  # Write a golden case, then replay it
  tensorop generate --output case.json -n 256 -m 4096 -g 128
  tensorop check --golden case.json --format json
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ./tensorop.toml when present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    /// Number of CPU threads, 0 for automatic
    #[arg(long, value_name = "N", global = true)]
    threads: Option<usize>,

    /// Packing policy for column counts that are not multiples of 8
    #[arg(long, value_name = "POLICY", global = true)]
    packing: Option<PackingPolicy>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show build, backend and configuration information
    Info(InfoCommand),

    /// Check kernels against reference answers and time them
    Check(CheckCommand),

    /// Write a golden case file
    #[command(alias = "gen")]
    Generate(GenerateCommand),
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(e) => {
            let code = if e.downcast_ref::<CheckFailed>().is_some() { EXIT_CHECK_FAILED } else { EXIT_GENERIC_FAIL };
            error!("Command failed: {}", e);

            // Show error chain
            for cause in e.chain().skip(1) {
                error!("  Caused by: {}", cause);
            }
            eprintln!("error: {e:#}");
            code
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(&cli)?;
    setup_logging(&config)?;
    debug!(?config, "configuration loaded");

    let registry = KernelRegistry::with_default_backends(config.runtime.clone());
    debug!("{}", registry.capabilities().summary());

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Some(Commands::Info(cmd)) => cmd.execute(&config, &registry, &mut stdout),
        Some(Commands::Check(cmd)) => cmd.execute(&config, &registry, &mut stdout),
        Some(Commands::Generate(cmd)) => cmd.execute(&config, &mut stdout),
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Load configuration from file and merge with CLI arguments
fn load_configuration(cli: &Cli) -> Result<CliConfig> {
    let config = CliConfig::load(cli.config.as_deref())?;
    Overrides {
        log_level: cli.log_level.clone(),
        log_format: cli.log_format.clone(),
        threads: cli.threads,
        packing: cli.packing,
    }
    .apply(config)
    .context("Failed to build configuration")
}

/// Setup logging based on configuration
fn setup_logging(config: &CliConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .with_context(|| format!("Invalid log level '{}'", config.logging.level))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.logging.format.as_str() {
        "json" => subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init(),
        "pretty" => subscriber.pretty().init(),
        _ => subscriber.compact().init(),
    }

    Ok(())
}
