//! Configuration management for the tensorop CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tensorop_common::{PackingPolicy, RuntimeConfig};

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tensorop.toml";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub runtime: RuntimeConfig,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: "compact".to_string() }
    }
}

/// Timing defaults for `tensorop check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub warmup: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { warmup: 3, iterations: 20, seed: 0x5eed }
    }
}

impl CliConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(text).context("Invalid configuration file")?;
        config.runtime.validate().context("Invalid [runtime] section")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Explicit `path`, else `tensorop.toml` if present, else the
    /// environment (`TENSOROP_NUM_THREADS`, `TENSOROP_PACKING`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            return Self::from_file(default_path);
        }
        let runtime = RuntimeConfig::from_env().context("Invalid runtime environment")?;
        Ok(Self { runtime, ..Self::default() })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub threads: Option<usize>,
    pub packing: Option<PackingPolicy>,
}

impl Overrides {
    pub fn apply(self, mut config: CliConfig) -> Result<CliConfig> {
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(threads) = self.threads {
            config.runtime.num_threads = (threads > 0).then_some(threads);
        }
        if let Some(packing) = self.packing {
            config.runtime.packing = packing;
        }
        config.runtime.validate().context("Invalid runtime override")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(CliConfig::from_toml_str("").unwrap(), CliConfig::default());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = CliConfig::from_toml_str(
            r#"
            [runtime]
            num_threads = 2
            packing = "permissive"

            [harness]
            iterations = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.num_threads, Some(2));
        assert_eq!(config.runtime.packing, PackingPolicy::Permissive);
        assert_eq!(config.harness.iterations, 5);
        assert_eq!(config.harness.warmup, HarnessConfig::default().warmup);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(CliConfig::from_toml_str("[runtime]\npacking = \"loose\"").is_err());
        assert!(CliConfig::from_toml_str("[runtime]\nnum_threads = 0").is_err());
        assert!(CliConfig::from_toml_str("[harness\n").is_err());
    }

    #[test]
    fn overrides_win_over_file_values() {
        let base = CliConfig::from_toml_str("[logging]\nlevel = \"info\"\n[runtime]\nnum_threads = 8").unwrap();
        let config = Overrides {
            log_level: Some("debug".into()),
            threads: Some(0),
            packing: Some(PackingPolicy::Permissive),
            ..Default::default()
        }
        .apply(base)
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.runtime.num_threads, None);
        assert_eq!(config.runtime.packing, PackingPolicy::Permissive);
    }

    #[test]
    fn serialized_config_reloads() {
        let mut config = CliConfig::default();
        config.runtime.num_threads = Some(3);
        config.harness.seed = 7;
        let text = config.to_toml_string().unwrap();
        assert_eq!(CliConfig::from_toml_str(&text).unwrap(), config);
    }
}
