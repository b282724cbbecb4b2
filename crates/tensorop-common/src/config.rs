//! Runtime configuration

use crate::error::{OpError, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the CPU worker count.
pub const ENV_NUM_THREADS: &str = "TENSOROP_NUM_THREADS";
/// Environment variable selecting the packing policy (`strict` or `permissive`).
pub const ENV_PACKING: &str = "TENSOROP_PACKING";

/// How packed extents that are not multiples of 8 are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackingPolicy {
    /// Reject unpacked column counts that are not a multiple of 8.
    #[default]
    Strict,
    /// Accept them and truncate the packed extent (`m / 8`).
    Permissive,
}

impl std::str::FromStr for PackingPolicy {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(PackingPolicy::Strict),
            "permissive" => Ok(PackingPolicy::Permissive),
            other => Err(OpError::param("packing", format!("expected strict|permissive, got '{other}'"))),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// CPU worker threads; `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
    pub packing: PackingPolicy,
}

impl RuntimeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_NUM_THREADS) {
            let n: usize = raw.trim().parse().map_err(|_| {
                OpError::param("num_threads", format!("{ENV_NUM_THREADS}='{raw}' is not an integer"))
            })?;
            config.num_threads = if n == 0 { None } else { Some(n) };
        }
        if let Some(raw) = lookup(ENV_PACKING) {
            config.packing = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_threads == Some(0) {
            return Err(OpError::param("num_threads", "must be positive when set"));
        }
        Ok(())
    }

    /// Worker count actually used by CPU kernels.
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }
}
