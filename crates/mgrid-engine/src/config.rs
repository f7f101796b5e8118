use std::path::PathBuf;
use std::time::Duration;

use mgrid_core::{ErrorInfo, GridError};
use serde::{Deserialize, Serialize};

use crate::balance::BalanceStrategy;
use crate::checkpoint::WriteDiscipline;

/// YAML-configurable parameters governing a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Fixed worker count for the whole sweep.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempts (successes, timeouts and failures all count) buffered by
    /// each worker between checkpoint flushes.
    #[serde(default = "default_save_freq")]
    pub save_freq: usize,
    /// Optional hard wall-clock deadline per simulator invocation, seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Append to pre-existing output of the same prefix.
    #[serde(default)]
    pub restart: bool,
    /// Remove pre-existing output of the same prefix before starting.
    #[serde(default)]
    pub overwrite: bool,
    /// Checkpoint write discipline, fixed for the sweep.
    #[serde(default)]
    pub discipline: WriteDiscipline,
    /// Absolute tolerance used when matching prior records to axis values.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Work assignment strategy.
    #[serde(default)]
    pub strategy: BalanceStrategy,
    /// Output destination.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_workers() -> usize {
    1
}

fn default_save_freq() -> usize {
    500
}

fn default_tolerance() -> f64 {
    1e-3
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            save_freq: default_save_freq(),
            timeout_secs: None,
            restart: false,
            overwrite: false,
            discipline: WriteDiscipline::default(),
            tolerance: default_tolerance(),
            strategy: BalanceStrategy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Validates setup-time invariants before any worker starts.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.workers == 0 {
            return Err(GridError::Config(ErrorInfo::new(
                "config-workers",
                "worker count must be at least 1",
            )));
        }
        if self.save_freq == 0 {
            return Err(GridError::Config(ErrorInfo::new(
                "config-save-freq",
                "checkpoint interval must be a positive attempt count",
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(GridError::Config(ErrorInfo::new(
                "config-tolerance",
                format!("tolerance {} is not a finite non-negative number", self.tolerance),
            )));
        }
        Ok(())
    }

    /// Per-point deadline as a duration, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Output destination layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding every sweep artifact. Created if missing.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Filename prefix shared by all artifacts of this sweep.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "modelgrid".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            prefix: default_prefix(),
        }
    }
}
