//! Runtime configuration
//!
//! This module handles settings for the effect runtime: worker threads, default
//! fork timeouts, producer channel capacity, verbosity, and the default retry
//! policy. Configuration can be built in code or loaded from TOML or YAML.

use crate::error::{EffectError, ErrorCode, Result};
use crate::schedule::{Schedule, ScheduleConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for the multi-threaded runtime; `None` uses one per core
    pub worker_threads: Option<usize>,
    /// Name given to runtime worker threads
    pub thread_name: String,
    /// Await timeout applied by `fork(None)`
    #[serde(with = "humantime_serde")]
    pub fork_timeout: Option<Duration>,
    /// Capacity of channels backing producer sources; `None` is unbounded
    pub channel_capacity: Option<usize>,
    /// Verbosity level for logging
    pub verbose: u8,
    /// Default retry policy
    pub retry: Option<ScheduleConfig>,
}

impl RuntimeConfig {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_fork_timeout(mut self, timeout: Duration) -> Self {
        self.fork_timeout = Some(timeout);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    pub fn with_retry(mut self, retry: ScheduleConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Load configuration from a `.toml`, `.yaml` or `.yml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EffectError::from(e).with_context(format!("reading {}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(EffectError::failure_with_code(
                ErrorCode::CONFIG_UNSUPPORTED_FORMAT,
                format!("unsupported configuration format: {}", path.display()),
            )),
        }
    }

    /// The configured retry policy, or the default policy
    pub fn retry_schedule(&self) -> Schedule {
        self.retry.clone().unwrap_or_default().to_schedule()
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "effio-worker".to_string(),
            fork_timeout: None,
            channel_capacity: None,
            verbose: 0,
            retry: None,
        }
    }
}
