//! Configuration for the chunk engine.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};

/// How the scheduler reacts to a failed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop handing out work after the first failure and report it.
    #[default]
    FailFast,
    /// Process every position and report all failures together.
    Aggregate,
}

impl FailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "failfast" => Some(Self::FailFast),
            "aggregate" | "run_to_completion" => Some(Self::Aggregate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine settings shared by every computation of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker thread limit. Unset uses every hardware thread, 1 runs
    /// serially in position order.
    pub max_threads: Option<usize>,

    /// Propagate missing inputs to the output without evaluating.
    pub skip_missing: bool,

    pub failure_policy: FailurePolicy,

    /// Accumulate time spent reading, computing and writing.
    pub track_timing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            skip_missing: false,
            failure_policy: FailurePolicy::FailFast,
            track_timing: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRIDMATH_MAX_THREADS") {
            if let Ok(threads) = val.parse() {
                config.max_threads = Some(threads);
            }
        }

        if let Ok(val) = std::env::var("GRIDMATH_SKIP_MISSING") {
            config.skip_missing = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("GRIDMATH_FAILURE_POLICY") {
            if let Some(policy) = FailurePolicy::from_str(&val) {
                config.failure_policy = policy;
            }
        }

        if let Ok(val) = std::env::var("GRIDMATH_TRACK_TIMING") {
            config.track_timing = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Load configuration from a YAML file. Absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChunkError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate().map_err(ChunkError::Config)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_threads == Some(0) {
            return Err("max_threads must be > 0 when set".to_string());
        }
        Ok(())
    }

    /// Worker threads to request from the pool.
    pub fn thread_count(&self) -> usize {
        self.max_threads.unwrap_or_else(available_threads)
    }
}

/// Hardware threads available to this process, at least one.
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
