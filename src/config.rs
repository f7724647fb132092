//! Configuration management for the limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{LeakyBucketLimiter, DEFAULT_MAX_IDLE_TIME};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Bucket parameters
    #[serde(default)]
    pub limiter: BucketConfig,

    /// Idle-bucket eviction
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bucket parameters shared by every key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum level at which an event is still admitted
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Units drained per unit of time
    #[serde(default = "default_leak_rate")]
    pub leak_rate: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            leak_rate: default_leak_rate(),
        }
    }
}

fn default_capacity() -> f64 {
    10.0
}

fn default_leak_rate() -> f64 {
    1.0
}

/// Idle-bucket eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Time between cleanup passes; the replay binary reads it in trace
    /// time units. Must be positive.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Time since the last update after which a drained bucket is dropped
    #[serde(default = "default_max_idle_time")]
    pub max_idle_time: f64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_idle_time: default_max_idle_time(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_idle_time() -> f64 {
    DEFAULT_MAX_IDLE_TIME
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml).map_err(|e| {
            LimiterError::ConfigFile(format!("failed to parse limiter config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup.interval_secs == 0 {
            return Err(LimiterError::InvalidConfiguration(
                "cleanup interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build an empty limiter from the bucket parameters.
    pub fn build_limiter(&self) -> Result<LeakyBucketLimiter> {
        LeakyBucketLimiter::new(self.limiter.capacity, self.limiter.leak_rate)
    }
}
