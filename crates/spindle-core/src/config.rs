//! Engine configuration.
//!
//! Everything that used to be process-wide state (stop words, retry policy,
//! lease and scan timings) lives here and is handed to components when they
//! are built. Durations are stored as milliseconds and exposed as
//! `Duration` through accessors.
//!
//! Loading order: defaults, then an optional JSON file, then `SPINDLE_*`
//! environment variables, then `validate()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RetryPolicy;

pub const ENV_PREFIX: &str = "SPINDLE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: String, value: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of workers the engine runs.
    pub workers: usize,

    /// Attempts at a reload-and-retry operation (cancel) before giving up
    /// on repeated version conflicts.
    pub max_conflict_retries: u32,

    pub lease: LeaseConfig,
    pub heartbeat: HeartbeatConfig,
    pub scanner: ScannerConfig,
    pub retry: RetryConfig,
    pub submission: SubmissionConfig,
    pub text: TextConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_conflict_retries: 5,
            lease: LeaseConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            scanner: ScannerConfig::default(),
            retry: RetryConfig::default(),
            submission: SubmissionConfig::default(),
            text: TextConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Must exceed the worst-case processing time.
    pub duration_ms: u64,

    /// How long one `dequeue` call blocks before the worker re-checks
    /// shutdown.
    pub dequeue_wait_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300_000,
            dequeue_wait_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,

    /// A worker silent for `interval * missed_intervals` is dead.
    pub missed_intervals: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            missed_intervals: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub interval_ms: u64,

    /// Reclaim a task whose lease is still live when its owner is confirmed
    /// dead by the worker registry.
    pub reclaim_dead_owner_early: bool,

    /// FAILED tasks untouched for this long are settled by the scanner.
    pub unsettled_failure_grace_ms: u64,

    /// Recorded as the actor of scanner transitions.
    pub scanner_id: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            reclaim_dead_owner_early: true,
            unsettled_failure_grace_ms: 60_000,
            scanner_id: "orphan-scanner".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,

    /// Fraction of the delay added at random, 0.0 to 1.0.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    pub max_payload_bytes: usize,
    pub max_top_n: usize,
    pub max_min_word_length: usize,
    pub max_page_size: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            max_top_n: 1_000,
            max_min_word_length: 64,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub stop_words: Vec<String>,
}

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "i", "if", "in", "is", "it", "its", "me", "my", "not", "of", "on", "or", "our",
    "she", "so", "that", "the", "their", "them", "then", "there", "they", "this", "to", "was",
    "we", "were", "what", "when", "which", "who", "will", "with", "you", "your",
];

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults or `path`, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SPINDLE_*` overrides. Unknown `SPINDLE_` variables are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let Some(key) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let bad = || ConfigError::Env {
                var: var.clone(),
                value: value.clone(),
            };
            match key {
                "WORKERS" => self.workers = value.parse().map_err(|_| bad())?,
                "LEASE_DURATION_MS" => self.lease.duration_ms = value.parse().map_err(|_| bad())?,
                "DEQUEUE_WAIT_MS" => self.lease.dequeue_wait_ms = value.parse().map_err(|_| bad())?,
                "HEARTBEAT_INTERVAL_MS" => {
                    self.heartbeat.interval_ms = value.parse().map_err(|_| bad())?
                }
                "HEARTBEAT_MISSED_INTERVALS" => {
                    self.heartbeat.missed_intervals = value.parse().map_err(|_| bad())?
                }
                "SCAN_INTERVAL_MS" => self.scanner.interval_ms = value.parse().map_err(|_| bad())?,
                "RECLAIM_DEAD_OWNER_EARLY" => {
                    self.scanner.reclaim_dead_owner_early = value.parse().map_err(|_| bad())?
                }
                "MAX_RETRIES" => self.retry.max_retries = value.parse().map_err(|_| bad())?,
                "RETRY_BASE_DELAY_MS" => {
                    self.retry.base_delay_ms = value.parse().map_err(|_| bad())?
                }
                "RETRY_MULTIPLIER" => self.retry.multiplier = value.parse().map_err(|_| bad())?,
                "RETRY_MAX_DELAY_MS" => self.retry.max_delay_ms = value.parse().map_err(|_| bad())?,
                "MAX_PAYLOAD_BYTES" => {
                    self.submission.max_payload_bytes = value.parse().map_err(|_| bad())?
                }
                "STOP_WORDS" => {
                    self.text.stop_words = value
                        .split(',')
                        .map(str::trim)
                        .filter(|w| !w.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.lease.duration_ms == 0 {
            return Err(invalid("lease.duration_ms", "must be positive"));
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(invalid("heartbeat.interval_ms", "must be positive"));
        }
        if self.heartbeat.missed_intervals == 0 {
            return Err(invalid("heartbeat.missed_intervals", "must be at least 1"));
        }
        if self.heartbeat.interval_ms >= self.lease.duration_ms {
            return Err(invalid(
                "heartbeat.interval_ms",
                "must be shorter than the lease duration",
            ));
        }
        if self.scanner.interval_ms == 0 {
            return Err(invalid("scanner.interval_ms", "must be positive"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be a finite number >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(invalid("retry.jitter", "must be within 0.0..=1.0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms", "must not exceed retry.max_delay_ms"));
        }
        if self.submission.max_payload_bytes == 0 {
            return Err(invalid("submission.max_payload_bytes", "must be positive"));
        }
        if self.submission.max_page_size == 0 {
            return Err(invalid("submission.max_page_size", "must be at least 1"));
        }
        if self.submission.max_top_n == 0 {
            return Err(invalid("submission.max_top_n", "must be at least 1"));
        }
        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease.duration_ms)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.lease.dequeue_wait_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.interval_ms)
    }

    /// `interval * missed_intervals`.
    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_interval() * self.heartbeat.missed_intervals
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scanner.interval_ms)
    }

    pub fn unsettled_failure_grace(&self) -> Duration {
        Duration::from_millis(self.scanner.unsettled_failure_grace_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.multiplier,
        )
        .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
        .with_jitter(self.retry.jitter)
    }
}
