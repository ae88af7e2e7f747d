//! Configuration management for the syncer.
//!
//! Loads configuration from an optional TOML file. Per-run switches from the
//! command line are folded into a [`SyncOptions`] value which is passed
//! explicitly to every Location, the reconciler and the watcher.

use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub s3: S3Config,
    pub sync: SyncConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// Region override; otherwise taken from the AWS environment
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint (MinIO, LocalStack, ...)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub compare: CompareMode,

    #[serde(default)]
    pub on_error: FailurePolicy,

    /// Attempts per put/delete, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for every further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// File-name substrings never synced
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub rename: RenamePolicy,

    /// Bound of the notification channel between the OS watcher and the loop
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// When an object present on both sides needs to be pushed again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    /// Sizes differ.
    #[default]
    Size,
    /// Sizes differ, or the source is newer and both sides are the same backend kind.
    SizeAndMtime,
}

/// What the reconciliation pass does after a failed key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// How rename notifications are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenamePolicy {
    /// Unhandled, like any other unknown notification.
    #[default]
    Fatal,
    /// Removed if the path is gone, created if it exists.
    DeleteCreate,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            compare: CompareMode::default(),
            on_error: FailurePolicy::default(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            exclude: Vec::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            rename: RenamePolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    /// Delay before attempt number `attempt` (1-based, so attempt 2 is the first retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(2).min(16);
        self.initial_backoff
            .saturating_mul(1 << doublings)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: Duration::from_millis(default_retry_backoff_ms()),
        }
    }
}

/// Everything a run needs to know, threaded through constructors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Log puts and deletes instead of executing them
    pub noop: bool,

    /// Watch subdirectories too
    pub recursive: bool,

    /// Delete destination objects missing from the source during reconciliation
    pub delete: bool,

    /// Skip the watch phase
    pub one_time: bool,

    pub compare: CompareMode,
    pub on_error: FailurePolicy,
    pub retry: RetryPolicy,
    pub rename: RenamePolicy,
    pub exclude: Vec<String>,
    pub channel_capacity: usize,
}

impl SyncOptions {
    /// File-derived settings; per-run switches start off.
    pub fn from_config(config: &Config) -> Self {
        Self {
            compare: config.sync.compare,
            on_error: config.sync.on_error,
            retry: RetryPolicy {
                max_attempts: config.sync.max_attempts.max(1),
                initial_backoff: Duration::from_millis(config.sync.retry_backoff_ms),
            },
            rename: config.watch.rename,
            exclude: config.sync.exclude.clone(),
            channel_capacity: config.watch.channel_capacity.max(1),
            ..Self::default()
        }
    }
}
