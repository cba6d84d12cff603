//! Configuration for relq clients.
//!
//! Settings are read from a TOML file and then overridden by environment
//! variables:
//!
//! | Key | Environment | Default |
//! |---|---|---|
//! | `prefix` | `RELQ_PREFIX` | `relq` |
//! | `redis_url` | `RELQ_REDIS_URL`, `REDIS_URL` | `redis://localhost:6379/0` |
//! | `retry_strategy` | `RELQ_RETRY_STRATEGY` | `linear` |
//! | `max_retries` | `RELQ_MAX_RETRIES` | `3` |
//! | `retry_delay` | `RELQ_RETRY_DELAY` | `0` |
//! | `schedule_batch_size` | | `100` |
//! | `blocking_pool_size` | `RELQ_BLOCKING_POOL_SIZE` | `16` |
//!
//! The file lives at `~/.relq/config.toml`, or `$RELQ_HOME/config.toml`
//! when `RELQ_HOME` is set. It is optional; a missing file means defaults.

use crate::error::{Error, Result as QueueResult};
use crate::queue::{QueueOptions, RetryStrategy};
use crate::store::DEFAULT_BLOCKING_POOL_SIZE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Redis connection.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Namespace for every key written by relq.
    pub prefix: String,
    pub redis_url: String,
    pub retry_strategy: RetryStrategy,
    /// Failures tolerated before a message is killed (`-1` for unlimited).
    pub max_retries: i64,
    /// Seconds before a failed message is retried.
    pub retry_delay: i64,
    /// Scheduled messages promoted per scan.
    pub schedule_batch_size: usize,
    /// Connections consumers may hold while blocked on an empty queue.
    pub blocking_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: "relq".to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            retry_strategy: RetryStrategy::Linear,
            max_retries: 3,
            retry_delay: 0,
            schedule_batch_size: 100,
            blocking_pool_size: DEFAULT_BLOCKING_POOL_SIZE,
        }
    }
}

/// Get the relq base directory.
///
/// Resolution order:
/// 1. `RELQ_HOME` environment variable (if set)
/// 2. `~/.relq/` (default)
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("RELQ_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".relq"))
}

/// Get the default config path: `~/.relq/config.toml`
pub fn default_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("config.toml"))
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if an
    /// environment variable holds an invalid value.
    pub fn load() -> Result<Self> {
        let path = default_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment
    /// overrides. `None` falls back to [`Config::load`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::load();
        };
        let mut config = Self::load_from(path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from the specified path, without environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A key is unknown or has an invalid type
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overrides settings from `RELQ_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or strategy variable cannot be parsed.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(prefix) = env("RELQ_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(url) = env("RELQ_REDIS_URL").or_else(|| env("REDIS_URL")) {
            self.redis_url = url;
        }
        if let Some(strategy) = env("RELQ_RETRY_STRATEGY") {
            self.retry_strategy = strategy
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid RELQ_RETRY_STRATEGY")?;
        }
        if let Some(retries) = env("RELQ_MAX_RETRIES") {
            self.max_retries = retries
                .parse()
                .with_context(|| format!("Invalid RELQ_MAX_RETRIES: {retries}"))?;
        }
        if let Some(delay) = env("RELQ_RETRY_DELAY") {
            self.retry_delay = delay
                .parse()
                .with_context(|| format!("Invalid RELQ_RETRY_DELAY: {delay}"))?;
        }
        if let Some(size) = env("RELQ_BLOCKING_POOL_SIZE") {
            self.blocking_pool_size = size
                .parse()
                .with_context(|| format!("Invalid RELQ_BLOCKING_POOL_SIZE: {size}"))?;
        }
        Ok(())
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] listing every problem found:
    /// - Empty prefix
    /// - `max_retries` below `-1`
    /// - Negative `retry_delay`
    /// - Zero `schedule_batch_size` or `blocking_pool_size`
    /// - A `redis_url` that is not a `redis://`, `rediss://` or `unix://` URL
    pub fn validate(&self) -> QueueResult<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.prefix.is_empty() {
            errors.push("prefix cannot be empty".to_string());
        }

        if self.max_retries < -1 {
            errors.push(format!(
                "max_retries must be -1 (unlimited) or greater (got: {})",
                self.max_retries
            ));
        }

        if self.retry_delay < 0 {
            errors.push(format!(
                "retry_delay cannot be negative (got: {})",
                self.retry_delay
            ));
        }

        if self.schedule_batch_size == 0 {
            errors.push("schedule_batch_size cannot be 0".to_string());
        }

        if self.blocking_pool_size == 0 {
            errors.push("blocking_pool_size cannot be 0".to_string());
        }

        let schemes = ["redis://", "rediss://", "unix://"];
        if !schemes.iter().any(|s| self.redis_url.starts_with(s)) {
            errors.push(format!(
                "redis_url must start with one of {} (got: '{}')",
                schemes.join(", "),
                self.redis_url
            ));
        }

        if self.retry_strategy == RetryStrategy::Linear
            && self.max_retries == -1
            && self.retry_delay == 0
        {
            warnings.push(
                "Unlimited retries without a retry_delay\n  \
                 Messages that always fail will be retried in a tight loop"
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(Error::InvalidConfig(errors.join("; ")));
        }

        Ok(ValidationResult { warnings })
    }

    /// Queue options derived from this configuration.
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions::default()
            .with_prefix(Some(self.prefix.as_str()))
            .with_retry_strategy(self.retry_strategy)
            .with_max_retries(self.max_retries)
            .with_retry_delay(Duration::from_secs(self.retry_delay.max(0).unsigned_abs()))
            .with_schedule_batch_size(self.schedule_batch_size)
    }
}
