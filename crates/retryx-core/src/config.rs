use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action::ActionKind;
use crate::retry::{BackoffPolicy, DefaultTimeouts};

/// Invalid values found while resolving the retry configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A duration was negative, NaN or infinite.
    #[error("retry.{key} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDuration { key: String, value: f64 },
    /// The global default timeout was zero.
    #[error("retry.timeout_secs must be greater than zero")]
    ZeroDefaultTimeout,
}

/// Retry parameters (`[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Default time budget in seconds for every action kind without an override.
    pub timeout_secs: f64,
    /// Upper bound in seconds on the exponential part of the backoff.
    pub max_wait_secs: f64,
    /// Ceiling in milliseconds of the random jitter added to every wait.
    pub jitter_millis: u64,
    /// Retry non-recoverable failures once with tracing forced on, for calls
    /// that ask for it.
    pub retry_with_trace_on_failure: bool,
    /// Per-action timeout overrides in seconds, keyed by `change_update` etc.
    pub timeouts: BTreeMap<ActionKind, f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20.0,
            max_wait_secs: 5.0,
            jitter_millis: 50,
            retry_with_trace_on_failure: false,
            timeouts: BTreeMap::new(),
        }
    }
}

fn secs(key: &str, value: f64) -> Result<Duration, ConfigError> {
    // Rejects NaN, negatives and values past `Duration::MAX`.
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration {
        key: key.to_string(),
        value,
    })
}

impl RetryConfig {
    /// Resolve the timeout of every action kind; unset kinds get `timeout_secs`.
    pub fn default_timeouts(&self) -> Result<DefaultTimeouts, ConfigError> {
        let fallback = secs("timeout_secs", self.timeout_secs)?;
        if fallback.is_zero() {
            return Err(ConfigError::ZeroDefaultTimeout);
        }
        let mut overrides = BTreeMap::new();
        for (kind, value) in &self.timeouts {
            let key = format!("timeouts.{}", kind.as_str().to_ascii_lowercase());
            overrides.insert(*kind, secs(&key, *value)?);
        }
        Ok(DefaultTimeouts::new(fallback, overrides))
    }

    /// Backoff policy built from `max_wait_secs` and `jitter_millis`.
    pub fn backoff(&self) -> Result<BackoffPolicy, ConfigError> {
        let max_wait = secs("max_wait_secs", self.max_wait_secs)?;
        Ok(BackoffPolicy::new(
            max_wait,
            Duration::from_millis(self.jitter_millis),
        ))
    }
}

/// Global configuration loaded from `~/.config/retryx/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryxConfig {
    /// Retry section; missing keys fall back to built-in defaults.
    #[serde(default)]
    pub retry: RetryConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("retryx")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RetryxConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RetryxConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<RetryxConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: RetryxConfig = toml::from_str(&data)?;
    // Surface bad durations at load time rather than at first use.
    cfg.retry.default_timeouts()?;
    cfg.retry.backoff()?;
    Ok(cfg)
}
