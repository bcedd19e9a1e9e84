//! Configuration management for tgaudit

use crate::error::{Error, Result};
use crate::telegram::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Semaphore;

/// Default number of probes allowed in flight
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default number of settled chats between dashboard refreshes
pub const DEFAULT_REPORT_EVERY: usize = 10;

/// Default capacity of the recent transport error log
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot API configuration
    pub telegram: TelegramConfig,

    /// Probe scheduling configuration
    pub probe: ProbeConfig,
}

/// Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Base URL of the Bot API, without trailing slash
    pub api_base: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Probe scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum probes in flight at once
    pub concurrency: usize,

    /// Refresh the dashboard every N settled chats
    pub report_every: usize,

    /// Skip this many identifiers from the head of the input
    pub start_from: usize,

    /// Minimum spacing between two dispatches (ms, 0 = none)
    pub dispatch_delay_ms: u64,

    /// Lower bound of the name-resolution retry delay (ms)
    pub retry_min_delay_ms: u64,

    /// Upper bound (exclusive) of the name-resolution retry delay (ms)
    pub retry_max_delay_ms: u64,

    /// Retries allowed per chat before it is dropped
    pub max_retries: u32,

    /// Number of recent transport errors kept for display
    pub error_log_capacity: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            concurrency: DEFAULT_CONCURRENCY,
            report_every: DEFAULT_REPORT_EVERY,
            start_from: 0,
            dispatch_delay_ms: 0,
            retry_min_delay_ms: 300,
            retry_max_delay_ms: 600,
            max_retries: 50,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup("TELEGRAM_API_BASE") {
            let base = base.trim().trim_end_matches('/').to_string();
            if !base.is_empty() {
                self.telegram.api_base = base;
            }
        }

        if let Some(value) = lookup("TGAUDIT_CONCURRENCY") {
            if let Ok(n) = value.trim().parse::<usize>() {
                self.probe.concurrency = n;
            }
        }

        if let Some(value) = lookup("TGAUDIT_REPORT_EVERY") {
            if let Ok(n) = value.trim().parse::<usize>() {
                self.probe.report_every = n;
            }
        }

        if let Some(value) = lookup("TGAUDIT_START_FROM") {
            if let Ok(n) = value.trim().parse::<usize>() {
                self.probe.start_from = n;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.telegram.api_base.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Bot API base URL is required".to_string(),
            ));
        }

        if self.telegram.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.probe.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.probe.concurrency > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidConfig(format!(
                "Concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        if self.probe.report_every == 0 {
            return Err(Error::InvalidConfig(
                "Report cadence must be greater than 0".to_string(),
            ));
        }

        if self.probe.retry_min_delay_ms > self.probe.retry_max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "Retry delay window is empty: {}ms > {}ms",
                self.probe.retry_min_delay_ms, self.probe.retry_max_delay_ms
            )));
        }

        Ok(())
    }
}
