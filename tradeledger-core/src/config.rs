//! TOML configuration for the ledger, quote sources, engine and reports.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineOptions, ThresholdPolicy};
use crate::quote::{CircuitBreaker, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TradeLedgerConfig {
    pub ledger: LedgerSettings,
    pub quotes: QuoteSettings,
    pub engine: EngineSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSettings {
    /// Ledger CSV file.
    pub path: PathBuf,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("transactions.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QuoteSettings {
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub base_delay_ms: u64,
    /// Longest single wait between attempts, Retry-After included.
    pub max_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_failure_threshold: u32,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            breaker_cooldown_secs: 30 * 60,
            breaker_failure_threshold: 3,
        }
    }
}

impl QuoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            Duration::from_secs(self.breaker_cooldown_secs),
            self.breaker_failure_threshold,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Upper bound on concurrent quote lookups during evaluation.
    pub max_concurrency: usize,
    pub threshold_policy: ThresholdPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            threshold_policy: ThresholdPolicy::Permissive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSettings {
    /// Trailing window, in days, of positions included in the ranking.
    pub window_days: u32,
    /// Ranking CSV output.
    pub output: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            window_days: 30,
            output: PathBuf::from("ranking_users.csv"),
        }
    }
}

impl TradeLedgerConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_concurrency must be at least 1".into(),
            ));
        }
        if self.quotes.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "quotes.timeout_secs must be at least 1".into(),
            ));
        }
        if self.report.window_days == 0 {
            return Err(ConfigError::Invalid(
                "report.window_days must be at least 1".into(),
            ));
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ledger.path must not be empty".into()));
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            retry: self.quotes.retry_policy(),
            max_concurrency: self.engine.max_concurrency,
            threshold_policy: self.engine.threshold_policy,
        }
    }
}
