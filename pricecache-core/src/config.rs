//! Cache configuration loaded from `pricecache.toml`.
//!
//! Every field has a default so an empty file (or no file) yields a working
//! setup that mirrors the historical `data/yfinance` + `logs/yfinance.log` layout.

use crate::domain::{Ticker, TickerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid ticker in config: {0}")]
    Ticker(#[from] TickerError),

    #[error("cannot create directory {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Transport settings for the remote provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub cooldown_secs: u64,
    pub failure_threshold: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
            cooldown_secs: 30 * 60,
            failure_threshold: 3,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Top-level cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root holding one `{TICKER}.csv` per symbol.
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Log file stem; the sink is `{log_dir}/{log_name}.log`.
    pub log_name: String,
    /// Worker pool size for batch syncs.
    pub max_workers: usize,
    /// Default ticker set when none are given on the command line.
    pub tickers: Vec<String>,
    pub provider: ProviderConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/yfinance"),
            log_dir: PathBuf::from("logs"),
            log_name: "yfinance".to_string(),
            max_workers: 5,
            tickers: Vec::new(),
            provider: ProviderConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.log_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_name",
                reason: "must not be empty".into(),
            });
        }
        self.parsed_tickers()?;
        Ok(())
    }

    /// The configured default tickers, validated.
    pub fn parsed_tickers(&self) -> Result<Vec<Ticker>, TickerError> {
        self.tickers.iter().map(|t| Ticker::parse(t)).collect()
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.log_name))
    }

    /// Create the cache root and the log directory if absent.
    pub fn bootstrap(&self) -> Result<(), ConfigError> {
        for dir in [&self.cache_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Bootstrap {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
