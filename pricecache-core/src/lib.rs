//! pricecache core: an append-only local cache of daily price series.
//!
//! - Domain types (tickers, price rows, per-ticker series, the as-of date)
//! - Remote fetch adapter trait, Yahoo Finance fetcher, circuit breaker
//! - CSV local store with atomic full-replace writes
//! - Synchronizer state machine and the failure policy table
//! - TOML configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod store;
pub mod sync;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{CacheConfig, ConfigError, ProviderConfig};
pub use domain::{AsOf, PriceRecord, Ticker, TickerError, TickerSeries};
pub use sync::{DataError, SyncOutcome, SyncReport, Synchronizer};
