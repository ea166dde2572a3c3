//! Remote fetch adapter trait and structured fetch failure types.
//!
//! The PriceFetcher trait abstracts over market-data sources (Yahoo Finance,
//! test doubles) so the synchronizer never touches HTTP directly.

use crate::domain::{PriceRecord, Ticker};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw daily OHLCV row from a provider, before it is stamped with its ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

impl RawBar {
    /// Attach the ticker column.
    pub fn stamp(self, ticker: &Ticker) -> PriceRecord {
        PriceRecord {
            date: self.date,
            ticker: ticker.clone(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            adj_close: self.adj_close,
            volume: self.volume,
        }
    }
}

/// Date range of one remote request.
///
/// `start` is inclusive and `None` means "full available history";
/// `end` is exclusive and is the as-of date of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn full_history(end: NaiveDate) -> Self {
        Self { start: None, end }
    }

    pub fn since(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end,
        }
    }

    /// Whether `date` falls inside `[start, end)`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && date < self.end
    }
}

/// Why a remote fetch could not complete.
///
/// These are designed to be displayable in both logs and CLI summaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found")]
    SymbolNotFound,

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("{0}")]
    Other(String),
}

/// A remote fetch failure, always attributable to its ticker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed for {ticker}: {cause}")]
pub struct FetchFailure {
    pub ticker: Ticker,
    #[source]
    pub cause: FetchCause,
}

impl FetchFailure {
    pub fn new(ticker: &Ticker, cause: FetchCause) -> Self {
        Self {
            ticker: ticker.clone(),
            cause,
        }
    }
}

/// Trait for remote market-data sources.
///
/// Implementations own their transport concerns (timeouts, retries, rate
/// limits). The store and synchronizer sit above this trait; fetchers know
/// nothing about the cache.
pub trait PriceFetcher: Send + Sync {
    /// Fetch daily bars for `ticker` inside `window`.
    ///
    /// An empty vector is a valid outcome (holiday window, delisted symbol)
    /// and must not be reported as a failure.
    fn fetch(&self, ticker: &Ticker, window: FetchWindow) -> Result<Vec<RawBar>, FetchFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn window_end_is_exclusive() {
        let w = FetchWindow::since(d(1, 2), d(1, 5));
        assert!(w.contains(d(1, 2)));
        assert!(w.contains(d(1, 4)));
        assert!(!w.contains(d(1, 5)));
        assert!(!w.contains(d(1, 1)));
    }

    #[test]
    fn full_history_has_no_lower_bound() {
        let w = FetchWindow::full_history(d(6, 1));
        assert!(w.contains(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()));
        assert!(!w.contains(d(6, 1)));
    }

    #[test]
    fn failure_message_names_ticker() {
        let t = Ticker::parse("ZZZZ").unwrap();
        let f = FetchFailure::new(&t, FetchCause::SymbolNotFound);
        assert_eq!(f.to_string(), "fetch failed for ZZZZ: symbol not found");
    }

    #[test]
    fn stamp_sets_ticker() {
        let t = Ticker::parse("SPY").unwrap();
        let bar = RawBar {
            date: d(1, 2),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
            adj_close: 1.4,
        };
        let rec = bar.stamp(&t);
        assert_eq!(rec.ticker, t);
        assert_eq!(rec.adj_close, 1.4);
    }
}
