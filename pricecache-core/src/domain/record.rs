//! PriceRecord: one trading day of one ticker.

use super::Ticker;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV row for a single ticker.
///
/// Prices the provider did not report are stored as NaN rather than dropping
/// the row; `adj_close` is the column downstream consumers rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub ticker: Ticker,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

impl PriceRecord {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.adj_close.is_nan()
    }

    /// Basic OHLC sanity check: high bounds the range, low bounds it from below.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            ticker: Ticker::parse("SPY").unwrap(),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            adj_close: 100.5,
            volume: 1_000,
        }
    }

    #[test]
    fn sane_record() {
        assert!(sample().is_sane());
        assert!(!sample().is_void());
    }

    #[test]
    fn nan_price_is_void() {
        let mut r = sample();
        r.adj_close = f64::NAN;
        assert!(r.is_void());
        assert!(!r.is_sane());
    }

    #[test]
    fn inverted_range_is_not_sane() {
        let mut r = sample();
        r.high = 98.0;
        assert!(!r.is_sane());
    }
}
