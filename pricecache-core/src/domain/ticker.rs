//! Ticker symbol newtype.
//!
//! A ticker doubles as the file stem of its persisted series, so parsing
//! restricts it to characters that are safe in a file name on every platform.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickerError {
    #[error("ticker symbol is empty")]
    Empty,

    #[error("ticker symbol '{symbol}' contains invalid character '{ch}'")]
    InvalidChar { symbol: String, ch: char },

    #[error("ticker symbol '{0}' is longer than 32 characters")]
    TooLong(String),
}

/// A validated, upper-cased ticker symbol (e.g. `AAPL`, `BRK-B`, `^GSPC`, `0700.HK`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    const MAX_LEN: usize = 32;

    /// Parse and normalize a raw symbol: trims whitespace and upper-cases.
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let symbol = raw.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(TickerError::Empty);
        }
        if symbol.len() > Self::MAX_LEN {
            return Err(TickerError::TooLong(symbol));
        }
        if let Some(ch) = symbol
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=')))
        {
            return Err(TickerError::InvalidChar { symbol, ch });
        }
        // "." and ".." would escape the cache directory
        if symbol.chars().all(|c| c == '.') {
            return Err(TickerError::InvalidChar { symbol, ch: '.' });
        }
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let t = Ticker::parse("  aapl ").unwrap();
        assert_eq!(t.as_str(), "AAPL");
    }

    #[test]
    fn parse_accepts_index_and_exchange_suffixes() {
        for raw in ["^GSPC", "BRK-B", "0700.HK", "EURUSD=X"] {
            assert!(Ticker::parse(raw).is_ok(), "{raw} should parse");
        }
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(Ticker::parse("   "), Err(TickerError::Empty));
    }

    #[test]
    fn parse_rejects_path_separators() {
        assert!(matches!(
            Ticker::parse("../etc"),
            Err(TickerError::InvalidChar { ch: '/', .. })
        ));
        assert!(Ticker::parse("..").is_err());
        assert!(Ticker::parse("A\\B").is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut tickers = vec![
            Ticker::parse("MSFT").unwrap(),
            Ticker::parse("AAPL").unwrap(),
            Ticker::parse("GOOG").unwrap(),
        ];
        tickers.sort();
        let names: Vec<&str> = tickers.iter().map(Ticker::as_str).collect();
        assert_eq!(names, vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn serde_roundtrip_validates() {
        let t: Ticker = serde_json::from_str("\"spy\"").unwrap();
        assert_eq!(t.as_str(), "SPY");
        assert!(serde_json::from_str::<Ticker>("\"a/b\"").is_err());
    }
}
