//! Local Store: one persisted table per ticker.
//!
//! The store owns the on-disk representation. The synchronizer only ever sees
//! whole `TickerSeries` values, and every write replaces the full record.

pub mod csv_store;

pub use csv_store::{CsvStore, StoreStatus};

use crate::domain::{Ticker, TickerSeries};
use chrono::NaiveDate;
use thiserror::Error;

/// Local store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no cached record for {ticker}")]
    NotFound { ticker: Ticker },

    #[error("cached record for {ticker} is corrupt: {reason}")]
    CorruptRecord { ticker: Ticker, reason: String },

    #[error("failed to write record for {ticker}: {reason}")]
    WriteFailure { ticker: Ticker, reason: String },
}

impl StoreError {
    pub fn ticker(&self) -> &Ticker {
        match self {
            StoreError::NotFound { ticker }
            | StoreError::CorruptRecord { ticker, .. }
            | StoreError::WriteFailure { ticker, .. } => ticker,
        }
    }
}

/// Whether a write actually touched the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The persisted bytes were already identical; nothing was replaced.
    Unchanged,
}

/// Per-ticker persistence.
pub trait SeriesStore: Send + Sync {
    fn exists(&self, ticker: &Ticker) -> bool;

    /// Read the full record, sorted by date with duplicates collapsed.
    fn read(&self, ticker: &Ticker) -> Result<TickerSeries, StoreError>;

    /// `max(Date)` of the persisted record, `None` for an empty record.
    fn latest_date(&self, ticker: &Ticker) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.read(ticker)?.latest_date())
    }

    /// Atomically replace the persisted record with `series`.
    fn write(&self, series: &TickerSeries) -> Result<WriteOutcome, StoreError>;
}
