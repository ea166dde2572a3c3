//! TickerSeries: the full cached history of one ticker.
//!
//! Invariant: records are sorted by date ascending with no duplicate dates.
//! Every constructor enforces it, so consumers never re-check.

use super::{PriceRecord, Ticker};
use chrono::NaiveDate;

/// Date-ordered, date-unique price history for a single ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSeries {
    ticker: Ticker,
    records: Vec<PriceRecord>,
}

impl TickerSeries {
    /// A series with no rows (new or delisted symbol with nothing fetched).
    pub fn empty(ticker: Ticker) -> Self {
        Self {
            ticker,
            records: Vec::new(),
        }
    }

    /// Build a series from rows in any order.
    ///
    /// Rows are stamped with `ticker`, stably sorted by date, and rows sharing
    /// a date collapse to the one that came last in `records`.
    pub fn from_records(ticker: Ticker, mut records: Vec<PriceRecord>) -> Self {
        for r in &mut records {
            if r.ticker != ticker {
                r.ticker = ticker.clone();
            }
        }
        records.sort_by_key(|r| r.date);

        let mut unique: Vec<PriceRecord> = Vec::with_capacity(records.len());
        for record in records {
            match unique.last_mut() {
                Some(prev) if prev.date == record.date => *prev = record,
                _ => unique.push(record),
            }
        }

        Self {
            ticker,
            records: unique,
        }
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First cached date, if any.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    /// `max(Date)`; the records are sorted so this is the last row.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.records.iter().map(|r| r.date)
    }
}
