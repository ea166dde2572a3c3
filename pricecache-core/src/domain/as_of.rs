//! The reference date a sync run is measured against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// "Today" for one batch invocation, fixed once and threaded through every
/// per-ticker sync so a run that straddles midnight compares all tickers
/// against the same boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsOf {
    today: NaiveDate,
}

impl AsOf {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Local calendar date at the moment of the call.
    pub fn now() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }

    /// Exclusive upper bound for remote fetches.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Most recent completed calendar day.
    pub fn yesterday(&self) -> NaiveDate {
        self.today.pred_opt().unwrap_or(self.today)
    }
}
