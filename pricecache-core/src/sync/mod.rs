//! Synchronizer: brings one ticker's cached record up to date.
//!
//! ```text
//! NEW      ── full fetch ──► FULL_FETCHED | FULL_FETCH_EMPTY | FULL_FETCH_FAILED
//! EXISTING ── latest >= yesterday ──► UP_TO_DATE
//!          └─ incremental fetch ──► MERGED | NO_NEW_DATA | MERGE_FETCH_FAILED
//! ```
//!
//! Fetch failures degrade (empty result on NEW, unmodified local record on
//! EXISTING) and are carried in the outcome. Store failures are returned as
//! `Err`. See [`policy`] for the full table.

pub mod merge;
pub mod policy;

pub use merge::{clip_to_window, merge};
pub use policy::{DataError, FailureKind, FailurePolicy, SyncPath};

use crate::data::{FetchFailure, FetchWindow, PriceFetcher};
use crate::domain::{AsOf, Ticker, TickerSeries};
use crate::store::{SeriesStore, WriteOutcome};
use chrono::NaiveDate;

/// Where a ticker starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// No usable local record.
    New,
    /// A local record with at least one row.
    Existing {
        series: TickerSeries,
        latest: NaiveDate,
    },
}

/// Terminal state of one sync.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    FullFetched { rows: usize },
    FullFetchEmpty,
    FullFetchFailed(FetchFailure),
    UpToDate,
    Merged { added: usize },
    NoNewData,
    MergeFetchFailed(FetchFailure),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::FullFetched { .. } => "FULL_FETCHED",
            SyncOutcome::FullFetchEmpty => "FULL_FETCH_EMPTY",
            SyncOutcome::FullFetchFailed(_) => "FULL_FETCH_FAILED",
            SyncOutcome::UpToDate => "UP_TO_DATE",
            SyncOutcome::Merged { .. } => "MERGED",
            SyncOutcome::NoNewData => "NO_NEW_DATA",
            SyncOutcome::MergeFetchFailed(_) => "MERGE_FETCH_FAILED",
        }
    }

    /// A fetch failed and the result was degraded.
    pub fn fetch_failure(&self) -> Option<&FetchFailure> {
        match self {
            SyncOutcome::FullFetchFailed(f) | SyncOutcome::MergeFetchFailed(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fetch_failure().is_some()
    }

    /// Whether the sync made a remote request.
    pub fn fetched(&self) -> bool {
        !matches!(self, SyncOutcome::UpToDate)
    }
}

/// Result of one successful (possibly degraded) sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub ticker: Ticker,
    pub outcome: SyncOutcome,
    /// The series handed downstream: fresh, unchanged, or empty.
    pub series: TickerSeries,
}

/// Per-ticker state machine over a fetcher and a store.
///
/// Holds no per-ticker state between calls, so one instance can be shared by
/// every worker in a batch.
pub struct Synchronizer<'a> {
    fetcher: &'a dyn PriceFetcher,
    store: &'a dyn SeriesStore,
    as_of: AsOf,
}

impl<'a> Synchronizer<'a> {
    pub fn new(fetcher: &'a dyn PriceFetcher, store: &'a dyn SeriesStore, as_of: AsOf) -> Self {
        Self {
            fetcher,
            store,
            as_of,
        }
    }

    pub fn as_of(&self) -> AsOf {
        self.as_of
    }

    /// NEW or EXISTING. A record that exists but holds no rows counts as NEW.
    pub fn determine_state(&self, ticker: &Ticker) -> Result<SyncState, DataError> {
        if !self.store.exists(ticker) {
            return Ok(SyncState::New);
        }
        let series = self.store.read(ticker)?;
        match series.latest_date() {
            Some(latest) => Ok(SyncState::Existing { series, latest }),
            None => {
                tracing::warn!(ticker = %ticker, "cached record has no rows, refetching full history");
                Ok(SyncState::New)
            }
        }
    }

    /// Run the state machine for one ticker.
    pub fn sync(&self, ticker: &Ticker) -> Result<SyncReport, DataError> {
        let state = self.determine_state(ticker)?;
        let report = match state {
            SyncState::New => self.sync_new(ticker)?,
            SyncState::Existing { series, latest } => self.sync_existing(series, latest)?,
        };
        tracing::info!(
            ticker = %ticker,
            outcome = report.outcome.label(),
            rows = report.series.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn sync_new(&self, ticker: &Ticker) -> Result<SyncReport, DataError> {
        let window = FetchWindow::full_history(self.as_of.today());
        tracing::info!(ticker = %ticker, end = %window.end, "new ticker, fetching full history");

        let bars = match self.fetcher.fetch(ticker, window) {
            Ok(bars) => bars,
            Err(failure) => {
                return self.degrade(SyncPath::New, failure, TickerSeries::empty(ticker.clone()))
            }
        };

        let records = clip_to_window(ticker, bars, window);
        if records.is_empty() {
            tracing::warn!(ticker = %ticker, "full history fetch returned no rows");
            return Ok(SyncReport {
                ticker: ticker.clone(),
                outcome: SyncOutcome::FullFetchEmpty,
                series: TickerSeries::empty(ticker.clone()),
            });
        }

        let series = TickerSeries::from_records(ticker.clone(), records);
        warn_insane(&series);
        self.store.write(&series)?;

        Ok(SyncReport {
            ticker: ticker.clone(),
            outcome: SyncOutcome::FullFetched { rows: series.len() },
            series,
        })
    }

    fn sync_existing(&self, local: TickerSeries, latest: NaiveDate) -> Result<SyncReport, DataError> {
        let ticker = local.ticker().clone();

        if latest >= self.as_of.yesterday() {
            tracing::info!(ticker = %ticker, latest = %latest, "up to date, skipping fetch");
            return Ok(SyncReport {
                ticker,
                outcome: SyncOutcome::UpToDate,
                series: local,
            });
        }

        let start = latest.succ_opt().unwrap_or(latest);
        let window = FetchWindow::since(start, self.as_of.today());
        tracing::info!(
            ticker = %ticker,
            start = %start,
            end = %window.end,
            "fetching incremental window"
        );

        let bars = match self.fetcher.fetch(&ticker, window) {
            Ok(bars) => bars,
            Err(failure) => return self.degrade(SyncPath::Existing, failure, local),
        };

        // The window starts after `latest`, so everything kept is strictly newer.
        let fresh = clip_to_window(&ticker, bars, window);
        if fresh.is_empty() {
            tracing::info!(ticker = %ticker, "no new rows since {latest}");
            return Ok(SyncReport {
                ticker,
                outcome: SyncOutcome::NoNewData,
                series: local,
            });
        }

        let merged = merge(&local, fresh);
        warn_insane(&merged);
        let added = merged.len().saturating_sub(local.len());
        if self.store.write(&merged)? == WriteOutcome::Unchanged {
            tracing::debug!(ticker = %ticker, "merged record identical to cache");
        }

        Ok(SyncReport {
            ticker,
            outcome: SyncOutcome::Merged { added },
            series: merged,
        })
    }

    fn degrade(
        &self,
        path: SyncPath,
        failure: FetchFailure,
        fallback: TickerSeries,
    ) -> Result<SyncReport, DataError> {
        let ticker = failure.ticker.clone();
        match FailurePolicy::decide(FailureKind::Fetch, path) {
            FailurePolicy::ReturnEmpty => {
                tracing::warn!(ticker = %ticker, error = %failure.cause, "full fetch failed, returning empty result");
                Ok(SyncReport {
                    ticker: ticker.clone(),
                    outcome: SyncOutcome::FullFetchFailed(failure),
                    series: TickerSeries::empty(ticker),
                })
            }
            FailurePolicy::ReturnLocal => {
                tracing::warn!(ticker = %ticker, error = %failure.cause, "incremental fetch failed, keeping local record");
                Ok(SyncReport {
                    ticker,
                    outcome: SyncOutcome::MergeFetchFailed(failure),
                    series: fallback,
                })
            }
            FailurePolicy::Fail => Err(failure.into()),
        }
    }
}

fn warn_insane(series: &TickerSeries) {
    let bad = series.records().iter().filter(|r| !r.is_sane()).count();
    if bad > 0 {
        tracing::warn!(ticker = %series.ticker(), rows = bad, "rows failing OHLC sanity check");
    }
}
