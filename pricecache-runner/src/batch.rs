//! Batch orchestrator: runs the synchronizer over a ticker set on a bounded
//! worker pool and assembles the combined table.
//!
//! Tickers are deduplicated and sorted before dispatch, so each ticker has at
//! most one in-flight sync and results come back in symbol order no matter
//! which worker finishes first. A failure (or panic) in one worker only
//! affects that ticker's entry.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use thiserror::Error;

use pricecache_core::data::{FetchFailure, PriceFetcher};
use pricecache_core::store::{SeriesStore, StoreError};
use pricecache_core::sync::{DataError, SyncOutcome, SyncReport, Synchronizer};
use pricecache_core::{AsOf, Ticker};

use crate::combined::{CombinedTable, Projection};
use crate::progress::{SyncProgress, TracingProgress};

/// Why a ticker appears in the failure list.
#[derive(Debug, Clone, Error)]
pub enum FailureReason {
    /// Fetch failed; the ticker still contributed its empty or last-known-good series.
    #[error(transparent)]
    Fetch(FetchFailure),

    /// Store failed; the ticker contributed nothing.
    #[error(transparent)]
    Store(StoreError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<DataError> for FailureReason {
    fn from(e: DataError) -> Self {
        match e {
            DataError::Fetch(f) => FailureReason::Fetch(f),
            DataError::Store(s) => FailureReason::Store(s),
        }
    }
}

/// A ticker that did not sync cleanly.
#[derive(Debug, Clone)]
pub struct TickerFailure {
    pub ticker: Ticker,
    pub reason: FailureReason,
}

impl TickerFailure {
    /// Degraded failures still contributed rows (possibly zero) to the table.
    pub fn is_degraded(&self) -> bool {
        matches!(self.reason, FailureReason::Fetch(_))
    }
}

/// Per-ticker terminal result as seen by progress reporters.
pub type TickerResult = Result<SyncReport, TickerFailure>;

/// Counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Fetched without error (full, merged, empty, or no new data).
    pub fetched: usize,
    pub up_to_date: usize,
    /// Fetch failed; a fallback series was used.
    pub degraded: usize,
    /// Explicit failures; no series.
    pub failed: usize,
    /// Rows in the combined table.
    pub rows: usize,
}

/// Everything a batch produced.
#[derive(Debug)]
pub struct BatchResult {
    pub as_of: AsOf,
    pub table: CombinedTable,
    /// Successful (possibly degraded) syncs, in symbol order.
    pub reports: Vec<SyncReport>,
    /// Degraded and failed tickers with their reasons, in symbol order.
    pub failures: Vec<TickerFailure>,
    pub summary: BatchSummary,
}

impl BatchResult {
    /// No ticker produced any data and every ticker is in the failure list.
    pub fn all_failed(&self) -> bool {
        self.summary.total > 0 && self.failures.len() == self.summary.total && self.table.is_empty()
    }
}

/// Errors that stop a batch before or after the per-ticker work.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to build combined table: {0}")]
    Table(#[from] polars::prelude::PolarsError),
}

/// Batch settings.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub projection: Projection,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: 5,
            projection: Projection::Minimal,
        }
    }
}

/// Dispatches the synchronizer across tickers.
pub struct BatchOrchestrator<'a> {
    fetcher: &'a dyn PriceFetcher,
    store: &'a dyn SeriesStore,
    options: BatchOptions,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(fetcher: &'a dyn PriceFetcher, store: &'a dyn SeriesStore, options: BatchOptions) -> Self {
        Self {
            fetcher,
            store,
            options,
        }
    }

    /// Sync every ticker against `as_of` and combine the results.
    pub fn fetch_all(
        &self,
        tickers: &[Ticker],
        as_of: AsOf,
        progress: &dyn SyncProgress,
    ) -> Result<BatchResult, BatchError> {
        let sorted: Vec<Ticker> = tickers.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let total = sorted.len();
        tracing::info!(
            tickers = total,
            workers = self.options.max_workers,
            as_of = %as_of.today(),
            "starting batch sync"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_workers.max(1))
            .thread_name(|i| format!("pricecache-sync-{i}"))
            .build()?;

        let sync = Synchronizer::new(self.fetcher, self.store, as_of);
        let results: Vec<TickerResult> = pool.install(|| {
            sorted
                .par_iter()
                .enumerate()
                .map(|(i, ticker)| {
                    progress.on_start(ticker, i, total);
                    let result = run_one(&sync, ticker);
                    progress.on_complete(ticker, &result);
                    result
                })
                .collect()
        });

        let mut reports = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };

        for result in results {
            match result {
                Ok(report) => {
                    match &report.outcome {
                        SyncOutcome::UpToDate => summary.up_to_date += 1,
                        outcome => match outcome.fetch_failure() {
                            Some(f) => {
                                summary.degraded += 1;
                                failures.push(TickerFailure {
                                    ticker: report.ticker.clone(),
                                    reason: FailureReason::Fetch(f.clone()),
                                });
                            }
                            None => summary.fetched += 1,
                        },
                    }
                    reports.push(report);
                }
                Err(failure) => {
                    summary.failed += 1;
                    failures.push(failure);
                }
            }
        }

        let table = CombinedTable::from_series(reports.iter().map(|r| &r.series), self.options.projection)?;
        summary.rows = table.height();
        progress.on_batch_complete(&summary);

        Ok(BatchResult {
            as_of,
            table,
            reports,
            failures,
            summary,
        })
    }
}

/// Sync with default options and `tracing` progress.
pub fn fetch_all(
    fetcher: &dyn PriceFetcher,
    store: &dyn SeriesStore,
    tickers: &[Ticker],
    as_of: AsOf,
) -> Result<BatchResult, BatchError> {
    BatchOrchestrator::new(fetcher, store, BatchOptions::default()).fetch_all(tickers, as_of, &TracingProgress)
}

fn run_one(sync: &Synchronizer<'_>, ticker: &Ticker) -> TickerResult {
    match catch_unwind(AssertUnwindSafe(|| sync.sync(ticker))) {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(TickerFailure {
            ticker: ticker.clone(),
            reason: e.into(),
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(ticker = %ticker, panic = %message, "sync worker panicked");
            Err(TickerFailure {
                ticker: ticker.clone(),
                reason: FailureReason::Panicked(message),
            })
        }
    }
}
