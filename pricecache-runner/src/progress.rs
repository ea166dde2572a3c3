//! Batch progress reporting.

use crate::batch::{BatchSummary, TickerResult};
use pricecache_core::Ticker;

/// Progress callback for a batch sync. Called from worker threads.
pub trait SyncProgress: Send + Sync {
    /// Called when a worker picks up `ticker`. `index` is its position in
    /// the sorted dispatch order.
    fn on_start(&self, ticker: &Ticker, index: usize, total: usize);

    /// Called when `ticker` reaches a terminal state.
    fn on_complete(&self, ticker: &Ticker, result: &TickerResult);

    /// Called once after every ticker has completed.
    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// Reports through `tracing`; the default for library callers.
pub struct TracingProgress;

impl SyncProgress for TracingProgress {
    fn on_start(&self, ticker: &Ticker, index: usize, total: usize) {
        tracing::debug!(ticker = %ticker, index = index + 1, total, "sync dispatched");
    }

    fn on_complete(&self, ticker: &Ticker, result: &TickerResult) {
        match result {
            Ok(report) if report.outcome.is_degraded() => {
                tracing::warn!(ticker = %ticker, outcome = report.outcome.label(), "degraded")
            }
            Ok(report) => tracing::debug!(ticker = %ticker, outcome = report.outcome.label(), "done"),
            Err(failure) => tracing::error!(ticker = %ticker, error = %failure.reason, "failed"),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        tracing::info!(
            total = summary.total,
            fetched = summary.fetched,
            up_to_date = summary.up_to_date,
            degraded = summary.degraded,
            failed = summary.failed,
            rows = summary.rows,
            "batch complete"
        );
    }
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_start(&self, ticker: &Ticker, index: usize, total: usize) {
        println!("[{}/{}] Syncing {ticker}...", index + 1, total);
    }

    fn on_complete(&self, ticker: &Ticker, result: &TickerResult) {
        match result {
            Ok(report) => match report.outcome.fetch_failure() {
                Some(f) => println!("  DEGRADED: {ticker}: {}", f.cause),
                None => println!(
                    "  OK: {ticker} {} ({} rows)",
                    report.outcome.label(),
                    report.series.len()
                ),
            },
            Err(failure) => println!("  FAIL: {ticker}: {}", failure.reason),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        println!(
            "\nSync complete: {}/{} ok ({} fetched, {} up to date), {} degraded, {} failed, {} rows",
            summary.total - summary.failed - summary.degraded,
            summary.total,
            summary.fetched,
            summary.up_to_date,
            summary.degraded,
            summary.failed,
            summary.rows
        );
    }
}
