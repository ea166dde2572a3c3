//! pricecache runner: batch orchestration on top of `pricecache-core`.
//!
//! - Bounded rayon worker pool, one synchronizer run per ticker
//! - Per-ticker failure isolation (errors and panics)
//! - Progress reporting
//! - Combined `Date, Ticker, Adj Close` table with CSV/Parquet export

pub mod batch;
pub mod combined;
pub mod progress;

pub use batch::{
    fetch_all, BatchError, BatchOptions, BatchOrchestrator, BatchResult, BatchSummary,
    FailureReason, TickerFailure, TickerResult,
};
pub use combined::{CombinedTable, ExportError, Projection};
pub use progress::{StdoutProgress, SyncProgress, TracingProgress};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn batch_types_are_send_sync() {
        assert_send::<BatchResult>();
        assert_sync::<BatchResult>();
        assert_send::<TickerFailure>();
        assert_sync::<TickerFailure>();
        assert_sync::<BatchOrchestrator<'static>>();
    }

    #[test]
    fn progress_reporters_are_send_sync() {
        assert_send::<TracingProgress>();
        assert_sync::<TracingProgress>();
        assert_send::<StdoutProgress>();
        assert_sync::<StdoutProgress>();
    }
}
