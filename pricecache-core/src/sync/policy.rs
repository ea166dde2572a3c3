//! Failure taxonomy and the per-path degrade/fail policy.
//!
//! | failure       | NEW path        | EXISTING path      |
//! |---------------|-----------------|--------------------|
//! | fetch         | empty, degraded | local, degraded    |
//! | corrupt       | fail            | fail               |
//! | write         | fail            | fail               |
//! | not found     | fail            | fail               |
//!
//! A corrupt record cannot occur on the NEW path (nothing is read) and the
//! synchronizer checks existence before reading, so the last two rows only
//! fire on races with other processes touching the cache.

use crate::data::FetchFailure;
use crate::domain::Ticker;
use crate::store::StoreError;
use thiserror::Error;

/// Any failure a single-ticker sync can hit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which branch of the state machine a failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPath {
    New,
    Existing,
}

/// Failure category, independent of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    NotFound,
    Corrupt,
    Write,
}

/// What the synchronizer does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log, report degraded, return an empty series.
    ReturnEmpty,
    /// Log, report degraded, return the last-known-good local series.
    ReturnLocal,
    /// Surface an explicit per-ticker failure.
    Fail,
}

impl FailurePolicy {
    pub fn decide(kind: FailureKind, path: SyncPath) -> Self {
        match (kind, path) {
            (FailureKind::Fetch, SyncPath::New) => FailurePolicy::ReturnEmpty,
            (FailureKind::Fetch, SyncPath::Existing) => FailurePolicy::ReturnLocal,
            (FailureKind::NotFound | FailureKind::Corrupt | FailureKind::Write, _) => {
                FailurePolicy::Fail
            }
        }
    }

    pub fn is_degraded(self) -> bool {
        !matches!(self, FailurePolicy::Fail)
    }
}

impl DataError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DataError::Fetch(_) => FailureKind::Fetch,
            DataError::Store(StoreError::NotFound { .. }) => FailureKind::NotFound,
            DataError::Store(StoreError::CorruptRecord { .. }) => FailureKind::Corrupt,
            DataError::Store(StoreError::WriteFailure { .. }) => FailureKind::Write,
        }
    }

    pub fn policy(&self, path: SyncPath) -> FailurePolicy {
        FailurePolicy::decide(self.kind(), path)
    }

    pub fn ticker(&self) -> &Ticker {
        match self {
            DataError::Fetch(f) => &f.ticker,
            DataError::Store(s) => s.ticker(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FetchCause;

    fn spy() -> Ticker {
        Ticker::parse("SPY").unwrap()
    }

    #[test]
    fn fetch_failures_degrade() {
        let err = DataError::from(FetchFailure::new(&spy(), FetchCause::SymbolNotFound));
        assert_eq!(err.policy(SyncPath::New), FailurePolicy::ReturnEmpty);
        assert_eq!(err.policy(SyncPath::Existing), FailurePolicy::ReturnLocal);
        assert!(err.policy(SyncPath::Existing).is_degraded());
    }

    #[test]
    fn store_failures_are_explicit() {
        let corrupt = DataError::from(StoreError::CorruptRecord {
            ticker: spy(),
            reason: "bad header".into(),
        });
        let write = DataError::from(StoreError::WriteFailure {
            ticker: spy(),
            reason: "disk full".into(),
        });
        assert_eq!(corrupt.policy(SyncPath::Existing), FailurePolicy::Fail);
        assert_eq!(write.policy(SyncPath::New), FailurePolicy::Fail);
        assert_eq!(write.policy(SyncPath::Existing), FailurePolicy::Fail);
        assert_eq!(write.ticker(), &spy());
    }

    #[test]
    fn transparent_display() {
        let err = DataError::from(StoreError::NotFound { ticker: spy() });
        assert_eq!(err.to_string(), "no cached record for SPY");
    }
}
