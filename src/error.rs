use std::time::Duration;

use crate::kv::KvError;

/// Result type used throughout the coordinator.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can be surfaced to a caller driving a [`crate::transaction::Transaction`].
///
/// Errors that the coordinator can recover from internally (region split, an expired
/// commit-ts) never reach here; see [`crate::retry`] for the local-recovery paths.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("write conflict on key {key:?}: start_ts={start_ts}, conflicting start_ts={conflict_start_ts}, conflicting commit_ts={conflict_commit_ts}")]
    WriteConflict {
        key: Vec<u8>,
        start_ts: u64,
        conflict_start_ts: u64,
        conflict_commit_ts: u64,
    },

    #[error("duplicate entry for key {0:?}")]
    DuplicateEntry(Vec<u8>),

    #[error("Lock wait timeout exceeded")]
    LockTimeout,

    #[error("transaction cancelled")]
    Cancelled,

    #[error("invalid transaction state: {0}")]
    TransactionState(&'static str),

    #[error("store unavailable after {attempts} attempt(s): {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: KvError,
    },

    #[error("timestamp source unavailable: {0}")]
    TimestampSource(#[source] anyhow::Error),

    #[error("region split retry exceeded deadline of {0:?}")]
    RegionSplitTimeout(Duration),

    #[error("commit-ts refresh retry exceeded deadline of {0:?}")]
    CommitTsExpiredTimeout(Duration),
}

impl Error {
    /// True when the transaction must be driven to `ROLLBACK` before this error is
    /// returned to the caller. `LockTimeout` is the one surfaced error that leaves the
    /// transaction usable: the statement fails but the txn's other state is preserved.
    /// `TransactionState` is a programmer error: the txn didn't change state at all.
    pub fn requires_rollback(&self) -> bool {
        !matches!(self, Error::LockTimeout | Error::TransactionState(_))
    }
}
