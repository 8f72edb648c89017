//! Retry/backoff policy glue for the 2PC paths (§4.7): what a failed KV RPC means for
//! the caller, distinct from the backoff *timing* in [`crate::backoff`].

use crate::kv::KvError;

/// What the caller should do after a KV RPC fails with `err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Region split / commit-ts-expired: re-resolve routing or refresh a timestamp
    /// and call the same RPC again, bounded by a [`crate::backoff::Deadline`].
    RetryLocally,
    /// The *statement*, not just the RPC, must be re-planned with a fresh start_ts.
    /// Only reachable for optimistic write-conflicts when `auto_commit` is set
    /// (§4.7: "retry statement if `auto_commit && txn_retry_cnt > 0`").
    RetryStatement,
    /// Not retriable at this layer: roll back and surface per §7.
    Fail,
}

/// Classifies a prewrite failure per the §4.7 table. `pessimistic` transactions never
/// retry a write conflict — their locks are already held, so a conflict there is a
/// genuine collision, not a stale read.
pub fn classify_prewrite_error(
    err: &KvError,
    pessimistic: bool,
    auto_commit: bool,
    retries_remaining: u32,
) -> RetryAction {
    match err {
        KvError::RegionSplit { .. } | KvError::CommitTsExpired { .. } => RetryAction::RetryLocally,
        KvError::WriteConflict { .. } if !pessimistic && auto_commit && retries_remaining > 0 => {
            RetryAction::RetryStatement
        }
        _ => RetryAction::Fail,
    }
}

/// Classifies a commit-primary failure. Only `RegionSplit`/`CommitTsExpired` are
/// locally retriable at this phase; everything else — including `WriteConflict`,
/// which cannot occur here since the lock is already held by this `start_ts` — rolls
/// back.
pub fn classify_commit_error(err: &KvError) -> RetryAction {
    match err {
        KvError::RegionSplit { .. } | KvError::CommitTsExpired { .. } => RetryAction::RetryLocally,
        _ => RetryAction::Fail,
    }
}

/// Classifies a pessimistic-lock failure. `LockTimeout` is surfaced verbatim
/// (§4.7: "surface as `Lock wait timeout exceeded`"), never retried here — the table
/// lock waiter has its own wait-and-timeout loop; this is the row-lock RPC.
pub fn classify_pessimistic_lock_error(err: &KvError) -> RetryAction {
    match err {
        KvError::RegionSplit { .. } => RetryAction::RetryLocally,
        _ => RetryAction::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_conflict() -> KvError {
        KvError::WriteConflict { key: b"k".to_vec(), conflict_start_ts: 1, conflict_commit_ts: 2 }
    }

    #[test]
    fn pessimistic_write_conflict_never_retries() {
        assert_eq!(classify_prewrite_error(&write_conflict(), true, true, 5), RetryAction::Fail);
    }

    #[test]
    fn optimistic_write_conflict_retries_only_with_auto_commit_and_budget() {
        assert_eq!(
            classify_prewrite_error(&write_conflict(), false, true, 1),
            RetryAction::RetryStatement
        );
        assert_eq!(classify_prewrite_error(&write_conflict(), false, false, 1), RetryAction::Fail);
        assert_eq!(classify_prewrite_error(&write_conflict(), false, true, 0), RetryAction::Fail);
    }

    #[test]
    fn region_split_and_commit_ts_expired_always_retry_locally() {
        let region_split = KvError::RegionSplit { key: b"k".to_vec(), stale_partition_id: 1 };
        let expired = KvError::CommitTsExpired { commit_ts: 10 };
        assert_eq!(classify_prewrite_error(&region_split, true, false, 0), RetryAction::RetryLocally);
        assert_eq!(classify_prewrite_error(&expired, false, false, 0), RetryAction::RetryLocally);
        assert_eq!(classify_commit_error(&region_split), RetryAction::RetryLocally);
        assert_eq!(classify_commit_error(&expired), RetryAction::RetryLocally);
    }

    #[test]
    fn lock_timeout_is_not_locally_retried() {
        assert_eq!(classify_pessimistic_lock_error(&KvError::LockTimeout), RetryAction::Fail);
    }
}
