//! Pessimistic-only machinery (§4.3): row-lock acquisition ahead of prewrite, the
//! primary-lock heartbeat, and residual-lock rollback. Prewrite and commit themselves
//! are shared with the optimistic path (see [`super::optimistic`]) once locks are held.

use std::collections::HashSet;

use slog::warn;

use super::{heartbeat, KeyTriple, Transaction, TransactionCore, DEFAULT_LOCK_TTL_MS};
use crate::backoff::{Backoff, Deadline};
use crate::error::{Error, Result};
use crate::kv::{KvError, Mutation, PessimisticLockRequest, PessimisticRollbackRequest};
use crate::retry::{classify_pessimistic_lock_error, RetryAction};

async fn do_pessimistic_lock(
    txn: &Transaction,
    core: &mut TransactionCore,
    key_triple: KeyTriple,
    for_update_ts: u64,
) -> Result<()> {
    if txn.handle.cancel_requested() {
        return Err(Error::Cancelled);
    }

    // The store's pessimistic-lock RPC always needs *a* primary key, even before this
    // transaction has designated its 2PC primary (a lock-only `SELECT FOR UPDATE`
    // ahead of any write never sets `core.primary_key`): fall back to the locked key
    // itself in that case.
    let primary_bytes = core.primary_key.as_ref().map(|p| p.2.clone()).unwrap_or_else(|| key_triple.2.clone());
    let deadline = Deadline::after(txn.options.lock_wait_timeout);
    let mut backoff = Backoff::region_split();
    let mut current_partition = key_triple.1;

    loop {
        let req = PessimisticLockRequest {
            start_ts: core.start_ts,
            for_update_ts,
            primary_key: primary_bytes.clone(),
            keys: vec![(key_triple.0, current_partition, key_triple.2.clone())],
            lock_ttl: DEFAULT_LOCK_TTL_MS,
        };

        let err = match txn.kv.txn_pessimistic_lock(req).await {
            Ok(()) => break,
            Err(err) => err,
        };

        match (classify_pessimistic_lock_error(&err), err) {
            (RetryAction::RetryLocally, KvError::RegionSplit { stale_partition_id, .. }) => {
                if deadline.is_expired() {
                    return Err(Error::RegionSplitTimeout(txn.options.lock_wait_timeout));
                }
                current_partition = txn
                    .partition_resolver
                    .resolve(key_triple.0, &key_triple.2, stale_partition_id)
                    .await
                    .map_err(|e| Error::StoreUnavailable {
                        attempts: backoff.attempts() + 1,
                        source: KvError::Other(e.to_string()),
                    })?;
                txn.buffer.reassign_partition(key_triple.0, &key_triple.2, current_partition);
                if let Some(delay) = backoff.next_delay() {
                    tokio::time::sleep(delay).await;
                }
            }
            // §4.7: the lock-wait timeout surfaces directly, never retried here — a
            // table-lock's own wait loop is a different layer (§4.5).
            (_, KvError::LockTimeout) => return Err(Error::LockTimeout),
            (_, KvError::WriteConflict { key, conflict_start_ts, conflict_commit_ts }) => {
                return Err(Error::WriteConflict {
                    key,
                    start_ts: core.start_ts,
                    conflict_start_ts,
                    conflict_commit_ts,
                });
            }
            (_, other) => {
                return Err(Error::StoreUnavailable { attempts: backoff.attempts() + 1, source: other });
            }
        }
    }

    core.acquired_locks.insert((key_triple.0, current_partition, key_triple.2));
    Ok(())
}

/// A buffered write's lock acquisition (§4.3 "first write designates the primary").
/// The first call here ever made by a transaction sets `primary_key` and starts the
/// heartbeat; every later call is a plain row lock.
pub(crate) async fn acquire_row_lock(
    txn: &Transaction,
    core: &mut TransactionCore,
    mutation: &Mutation,
) -> Result<()> {
    let key_triple = (mutation.table_id, mutation.partition_id, mutation.key.clone());
    let for_update_ts = mutation.for_update_ts.unwrap_or(core.for_update_ts);
    let is_first_write = core.primary_key.is_none();

    do_pessimistic_lock(txn, core, key_triple.clone(), for_update_ts).await?;

    if is_first_write {
        core.primary_key = Some(key_triple.clone());
        core.heartbeat = heartbeat::spawn(
            txn.kv.clone(),
            core.start_ts,
            key_triple,
            txn.options.heartbeat_option,
            DEFAULT_LOCK_TTL_MS,
            txn.logger.clone(),
        );
    }
    Ok(())
}

/// A `SELECT ... FOR UPDATE` row with no associated write: locked but never buffered
/// as a mutation, so it becomes a residual lock unless a later write covers the same
/// key (§4.3 "residual lock"). Never designates the primary or starts the heartbeat —
/// only an actual write does that.
pub(crate) async fn acquire_lock_only(
    txn: &Transaction,
    core: &mut TransactionCore,
    mutation: &Mutation,
) -> Result<()> {
    let key_triple = (mutation.table_id, mutation.partition_id, mutation.key.clone());
    let for_update_ts = mutation.for_update_ts.unwrap_or(core.for_update_ts);
    do_pessimistic_lock(txn, core, key_triple, for_update_ts).await
}

/// Rolls back every acquired lock not covered by a buffered mutation, just ahead of
/// commit (§4.3 "residual-lock rollback"). Best effort: logged, never raised.
pub(crate) async fn rollback_residual_locks(txn: &Transaction, core: &mut TransactionCore) {
    let covered: HashSet<KeyTriple> = txn.buffer.all_keys().into_iter().collect();
    let residual: Vec<KeyTriple> = core.acquired_locks.iter().filter(|k| !covered.contains(*k)).cloned().collect();
    if residual.is_empty() {
        return;
    }
    fail::fail_point!("before-cleanup-locks");

    let req = PessimisticRollbackRequest {
        start_ts: core.start_ts,
        for_update_ts: core.for_update_ts,
        keys: residual.clone(),
    };
    if let Err(err) = txn.kv.txn_pessimistic_rollback(req).await {
        warn!(txn.logger, "residual pessimistic-lock rollback failed";
              "start_ts" => core.start_ts, "error" => %err);
    }
    for key in &residual {
        core.acquired_locks.remove(key);
    }
}

/// Rolls back every lock this transaction ever acquired (§4.3 "Rollback"). Used by the
/// full-transaction rollback path, not just pre-commit residual cleanup.
pub(crate) async fn rollback_all_locks(txn: &Transaction, core: &mut TransactionCore) {
    if core.acquired_locks.is_empty() {
        return;
    }
    fail::fail_point!("before-cleanup-locks");
    let keys: Vec<KeyTriple> = core.acquired_locks.drain().collect();
    let req = PessimisticRollbackRequest { start_ts: core.start_ts, for_update_ts: core.for_update_ts, keys };
    if let Err(err) = txn.kv.txn_pessimistic_rollback(req).await {
        warn!(txn.logger, "pessimistic-lock rollback failed";
              "start_ts" => core.start_ts, "error" => %err);
    }
}
