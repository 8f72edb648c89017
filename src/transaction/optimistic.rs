//! The 2PC mechanics shared by both transaction kinds (§4.2): prewrite every buffered
//! mutation, commit the primary, then fire off secondary commit. Called "optimistic"
//! because an optimistic transaction uses exactly this and nothing else; a pessimistic
//! transaction reuses it verbatim once its row locks are already in place.

use slog::warn;

use super::{Transaction, TransactionCore, DEFAULT_LOCK_TTL_MS};
use crate::backoff::{Backoff, Deadline};
use crate::error::{Error, Result};
use crate::kv::{CommitRequest, KvError, Mutation, Op, PartitionId, PrewriteRequest};
use crate::retry::{classify_commit_error, classify_prewrite_error, RetryAction};

/// Prewrites the primary key first, then every remaining partition (§4.2(ii)-(iv)).
/// Returns whether `commit()` should still go on to commit the primary: a
/// `CheckNotExists` primary that succeeds means the row already didn't exist at
/// `start_ts` — the rest of the statement's writes never needed a store round trip in
/// the first place, so secondaries are skipped entirely and there is nothing left to
/// commit (§4.2(iii)).
pub(crate) async fn prewrite(txn: &Transaction, core: &mut TransactionCore) -> Result<bool> {
    let primary = txn.buffer.primary().expect("commit() only calls prewrite when the buffer is non-empty");

    prewrite_partition(txn, core, primary.partition_id, std::slice::from_ref(&primary)).await?;
    fail::fail_point!("after-prewrite");

    // Optimistic transactions never go through `pessimistic::acquire_row_lock`, so
    // this is the only place `core.primary_key` gets set for them; for a pessimistic
    // transaction it was already set at first-write time, but re-reading the buffer
    // here picks up any partition reassignment a region split during prewrite applied.
    let primary = txn.buffer.primary().expect("primary exists");
    core.primary_key = Some((primary.table_id, primary.partition_id, primary.key.clone()));

    if primary.op == Op::CheckNotExists {
        return Ok(false);
    }

    for (partition_id, mutations) in txn.buffer.secondaries_by_partition() {
        prewrite_partition(txn, core, partition_id, &mutations).await?;
    }
    Ok(true)
}

async fn prewrite_partition(
    txn: &Transaction,
    core: &mut TransactionCore,
    partition_id: PartitionId,
    mutations: &[Mutation],
) -> Result<()> {
    let primary = txn.buffer.primary().expect("primary exists");
    let deadline = Deadline::after(txn.options.lock_wait_timeout);
    let mut backoff = Backoff::region_split();
    let mut current_partition = partition_id;
    let table_id = mutations[0].table_id;

    loop {
        if txn.handle.cancel_requested() {
            return Err(Error::Cancelled);
        }

        let req = PrewriteRequest {
            start_ts: core.start_ts,
            primary_key: primary.key.clone(),
            mutations: retarget(mutations, current_partition),
            lock_ttl: DEFAULT_LOCK_TTL_MS,
            for_update_ts: mutations.first().and_then(|m| m.for_update_ts),
        };

        match txn.kv.txn_prewrite(req).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                match classify_prewrite_error(
                    &err,
                    txn.options.is_pessimistic(),
                    txn.options.auto_commit,
                    txn.options.txn_retry_cnt,
                ) {
                    RetryAction::RetryLocally => {
                        if deadline.is_expired() {
                            return Err(retry_timeout_error(&err, txn));
                        }
                        if let KvError::RegionSplit { stale_partition_id, key } = &err {
                            current_partition = txn
                                .partition_resolver
                                .resolve(table_id, key, *stale_partition_id)
                                .await
                                .map_err(|e| Error::StoreUnavailable {
                                    attempts: backoff.attempts() + 1,
                                    source: KvError::Other(e.to_string()),
                                })?;
                            for m in mutations {
                                txn.buffer.reassign_partition(m.table_id, &m.key, current_partition);
                            }
                        }
                        // `CommitTsExpired` never actually fires from prewrite (it has
                        // no commit_ts yet); the table still routes it here rather than
                        // to `Fail` in case a future store version reuses the signal.
                        match backoff.next_delay() {
                            Some(delay) => tokio::time::sleep(delay).await,
                            None => return Err(retry_timeout_error(&err, txn)),
                        }
                    }
                    RetryAction::RetryStatement | RetryAction::Fail => {
                        return Err(map_kv_error(err, core.start_ts));
                    }
                }
            }
        }
    }
}

fn retarget(mutations: &[Mutation], partition_id: PartitionId) -> Vec<Mutation> {
    mutations
        .iter()
        .cloned()
        .map(|mut m| {
            m.partition_id = partition_id;
            m
        })
        .collect()
}

fn retry_timeout_error(err: &KvError, txn: &Transaction) -> Error {
    match err {
        KvError::RegionSplit { .. } => Error::RegionSplitTimeout(txn.options.lock_wait_timeout),
        KvError::CommitTsExpired { .. } => Error::CommitTsExpiredTimeout(txn.options.lock_wait_timeout),
        other => Error::StoreUnavailable { attempts: 1, source: other.clone() },
    }
}

fn map_kv_error(err: KvError, start_ts: u64) -> Error {
    match err {
        KvError::WriteConflict { key, conflict_start_ts, conflict_commit_ts } => {
            Error::WriteConflict { key, start_ts, conflict_start_ts, conflict_commit_ts }
        }
        KvError::DuplicateEntry(key) => Error::DuplicateEntry(key),
        KvError::LockTimeout => Error::LockTimeout,
        other => Error::StoreUnavailable { attempts: 1, source: other },
    }
}

/// Commits the primary key, retrying `CommitTsExpired`/`RegionSplit` within
/// `lock_wait_timeout` (§4.2(ii)). The store reporting the key already resolved is
/// treated as success.
pub(crate) async fn commit_primary(txn: &Transaction, core: &mut TransactionCore) -> Result<()> {
    let primary = core.primary_key.clone().expect("primary_key set by a successful prewrite");
    let deadline = Deadline::after(txn.options.lock_wait_timeout);
    let mut backoff = Backoff::region_split();
    let mut partition_id = primary.1;

    loop {
        if txn.handle.cancel_requested() {
            return Err(Error::Cancelled);
        }

        let commit_ts = core.commit_ts.expect("commit_ts assigned before commit_primary runs");
        let req = CommitRequest {
            start_ts: core.start_ts,
            commit_ts,
            keys: vec![(primary.0, partition_id, primary.2.clone())],
        };

        let err = match txn.kv.txn_commit(req).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        if classify_commit_error(&err) != RetryAction::RetryLocally {
            return Err(map_kv_error(err, core.start_ts));
        }

        match err {
            KvError::CommitTsExpired { .. } => {
                if deadline.is_expired() {
                    return Err(Error::CommitTsExpiredTimeout(txn.options.lock_wait_timeout));
                }
                let fresh_commit_ts = txn.tso.tso().await.map_err(Error::TimestampSource)?;
                core.commit_ts = Some(fresh_commit_ts);
                if let Some(delay) = backoff.next_delay() {
                    tokio::time::sleep(delay).await;
                }
            }
            KvError::RegionSplit { stale_partition_id, key } => {
                if deadline.is_expired() {
                    return Err(Error::RegionSplitTimeout(txn.options.lock_wait_timeout));
                }
                partition_id = txn
                    .partition_resolver
                    .resolve(primary.0, &key, stale_partition_id)
                    .await
                    .map_err(|e| Error::StoreUnavailable {
                        attempts: backoff.attempts() + 1,
                        source: KvError::Other(e.to_string()),
                    })?;
                txn.buffer.reassign_partition(primary.0, &primary.2, partition_id);
                if let Some(delay) = backoff.next_delay() {
                    tokio::time::sleep(delay).await;
                }
            }
            other => return Err(map_kv_error(other, core.start_ts)),
        }
    }
}

/// Dispatches every secondary key's commit onto the `exec-txn-commit` pool (§4.2(iv));
/// fire-and-forget, logged rather than raised, since the transaction is already
/// durably committed once the primary key resolves.
pub(crate) fn spawn_secondary_commit(txn: &Transaction, core: &mut TransactionCore) {
    let secondaries = txn.buffer.secondaries_by_partition();
    if secondaries.is_empty() {
        return;
    }
    let start_ts = core.start_ts;
    let commit_ts = core.commit_ts.expect("commit_ts set before dispatching secondaries");
    let kv = txn.kv.clone();
    let logger = txn.logger.clone();

    let handle = txn.executors.commit.spawn(async move {
        fail::fail_point!("before-commit-secondary");
        for (partition_id, mutations) in secondaries {
            let keys = mutations.into_iter().map(|m| (m.table_id, partition_id, m.key)).collect();
            let req = CommitRequest { start_ts, commit_ts, keys };
            if let Err(err) = kv.txn_commit(req).await {
                warn!(logger, "secondary commit failed";
                      "start_ts" => start_ts, "partition_id" => partition_id, "error" => %err);
            }
        }
    });
    core.secondary_commit = Some(handle);
}
