//! The transaction coordinator itself (§3, §4). [`Transaction`] is the public surface
//! an embedding frontend drives; everything else in this module is plumbing shared
//! between the optimistic and pessimistic paths.

pub mod buffer;
pub mod lock;
pub mod registry;
pub mod status;

mod heartbeat;
mod optimistic;
mod pessimistic;

pub use buffer::MutationBuffer;
pub use lock::{LockGuard, LockKind, TableLockManager};
pub use registry::{ConnectionId, Environment, TxnId};
pub use status::{Event, Status};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use slog::Logger;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::config::TransactionOptions;
use crate::error::{Error, Result};
use crate::executor::ExecutorPools;
use crate::kv::{BatchRollbackRequest, KvAdapter, PartitionId, TableId};
use crate::partition::PartitionResolver;
use crate::timestamp::TimestampSource;

/// Every acquired lock's default TTL before the heartbeat (if any) extends it.
pub(crate) const DEFAULT_LOCK_TTL_MS: u64 = 20_000;

/// The cancel flag and completion signal a [`Transaction`] is registered under (§4.6,
/// §5.1). Split out from `Transaction` itself so [`Environment`] can hold only a
/// `Weak` reference to it without keeping the buffer, KV adapter, or anything else
/// alive past the transaction's own lifetime.
#[derive(Debug)]
pub struct TransactionHandle {
    cancelled: AtomicBool,
    finished: Notify,
}

impl Default for TransactionHandle {
    fn default() -> Self {
        TransactionHandle { cancelled: AtomicBool::new(false), finished: Notify::new() }
    }
}

impl TransactionHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        self.finished.notify_waiters();
    }

    /// Resolves once the owning transaction has run `close()`. Exposed so a caller
    /// that only holds the handle (e.g. after `kill_connection`) can wait for cleanup
    /// without holding the `Transaction` itself.
    pub async fn wait_finished(&self) {
        self.finished.notified().await;
    }
}

type KeyTriple = (TableId, PartitionId, Vec<u8>);

struct TransactionCore {
    status: Status,
    start_ts: u64,
    for_update_ts: u64,
    commit_ts: Option<u64>,
    primary_key: Option<KeyTriple>,
    acquired_locks: HashSet<KeyTriple>,
    sql_list: Vec<String>,
    secondary_commit: Option<JoinHandle<()>>,
    heartbeat: Option<heartbeat::HeartbeatHandle>,
    table_lock_guards: Vec<LockGuard>,
}

impl TransactionCore {
    fn new(start_ts: u64) -> Self {
        TransactionCore {
            status: Status::Start,
            start_ts,
            for_update_ts: start_ts,
            commit_ts: None,
            primary_key: None,
            acquired_locks: HashSet::new(),
            sql_list: Vec::new(),
            secondary_commit: None,
            heartbeat: None,
            table_lock_guards: Vec::new(),
        }
    }
}

/// One 2PC transaction (§3, §4.1). Cheap to clone via `Arc`; every public method takes
/// `&self` and internally serializes through a single `core` mutex, so a caller may
/// freely share a `Transaction` across tasks (e.g. a statement executor and a
/// cancellation watcher) without wrapping it itself.
pub struct Transaction {
    id: TxnId,
    connection_id: ConnectionId,
    env: Arc<Environment>,
    kv: Arc<dyn KvAdapter>,
    tso: Arc<dyn TimestampSource>,
    partition_resolver: Arc<dyn PartitionResolver>,
    executors: Arc<ExecutorPools>,
    options: TransactionOptions,
    logger: Logger,
    handle: Arc<TransactionHandle>,
    buffer: Arc<MutationBuffer>,
    core: AsyncMutex<TransactionCore>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TxnId,
        connection_id: ConnectionId,
        env: Arc<Environment>,
        kv: Arc<dyn KvAdapter>,
        tso: Arc<dyn TimestampSource>,
        partition_resolver: Arc<dyn PartitionResolver>,
        executors: Arc<ExecutorPools>,
        options: TransactionOptions,
        logger: Logger,
    ) -> Arc<Self> {
        let handle = Arc::new(TransactionHandle::default());
        env.register(id, connection_id, &handle);
        Arc::new(Transaction {
            id,
            connection_id,
            env,
            kv,
            tso,
            partition_resolver,
            executors,
            options,
            logger,
            handle,
            buffer: Arc::new(MutationBuffer::new()),
            core: AsyncMutex::new(TransactionCore::new(id.start_ts)),
        })
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn is_pessimistic(&self) -> bool {
        self.options.is_pessimistic()
    }

    pub fn start_ts(&self) -> u64 {
        self.id.start_ts
    }

    pub async fn status(&self) -> Status {
        self.core.lock().await.status
    }

    pub async fn commit_ts(&self) -> Option<u64> {
        self.core.lock().await.commit_ts
    }

    /// Cancels the transaction. Lock-free (§5.1): flips the shared atomic without
    /// waiting for the `core` mutex, so `kill_connection`/`kill_query` never block on
    /// whatever statement this transaction happens to be running.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn cancel_requested(&self) -> bool {
        self.handle.cancel_requested()
    }

    /// Records a statement in the audit trail (§3.1: `sql_list`/`executed_statements`),
    /// capped so a long-running transaction can't grow this unboundedly.
    pub async fn record_statement(&self, sql: impl Into<String>) {
        const SQL_LIST_CAP: usize = 256;
        let mut core = self.core.lock().await;
        if core.sql_list.len() >= SQL_LIST_CAP {
            core.sql_list.remove(0);
        }
        core.sql_list.push(sql.into());
    }

    pub async fn executed_statements(&self) -> Vec<String> {
        self.core.lock().await.sql_list.clone()
    }

    /// Acquires a table-level lock for the remainder of the transaction (§4.5); used
    /// by DDL statements to serialize against concurrent DML on the same table. The
    /// guard is released when the transaction closes, never before.
    pub async fn acquire_table_lock(&self, table_id: TableId, kind: LockKind) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.status.is_terminal() {
            return Err(Error::TransactionState("transaction already closed"));
        }
        let guard = self.env.table_locks().lock(table_id, kind, self.options.lock_wait_timeout).await?;
        core.table_lock_guards.push(guard);
        Ok(())
    }

    pub async fn put(&self, table_id: TableId, partition_id: PartitionId, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.apply_write(crate::kv::Mutation::put(table_id, partition_id, key, value)).await
    }

    pub async fn delete(&self, table_id: TableId, partition_id: PartitionId, key: Vec<u8>) -> Result<()> {
        self.apply_write(crate::kv::Mutation::delete(table_id, partition_id, key)).await
    }

    pub async fn check_not_exists(&self, table_id: TableId, partition_id: PartitionId, key: Vec<u8>) -> Result<()> {
        self.apply_write(crate::kv::Mutation::check_not_exists(table_id, partition_id, key)).await
    }

    /// `SELECT ... FOR UPDATE` (§4.3): under an optimistic transaction this is a
    /// server-side read concern outside this coordinator (no lock to acquire here);
    /// under a pessimistic one it takes a row lock that is never itself buffered as a
    /// write, becoming a residual lock unless a later write covers the same key.
    pub async fn lock_for_update(&self, table_id: TableId, partition_id: PartitionId, key: Vec<u8>) -> Result<()> {
        if !self.options.is_pessimistic() {
            return Ok(());
        }
        let mut core = self.core.lock().await;
        self.reject_if_unusable(&core)?;
        let for_update_ts = self.tso.tso().await.map_err(Error::TimestampSource)?;
        if for_update_ts > core.for_update_ts {
            core.for_update_ts = for_update_ts;
        }
        let mutation = crate::kv::Mutation::lock(table_id, partition_id, key);
        pessimistic::acquire_lock_only(self, &mut core, &mutation).await
    }

    async fn apply_write(&self, mut mutation: crate::kv::Mutation) -> Result<()> {
        let mut core = self.core.lock().await;
        self.reject_if_unusable(&core)?;
        if self.options.is_pessimistic() {
            let for_update_ts = self.tso.tso().await.map_err(Error::TimestampSource)?;
            if for_update_ts > core.for_update_ts {
                core.for_update_ts = for_update_ts;
            }
            mutation.for_update_ts = Some(core.for_update_ts);
            pessimistic::acquire_row_lock(self, &mut core, &mutation).await?;
        }
        self.buffer.put(mutation);
        Ok(())
    }

    fn reject_if_unusable(&self, core: &TransactionCore) -> Result<()> {
        if self.handle.cancel_requested() {
            return Err(Error::Cancelled);
        }
        if core.status.is_terminal() {
            return Err(Error::TransactionState("transaction already closed"));
        }
        Ok(())
    }

    /// Runs the full 2PC sequence (§4.1, §4.2, §4.3): prewrite, residual-lock cleanup,
    /// primary commit, and fire-and-forget secondary commit. An empty buffer is a
    /// no-op that leaves `status` at `Start` (§4.1).
    pub async fn commit(&self) -> Result<()> {
        let mut core = self.core.lock().await;

        if core.status.is_terminal() {
            return Ok(());
        }

        if self.handle.cancel_requested() {
            core.status = core.status.transition(Event::Cancelled)?;
            return self.fail_and_rollback(&mut core, Error::Cancelled).await;
        }

        if !self.buffer.check_continue() {
            if self.options.is_pessimistic() {
                pessimistic::rollback_residual_locks(self, &mut core).await;
            }
            return Ok(());
        }

        core.status = core.status.transition(Event::BeginPreWrite)?;

        let needs_primary_commit = match optimistic::prewrite(self, &mut core).await {
            Ok(needs_primary_commit) => needs_primary_commit,
            Err(err) => {
                core.status = core.status.transition(Event::PreWriteFailed)?;
                return self.fail_and_rollback(&mut core, err).await;
            }
        };
        core.status = core.status.transition(Event::PrimaryKeyPrewritten)?;
        core.status = core.status.transition(Event::SecondariesPrewritten)?;

        if self.options.is_pessimistic() {
            pessimistic::rollback_residual_locks(self, &mut core).await;
        }

        if self.handle.cancel_requested() {
            core.status = core.status.transition(Event::PreWriteFailed).unwrap_or(core.status);
            return self.fail_and_rollback(&mut core, Error::Cancelled).await;
        }

        let commit_ts = self.tso.tso().await.map_err(Error::TimestampSource)?;
        core.commit_ts = Some(commit_ts);

        // `PrimaryKeyCommitted` marks the start of the commit attempt (entering
        // `CommitPrimaryKey`), not its success — `Committed`/`CommitFailed` below
        // resolve it one way or the other.
        core.status = core.status.transition(Event::PrimaryKeyCommitted)?;

        // A `CheckNotExists` primary never prewrote anything, primary or secondary —
        // there is nothing left for the store to commit (§4.2(iii)).
        if needs_primary_commit {
            if let Err(err) = optimistic::commit_primary(self, &mut core).await {
                core.status = core.status.transition(Event::CommitFailed)?;
                return self.fail_and_rollback(&mut core, err).await;
            }

            optimistic::spawn_secondary_commit(self, &mut core);
        }

        core.status = core.status.transition(Event::Committed)?;
        Ok(())
    }

    /// Drives `core` to `Rollback` after `err`, best-effort cleaning up whatever the
    /// failed phase left behind, then returns `err` to the caller.
    async fn fail_and_rollback(&self, core: &mut TransactionCore, err: Error) -> Result<()> {
        self.rollback_in_place(core).await;
        core.status = core.status.transition(Event::RollbackStarted)?;
        Err(err)
    }

    /// Explicit rollback (§4.1, §4.3 "Rollback"). Idempotent once the transaction has
    /// already reached `Rollback`/`RollbackFail`/`Close`.
    pub async fn rollback(&self) -> Result<()> {
        let mut core = self.core.lock().await;

        if core.status.is_terminal() || matches!(core.status, Status::Rollback | Status::RollbackFail) {
            return Ok(());
        }

        if self.handle.cancel_requested() && core.status != Status::Cancel {
            core.status = core.status.transition(Event::Cancelled)?;
        }

        if core.status == Status::Start {
            if self.options.is_pessimistic() {
                pessimistic::rollback_all_locks(self, &mut core).await;
            }
            if let Some(hb) = core.heartbeat.take() {
                hb.stop();
            }
            return Ok(());
        }

        self.rollback_in_place(&mut core).await;
        core.status = core.status.transition(Event::RollbackStarted)?;
        Ok(())
    }

    /// Best-effort cleanup shared by every path that ends in `Rollback` (§4.3, §7):
    /// batch-rollback whatever was prewritten, pessimistic-rollback whatever locks
    /// were acquired, and stop the heartbeat. Never itself raises — a failed rollback
    /// RPC is logged and, per the state machine, surfaces as `RollbackFail` only if the
    /// caller explicitly drives that transition; this crate treats rollback as
    /// fire-and-forget cleanup instead.
    async fn rollback_in_place(&self, core: &mut TransactionCore) {
        let keys = self.buffer.all_keys();
        if !keys.is_empty() {
            let req = BatchRollbackRequest { start_ts: core.start_ts, keys };
            if let Err(err) = self.kv.txn_batch_rollback(req).await {
                slog::warn!(self.logger, "batch rollback failed";
                             "start_ts" => core.start_ts, "error" => %err);
            }
        }
        if self.options.is_pessimistic() {
            pessimistic::rollback_all_locks(self, core).await;
        }
        if let Some(hb) = core.heartbeat.take() {
            hb.stop();
        }
    }

    /// Tears the transaction down (§4.1, §4.6.1): stops the heartbeat, waits for (or
    /// detaches) the secondary-commit job onto the cleanup pool, drops the buffer,
    /// unregisters from the [`Environment`], and signals `finished` unconditionally —
    /// even if this is reached from a state the happy path never produces.
    pub async fn close(&self) -> Result<()> {
        let mut core = self.core.lock().await;

        if core.status == Status::Close {
            return Ok(());
        }

        if !matches!(core.status, Status::Commit | Status::Rollback | Status::RollbackFail | Status::Start) {
            self.rollback_in_place(&mut core).await;
            core.status = core.status.transition(Event::RollbackStarted).unwrap_or(core.status);
        }

        if let Some(hb) = core.heartbeat.take() {
            hb.stop();
        }
        core.table_lock_guards.clear();

        let buffer = self.buffer.clone();
        match core.secondary_commit.take() {
            Some(handle) => {
                let max_wait = self.options.max_execution_time;
                self.executors.cleanup.spawn(async move {
                    match max_wait {
                        Some(d) => {
                            let _ = tokio::time::timeout(d, handle).await;
                        }
                        None => {
                            let _ = handle.await;
                        }
                    }
                    buffer.clear();
                });
            }
            None => buffer.clear(),
        }

        core.status = core.status.transition(Event::Closed)?;
        self.env.unregister(self.id, self.connection_id);
        self.handle.finish();
        Ok(())
    }
}

/// End-to-end coordinator tests against [`crate::kv::MockKvAdapter`], exercising the
/// scenarios in §8 rather than any single component in isolation.
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::HeartbeatOption;
    use crate::kv::{CommitRequest, KvError, MockKvAdapter, PrewriteRequest};
    use crate::partition::StaticPartitionResolver;
    use crate::timestamp::MockTimestampSource;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    /// Everything a test needs to `begin` transactions against a shared in-memory
    /// store and timestamp source, without a `Client` (the scenarios below care about
    /// the coordinator's state machine directly, not the entry-point wiring).
    struct Fixture {
        kv: Arc<MockKvAdapter>,
        tso: Arc<MockTimestampSource>,
        env: Arc<Environment>,
        executors: Arc<ExecutorPools>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                kv: Arc::new(MockKvAdapter::new()),
                tso: Arc::new(MockTimestampSource::new(100)),
                env: Environment::new(1),
                executors: Arc::new(ExecutorPools::default()),
            }
        }

        async fn begin(&self, options: TransactionOptions) -> Arc<Transaction> {
            let start_ts = self.tso.tso().await.unwrap();
            let id = self.env.next_txn_id(start_ts);
            Transaction::new(
                id,
                1,
                self.env.clone(),
                self.kv.clone(),
                self.tso.clone(),
                Arc::new(StaticPartitionResolver),
                self.executors.clone(),
                options,
                test_logger(),
            )
        }
    }

    fn pessimistic_no_heartbeat() -> TransactionOptions {
        TransactionOptions::new_pessimistic().heartbeat_option(HeartbeatOption::NoHeartbeat)
    }

    // S1: optimistic happy path — both keys visible once commit returns, the
    // secondary committing asynchronously.
    #[tokio::test]
    async fn optimistic_happy_path_commits_all_keys() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.put(1, 0, b"a".to_vec(), b"1".to_vec()).await.unwrap();
        txn.put(1, 0, b"b".to_vec(), b"2".to_vec()).await.unwrap();

        txn.commit().await.unwrap();
        assert_eq!(txn.status().await, Status::Commit);
        // Primary commits synchronously within commit().
        assert!(fx.kv.committed_value_exists(b"a"));

        txn.close().await.unwrap();
        assert_eq!(txn.status().await, Status::Close);

        // Secondary commit is dispatched fire-and-forget; give the executor pool a
        // moment to run it.
        for _ in 0..20 {
            if fx.kv.committed_value_exists(b"b") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(fx.kv.committed_value_exists(b"b"));
    }

    // S2: a prior committed write conflicts with this transaction's prewrite; no
    // auto_commit, so the coordinator aborts outright rather than retrying.
    #[tokio::test]
    async fn optimistic_write_conflict_aborts_without_auto_commit() {
        let fx = Fixture::new();
        fx.kv
            .txn_prewrite(PrewriteRequest {
                start_ts: 1,
                primary_key: b"a".to_vec(),
                mutations: vec![crate::kv::Mutation::put(1, 0, b"a".to_vec(), b"orig".to_vec())],
                lock_ttl: 1000,
                for_update_ts: None,
            })
            .await
            .unwrap();
        fx.kv
            .txn_commit(CommitRequest { start_ts: 1, commit_ts: 1000, keys: vec![(1, 0, b"a".to_vec())] })
            .await
            .unwrap();

        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.put(1, 0, b"a".to_vec(), b"new".to_vec()).await.unwrap();

        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, Error::WriteConflict { .. }));
        assert!(err.requires_rollback());
        assert_eq!(txn.status().await, Status::Rollback);

        txn.close().await.unwrap();
        assert_eq!(txn.status().await, Status::Close);
    }

    // S4: the store reports a region split while committing the primary; the
    // coordinator re-resolves and retries rather than failing the transaction.
    #[tokio::test]
    async fn region_split_during_commit_primary_retries_and_succeeds() {
        let fx = Fixture::new();
        fx.kv.inject_error(
            "commit",
            KvError::RegionSplit { key: b"a".to_vec(), stale_partition_id: 0 },
            1,
        );

        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.put(1, 0, b"a".to_vec(), b"1".to_vec()).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(txn.status().await, Status::Commit);
        assert!(fx.kv.committed_value_exists(b"a"));
    }

    // S5: a second pessimistic lock request on an already-locked row surfaces
    // `LockTimeout` without poisoning the rest of the transaction.
    #[tokio::test]
    async fn pessimistic_lock_conflict_surfaces_timeout_and_txn_stays_usable() {
        let fx = Fixture::new();
        let t1 = fx.begin(pessimistic_no_heartbeat()).await;
        t1.put(1, 0, b"a".to_vec(), b"1".to_vec()).await.unwrap();

        let t2 = fx.begin(pessimistic_no_heartbeat()).await;
        let err = t2.put(1, 0, b"a".to_vec(), b"2".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout));
        assert!(!err.requires_rollback());

        // t2's state machine is untouched by the failed statement.
        assert_eq!(t2.status().await, Status::Start);
        t2.put(1, 0, b"b".to_vec(), b"3".to_vec()).await.unwrap();
        t2.commit().await.unwrap();
        assert_eq!(t2.status().await, Status::Commit);

        t1.rollback().await.unwrap();
        t1.close().await.unwrap();
        t2.close().await.unwrap();
    }

    // §4.3: a SELECT-FOR-UPDATE row with no covering write is a residual lock and
    // must be rolled back before commit proceeds.
    #[tokio::test]
    async fn residual_pessimistic_lock_is_rolled_back_before_commit() {
        let fx = Fixture::new();
        let txn = fx.begin(pessimistic_no_heartbeat()).await;
        txn.lock_for_update(1, 0, b"locked_only".to_vec()).await.unwrap();
        txn.put(1, 0, b"written".to_vec(), b"v".to_vec()).await.unwrap();
        assert!(fx.kv.has_lock(b"locked_only"));

        txn.commit().await.unwrap();

        assert!(!fx.kv.has_lock(b"locked_only"), "residual lock must be rolled back before commit");
        assert!(fx.kv.committed_value_exists(b"written"));
        txn.close().await.unwrap();
    }

    // Cancellation observed ahead of prewrite rolls the transaction back instead of
    // committing (§5.1, property 6).
    #[tokio::test]
    async fn cancel_before_commit_rolls_back_instead_of_committing() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.put(1, 0, b"a".to_vec(), b"1".to_vec()).await.unwrap();
        txn.cancel();

        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(txn.status().await, Status::Rollback);

        txn.close().await.unwrap();
        assert_eq!(txn.status().await, Status::Close);
        assert!(!fx.kv.has_lock(b"a"));
        assert!(!fx.kv.committed_value_exists(b"a"));
    }

    // Property 4: rollback is idempotent once a transaction has reached `Close`.
    #[tokio::test]
    async fn rollback_is_idempotent_after_close() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.put(1, 0, b"a".to_vec(), b"1".to_vec()).await.unwrap();
        txn.commit().await.unwrap();
        txn.close().await.unwrap();

        txn.rollback().await.unwrap();
        txn.rollback().await.unwrap();
        assert_eq!(txn.status().await, Status::Close);
    }

    // §4.1: an empty mutation buffer makes commit() a no-op; status never leaves
    // `Start` until close() drives it straight to `Close`.
    #[tokio::test]
    async fn empty_transaction_commit_is_noop() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.commit().await.unwrap();
        assert_eq!(txn.status().await, Status::Start);
        txn.close().await.unwrap();
        assert_eq!(txn.status().await, Status::Close);
    }

    // §4.5/§9: a table lock is released on every exit path, including a plain close()
    // with no explicit unlock call.
    #[tokio::test]
    async fn table_lock_is_released_when_transaction_closes() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        txn.acquire_table_lock(1, LockKind::Table).await.unwrap();
        txn.close().await.unwrap();

        let locks = fx.env.table_locks();
        let guard = locks.lock(1, LockKind::Table, Duration::from_secs(1)).await.unwrap();
        drop(guard);
    }

    // §3: sql_list is capped so a long-running transaction doesn't grow it forever.
    #[tokio::test]
    async fn statement_audit_trail_is_capped() {
        let fx = Fixture::new();
        let txn = fx.begin(TransactionOptions::new_optimistic()).await;
        for i in 0..300 {
            txn.record_statement(format!("SELECT {i}")).await;
        }
        let statements = txn.executed_statements().await;
        assert_eq!(statements.len(), 256);
        assert_eq!(statements.last().unwrap(), "SELECT 299");
        txn.close().await.unwrap();
    }
}
