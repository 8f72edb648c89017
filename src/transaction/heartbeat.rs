//! The pessimistic primary-lock heartbeat task (§4.3.1).

use std::sync::Arc;

use slog::{warn, Logger};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::HeartbeatOption;
use crate::kv::{HeartbeatRequest, KvAdapter, PartitionId, TableId};

/// Caps how far the heartbeat lets the lock TTL grow; the primary lock never needs a
/// longer lease than this regardless of how long the transaction runs.
const MAX_TTL_MS: u64 = 60_000;
/// How much each heartbeat round bumps the requested TTL — the teacher's
/// `HeartbeatOption::FixedTime` only fixes the *cadence*; the TTL itself is allowed
/// to grow so a slow statement doesn't race its own lock's expiry.
const TTL_GROWTH_STEP_MS: u64 = 3_000;

pub struct HeartbeatHandle {
    stop: Arc<Notify>,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Arms the stop signal. Never awaited by `close()` (§4.3.1): the task exits on
    /// its own time, and closing a transaction must not block on network I/O it
    /// doesn't need.
    pub fn stop(&self) {
        self.stop.notify_waiters();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns the heartbeat loop, or returns `None` under `HeartbeatOption::NoHeartbeat`.
/// Holds only the immutable identity of the transaction (`start_ts`, the primary key
/// triple) plus the adapter — never a handle back to the owning `TransactionCore`
/// (§9: break cyclic references with weak back-references; the heartbeat is the one
/// place a *strong* reference to the coordinator would create a cycle, so it gets
/// none at all).
pub fn spawn(
    kv: Arc<dyn KvAdapter>,
    start_ts: u64,
    primary_key: (TableId, PartitionId, Vec<u8>),
    option: HeartbeatOption,
    initial_ttl_ms: u64,
    logger: Logger,
) -> Option<HeartbeatHandle> {
    let cadence = match option {
        HeartbeatOption::NoHeartbeat => return None,
        HeartbeatOption::FixedTime(d) => d,
    };
    let stop = Arc::new(Notify::new());
    let stop_rx = stop.clone();
    let join = tokio::spawn(async move {
        let mut ttl = initial_ttl_ms;
        loop {
            tokio::select! {
                _ = stop_rx.notified() => return,
                _ = tokio::time::sleep(cadence) => {}
            }
            ttl = (ttl + TTL_GROWTH_STEP_MS).min(MAX_TTL_MS);
            let req = HeartbeatRequest { start_ts, primary_key: primary_key.2.clone(), new_ttl: ttl };
            match kv.txn_heartbeat(req).await {
                Ok(applied) => ttl = applied,
                Err(err) => {
                    // A missed heartbeat just shortens the effective TTL; the store
                    // resolves the lock via the primary key if this transaction never
                    // comes back. Not retried (§4.3.1).
                    warn!(logger, "pessimistic lock heartbeat failed, stopping";
                          "start_ts" => start_ts, "error" => %err);
                    return;
                }
            }
        }
    });
    Some(HeartbeatHandle { stop, join })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MockKvAdapter;
    use std::time::Duration;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn no_heartbeat_option_spawns_nothing() {
        let kv = Arc::new(MockKvAdapter::new());
        let handle = spawn(
            kv,
            100,
            (1, 0, b"k".to_vec()),
            HeartbeatOption::NoHeartbeat,
            1000,
            test_logger(),
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn heartbeat_keeps_lock_alive_until_stopped() {
        let kv = Arc::new(MockKvAdapter::new());
        kv.txn_prewrite(crate::kv::PrewriteRequest {
            start_ts: 100,
            primary_key: b"k".to_vec(),
            mutations: vec![crate::kv::Mutation::put(1, 0, b"k".to_vec(), b"v".to_vec())],
            lock_ttl: 1000,
            for_update_ts: None,
        })
        .await
        .unwrap();
        assert!(kv.has_lock(b"k"));

        let handle = spawn(
            kv.clone(),
            100,
            (1, 0, b"k".to_vec()),
            HeartbeatOption::FixedTime(Duration::from_millis(20)),
            1000,
            test_logger(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(kv.has_lock(b"k"), "heartbeat should keep the lock alive");

        handle.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn heartbeat_exits_after_rpc_error() {
        let kv = Arc::new(MockKvAdapter::new());
        // No lock present: txn_heartbeat errors immediately with "lock not found".
        let handle = spawn(
            kv,
            100,
            (1, 0, b"k".to_vec()),
            HeartbeatOption::FixedTime(Duration::from_millis(10)),
            1000,
            test_logger(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
