//! The transaction registry and kill surface (§4.6), plus the long-lived
//! `Environment` that owns it (§9: "avoid process-wide singletons in tests by
//! parameterizing").

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::TransactionHandle;
use crate::transaction::lock::TableLockManager;

pub type ConnectionId = u64;

/// Identifies a transaction: `(server_id, start_ts, seq)` per §3. `seq` disambiguates
/// transactions that happen to share a `start_ts` (never possible from one TSO, but
/// the triple survives a multi-frontend deployment where two frontends raced a
/// timestamp request before either began a transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId {
    pub server_id: u64,
    pub start_ts: u64,
    pub seq: u64,
}

/// The process-wide (or, in tests, per-`Environment`) owner of the transaction
/// registry, the connection-to-transaction map, and the shared table-lock manager.
/// Constructed once and threaded into every `Client`/`Transaction`, rather than
/// reached for as a global singleton (§9).
pub struct Environment {
    registry: DashMap<TxnId, Weak<TransactionHandle>>,
    connections: DashMap<ConnectionId, HashSet<TxnId>>,
    table_locks: Arc<TableLockManager>,
    next_seq: AtomicU64,
    server_id: u64,
}

impl Environment {
    pub fn new(server_id: u64) -> Arc<Self> {
        Arc::new(Environment {
            registry: DashMap::new(),
            connections: DashMap::new(),
            table_locks: Arc::new(TableLockManager::new()),
            next_seq: AtomicU64::new(1),
            server_id,
        })
    }

    pub fn table_locks(&self) -> Arc<TableLockManager> {
        self.table_locks.clone()
    }

    pub fn next_txn_id(&self, start_ts: u64) -> TxnId {
        TxnId {
            server_id: self.server_id,
            start_ts,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Registers a transaction for exactly its lifetime (§3 invariant). Stores only a
    /// `Weak` reference: a transaction dropped without an explicit `close()` (e.g. a
    /// panicking caller) does not keep this entry — and the handle it points to —
    /// alive forever (§4.6.1).
    pub fn register(&self, id: TxnId, connection_id: ConnectionId, handle: &Arc<TransactionHandle>) {
        self.registry.insert(id, Arc::downgrade(handle));
        self.connections.entry(connection_id).or_default().insert(id);
    }

    pub fn unregister(&self, id: TxnId, connection_id: ConnectionId) {
        self.registry.remove(&id);
        if let Some(mut txns) = self.connections.get_mut(&connection_id) {
            txns.remove(&id);
        }
    }

    /// Cancels every in-flight transaction registered on `connection_id` (kill-query
    /// when issued for the statement's own connection, kill-connection when issued
    /// from another session).
    pub fn kill_connection(&self, connection_id: ConnectionId) {
        if let Some(txns) = self.connections.get(&connection_id) {
            for id in txns.iter() {
                if let Some(handle) = self.registry.get(id).and_then(|w| w.upgrade()) {
                    handle.cancel();
                }
            }
        }
    }

    pub fn kill_transaction(&self, id: TxnId) {
        if let Some(handle) = self.registry.get(&id).and_then(|w| w.upgrade()) {
            handle.cancel();
        }
    }

    /// Drops registry entries whose handle has already been dropped. Cheap enough to
    /// call opportunistically (e.g. periodically from a maintenance task); not
    /// required for correctness since `unregister` is the authoritative path.
    pub fn sweep_stale(&self) {
        self.registry.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionHandle;

    fn dummy_handle() -> Arc<TransactionHandle> {
        Arc::new(TransactionHandle::default())
    }

    #[test]
    fn register_and_unregister_round_trip() {
        let env = Environment::new(1);
        let id = env.next_txn_id(100);
        let handle = dummy_handle();
        env.register(id, 1, &handle);
        assert_eq!(env.registered_count(), 1);
        env.unregister(id, 1);
        assert_eq!(env.registered_count(), 0);
    }

    #[test]
    fn kill_connection_cancels_its_transactions() {
        let env = Environment::new(1);
        let id = env.next_txn_id(100);
        let handle = dummy_handle();
        env.register(id, 7, &handle);
        env.kill_connection(7);
        assert!(handle.cancel_requested());
    }

    #[test]
    fn dropped_handle_does_not_leak_forever() {
        let env = Environment::new(1);
        let id = env.next_txn_id(100);
        {
            let handle = dummy_handle();
            env.register(id, 1, &handle);
        }
        env.sweep_stale();
        assert_eq!(env.registered_count(), 0);
    }
}
