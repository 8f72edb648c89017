//! The per-table row-lock waiter (§4.5) used to serialize DDL against running DML.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::kv::TableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Row,
    Table,
}

type WaiterId = u64;

struct Waiter {
    id: WaiterId,
    kind: LockKind,
    granted_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct TableQueue {
    waiters: VecDeque<Waiter>,
    /// Ids currently holding a granted lock (may be several row-locks at once, or
    /// exactly one table-lock).
    holders: Vec<(WaiterId, LockKind)>,
}

impl TableQueue {
    /// Grant rules (§4.5): row-locks are mutually compatible with each other; a
    /// table-lock is exclusive against every other holder.
    fn compatible_with_holders(&self, kind: LockKind) -> bool {
        if self.holders.is_empty() {
            return true;
        }
        match kind {
            LockKind::Row => self.holders.iter().all(|(_, k)| *k == LockKind::Row),
            LockKind::Table => false,
        }
    }

    /// Scans from the front of the queue, granting every waiter that the current
    /// holder set (plus everything already granted in this scan) allows, honoring
    /// fairness (§4.5): a row-lock may jump a blocked table-lock only if that
    /// table-lock is itself stuck behind another row-lock — i.e. we never let a row
    /// request skip over a table request that is next in line with nothing blocking it.
    fn try_grant_pending(&mut self) {
        let mut table_lock_blocked_at_front = false;
        let mut i = 0;
        while i < self.waiters.len() {
            let kind = self.waiters[i].kind;
            let can_jump_ahead = kind == LockKind::Row && i > 0 && table_lock_blocked_at_front;
            let in_fifo_turn = i == 0 || can_jump_ahead;

            if in_fifo_turn && self.compatible_with_holders(kind) {
                let mut waiter = self.waiters.remove(i).unwrap();
                self.holders.push((waiter.id, waiter.kind));
                if let Some(tx) = waiter.granted_tx.take() {
                    let _ = tx.send(());
                }
                // Re-scan from the front: granting may unblock the new front.
                i = 0;
                table_lock_blocked_at_front = false;
                continue;
            }

            if i == 0 && kind == LockKind::Table {
                table_lock_blocked_at_front = true;
            }
            i += 1;
        }
    }

    fn release(&mut self, id: WaiterId) {
        self.holders.retain(|(h, _)| *h != id);
        self.try_grant_pending();
    }
}

/// A per-table FIFO lock manager. `lock()` returns once the request is either granted
/// or the `lock_wait_timeout` deadline passes (surfaced as `Error::LockTimeout`).
/// Release is driven entirely by the caller dropping the returned [`LockGuard`] (which
/// stands in for the "released" future wired to a transaction's `finished_future` in
/// the source design, §9) — guaranteeing release on every exit path: commit,
/// rollback, cancel, or simply dropping the connection.
#[derive(Default)]
pub struct TableLockManager {
    tables: DashMap<TableId, Mutex<TableQueue>>,
    next_id: AtomicU64,
}

/// Owns an `Arc` back to the manager rather than borrowing it, so a guard can be
/// stashed on a transaction handle (itself `Arc`-owned and held well past the stack
/// frame that acquired the lock) without fighting lifetimes.
pub struct LockGuard {
    manager: std::sync::Arc<TableLockManager>,
    table_id: TableId,
    id: WaiterId,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.manager.tables.get(&self.table_id) {
            queue.lock().release(self.id);
        }
    }
}

impl TableLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `kind` on `table_id`; blocks (asynchronously) until granted or until
    /// `timeout` elapses, in which case the waiter is dequeued and `Error::LockTimeout`
    /// is returned so the table-lock wait surfaces exactly like a pessimistic lock
    /// wait (§4.5, §7).
    pub async fn lock(
        self: &std::sync::Arc<Self>,
        table_id: TableId,
        kind: LockKind,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let queue = self.tables.entry(table_id).or_default();
            let mut queue = queue.lock();
            queue.waiters.push_back(Waiter { id, kind, granted_tx: Some(tx) });
            queue.try_grant_pending();
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(LockGuard { manager: self.clone(), table_id, id }),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                if let Some(queue) = self.tables.get(&table_id) {
                    let mut queue = queue.lock();
                    queue.waiters.retain(|w| w.id != id);
                    queue.holders.retain(|(h, _)| *h != id);
                }
                Err(Error::LockTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn row_locks_are_mutually_compatible() {
        let mgr = Arc::new(TableLockManager::new());
        let g1 = mgr.lock(1, LockKind::Row, Duration::from_secs(1)).await.unwrap();
        let g2 = mgr.lock(1, LockKind::Row, Duration::from_secs(1)).await.unwrap();
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn table_lock_excludes_row_lock() {
        let mgr = Arc::new(TableLockManager::new());
        let _table_guard = mgr.lock(1, LockKind::Table, Duration::from_secs(5)).await.unwrap();
        let row = mgr.lock(1, LockKind::Row, Duration::from_millis(50)).await;
        assert!(matches!(row, Err(Error::LockTimeout)));
    }

    #[tokio::test]
    async fn fifo_order_is_respected() {
        let mgr = Arc::new(TableLockManager::new());
        let table_guard = mgr.lock(1, LockKind::Table, Duration::from_secs(5)).await.unwrap();

        let mgr2 = mgr.clone();
        let first = tokio::spawn(async move {
            mgr2.lock(1, LockKind::Table, Duration::from_secs(5)).await
        });
        // Give `first` time to enqueue before releasing the current holder.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(table_guard);

        let first_guard = first.await.unwrap().unwrap();
        drop(first_guard);
    }

    #[tokio::test]
    async fn row_lock_can_jump_a_table_lock_blocked_behind_another_row_lock() {
        let mgr = Arc::new(TableLockManager::new());
        // Row lock holds the table.
        let row_holder = mgr.lock(1, LockKind::Row, Duration::from_secs(5)).await.unwrap();

        // A table-lock request queues behind it.
        let mgr2 = mgr.clone();
        let table_req = tokio::spawn(async move {
            mgr2.lock(1, LockKind::Table, Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A second row-lock request should be granted immediately, jumping the
        // blocked table-lock, since the table-lock is itself stuck behind a row lock.
        let row2 = mgr.lock(1, LockKind::Row, Duration::from_millis(50)).await;
        assert!(row2.is_ok());

        drop(row_holder);
        drop(row2);
        let table_guard = table_req.await.unwrap().unwrap();
        drop(table_guard);
    }

    #[tokio::test]
    async fn timeout_removes_waiter_without_granting() {
        let mgr = Arc::new(TableLockManager::new());
        let _held = mgr.lock(1, LockKind::Table, Duration::from_secs(5)).await.unwrap();
        let res = mgr.lock(1, LockKind::Table, Duration::from_millis(30)).await;
        assert!(matches!(res, Err(Error::LockTimeout)));
    }
}
