use std::collections::VecDeque;

use parking_lot::Mutex;

use super::{
    BatchRollbackRequest, CommitRequest, HeartbeatRequest, KvAdapter, KvError, KvResult,
    PessimisticLockRequest, PessimisticRollbackRequest, PrewriteRequest,
};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LockRecord {
    start_ts: u64,
    for_update_ts: Option<u64>,
    primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteRecord {
    start_ts: u64,
    commit_ts: u64,
}

/// An in-process stand-in for the real store, used by unit and scenario tests. It is
/// not a faithful MVCC engine — only enough state to exercise the coordinator's
/// protocol: one lock slot per key, one latest committed write per key, and an
/// injectable queue of canned errors per RPC kind so tests can drive the retry paths
/// in §4.7 deterministically (region split, commit-ts-expired, write conflict).
#[derive(Default)]
pub struct MockKvAdapter {
    locks: Mutex<std::collections::HashMap<Vec<u8>, LockRecord>>,
    writes: Mutex<std::collections::HashMap<Vec<u8>, WriteRecord>>,
    inject: Mutex<std::collections::HashMap<&'static str, VecDeque<KvError>>>,
}

impl MockKvAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `err` to be returned the next `n` times `rpc` (e.g. `"prewrite"`,
    /// `"commit"`, `"pessimistic_lock"`) is called, before falling through to normal
    /// behavior.
    pub fn inject_error(&self, rpc: &'static str, err: KvError, times: usize) {
        let mut inject = self.inject.lock();
        let queue = inject.entry(rpc).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    fn take_injected(&self, rpc: &'static str) -> Option<KvError> {
        self.inject.lock().get_mut(rpc).and_then(|q| q.pop_front())
    }

    pub fn has_lock(&self, key: &[u8]) -> bool {
        self.locks.lock().contains_key(key)
    }

    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn committed_value_exists(&self, key: &[u8]) -> bool {
        self.writes.lock().contains_key(key)
    }
}

#[async_trait]
impl KvAdapter for MockKvAdapter {
    async fn txn_prewrite(&self, req: PrewriteRequest) -> KvResult<()> {
        if let Some(err) = self.take_injected("prewrite") {
            return Err(err);
        }
        let mut locks = self.locks.lock();
        let writes = self.writes.lock();
        for m in &req.mutations {
            if let Some(write) = writes.get(&m.key) {
                if write.commit_ts > req.start_ts {
                    return Err(KvError::WriteConflict {
                        key: m.key.clone(),
                        conflict_start_ts: write.start_ts,
                        conflict_commit_ts: write.commit_ts,
                    });
                }
            }
            locks.insert(
                m.key.clone(),
                LockRecord {
                    start_ts: req.start_ts,
                    for_update_ts: req.for_update_ts,
                    primary: m.key == req.primary_key,
                },
            );
        }
        Ok(())
    }

    async fn txn_commit(&self, req: CommitRequest) -> KvResult<bool> {
        if let Some(err) = self.take_injected("commit") {
            return Err(err);
        }
        let mut locks = self.locks.lock();
        let mut writes = self.writes.lock();
        let mut any = false;
        for (_, _, key) in &req.keys {
            if let Some(lock) = locks.get(key) {
                if lock.start_ts == req.start_ts {
                    writes.insert(
                        key.clone(),
                        WriteRecord { start_ts: req.start_ts, commit_ts: req.commit_ts },
                    );
                    locks.remove(key);
                    any = true;
                }
            }
        }
        Ok(any || req.keys.is_empty())
    }

    async fn txn_pessimistic_lock(&self, req: PessimisticLockRequest) -> KvResult<()> {
        if let Some(err) = self.take_injected("pessimistic_lock") {
            return Err(err);
        }
        let mut locks = self.locks.lock();
        for (_, _, key) in &req.keys {
            if let Some(existing) = locks.get(key) {
                if existing.start_ts != req.start_ts {
                    return Err(KvError::LockTimeout);
                }
            }
            locks.insert(
                key.clone(),
                LockRecord {
                    start_ts: req.start_ts,
                    for_update_ts: Some(req.for_update_ts),
                    primary: *key == req.primary_key,
                },
            );
        }
        Ok(())
    }

    async fn txn_pessimistic_rollback(&self, req: PessimisticRollbackRequest) -> KvResult<()> {
        let mut locks = self.locks.lock();
        for (_, _, key) in &req.keys {
            if let Some(existing) = locks.get(key) {
                if existing.start_ts == req.start_ts {
                    locks.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn txn_heartbeat(&self, req: HeartbeatRequest) -> KvResult<u64> {
        let mut locks = self.locks.lock();
        if locks.contains_key(&req.primary_key) {
            Ok(req.new_ttl)
        } else {
            Err(KvError::Other("lock not found".into()))
        }
    }

    async fn txn_batch_rollback(&self, req: BatchRollbackRequest) -> KvResult<()> {
        let mut locks = self.locks.lock();
        for (_, _, key) in &req.keys {
            if let Some(existing) = locks.get(key) {
                if existing.start_ts == req.start_ts {
                    locks.remove(key);
                }
            }
        }
        Ok(())
    }
}
