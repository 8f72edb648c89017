//! The two named bounded task pools secondary-commit and cleanup work are dispatched
//! onto (§5, design note §9): `exec-txn-commit` and `exec-txn-cleanup`. Modeled as a
//! thin wrapper over `tokio::spawn` gated by a `Semaphore` rather than a dedicated
//! `tokio::runtime::Runtime` — the coordinator is embedded inside a larger process
//! that already owns the main multi-threaded runtime, so it only needs to bound
//! concurrency, not own worker threads.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct BoundedExecutor {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl BoundedExecutor {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        BoundedExecutor { name, permits: Arc::new(Semaphore::new(capacity.max(1))) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawns `fut` once a permit is free. Never blocks the caller: the wait for a
    /// permit happens inside the spawned task, not on this thread, so callers that
    /// fire-and-forget secondary work (§4.2(iv)) never stall on pool saturation.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.expect("executor semaphore never closed");
            fut.await;
        })
    }
}

/// The pair of pools every transaction shares, named to match §5's
/// `exec-txnCommit`/`exec-txnCleanUp`.
pub struct ExecutorPools {
    pub commit: BoundedExecutor,
    pub cleanup: BoundedExecutor,
}

impl ExecutorPools {
    pub fn new(commit_capacity: usize, cleanup_capacity: usize) -> Self {
        ExecutorPools {
            commit: BoundedExecutor::new("exec-txn-commit", commit_capacity),
            cleanup: BoundedExecutor::new("exec-txn-cleanup", cleanup_capacity),
        }
    }
}

impl Default for ExecutorPools {
    fn default() -> Self {
        Self::new(32, 16)
    }
}
