//! Contract for the underlying key-value store. The store's own server-side MVCC
//! implementation and region router are out of scope for this crate (§1); everything
//! here is the thin typed-RPC surface the coordinator drives.

mod mock;
mod mutation;

pub use mock::MockKvAdapter;
pub use mutation::{Mutation, Op};

use async_trait::async_trait;

pub type TableId = u64;
pub type PartitionId = u64;

/// Errors a real store RPC can fail with. Distinct from [`crate::Error`]: these are
/// the raw signals the retry engine (§4.7) pattern-matches on; most never escape the
/// coordinator as-is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("write conflict on key {key:?}")]
    WriteConflict {
        key: Vec<u8>,
        conflict_start_ts: u64,
        conflict_commit_ts: u64,
    },
    #[error("duplicate entry for key {0:?}")]
    DuplicateEntry(Vec<u8>),
    #[error("region split while serving key {key:?}")]
    RegionSplit {
        key: Vec<u8>,
        stale_partition_id: PartitionId,
    },
    #[error("commit_ts {commit_ts} expired")]
    CommitTsExpired { commit_ts: u64 },
    #[error("lock wait timeout")]
    LockTimeout,
    #[error("store error: {0}")]
    Other(String),
}

pub type KvResult<T> = std::result::Result<T, KvError>;

#[derive(Debug, Clone)]
pub struct PrewriteRequest {
    pub start_ts: u64,
    pub primary_key: Vec<u8>,
    pub mutations: Vec<Mutation>,
    pub lock_ttl: u64,
    pub for_update_ts: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub start_ts: u64,
    pub commit_ts: u64,
    pub keys: Vec<(TableId, PartitionId, Vec<u8>)>,
}

#[derive(Debug, Clone)]
pub struct PessimisticLockRequest {
    pub start_ts: u64,
    pub for_update_ts: u64,
    pub primary_key: Vec<u8>,
    pub keys: Vec<(TableId, PartitionId, Vec<u8>)>,
    pub lock_ttl: u64,
}

#[derive(Debug, Clone)]
pub struct PessimisticRollbackRequest {
    pub start_ts: u64,
    pub for_update_ts: u64,
    pub keys: Vec<(TableId, PartitionId, Vec<u8>)>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub start_ts: u64,
    pub primary_key: Vec<u8>,
    pub new_ttl: u64,
}

#[derive(Debug, Clone)]
pub struct BatchRollbackRequest {
    pub start_ts: u64,
    pub keys: Vec<(TableId, PartitionId, Vec<u8>)>,
}

/// The typed RPC surface of the store (§6). Modeled as a trait so the coordinator is
/// generic over it and so tests can supply [`MockKvAdapter`] instead of a live cluster.
#[async_trait]
pub trait KvAdapter: Send + Sync + 'static {
    async fn txn_prewrite(&self, req: PrewriteRequest) -> KvResult<()>;

    /// Returns `Ok(true)` when the key committed, `Ok(false)` when the commit RPC
    /// reports the key was already resolved as missing (treated as success by the
    /// caller per §4.2(ii)) or genuinely did not commit within this call.
    async fn txn_commit(&self, req: CommitRequest) -> KvResult<bool>;

    async fn txn_pessimistic_lock(&self, req: PessimisticLockRequest) -> KvResult<()>;

    async fn txn_pessimistic_rollback(&self, req: PessimisticRollbackRequest) -> KvResult<()>;

    /// Returns the TTL the store actually applied (it may clamp the requested value).
    async fn txn_heartbeat(&self, req: HeartbeatRequest) -> KvResult<u64>;

    async fn txn_batch_rollback(&self, req: BatchRollbackRequest) -> KvResult<()>;
}
