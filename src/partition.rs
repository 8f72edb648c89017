//! Partition routing is an explicit non-goal (§1: "Metadata/catalog service and
//! partition routing"); the region-split retry path (§4.7) still needs a seam to
//! re-resolve a key's partition, so this trait models that external collaborator by
//! contract only.

use async_trait::async_trait;

use crate::kv::{PartitionId, TableId};

#[async_trait]
pub trait PartitionResolver: Send + Sync + 'static {
    /// Re-resolves the partition serving `(table_id, key)` after the store reported
    /// `stale_partition_id` as split. A real implementation would consult the
    /// metadata/catalog service; this crate only needs to call back into it between
    /// retries.
    async fn resolve(
        &self,
        table_id: TableId,
        key: &[u8],
        stale_partition_id: PartitionId,
    ) -> anyhow::Result<PartitionId>;
}

/// The degenerate resolver used when no real router is wired in: echoes back the
/// stale id unchanged. A `RegionSplit` retry under this resolver still retries the
/// RPC — the store may have finished its own rebalance by the next attempt — it just
/// never changes the partition id the coordinator sends.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPartitionResolver;

#[async_trait]
impl PartitionResolver for StaticPartitionResolver {
    async fn resolve(
        &self,
        _table_id: TableId,
        _key: &[u8],
        stale_partition_id: PartitionId,
    ) -> anyhow::Result<PartitionId> {
        Ok(stale_partition_id)
    }
}
