//! The per-transaction mutation buffer, informally "the cache" (§4.4).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::kv::{Mutation, Op, PartitionId, TableId};

/// Ordered multimap keyed by `(table_id, key)`, preserving insertion order of the
/// *first* write to each key so primary-key selection is deterministic across
/// retries (§4.4 invariant). Guarded by a `Mutex` rather than `&mut self` access
/// alone because the cleanup task (§4.2.1) drops the buffer from a pool thread after
/// the owning connection has moved on.
#[derive(Default)]
pub struct MutationBuffer {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Mutation>,
    index: HashMap<(TableId, Vec<u8>), usize>,
}

impl MutationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `mutation` into the buffer, applying the op-merge rules for any
    /// existing entry at the same `(table_id, key)` and otherwise appending.
    pub fn put(&self, mutation: Mutation) {
        let mut inner = self.inner.lock();
        let index_key = (mutation.table_id, mutation.key.clone());
        if let Some(&slot) = inner.index.get(&index_key) {
            let merged_op = Op::merge(inner.entries[slot].op, mutation.op);
            let mut merged = mutation;
            merged.op = merged_op;
            inner.entries[slot] = merged;
        } else {
            let slot = inner.entries.len();
            inner.entries.push(mutation);
            inner.index.insert(index_key, slot);
        }
    }

    /// True if this buffer has any mutation at all.
    pub fn has_any(&self) -> bool {
        !self.inner.lock().entries.is_empty()
    }

    /// Whether `commit()` should proceed into prewrite at all — an empty buffer is a
    /// no-op commit per §4.1/§4.4, so the state machine calls this before entering
    /// `PreWriteStart` rather than inlining `has_any`.
    pub fn check_continue(&self) -> bool {
        self.has_any()
    }

    /// The first mutation ever buffered — the primary key for this transaction
    /// (§3: "Chosen as the first mutation buffered").
    pub fn primary(&self) -> Option<Mutation> {
        self.inner.lock().entries.first().cloned()
    }

    /// All buffered mutations, grouped by partition, in the order each partition was
    /// first seen (stable — not a `HashMap` — because the primary key's partition
    /// must be the first one a caller processes; see §4.4.1).
    pub fn iter_by_partition(&self) -> Vec<(PartitionId, Vec<Mutation>)> {
        let inner = self.inner.lock();
        let mut order: Vec<PartitionId> = Vec::new();
        let mut groups: HashMap<PartitionId, Vec<Mutation>> = HashMap::new();
        for m in &inner.entries {
            groups.entry(m.partition_id).or_insert_with(|| {
                order.push(m.partition_id);
                Vec::new()
            });
            groups.get_mut(&m.partition_id).unwrap().push(m.clone());
        }
        order.into_iter().map(|p| (p, groups.remove(&p).unwrap())).collect()
    }

    /// All mutations excluding the primary, still grouped by partition — what the
    /// secondary-prewrite and secondary-commit jobs iterate (§4.2(iv), §4.2.1).
    pub fn secondaries_by_partition(&self) -> Vec<(PartitionId, Vec<Mutation>)> {
        let primary = self.primary();
        self.iter_by_partition()
            .into_iter()
            .filter_map(|(p, mutations)| {
                let filtered: Vec<_> = mutations
                    .into_iter()
                    .filter(|m| Some(m) != primary.as_ref())
                    .collect();
                if filtered.is_empty() { None } else { Some((p, filtered)) }
            })
            .collect()
    }

    /// All buffered keys as `(table_id, partition_id, key)` triples, the shape the
    /// KV adapter's commit/rollback RPCs take.
    pub fn all_keys(&self) -> Vec<(TableId, PartitionId, Vec<u8>)> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|m| (m.table_id, m.partition_id, m.key.clone()))
            .collect()
    }

    /// Refreshes the partition id recorded for `key` after a region split (§3:
    /// "partition-id may be refreshed on region-split").
    pub fn reassign_partition(&self, table_id: TableId, key: &[u8], new_partition_id: PartitionId) {
        let mut inner = self.inner.lock();
        if let Some(&slot) = inner.index.get(&(table_id, key.to_vec())) {
            inner.entries[slot].partition_id = new_partition_id;
        }
    }

    /// Drops every buffered mutation; invoked by the cleanup job (§4.4: `drop()`, `O(buffer)`).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.index.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(table: TableId, partition: PartitionId, key: &[u8], value: &[u8]) -> Mutation {
        Mutation::put(table, partition, key.to_vec(), value.to_vec())
    }

    #[test]
    fn first_write_wins_primary_selection() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"b", b"2"));
        buf.put(put(1, 0, b"a", b"1"));
        assert_eq!(buf.primary().unwrap().key, b"b");
    }

    #[test]
    fn merge_delete_then_put_is_delete() {
        let buf = MutationBuffer::new();
        buf.put(Mutation::delete(1, 0, b"k".to_vec()));
        buf.put(put(1, 0, b"k", b"v"));
        let m = buf.primary().unwrap();
        assert_eq!(m.op, Op::Delete);
    }

    #[test]
    fn merge_put_then_delete_is_put() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"k", b"v"));
        buf.put(Mutation::delete(1, 0, b"k".to_vec()));
        assert_eq!(buf.primary().unwrap().op, Op::Put);
    }

    #[test]
    fn merge_check_not_exists_then_put_is_put_if_absent() {
        let buf = MutationBuffer::new();
        buf.put(Mutation::check_not_exists(1, 0, b"k".to_vec()));
        buf.put(put(1, 0, b"k", b"v"));
        assert_eq!(buf.primary().unwrap().op, Op::PutIfAbsent);
    }

    #[test]
    fn later_write_supersedes_without_new_slot() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"k", b"v1"));
        buf.put(put(1, 0, b"k", b"v2"));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.primary().unwrap().value, b"v2");
    }

    #[test]
    fn iteration_order_within_partition_is_first_insertion_order() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"c", b"3"));
        buf.put(put(1, 0, b"a", b"1"));
        buf.put(put(1, 0, b"b", b"2"));
        // Overwrite "a" later; it should not move position.
        buf.put(put(1, 0, b"a", b"1-updated"));
        let groups = buf.iter_by_partition();
        assert_eq!(groups.len(), 1);
        let keys: Vec<_> = groups[0].1.iter().map(|m| m.key.clone()).collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn partitions_are_grouped_in_first_seen_order() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 2, b"x", b"1"));
        buf.put(put(1, 1, b"y", b"1"));
        buf.put(put(1, 2, b"z", b"1"));
        let groups = buf.iter_by_partition();
        let partitions: Vec<_> = groups.iter().map(|(p, _)| *p).collect();
        assert_eq!(partitions, vec![2, 1]);
    }

    #[test]
    fn secondaries_exclude_primary() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"primary", b"1"));
        buf.put(put(1, 0, b"secondary", b"2"));
        let secondaries = buf.secondaries_by_partition();
        let keys: Vec<_> = secondaries[0].1.iter().map(|m| m.key.clone()).collect();
        assert_eq!(keys, vec![b"secondary".to_vec()]);
    }

    #[test]
    fn clear_empties_buffer() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"k", b"v"));
        assert!(buf.has_any());
        buf.clear();
        assert!(!buf.has_any());
        assert!(buf.primary().is_none());
    }

    #[test]
    fn reassign_partition_on_region_split() {
        let buf = MutationBuffer::new();
        buf.put(put(1, 0, b"k", b"v"));
        buf.reassign_partition(1, b"k", 7);
        assert_eq!(buf.primary().unwrap().partition_id, 7);
    }
}
