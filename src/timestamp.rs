//! The timestamp oracle is used only through a monotonic timestamp source (§1 non-goals);
//! the oracle's own implementation is out of scope.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

pub type Timestamp = u64;

/// A source of strictly monotonic 64-bit timestamps within a process (§6: `tso()`).
#[async_trait]
pub trait TimestampSource: Send + Sync + 'static {
    async fn tso(&self) -> anyhow::Result<Timestamp>;
}

/// An in-process TSO stand-in for tests: a single atomic counter, monotonic by
/// construction and cheap enough to call from a tight retry loop.
pub struct MockTimestampSource {
    next: AtomicU64,
}

impl MockTimestampSource {
    pub fn new(start: Timestamp) -> Self {
        MockTimestampSource { next: AtomicU64::new(start) }
    }
}

impl Default for MockTimestampSource {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl TimestampSource for MockTimestampSource {
    async fn tso(&self) -> anyhow::Result<Timestamp> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
