//! A client-side distributed transaction coordinator for a sharded MVCC key-value
//! store: two-phase commit over pluggable [`kv`], [`timestamp`], and [`partition`]
//! collaborators, with both optimistic and pessimistic isolation (§2).
//!
//! The store's own MVCC engine, region router, and timestamp oracle are out of scope
//! (§1) — this crate drives them through the [`kv::KvAdapter`], [`partition::PartitionResolver`],
//! and [`timestamp::TimestampSource`] traits respectively, so it can be exercised
//! against [`kv::MockKvAdapter`] and [`timestamp::MockTimestampSource`] without a live
//! cluster.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod kv;
pub mod partition;
pub mod retry;
pub mod timestamp;
pub mod transaction;

pub use client::{Client, ClientBuilder};
pub use config::{HeartbeatOption, IsolationLevel, SessionConfig, SqlIsolationLevel, TransactionOptions, TxnMode};
pub use error::{Error, Result};
pub use transaction::{ConnectionId, Status, Transaction, TxnId};
