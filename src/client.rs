//! The coordinator's front door (§2): one [`Client`] per embedding process, shared
//! across every connection. Modeled on the teacher's `TransactionClient` — `new`,
//! `begin`/`begin_with_options`, plus the kill surface a session needs to implement
//! `KILL QUERY`/`KILL CONNECTION`.

use std::sync::Arc;

use slog::Logger;

use crate::config::{SessionConfig, TransactionOptions};
use crate::executor::ExecutorPools;
use crate::kv::KvAdapter;
use crate::partition::{PartitionResolver, StaticPartitionResolver};
use crate::timestamp::TimestampSource;
use crate::transaction::{ConnectionId, Environment, Transaction, TxnId};

/// Constructs a [`Client`] with the pieces it needs wired in: the store adapter, the
/// timestamp source, and (optionally) a partition resolver and executor pool sizing.
/// Mirrors the teacher's `TransactionClient::new_with_config` builder shape.
pub struct ClientBuilder {
    server_id: u64,
    kv: Arc<dyn KvAdapter>,
    tso: Arc<dyn TimestampSource>,
    partition_resolver: Arc<dyn PartitionResolver>,
    executors: ExecutorPools,
    logger: Logger,
}

impl ClientBuilder {
    pub fn new(server_id: u64, kv: Arc<dyn KvAdapter>, tso: Arc<dyn TimestampSource>) -> Self {
        ClientBuilder {
            server_id,
            kv,
            tso,
            partition_resolver: Arc::new(StaticPartitionResolver),
            executors: ExecutorPools::default(),
            logger: default_logger(),
        }
    }

    pub fn partition_resolver(mut self, resolver: Arc<dyn PartitionResolver>) -> Self {
        self.partition_resolver = resolver;
        self
    }

    pub fn executor_pools(mut self, commit_capacity: usize, cleanup_capacity: usize) -> Self {
        self.executors = ExecutorPools::new(commit_capacity, cleanup_capacity);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Client {
        Client {
            env: Environment::new(self.server_id),
            kv: self.kv,
            tso: self.tso,
            partition_resolver: self.partition_resolver,
            executors: Arc::new(self.executors),
            logger: self.logger,
        }
    }
}

/// Builds the `slog`/`slog-term`/`slog-async` drain the teacher wires up by default —
/// a real embedding frontend is expected to pass its own `Logger` in via
/// [`ClientBuilder::logger`] instead (§6.1).
fn default_logger() -> Logger {
    use slog::{o, Drain};
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("component" => "kvtxn-coordinator"))
}

/// The coordinator's entry point: owns the shared [`Environment`] (transaction
/// registry, table-lock manager) and the collaborators every transaction is built
/// from. One `Client` per process; every `begin*` call produces an independent
/// [`Transaction`] sharing this state.
#[derive(Clone)]
pub struct Client {
    env: Arc<Environment>,
    kv: Arc<dyn KvAdapter>,
    tso: Arc<dyn TimestampSource>,
    partition_resolver: Arc<dyn PartitionResolver>,
    executors: Arc<ExecutorPools>,
    logger: Logger,
}

impl Client {
    /// Begins a transaction using the kind and limits implied by `session` (§6).
    pub async fn begin(&self, connection_id: ConnectionId, session: &SessionConfig) -> crate::error::Result<Arc<Transaction>> {
        self.begin_with_options(connection_id, TransactionOptions::from_session(session)).await
    }

    /// Begins a transaction with explicit options, bypassing session defaults — the
    /// path `BEGIN PESSIMISTIC`/`BEGIN OPTIMISTIC` or an internal retry takes.
    pub async fn begin_with_options(
        &self,
        connection_id: ConnectionId,
        options: TransactionOptions,
    ) -> crate::error::Result<Arc<Transaction>> {
        let start_ts = self.tso.tso().await.map_err(crate::error::Error::TimestampSource)?;
        let id = self.env.next_txn_id(start_ts);
        let logger = self.logger.new(slog::o!("start_ts" => start_ts, "connection_id" => connection_id));
        Ok(Transaction::new(
            id,
            connection_id,
            self.env.clone(),
            self.kv.clone(),
            self.tso.clone(),
            self.partition_resolver.clone(),
            self.executors.clone(),
            options,
            logger,
        ))
    }

    /// `KILL QUERY`/`KILL CONNECTION` (§4.6): cancels every transaction registered on
    /// `connection_id`, regardless of which connection issues the kill.
    pub fn kill_connection(&self, connection_id: ConnectionId) {
        self.env.kill_connection(connection_id);
    }

    pub fn kill_transaction(&self, id: TxnId) {
        self.env.kill_transaction(id);
    }

    pub fn environment(&self) -> Arc<Environment> {
        self.env.clone()
    }
}
