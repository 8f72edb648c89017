//! Session-level configuration (§6). These are the knobs an embedding frontend
//! exposes as session variables; the coordinator has no config file or on-disk state
//! of its own.

use std::time::Duration;

/// Default transaction kind when a session opens a transaction without specifying one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    Optimistic,
    Pessimistic,
}

/// `transaction_isolation` session variable (§6), mapped onto the two levels the
/// coordinator actually implements. Stricter levels than snapshot-isolation are
/// accepted and degrade rather than rejected — see DESIGN.md's Open Question 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlIsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    SnapshotIsolation,
}

impl SqlIsolationLevel {
    /// `REPEATABLE-READ` and `SERIALIZABLE` both degrade to snapshot-isolation, since
    /// this store only offers start-ts/commit-ts MVCC snapshot reads, not true
    /// serializability. `READ-UNCOMMITTED` also degrades up to `READ-COMMITTED`: the
    /// store has no dirty-read path.
    pub fn to_coordinator_level(self) -> IsolationLevel {
        match self {
            SqlIsolationLevel::ReadUncommitted | SqlIsolationLevel::ReadCommitted => {
                IsolationLevel::ReadCommitted
            }
            SqlIsolationLevel::RepeatableRead | SqlIsolationLevel::Serializable => {
                IsolationLevel::SnapshotIsolation
            }
        }
    }
}

/// Whether and how often a pessimistic transaction's primary lock is refreshed (§4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOption {
    NoHeartbeat,
    FixedTime(Duration),
}

impl Default for HeartbeatOption {
    fn default() -> Self {
        // TTL/3 cadence against the default lock TTL used across this codebase family.
        HeartbeatOption::FixedTime(Duration::from_secs(7))
    }
}

/// The bundle of session variables that shape one transaction's behavior (§6).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub txn_mode: TxnMode,
    pub lock_wait_timeout: Duration,
    pub max_execution_time: Option<Duration>,
    pub txn_retry: bool,
    pub txn_retry_cnt: u32,
    pub transaction_isolation: SqlIsolationLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            txn_mode: TxnMode::Optimistic,
            lock_wait_timeout: Duration::from_secs(50),
            max_execution_time: None,
            txn_retry: false,
            txn_retry_cnt: 0,
            transaction_isolation: SqlIsolationLevel::RepeatableRead,
        }
    }
}

/// Per-transaction options, built fluently the way the teacher's `TransactionOptions`
/// is (`TransactionOptions::new_optimistic().heartbeat_option(...)`).
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub(crate) mode: TxnMode,
    pub(crate) isolation_level: IsolationLevel,
    pub(crate) auto_commit: bool,
    pub(crate) heartbeat_option: HeartbeatOption,
    pub(crate) lock_wait_timeout: Duration,
    pub(crate) max_execution_time: Option<Duration>,
    pub(crate) txn_retry_cnt: u32,
}

impl TransactionOptions {
    pub fn new_optimistic() -> Self {
        TransactionOptions {
            mode: TxnMode::Optimistic,
            isolation_level: IsolationLevel::SnapshotIsolation,
            auto_commit: false,
            heartbeat_option: HeartbeatOption::NoHeartbeat,
            lock_wait_timeout: Duration::from_secs(50),
            max_execution_time: None,
            txn_retry_cnt: 0,
        }
    }

    pub fn new_pessimistic() -> Self {
        TransactionOptions {
            mode: TxnMode::Pessimistic,
            heartbeat_option: HeartbeatOption::default(),
            ..Self::new_optimistic()
        }
    }

    pub fn from_session(config: &SessionConfig) -> Self {
        let mut opts = match config.txn_mode {
            TxnMode::Optimistic => Self::new_optimistic(),
            TxnMode::Pessimistic => Self::new_pessimistic(),
        };
        opts.isolation_level = config.transaction_isolation.to_coordinator_level();
        opts.lock_wait_timeout = config.lock_wait_timeout;
        opts.max_execution_time = config.max_execution_time;
        opts.txn_retry_cnt = if config.txn_retry { config.txn_retry_cnt } else { 0 };
        opts
    }

    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn heartbeat_option(mut self, option: HeartbeatOption) -> Self {
        self.heartbeat_option = option;
        self
    }

    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn max_execution_time(mut self, timeout: Duration) -> Self {
        self.max_execution_time = Some(timeout);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.txn_retry_cnt = count;
        self
    }

    pub fn is_pessimistic(&self) -> bool {
        matches!(self.mode, TxnMode::Pessimistic)
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::new_optimistic()
    }
}
