#![cfg(feature = "integration-tests")]

use std::sync::Arc;
use std::time::Duration;

use kvtxn_coordinator::client::{Client, ClientBuilder};
use kvtxn_coordinator::kv::MockKvAdapter;
use kvtxn_coordinator::timestamp::MockTimestampSource;
use kvtxn_coordinator::TransactionOptions;
use slog::{o, Drain, Logger};

/// Everything a failpoint scenario needs: a `Client` wired to a [`MockKvAdapter`] the
/// test still holds directly, so it can assert on lock/write state the coordinator's
/// public API doesn't expose.
pub struct Harness {
    pub client: Client,
    pub kv: Arc<MockKvAdapter>,
}

pub fn new_harness() -> Harness {
    let kv = Arc::new(MockKvAdapter::new());
    let tso = Arc::new(MockTimestampSource::new(1));
    let client = ClientBuilder::new(1, kv.clone(), tso).logger(test_logger()).build();
    Harness { client, kv }
}

pub fn test_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("test" => true))
}

pub fn pessimistic_options() -> TransactionOptions {
    TransactionOptions::new_pessimistic().heartbeat_option(kvtxn_coordinator::HeartbeatOption::NoHeartbeat)
}

pub fn optimistic_options() -> TransactionOptions {
    TransactionOptions::new_optimistic()
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
