//! Wires the mocks into a full engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use outpost_common::sync::BackoffCalculator;
use outpost_common::testing::MockClock;
use outpost_core::{ConnectivityMonitor, DurableQueue, OrchestratorConfig, SyncOrchestrator};
use outpost_domain::{EntityKind, Priority, SyncItem, SyncOperation};
use serde_json::{json, Map, Value};

use super::mocks::{FakeProbe, MemoryStore, RecordingLocalStore, ScriptedTransport};

pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub local_store: Arc<RecordingLocalStore>,
    pub probe: Arc<FakeProbe>,
    pub clock: Arc<MockClock>,
    pub queue: Arc<DurableQueue>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub orchestrator: SyncOrchestrator,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

/// Short, jitter-free backoff so retries do not slow tests down.
pub fn fast_backoff() -> BackoffCalculator {
    BackoffCalculator::custom(Duration::from_millis(5), Duration::from_millis(20), 0.0).unwrap()
}

/// Build an engine over `store` (so tests can simulate restarts).
pub async fn engine_with_store(
    store: Arc<MemoryStore>,
    probe: FakeProbe,
    max_retries: u32,
) -> Engine {
    build(store, probe, max_retries, fast_backoff()).await
}

/// Engine with a fresh store and the given backoff policy.
pub async fn engine_with_backoff(probe: FakeProbe, backoff: BackoffCalculator) -> Engine {
    build(Arc::new(MemoryStore::default()), probe, 5, backoff).await
}

async fn build(
    store: Arc<MemoryStore>,
    probe: FakeProbe,
    max_retries: u32,
    backoff: BackoffCalculator,
) -> Engine {
    let transport = Arc::new(ScriptedTransport::default());
    let local_store = Arc::new(RecordingLocalStore::default());
    let probe = Arc::new(probe);
    let clock = Arc::new(MockClock::starting_at_utc(base_time()));

    let queue = Arc::new(DurableQueue::new(store.clone(), clock.clone()));
    let connectivity = Arc::new(ConnectivityMonitor::new(probe.clone()));
    connectivity.initialize().await;

    let orchestrator = SyncOrchestrator::new(
        queue.clone(),
        connectivity.clone(),
        transport.clone(),
        local_store.clone(),
        backoff,
        clock.clone(),
        OrchestratorConfig { max_retries },
    );

    Engine { store, transport, local_store, probe, clock, queue, connectivity, orchestrator }
}

/// Engine with a fresh store. The orchestrator is not initialized.
pub async fn engine(probe: FakeProbe) -> Engine {
    engine_with_store(Arc::new(MemoryStore::default()), probe, 5).await
}

/// Item created `age_secs` before [`base_time`].
pub fn item(id: &str, priority: Priority, age_secs: i64) -> SyncItem {
    let payload = match json!({"id": id, "value": 42}) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    SyncItem::new(EntityKind::Session, SyncOperation::Create, payload)
        .with_id(id)
        .with_priority(priority)
        .with_created_at(base_time() - chrono::Duration::seconds(age_secs))
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `future` with a test-friendly timeout.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(value) => value,
        Err(_) => panic!("operation timed out"),
    }
}
