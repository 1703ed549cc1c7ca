//! Shared helpers for `outpost-infra` integration tests.
//!
//! Wires the infra adapters (in-memory store, manual probe) into a full
//! engine with a counting transport, so scheduler tests observe drains by
//! the requests they send.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outpost_common::sync::BackoffCalculator;
use outpost_common::testing::SystemClock;
use outpost_core::{
    ConnectivityMonitor, DurableQueue, LocalRecordStore, OrchestratorConfig, SyncOrchestrator,
    SyncTransport,
};
use outpost_domain::{
    ConnectionKind, EntityKind, Priority, Result as DomainResult, SyncItem, SyncOperation,
    SyncRequest, TransportError,
};
use outpost_infra::observability::metrics::SchedulerMetrics;
use outpost_infra::{
    ManualConnectivityProbe, MemoryKeyValueStore, SyncScheduler, SyncSchedulerConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

/// Records every request; fails them all while `failing` is set.
#[derive(Default)]
pub struct CountingTransport {
    requests: Mutex<Vec<SyncRequest>>,
    failing: AtomicBool,
}

impl CountingTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn attempted_ids(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.idempotency_key.clone()).collect()
    }
}

#[async_trait]
impl SyncTransport for CountingTransport {
    async fn send(&self, request: &SyncRequest) -> Result<(), TransportError> {
        self.requests.lock().push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::ServerError(503));
        }
        Ok(())
    }
}

/// Accepts every `mark_synced` call.
#[derive(Default)]
pub struct NoopLocalStore;

#[async_trait]
impl LocalRecordStore for NoopLocalStore {
    async fn mark_synced(&self, _kind: EntityKind, _id: &str) -> DomainResult<()> {
        Ok(())
    }
}

pub struct TestEngine {
    pub probe: Arc<ManualConnectivityProbe>,
    pub transport: Arc<CountingTransport>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub orchestrator: SyncOrchestrator,
    pub scheduler: SyncScheduler,
}

impl TestEngine {
    pub fn go_online(&self) {
        self.probe.report(vec![ConnectionKind::Wifi]);
    }

    pub fn go_offline(&self) {
        self.probe.report(vec![ConnectionKind::None]);
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        self.scheduler.metrics()
    }
}

/// Scheduler settings with a long interval so only the test's own triggers
/// fire.
pub fn quiet_config() -> SyncSchedulerConfig {
    SyncSchedulerConfig {
        interval: Duration::from_secs(3600),
        reconnect_debounce: Duration::from_millis(500),
        join_timeout: Duration::from_secs(1),
    }
}

/// Initialized engine over an in-memory store; the scheduler is not started.
pub async fn engine(online: bool, config: SyncSchedulerConfig) -> TestEngine {
    let initial = if online { vec![ConnectionKind::Wifi] } else { vec![ConnectionKind::None] };
    let probe = Arc::new(ManualConnectivityProbe::new(initial));
    let transport = Arc::new(CountingTransport::default());

    let queue = Arc::new(DurableQueue::new(
        Arc::new(MemoryKeyValueStore::new()),
        Arc::new(SystemClock),
    ));
    let connectivity = Arc::new(ConnectivityMonitor::new(probe.clone()));
    connectivity.initialize().await;

    let backoff =
        BackoffCalculator::custom(Duration::from_millis(5), Duration::from_millis(20), 0.0)
            .expect("valid backoff");
    let orchestrator = SyncOrchestrator::new(
        queue,
        connectivity.clone(),
        transport.clone(),
        Arc::new(NoopLocalStore),
        backoff,
        Arc::new(SystemClock),
        OrchestratorConfig { max_retries: 10 },
    );
    orchestrator.initialize().await.expect("orchestrator initializes");

    let scheduler = SyncScheduler::new(
        orchestrator.clone(),
        connectivity.clone(),
        config,
        Arc::new(SchedulerMetrics::new()),
    );

    TestEngine { probe, transport, connectivity, orchestrator, scheduler }
}

pub fn session_item(id: &str) -> SyncItem {
    let payload = match json!({"id": id, "duration_secs": 90}) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    SyncItem::new(EntityKind::Session, SyncOperation::Create, payload)
        .with_id(id)
        .with_priority(Priority::Normal)
}

/// Let spawned tasks run; under paused time this also advances the clock.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
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

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(value) => value,
        Err(_) => panic!("operation timed out"),
    }
}
