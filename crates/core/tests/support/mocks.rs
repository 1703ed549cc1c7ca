//! Mock port implementations for testing
//!
//! Every mock is thread-safe and records what the engine asked of it, so
//! tests assert on behaviour instead of internals.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use outpost_core::sync::ports::{
    ConnectivityProbe, KeyValueStore, LocalRecordStore, SyncTransport,
};
use outpost_domain::{
    ConnectionKind, EntityKind, OutpostError, Result as DomainResult, SyncRequest, TransportError,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};

/// In-memory `KeyValueStore` with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OutpostError::Storage("simulated write failure".into()));
        }
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Scripted outcome for one attempt.
#[derive(Debug, Clone)]
pub enum Behavior {
    Fail(TransportError),
    Panic,
}

/// `SyncTransport` that succeeds unless a behaviour is scripted for the
/// request's idempotency key.
#[derive(Default)]
pub struct ScriptedTransport {
    requests: Mutex<Vec<SyncRequest>>,
    script: Mutex<HashMap<String, VecDeque<Behavior>>>,
    always_fail: Mutex<Option<TransportError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedTransport {
    /// Fail the next attempt for `id` with `error`.
    pub fn fail_once(&self, id: &str, error: TransportError) {
        self.script.lock().entry(id.to_string()).or_default().push_back(Behavior::Fail(error));
    }

    pub fn panic_once(&self, id: &str) {
        self.script.lock().entry(id.to_string()).or_default().push_back(Behavior::Panic);
    }

    /// Fail every unscripted attempt until cleared with `None`.
    pub fn fail_all(&self, error: Option<TransportError>) {
        *self.always_fail.lock() = error;
    }

    /// Block every send until [`release`](Self::release) is called.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Every request seen, in attempt order.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// Idempotency keys of every attempt, in order.
    pub fn attempted_ids(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.idempotency_key.clone()).collect()
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn send(&self, request: &SyncRequest) -> std::result::Result<(), TransportError> {
        self.requests.lock().push(request.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let scripted = self
            .script
            .lock()
            .get_mut(&request.idempotency_key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Behavior::Fail(error)) => Err(error),
            Some(Behavior::Panic) => panic!("transport exploded for {}", request.idempotency_key),
            None => match self.always_fail.lock().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            },
        }
    }
}

/// Records `mark_synced` calls; can be told to fail.
#[derive(Default)]
pub struct RecordingLocalStore {
    synced: Mutex<Vec<(EntityKind, String)>>,
    fail: AtomicBool,
}

impl RecordingLocalStore {
    pub fn synced_ids(&self) -> Vec<String> {
        self.synced.lock().iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalRecordStore for RecordingLocalStore {
    async fn mark_synced(&self, kind: EntityKind, id: &str) -> DomainResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutpostError::Storage("local store unavailable".into()));
        }
        self.synced.lock().push((kind, id.to_string()));
        Ok(())
    }
}

/// Connectivity probe driven by the test.
pub struct FakeProbe {
    kinds: Mutex<Vec<ConnectionKind>>,
    fail_checks: AtomicBool,
    sender: broadcast::Sender<Vec<ConnectionKind>>,
}

impl FakeProbe {
    pub fn new(kinds: Vec<ConnectionKind>) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { kinds: Mutex::new(kinds), fail_checks: AtomicBool::new(false), sender }
    }

    pub fn online() -> Self {
        Self::new(vec![ConnectionKind::Wifi])
    }

    pub fn offline() -> Self {
        Self::new(vec![ConnectionKind::None])
    }

    /// Change the reported links and notify subscribers.
    pub fn report(&self, kinds: Vec<ConnectionKind>) {
        *self.kinds.lock() = kinds.clone();
        let _ = self.sender.send(kinds);
    }

    pub fn go_offline(&self) {
        self.report(vec![ConnectionKind::None]);
    }

    pub fn go_online(&self) {
        self.report(vec![ConnectionKind::Wifi]);
    }

    pub fn fail_checks(&self, fail: bool) {
        self.fail_checks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for FakeProbe {
    async fn check(&self) -> DomainResult<Vec<ConnectionKind>> {
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(OutpostError::Internal("probe unavailable".into()));
        }
        Ok(self.kinds.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<ConnectionKind>> {
        self.sender.subscribe()
    }
}
