//! Drains the durable queue through the transport.
//!
//! The orchestrator owns the published [`SyncState`]. One drain runs at a
//! time; overlapping triggers return [`DrainOutcome::AlreadyRunning`]
//! immediately. A drain attempts each queued item at most once, so a failing
//! item cannot starve the rest of the queue.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use outpost_common::sync::{BackoffCalculator, EventChannel};
use outpost_common::testing::Clock;
use outpost_common::time::TimerSlot;
use outpost_domain::constants::DEFAULT_MAX_RETRIES;
use outpost_domain::{Result, SyncItem, SyncRequest, SyncState, SyncStatus};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::ports::{LocalRecordStore, SyncTransport};
use crate::sync::queue::{truncate_reason, DurableQueue, FailureOutcome};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Failed attempts before an item is dead-lettered
    pub max_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES }
    }
}

/// What a call to [`SyncOrchestrator::sync_pending_items`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain holds the single-flight flag
    AlreadyRunning,
    Offline,
    Disposed,
    /// Nothing pending
    Empty,
    Completed(DrainReport),
}

/// Per-drain counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// The drain stopped early (offline, dispose, or a queue write failure)
    pub interrupted: bool,
}

enum Attempt {
    Delivered,
    Failed(String),
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    queue: Arc<DurableQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    transport: Arc<dyn SyncTransport>,
    local_store: Arc<dyn LocalRecordStore>,
    backoff: BackoffCalculator,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    state: RwLock<SyncState>,
    states: EventChannel<SyncState>,
    draining: AtomicBool,
    disposed: AtomicBool,
    cancel: CancellationToken,
    deferred: TimerSlot,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Outbox drain state machine. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &*self.inner.state.read())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Wire an orchestrator. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        queue: Arc<DurableQueue>,
        connectivity: Arc<ConnectivityMonitor>,
        transport: Arc<dyn SyncTransport>,
        local_store: Arc<dyn LocalRecordStore>,
        backoff: BackoffCalculator,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let initial = SyncState::initial(connectivity.is_online());
        Self {
            inner: Arc::new(Inner {
                queue,
                connectivity,
                transport,
                local_store,
                backoff,
                clock,
                config,
                state: RwLock::new(initial),
                states: EventChannel::default(),
                draining: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                deferred: TimerSlot::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Load the queue, publish the initial state and follow connectivity.
    ///
    /// Spawns a drain when online with pending items.
    ///
    /// # Errors
    /// Returns the storage error if the queue cannot be loaded; the state is
    /// then `Error`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        if let Err(err) = self.inner.queue.load().await {
            error!(error = %err, "Failed to load sync queue");
            let message = truncate_reason(&err.to_string());
            self.update_state(|state| {
                state.status = SyncStatus::Error;
                state.error_message = Some(message);
            });
            return Err(err);
        }

        let online = self.inner.connectivity.is_online();
        let (pending, failed) = self.counts();
        self.update_state(|state| {
            *state = SyncState {
                pending_count: pending,
                failed_count: failed,
                last_sync_at: state.last_sync_at,
                ..SyncState::initial(online)
            };
        });

        self.spawn_connectivity_listener();
        info!(pending, failed, online, "Sync orchestrator initialized");

        if online && pending > 0 {
            self.spawn_drain();
        }
        Ok(())
    }

    /// Deliver pending items until the queue is exhausted for this pass.
    #[instrument(skip(self))]
    pub async fn sync_pending_items(&self) -> DrainOutcome {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            return DrainOutcome::Disposed;
        }
        if inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress");
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = DrainGuard(&inner.draining);

        if !inner.connectivity.is_online() {
            self.update_state(|state| {
                state.status = SyncStatus::Offline;
                state.is_online = false;
            });
            return DrainOutcome::Offline;
        }
        if inner.queue.is_empty() {
            self.publish_counts();
            return DrainOutcome::Empty;
        }

        self.update_state(|state| {
            state.status = SyncStatus::Syncing;
            state.is_online = true;
        });
        info!(pending = inner.queue.pending_count(), "Starting sync drain");

        let mut report = DrainReport::default();
        let mut attempted = HashSet::new();
        let mut last_failure: Option<String> = None;

        loop {
            if inner.disposed.load(Ordering::Acquire) || !inner.connectivity.is_online() {
                report.interrupted = true;
                break;
            }
            let Some(item) = inner.queue.peek_excluding(&attempted) else {
                break;
            };
            attempted.insert(item.id.clone());

            let attempt = self.deliver(&item).await;
            if inner.disposed.load(Ordering::Acquire) {
                debug!(item_id = %item.id, "Result ignored after dispose");
                report.interrupted = true;
                break;
            }

            match attempt {
                Attempt::Delivered => match inner.queue.mark_completed(&item.id).await {
                    Ok(_) => {
                        report.delivered = report.delivered.saturating_add(1);
                        self.notify_local_store(&item).await;
                    }
                    Err(err) => {
                        error!(item_id = %item.id, error = %err, "mark_completed failed");
                        last_failure = Some(err.to_string());
                        report.interrupted = true;
                        break;
                    }
                },
                Attempt::Failed(message) => {
                    report.failed = report.failed.saturating_add(1);
                    last_failure = Some(message.clone());
                    match inner.queue.mark_failed(&item.id, &message, inner.config.max_retries).await
                    {
                        Ok(Some(FailureOutcome::Retrying { .. })) => {
                            self.publish_counts();
                            // Keyed on the count before this failure.
                            let delay = inner.backoff.delay_with_jitter(item.retry_count);
                            if !self.wait_backoff(delay).await {
                                report.interrupted = true;
                                break;
                            }
                        }
                        Ok(Some(FailureOutcome::DeadLettered)) => {
                            report.dead_lettered = report.dead_lettered.saturating_add(1);
                        }
                        Ok(None) => {
                            debug!(item_id = %item.id, "Item left the queue during delivery");
                        }
                        Err(err) => {
                            error!(item_id = %item.id, error = %err, "mark_failed failed");
                            last_failure = Some(err.to_string());
                            report.interrupted = true;
                            break;
                        }
                    }
                }
            }

            self.publish_counts();
        }

        self.finish_drain(&report, last_failure);
        DrainOutcome::Completed(report)
    }

    /// Queue an item for delivery. Returns `false` for a duplicate id.
    ///
    /// # Errors
    /// Propagates queue validation and storage errors.
    pub async fn enqueue(&self, item: SyncItem) -> Result<bool> {
        let added = self.inner.queue.enqueue(item).await?;
        if added {
            self.publish_counts();
        }
        Ok(added)
    }

    /// Return every dead-lettered item to pending and drain if online.
    ///
    /// # Errors
    /// Propagates the queue's storage error.
    #[instrument(skip(self))]
    pub async fn retry_failed_items(&self) -> Result<usize> {
        let moved = self.inner.queue.retry_failed().await?;
        self.publish_counts();
        if self.inner.connectivity.is_online() {
            self.sync_pending_items().await;
        }
        Ok(moved)
    }

    /// Operator retry of one dead-lettered item.
    ///
    /// # Errors
    /// Propagates the queue's storage error.
    pub async fn retry_failed_item(&self, id: &str) -> Result<bool> {
        let moved = self.inner.queue.retry_failed_item(id).await?;
        if moved {
            self.publish_counts();
        }
        Ok(moved)
    }

    /// Drop one dead-lettered item for good.
    ///
    /// # Errors
    /// Propagates the queue's storage error.
    pub async fn discard_failed_item(&self, id: &str) -> Result<bool> {
        let removed = self.inner.queue.discard_failed(id).await?;
        if removed {
            self.publish_counts();
        }
        Ok(removed)
    }

    /// Cancel any deferred drain and drain now.
    pub async fn force_sync_now(&self) -> DrainOutcome {
        self.inner.deferred.cancel();
        self.sync_pending_items().await
    }

    /// (Re)arm the deferred drain. Each call restarts the delay.
    pub fn schedule_sync(&self, delay: Duration) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }
        let this = self.clone();
        self.inner.deferred.arm(delay, async move {
            let outcome = this.sync_pending_items().await;
            debug!(?outcome, "Deferred drain finished");
        });
    }

    /// Cancel a deferred drain. Returns `true` if one was armed.
    pub fn cancel_scheduled_sync(&self) -> bool {
        self.inner.deferred.cancel()
    }

    /// Whether a deferred drain is armed.
    pub fn has_scheduled_sync(&self) -> bool {
        self.inner.deferred.is_armed()
    }

    /// Pending items in delivery order.
    pub fn pending_items(&self) -> Vec<SyncItem> {
        self.inner.queue.pending_items()
    }

    /// Dead-lettered items, oldest first.
    pub fn failed_items(&self) -> Vec<SyncItem> {
        self.inner.queue.failed_items()
    }

    /// Number of pending items.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.pending_count()
    }

    /// Last known connectivity.
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Whether a drain is in flight.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Current state snapshot.
    pub fn state(&self) -> SyncState {
        self.inner.state.read().clone()
    }

    /// Subscribe to state snapshots published after every change.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncState> {
        self.inner.states.subscribe()
    }

    /// Cancel timers and subscriptions and close the state feed.
    ///
    /// A delivery already in flight completes, but its result is ignored.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.deferred.cancel();

        let listener = self.inner.listener.lock().take();
        if let Some(handle) = listener {
            if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
                warn!("Connectivity listener did not stop in time");
            }
        }

        self.inner.states.close();
        info!("Sync orchestrator disposed");
    }

    async fn deliver(&self, item: &SyncItem) -> Attempt {
        let request = SyncRequest::for_item(item);
        debug!(
            item_id = %item.id,
            method = %request.method,
            path = %request.path,
            retry_count = item.retry_count,
            "Delivering sync item"
        );

        match AssertUnwindSafe(self.inner.transport.send(&request)).catch_unwind().await {
            Ok(Ok(())) => {
                debug!(item_id = %item.id, "Delivered");
                Attempt::Delivered
            }
            Ok(Err(err)) => {
                warn!(item_id = %item.id, error = %err, "Delivery failed");
                Attempt::Failed(err.to_string())
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(item_id = %item.id, panic = %detail, "Transport panicked during delivery");
                Attempt::Failed(format!("transport panicked: {detail}"))
            }
        }
    }

    async fn notify_local_store(&self, item: &SyncItem) {
        if let Err(err) = self.inner.local_store.mark_synced(item.entity_kind, &item.id).await {
            warn!(
                item_id = %item.id,
                entity_kind = %item.entity_kind,
                error = %err,
                "Failed to mark local record as synced"
            );
        }
    }

    /// Sleep for `delay`; `false` if dispose interrupted the wait.
    async fn wait_backoff(&self, delay: Duration) -> bool {
        debug!(delay_ms = delay.as_millis(), "Backing off after failed delivery");
        tokio::select! {
            () = self.inner.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn finish_drain(&self, report: &DrainReport, last_failure: Option<String>) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }
        let online = self.inner.connectivity.is_online();
        let now = self.inner.clock.utc_now();
        let (pending, failed) = self.counts();

        self.update_state(|state| {
            state.pending_count = pending;
            state.failed_count = failed;
            state.is_online = online;
            if !online {
                state.status = SyncStatus::Offline;
            } else if let Some(message) = last_failure {
                state.status = SyncStatus::Error;
                state.error_message = Some(truncate_reason(&message));
            } else {
                state.status = SyncStatus::Idle;
                state.error_message = None;
                state.last_sync_at = Some(now);
            }
        });

        info!(
            delivered = report.delivered,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            interrupted = report.interrupted,
            pending,
            "Sync drain finished"
        );
    }

    fn spawn_drain(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.sync_pending_items().await;
        });
    }

    fn spawn_connectivity_listener(&self) {
        let mut guard = self.inner.listener.lock();
        if guard.is_some() {
            return;
        }
        let mut changes = self.inner.connectivity.changes();
        let cancel = self.inner.cancel.clone();
        let weak = Arc::downgrade(&self.inner);

        *guard = Some(tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    () = cancel.cancelled() => break,
                    message = changes.recv() => message,
                };
                let Some(inner) = weak.upgrade() else { break };
                let this = Self { inner };
                match message {
                    Ok(online) => this.on_connectivity(online),
                    Err(RecvError::Lagged(_)) => {
                        this.on_connectivity(this.inner.connectivity.is_online());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    fn on_connectivity(&self, online: bool) {
        self.update_state(|state| {
            state.is_online = online;
            if !online {
                state.status = SyncStatus::Offline;
            } else if state.status == SyncStatus::Offline {
                state.status = SyncStatus::Idle;
            }
        });
    }

    fn counts(&self) -> (usize, usize) {
        (self.inner.queue.pending_count(), self.inner.queue.failed_count())
    }

    fn publish_counts(&self) {
        let (pending, failed) = self.counts();
        self.update_state(|state| {
            state.pending_count = pending;
            state.failed_count = failed;
        });
    }

    fn update_state(&self, apply: impl FnOnce(&mut SyncState)) {
        let snapshot = {
            let mut state = self.inner.state.write();
            let before = state.clone();
            apply(&mut state);
            if *state == before {
                return;
            }
            state.clone()
        };
        if self.inner.states.emit(snapshot).is_err() {
            debug!("State change after dispose; not published");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
