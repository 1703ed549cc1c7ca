//! Sync scheduler: periodic and reconnect triggers for the orchestrator.
//!
//! Every trigger is advisory. The orchestrator's single-flight guard collapses
//! overlapping drains, so the scheduler never waits for one to finish; drains
//! are spawned detached and outlive `stop()`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use outpost_core::{ConnectivityMonitor, SyncOrchestrator};
//! use outpost_infra::observability::metrics::SchedulerMetrics;
//! use outpost_infra::scheduling::{SyncScheduler, SyncSchedulerConfig};
//!
//! # async fn example(
//! #     orchestrator: SyncOrchestrator,
//! #     connectivity: Arc<ConnectivityMonitor>,
//! # ) -> Result<(), outpost_infra::SchedulerError> {
//! let scheduler = SyncScheduler::new(
//!     orchestrator,
//!     connectivity,
//!     SyncSchedulerConfig::default(),
//!     Arc::new(SchedulerMetrics::new()),
//! );
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outpost_core::{ConnectivityMonitor, SyncOrchestrator};
use outpost_domain::constants::{
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_PERIODIC_INTERVAL_SECS, DEFAULT_RECONNECT_DEBOUNCE_MS,
};
use outpost_domain::SyncConfig;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::observability::metrics::SchedulerMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for sync scheduler
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Periodic drain interval
    pub interval: Duration,
    /// Quiet period after coming online before draining
    pub reconnect_debounce: Duration,
    /// Upper bound for joining background tasks on stop/pause
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_PERIODIC_INTERVAL_SECS), // 5 minutes
            reconnect_debounce: Duration::from_millis(DEFAULT_RECONNECT_DEBOUNCE_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
        }
    }
}

impl From<&SyncConfig> for SyncSchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.periodic_interval().max(Duration::from_secs(1)),
            reconnect_debounce: config.reconnect_debounce(),
            join_timeout: config.join_timeout(),
        }
    }
}

/// Shared pieces handed to the background tasks
#[derive(Clone)]
struct TriggerContext {
    orchestrator: SyncOrchestrator,
    connectivity: Arc<ConnectivityMonitor>,
    metrics: Arc<SchedulerMetrics>,
}

impl TriggerContext {
    /// Spawn a detached drain if online.
    fn request_drain(&self, reason: &'static str) -> bool {
        if !self.connectivity.is_online() {
            debug!(reason, "Drain skipped while offline");
            return false;
        }
        log_metric(self.metrics.record_drain_request(), "scheduler.sync.drain_request");
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.sync_pending_items().await;
            debug!(reason, ?outcome, "Scheduled drain finished");
        });
        true
    }

    /// Immediate drain used on start/resume: only when work is waiting.
    fn request_drain_if_pending(&self, reason: &'static str) {
        if self.orchestrator.pending_count() > 0 {
            self.request_drain(reason);
        }
    }
}

/// Sync scheduler for periodic and reconnect-driven draining
pub struct SyncScheduler {
    context: TriggerContext,
    config: SyncSchedulerConfig,
    running: AtomicBool,
    paused: AtomicBool,
    cancellation_token: SyncMutex<CancellationToken>,
    periodic_token: SyncMutex<CancellationToken>,
    periodic_handle: TaskHandle,
    listener_handle: TaskHandle,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Create a new sync scheduler
    ///
    /// # Arguments
    ///
    /// * `orchestrator` - Drain target
    /// * `connectivity` - Source of online/offline transitions
    /// * `config` - Scheduler configuration
    /// * `metrics` - Trigger counters
    pub fn new(
        orchestrator: SyncOrchestrator,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncSchedulerConfig,
        metrics: Arc<SchedulerMetrics>,
    ) -> Self {
        Self {
            context: TriggerContext { orchestrator, connectivity, metrics },
            config,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cancellation_token: SyncMutex::new(CancellationToken::new()),
            periodic_token: SyncMutex::new(CancellationToken::new()),
            periodic_handle: Arc::new(Mutex::new(None)),
            listener_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler
    ///
    /// Follows connectivity changes, starts the periodic loop unless paused,
    /// and drains immediately when online with pending items.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&self) -> SchedulerResult<()> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!("Starting sync scheduler");

        // Fresh token so the scheduler can restart after stop
        let root = CancellationToken::new();
        *self.cancellation_token.lock() = root.clone();

        // Subscribe before spawning so a transition emitted ahead of the
        // task's first poll is not lost.
        let changes = self.context.connectivity.changes();
        let listener = tokio::spawn(Self::reconnect_loop(
            self.context.clone(),
            changes,
            self.config.reconnect_debounce,
            root.clone(),
        ));
        *self.listener_handle.lock().await = Some(listener);

        if !self.is_paused() {
            self.spawn_periodic(&root).await;
        }

        self.context.request_drain_if_pending("start");
        info!(interval_secs = self.config.interval.as_secs(), "Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the periodic loop, the connectivity listener and any armed
    /// debounce, then awaits the tasks. Drains already running are left to
    /// finish. Stopping a stopped scheduler is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if a background task does not finish within the join
    /// timeout or panicked
    #[instrument(skip(self))]
    pub async fn stop(&self) -> SchedulerResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!("Sync scheduler already stopped");
            return Ok(());
        }

        info!("Stopping sync scheduler");

        self.cancellation_token.lock().cancel();
        self.context.orchestrator.cancel_scheduled_sync();

        let periodic = self.periodic_handle.lock().await.take();
        let listener = self.listener_handle.lock().await.take();
        for handle in [periodic, listener].into_iter().flatten() {
            self.join(handle).await?;
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Stop the periodic loop only. Reconnect triggers and manual drains keep
    /// working.
    ///
    /// # Errors
    ///
    /// Returns error if the periodic task does not stop in time
    #[instrument(skip(self))]
    pub async fn pause(&self) -> SchedulerResult<()> {
        if self.paused.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.periodic_token.lock().cancel();

        let periodic = self.periodic_handle.lock().await.take();
        if let Some(handle) = periodic {
            self.join(handle).await?;
        }
        info!("Periodic sync paused");
        Ok(())
    }

    /// Restart the periodic loop and drain now when appropriate.
    #[instrument(skip(self))]
    pub async fn resume(&self) {
        if !self.paused.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.is_running() {
            let root = self.cancellation_token.lock().clone();
            self.spawn_periodic(&root).await;
            self.context.request_drain_if_pending("resume");
        }
        info!("Periodic sync resumed");
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether periodic ticks are paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Trigger counters.
    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.context.metrics
    }

    async fn spawn_periodic(&self, root: &CancellationToken) {
        let token = root.child_token();
        *self.periodic_token.lock() = token.clone();

        let handle = tokio::spawn(Self::periodic_loop(
            self.context.clone(),
            self.config.interval,
            token,
        ));
        if let Some(previous) = self.periodic_handle.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn join(&self, handle: JoinHandle<()>) -> SchedulerResult<()> {
        let join_timeout = self.config.join_timeout;
        tokio::time::timeout(join_timeout, handle)
            .await
            .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        Ok(())
    }

    /// Background periodic loop
    async fn periodic_loop(context: TriggerContext, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Periodic sync loop cancelled");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    log_metric(context.metrics.record_tick(), "scheduler.sync.tick");
                    context.request_drain("periodic");
                }
            }
        }
    }

    /// Background connectivity listener
    ///
    /// Every transition to online (re)arms the orchestrator's deferred drain;
    /// going offline disarms it.
    async fn reconnect_loop(
        context: TriggerContext,
        mut changes: broadcast::Receiver<bool>,
        debounce: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Reconnect listener cancelled");
                    break;
                }
                message = changes.recv() => message,
            };

            let online = match message {
                Ok(online) => online,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Connectivity feed lagged; using current state");
                    context.connectivity.is_online()
                }
                Err(RecvError::Closed) => {
                    debug!("Connectivity feed closed");
                    break;
                }
            };

            if online {
                log_metric(
                    context.metrics.record_reconnect_trigger(),
                    "scheduler.sync.reconnect_trigger",
                );
                debug!(debounce_ms = debounce.as_millis(), "Back online; drain debounced");
                context.orchestrator.schedule_sync(debounce);
            } else if context.orchestrator.cancel_scheduled_sync() {
                debug!("Went offline; pending reconnect drain cancelled");
            }
        }
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

/// Ensure background tasks stop when the scheduler is dropped
impl Drop for SyncScheduler {
    fn drop(&mut self) {
        let token = self.cancellation_token.get_mut();
        if self.running.load(Ordering::Acquire) && !token.is_cancelled() {
            warn!("SyncScheduler dropped while running; cancelling");
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_sync_settings() {
        let sync = SyncConfig {
            periodic_interval_secs: 90,
            reconnect_debounce_ms: 250,
            join_timeout_ms: 2_000,
            ..SyncConfig::default()
        };

        let config = SyncSchedulerConfig::from(&sync);

        assert_eq!(config.interval, Duration::from_secs(90));
        assert_eq!(config.reconnect_debounce, Duration::from_millis(250));
        assert_eq!(config.join_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_interval_is_clamped_to_one_second() {
        let sync = SyncConfig { periodic_interval_secs: 0, ..SyncConfig::default() };
        assert_eq!(SyncSchedulerConfig::from(&sync).interval, Duration::from_secs(1));
    }
}
