//! Engine context - the lifecycle object that owns every sync component
//!
//! The host builds one [`EngineContext`], calls [`initialize`] once, passes
//! the context by reference to producers, and calls [`dispose`] on shutdown.
//!
//! [`initialize`]: EngineContext::initialize
//! [`dispose`]: EngineContext::dispose

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use outpost_common::sync::BackoffCalculator;
use outpost_common::testing::{Clock, SystemClock};
use outpost_core::{
    ConnectivityMonitor, ConnectivityProbe, DrainOutcome, DurableQueue, KeyValueStore,
    LocalRecordStore, OrchestratorConfig, SyncOrchestrator, SyncTransport,
};
use outpost_domain::{Config, OutpostError, Result, StorageBackend, SyncItem, SyncState};
use outpost_infra::observability::metrics::SchedulerMetrics;
use outpost_infra::observability::{init_tracing, LogFormat};
use outpost_infra::{
    DbManager, HttpSyncTransport, MemoryKeyValueStore, SqliteKeyValueStore, SyncScheduler,
    SyncSchedulerConfig,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};
use crate::utils::logging::{error_label, log_operation};

/// Load `.env`, install tracing and load the configuration.
///
/// `OUTPOST_LOG_FORMAT=json` switches the log output to JSON lines.
///
/// # Errors
/// Returns `OutpostError::Config` when the configuration is invalid.
pub fn bootstrap() -> Result<Config> {
    // Load .env first so RUST_LOG from the file applies to the subscriber.
    let dotenv = dotenvy::dotenv();

    let format = match std::env::var("OUTPOST_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing(format);

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(err) => debug!(error = %err, "No .env file loaded"),
    }

    outpost_infra::config::load()
}

/// Owns the queue, connectivity monitor, orchestrator and scheduler
pub struct EngineContext {
    pub config: Config,
    db: Option<Arc<DbManager>>,
    queue: Arc<DurableQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    orchestrator: SyncOrchestrator,
    scheduler: Arc<SyncScheduler>,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("backend", &self.config.storage.backend)
            .field("orchestrator", &self.orchestrator)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Build the engine from configuration.
    ///
    /// Opens the configured key-value store (running migrations for SQLite)
    /// and the HTTP transport. The host supplies the connectivity probe and
    /// its local record store.
    ///
    /// # Errors
    /// Returns a config or storage error if a component cannot be built.
    pub async fn new(
        config: Config,
        probe: Arc<dyn ConnectivityProbe>,
        local_store: Arc<dyn LocalRecordStore>,
    ) -> Result<Self> {
        config.validate()?;

        let (store, db): (Arc<dyn KeyValueStore>, Option<Arc<DbManager>>) =
            match config.storage.backend {
                StorageBackend::Sqlite => {
                    let path = config.storage.path.clone();
                    let pool_size = config.storage.pool_size;
                    let db = tokio::task::spawn_blocking(move || -> Result<DbManager> {
                        let db = DbManager::new(&path, pool_size)?;
                        db.run_migrations()?;
                        Ok(db)
                    })
                    .await
                    .map_err(|err| {
                        OutpostError::Internal(format!("database setup task failed: {err}"))
                    })??;
                    let db = Arc::new(db);
                    (Arc::new(SqliteKeyValueStore::new(Arc::clone(&db))), Some(db))
                }
                StorageBackend::Memory => {
                    warn!("Using in-memory queue storage; pending items will not survive a restart");
                    (Arc::new(MemoryKeyValueStore::new()), None)
                }
            };

        let transport = Arc::new(HttpSyncTransport::from_config(&config.transport)?);

        let mut context = Self::with_ports(config, store, transport, probe, local_store)?;
        context.db = db;
        Ok(context)
    }

    /// Build the engine over caller-supplied ports.
    ///
    /// # Errors
    /// Returns `OutpostError::Config` if the backoff settings are invalid.
    pub fn with_ports(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn SyncTransport>,
        probe: Arc<dyn ConnectivityProbe>,
        local_store: Arc<dyn LocalRecordStore>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let backoff = BackoffCalculator::custom(
            config.backoff.base_delay(),
            config.backoff.max_delay(),
            config.backoff.jitter_factor,
        )
        .map_err(|err| OutpostError::Config(format!("invalid backoff settings: {err}")))?;

        let queue = Arc::new(
            DurableQueue::new(store, Arc::clone(&clock))
                .with_dead_letter_capacity(config.sync.dead_letter_capacity),
        );
        let connectivity = Arc::new(ConnectivityMonitor::new(probe));

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&queue),
            Arc::clone(&connectivity),
            transport,
            local_store,
            backoff,
            clock,
            OrchestratorConfig { max_retries: config.sync.max_retries },
        );

        let scheduler = Arc::new(SyncScheduler::new(
            orchestrator.clone(),
            Arc::clone(&connectivity),
            SyncSchedulerConfig::from(&config.sync),
            Arc::new(SchedulerMetrics::new()),
        ));

        Ok(Self {
            config,
            db: None,
            queue,
            connectivity,
            orchestrator,
            scheduler,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    /// Take the first connectivity reading, load the queue and start the
    /// scheduler (when sync is enabled). Idempotent.
    ///
    /// # Errors
    /// Returns the storage error if the queue cannot be loaded, or an
    /// internal error if the scheduler fails to start.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(OutpostError::InvalidInput("engine already disposed".into()));
        }
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!("Engine already initialized");
            return Ok(());
        }

        self.connectivity.initialize().await;

        if let Err(err) = self.orchestrator.initialize().await {
            // Allow a retry once storage recovers.
            self.initialized.store(false, Ordering::Release);
            return Err(err);
        }

        if self.config.sync.enabled {
            self.scheduler.start().await?;
        } else {
            info!("Automatic sync disabled; drains run on request only");
        }

        let state = self.orchestrator.state();
        info!(
            pending = state.pending_count,
            failed = state.failed_count,
            online = state.is_online,
            "Engine initialized"
        );
        Ok(())
    }

    /// Stop the scheduler, then dispose the orchestrator and the connectivity
    /// monitor. Idempotent.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(err) = self.scheduler.stop().await {
            warn!(error = %err, "Sync scheduler did not stop cleanly");
        }
        self.orchestrator.dispose().await;
        self.connectivity.dispose();

        info!("Engine disposed");
    }

    /// Queue an item for delivery. Returns `false` for a duplicate id.
    ///
    /// # Errors
    /// Propagates queue validation and storage errors.
    pub async fn enqueue(&self, item: SyncItem) -> Result<bool> {
        let started = Instant::now();
        let result = self.orchestrator.enqueue(item).await;
        log_operation("engine::enqueue", started.elapsed(), result.is_ok());
        if let Err(err) = &result {
            warn!(error = %err, error_type = error_label(err), "Enqueue rejected");
        }
        result
    }

    /// Drain the queue now; see [`SyncOrchestrator::sync_pending_items`].
    pub async fn sync_pending_items(&self) -> DrainOutcome {
        self.orchestrator.sync_pending_items().await
    }

    /// Move every dead-lettered item back to pending and drain if online.
    ///
    /// # Errors
    /// Propagates the queue's storage error.
    pub async fn retry_failed_items(&self) -> Result<usize> {
        let started = Instant::now();
        let result = self.orchestrator.retry_failed_items().await;
        log_operation("engine::retry_failed_items", started.elapsed(), result.is_ok());
        result
    }

    /// # Errors
    /// Propagates the queue's storage error.
    pub async fn retry_failed_item(&self, id: &str) -> Result<bool> {
        self.orchestrator.retry_failed_item(id).await
    }

    /// # Errors
    /// Propagates the queue's storage error.
    pub async fn discard_failed_item(&self, id: &str) -> Result<bool> {
        self.orchestrator.discard_failed_item(id).await
    }

    /// Cancel any pending debounce and drain now.
    pub async fn force_sync_now(&self) -> DrainOutcome {
        let started = Instant::now();
        let outcome = self.orchestrator.force_sync_now().await;
        log_operation("engine::force_sync_now", started.elapsed(), true);
        outcome
    }

    /// Pending items in delivery order.
    pub fn pending_items(&self) -> Vec<SyncItem> {
        self.orchestrator.pending_items()
    }

    /// Dead-lettered items, oldest first.
    pub fn failed_items(&self) -> Vec<SyncItem> {
        self.orchestrator.failed_items()
    }

    /// Subscribe to state snapshots. The stream ends on dispose.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncState> {
        self.orchestrator.subscribe()
    }

    /// Current sync state snapshot.
    pub fn state(&self) -> SyncState {
        self.orchestrator.state()
    }

    /// Suspend periodic draining. Reconnects and manual drains still run.
    ///
    /// # Errors
    /// Returns an internal error if the periodic task does not stop in time.
    pub async fn pause(&self) -> Result<()> {
        self.scheduler.pause().await.map_err(OutpostError::from)
    }

    /// Resume periodic sync and drain any pending work.
    pub async fn resume(&self) {
        self.scheduler.resume().await;
    }

    /// Last known connectivity.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Whether periodic sync is paused.
    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    /// Scheduler trigger counters.
    pub fn scheduler_metrics(&self) -> &Arc<SchedulerMetrics> {
        self.scheduler.metrics()
    }

    /// Check every component and summarize.
    ///
    /// Dead-lettered items are reported on the queue component but do not
    /// make it unhealthy.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new()
            .add_component(self.check_storage_health().await)
            .add_component(self.check_connectivity_health())
            .add_component(self.check_queue_health())
            .add_component(self.check_scheduler_health());

        status.calculate_score();
        status
    }

    async fn check_storage_health(&self) -> ComponentHealth {
        let Some(db) = self.db.clone() else {
            return ComponentHealth::healthy_with("storage", "in-memory");
        };

        match tokio::task::spawn_blocking(move || db.health_check()).await {
            Ok(Ok(())) => ComponentHealth::healthy("storage"),
            Ok(Err(e)) => {
                warn!(error = %e, "Storage health check failed");
                ComponentHealth::unhealthy("storage", format!("query failed: {e}"))
            }
            Err(e) => {
                warn!(error = %e, "Storage health check task panicked");
                ComponentHealth::unhealthy("storage", format!("task panic: {e}"))
            }
        }
    }

    fn check_connectivity_health(&self) -> ComponentHealth {
        if self.connectivity.is_online() {
            ComponentHealth::healthy("connectivity")
        } else {
            ComponentHealth::unhealthy("connectivity", "offline")
        }
    }

    fn check_queue_health(&self) -> ComponentHealth {
        if !self.queue.is_loaded() {
            return ComponentHealth::unhealthy("sync_queue", "not loaded");
        }
        match self.queue.failed_count() {
            0 => ComponentHealth::healthy("sync_queue"),
            failed => ComponentHealth::healthy_with("sync_queue", format!("{failed} dead-lettered")),
        }
    }

    fn check_scheduler_health(&self) -> ComponentHealth {
        if !self.config.sync.enabled {
            return ComponentHealth::healthy_with("scheduler", "disabled");
        }
        if self.scheduler.is_running() {
            ComponentHealth::healthy("scheduler")
        } else {
            ComponentHealth::unhealthy("scheduler", "not running")
        }
    }
}
