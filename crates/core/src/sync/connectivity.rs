//! Online/offline tracking on top of a [`ConnectivityProbe`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use outpost_common::sync::EventChannel;
use outpost_domain::ConnectionKind;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::sync::ports::ConnectivityProbe;

struct Shared {
    online: AtomicBool,
    changes: EventChannel<bool>,
}

impl Shared {
    /// Store the new value, emitting only on transitions.
    fn apply(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous != online {
            info!(online, "Connectivity changed");
            if self.changes.emit(online).is_err() {
                debug!("Connectivity change after dispose; not published");
            }
        }
        online
    }
}

/// Folds probe reports into a single online flag and publishes transitions.
///
/// Reports `true` until told otherwise, and fails open: a probe error never
/// marks the engine offline.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    /// Monitor over `probe`. Call [`initialize`](Self::initialize) before use.
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            probe,
            shared: Arc::new(Shared { online: AtomicBool::new(true), changes: EventChannel::default() }),
            cancel: CancellationToken::new(),
            listener: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Take the first reading and start following the probe's change feed.
    ///
    /// Idempotent; a no-op after [`dispose`](Self::dispose).
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        if self.cancel.is_cancelled() || self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        // Subscribe before the first check so no change slips between them.
        let receiver = self.probe.subscribe();

        match self.probe.check().await {
            Ok(kinds) => {
                let online = self.shared.apply(ConnectionKind::any_online(&kinds));
                debug!(online, ?kinds, "Initial connectivity reading");
            }
            Err(err) => {
                warn!(error = %err, "Connectivity check failed; assuming online");
                self.shared.apply(true);
            }
        }

        let handle = tokio::spawn(Self::listen(
            receiver,
            Arc::clone(&self.probe),
            Arc::clone(&self.shared),
            self.cancel.clone(),
        ));
        *self.listener.lock() = Some(handle);
    }

    /// Last known state; `true` before the first reading.
    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::Acquire)
    }

    /// Subscribe to online/offline transitions.
    pub fn changes(&self) -> broadcast::Receiver<bool> {
        self.shared.changes.subscribe()
    }

    /// Re-check the probe now. On failure the cached value is returned.
    #[instrument(skip(self))]
    pub async fn check_now(&self) -> bool {
        match self.probe.check().await {
            Ok(kinds) => self.shared.apply(ConnectionKind::any_online(&kinds)),
            Err(err) => {
                warn!(error = %err, "Connectivity re-check failed; keeping cached value");
                self.is_online()
            }
        }
    }

    /// Stop following the probe and close the change feed. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.shared.changes.close();
    }

    async fn listen(
        mut receiver: broadcast::Receiver<Vec<ConnectionKind>>,
        probe: Arc<dyn ConnectivityProbe>,
        shared: Arc<Shared>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Connectivity listener cancelled");
                    break;
                }
                message = receiver.recv() => match message {
                    Ok(kinds) => {
                        shared.apply(ConnectionKind::any_online(&kinds));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Connectivity feed lagged; re-checking");
                        if let Ok(kinds) = probe.check().await {
                            shared.apply(ConnectionKind::any_online(&kinds));
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Connectivity feed closed");
                        break;
                    }
                },
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
