//! Host-fed connectivity probe.

use async_trait::async_trait;
use outpost_common::sync::EventChannel;
use outpost_core::ConnectivityProbe;
use outpost_domain::{ConnectionKind, Result as DomainResult};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// [`ConnectivityProbe`] whose readings are pushed in by the host.
///
/// Starts with `initial` links; every [`report`](Self::report) replaces the
/// current set and notifies subscribers, even if nothing changed. The
/// monitor de-duplicates.
#[derive(Debug)]
pub struct ManualConnectivityProbe {
    kinds: RwLock<Vec<ConnectionKind>>,
    changes: EventChannel<Vec<ConnectionKind>>,
}

impl ManualConnectivityProbe {
    /// Probe reporting `initial` until the host reports otherwise.
    pub fn new(initial: Vec<ConnectionKind>) -> Self {
        Self { kinds: RwLock::new(initial), changes: EventChannel::default() }
    }

    /// Replace the current links and notify subscribers.
    pub fn report(&self, kinds: Vec<ConnectionKind>) {
        *self.kinds.write() = kinds.clone();
        match self.changes.emit(kinds) {
            Ok(receivers) => debug!(receivers, "Connectivity report forwarded"),
            Err(_) => debug!("Connectivity report after close; dropped"),
        }
    }

    /// Last reported interfaces.
    pub fn current(&self) -> Vec<ConnectionKind> {
        self.kinds.read().clone()
    }

    /// Stop notifying subscribers. Later reports still update [`current`](Self::current).
    pub fn close(&self) {
        self.changes.close();
    }
}

impl Default for ManualConnectivityProbe {
    /// Assumes a routable link until the host says otherwise.
    fn default() -> Self {
        Self::new(vec![ConnectionKind::Other, ConnectionKind::Wifi])
    }
}

#[async_trait]
impl ConnectivityProbe for ManualConnectivityProbe {
    async fn check(&self) -> DomainResult<Vec<ConnectionKind>> {
        Ok(self.current())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<ConnectionKind>> {
        self.changes.subscribe()
    }
}
