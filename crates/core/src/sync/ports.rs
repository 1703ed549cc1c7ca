//! Port interfaces for sync operations
//!
//! The engine reaches the outside world only through these traits; adapters
//! live in `outpost-infra` or in the host application.

use async_trait::async_trait;
use outpost_domain::{ConnectionKind, EntityKind, Result, SyncRequest, TransportError};
use tokio::sync::broadcast;

/// Durable string key-value storage used to persist the queue.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Issues one delivery request against the remote service.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send `request`, classifying any failure.
    async fn send(&self, request: &SyncRequest) -> std::result::Result<(), TransportError>;
}

/// The host's local domain store, told when a record reached the server.
#[async_trait]
pub trait LocalRecordStore: Send + Sync {
    /// Flag the local record as synced. Failures are logged by the caller and
    /// never affect the queue.
    async fn mark_synced(&self, kind: EntityKind, id: &str) -> Result<()>;
}

/// OS connectivity primitive.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Current set of active links.
    async fn check(&self) -> Result<Vec<ConnectionKind>>;

    /// Feed of link sets, one message per OS change notification.
    fn subscribe(&self) -> broadcast::Receiver<Vec<ConnectionKind>>;
}
