//! Shared helpers for `outpost-app` integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outpost_core::{LocalRecordStore, SyncTransport};
use outpost_domain::{
    Config, EntityKind, OutpostError, Result as DomainResult, StorageBackend, SyncItem,
    SyncOperation, SyncRequest, TransportError,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

/// Records every `mark_synced` call.
#[derive(Default)]
pub struct RecordingLocalStore {
    synced: Mutex<Vec<(EntityKind, String)>>,
}

impl RecordingLocalStore {
    pub fn synced_ids(&self) -> Vec<String> {
        self.synced.lock().iter().map(|(_, id)| id.clone()).collect()
    }
}

#[async_trait]
impl LocalRecordStore for RecordingLocalStore {
    async fn mark_synced(&self, kind: EntityKind, id: &str) -> DomainResult<()> {
        self.synced.lock().push((kind, id.to_string()));
        Ok(())
    }
}

/// Accepts every request and keeps it.
#[derive(Default)]
pub struct AcceptingTransport {
    requests: Mutex<Vec<SyncRequest>>,
}

impl AcceptingTransport {
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl SyncTransport for AcceptingTransport {
    async fn send(&self, request: &SyncRequest) -> Result<(), TransportError> {
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

/// Store whose reads always fail, as if the disk were gone.
pub struct BrokenStore;

#[async_trait]
impl outpost_core::KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> DomainResult<Option<String>> {
        Err(OutpostError::Storage("disk unavailable".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> DomainResult<()> {
        Err(OutpostError::Storage("disk unavailable".into()))
    }

    async fn remove(&self, _key: &str) -> DomainResult<()> {
        Err(OutpostError::Storage("disk unavailable".into()))
    }
}

/// SQLite-backed config pointing at `base_url`, with automatic sync off so
/// tests control every drain.
pub fn sqlite_config(dir: &Path, base_url: &str) -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.path = dir.join("outpost.db").to_string_lossy().to_string();
    config.storage.pool_size = 2;
    config.transport.base_url = base_url.to_string();
    config.transport.timeout_ms = 2_000;
    config.sync.enabled = false;
    config.backoff.base_delay_ms = 1;
    config.backoff.max_delay_ms = 10;
    config.backoff.jitter_factor = 0.0;
    config
}

pub fn memory_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.sync.enabled = false;
    config.backoff.base_delay_ms = 1;
    config.backoff.max_delay_ms = 10;
    config
}

pub fn exercise_item(id: &str) -> SyncItem {
    let payload = match json!({"id": id, "reps": 12, "note": "Übung"}) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    SyncItem::new(EntityKind::Exercise, SyncOperation::Create, payload).with_id(id)
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
