//! Process-local key-value store.
//!
//! Used when `storage.backend = "memory"` and in tests. Nothing survives a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use outpost_core::KeyValueStore;
use outpost_domain::Result as DomainResult;
use parking_lot::RwLock;

/// Thread-safe in-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// `true` when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
