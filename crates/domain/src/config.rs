//! Configuration structures
//!
//! Every section has serde defaults so a partial file (or no file at all)
//! yields a usable configuration. Durations are stored as integers with a
//! unit suffix and exposed as [`Duration`] through accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX_MS, DEFAULT_BASE_URL,
    DEFAULT_DB_PATH, DEFAULT_DB_POOL_SIZE, DEFAULT_DEAD_LETTER_CAPACITY, DEFAULT_JOIN_TIMEOUT_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_PERIODIC_INTERVAL_SECS, DEFAULT_RECONNECT_DEBOUNCE_MS,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
use crate::impl_domain_status_conversions;
use crate::{OutpostError, Result};

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub sync: SyncConfig,
    pub backoff: BackoffConfig,
}

impl Config {
    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `OutpostError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.trim().is_empty() {
            return Err(OutpostError::Config("storage.path must not be empty".into()));
        }
        if self.storage.pool_size == 0 {
            return Err(OutpostError::Config("storage.pool_size must be at least 1".into()));
        }

        let url = self.transport.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OutpostError::Config(format!(
                "transport.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.transport.timeout_ms == 0 {
            return Err(OutpostError::Config("transport.timeout_ms must be positive".into()));
        }

        if self.sync.periodic_interval_secs == 0 {
            return Err(OutpostError::Config("sync.periodic_interval_secs must be positive".into()));
        }
        if self.sync.dead_letter_capacity == 0 {
            return Err(OutpostError::Config("sync.dead_letter_capacity must be positive".into()));
        }

        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(OutpostError::Config(format!(
                "backoff.base_delay_ms ({}) exceeds backoff.max_delay_ms ({})",
                self.backoff.base_delay_ms, self.backoff.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            return Err(OutpostError::Config(format!(
                "backoff.jitter_factor must be within [0, 1], got {}",
                self.backoff.jitter_factor
            )));
        }

        Ok(())
    }
}

/// Where the queue is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl_domain_status_conversions!(StorageBackend {
    Sqlite => "sqlite",
    Memory => "memory",
});

/// Key-value persistence for the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: DEFAULT_DB_PATH.to_string(),
            pool_size: DEFAULT_DB_POOL_SIZE,
        }
    }
}

/// Remote endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl TransportConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            auth_token: None,
        }
    }
}

/// Queue and scheduler behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the periodic/reconnect scheduler. Manual triggers work either way.
    pub enabled: bool,
    pub max_retries: u32,
    pub dead_letter_capacity: usize,
    pub periodic_interval_secs: u64,
    pub reconnect_debounce_ms: u64,
    pub join_timeout_ms: u64,
}

impl SyncConfig {
    /// Periodic drain interval.
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    /// Quiet period after reconnecting.
    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    /// Upper bound for joining scheduler tasks.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            periodic_interval_secs: DEFAULT_PERIODIC_INTERVAL_SECS,
            reconnect_debounce_ms: DEFAULT_RECONNECT_DEBOUNCE_MS,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

/// Retry delay parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl BackoffConfig {
    /// Backoff delay for attempt 0.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff cap.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BACKOFF_BASE_MS,
            max_delay_ms: DEFAULT_BACKOFF_MAX_MS,
            jitter_factor: DEFAULT_BACKOFF_JITTER,
        }
    }
}
