//! Outbox data model: queued items, delivery requests and published state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Remote resource type a queued item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    MeasurementResult,
    Exercise,
    UserSettings,
}

impl_domain_status_conversions!(EntityKind {
    Session => "session",
    MeasurementResult => "measurement_result",
    Exercise => "exercise",
    UserSettings => "user_settings",
});

impl EntityKind {
    /// Collection path on the remote service.
    pub const fn remote_path(&self) -> &'static str {
        match self {
            Self::Session => "/sessions",
            Self::MeasurementResult => "/measurement-results",
            Self::Exercise => "/exercises",
            Self::UserSettings => "/user-settings",
        }
    }
}

/// Change a queued item carries to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl_domain_status_conversions!(SyncOperation {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

impl SyncOperation {
    /// Verb used to deliver this operation.
    pub const fn method(&self) -> RequestMethod {
        match self {
            Self::Create => RequestMethod::Post,
            Self::Update => RequestMethod::Put,
            Self::Delete => RequestMethod::Delete,
        }
    }
}

/// HTTP-like verb used for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Post,
    Put,
    Delete,
}

impl RequestMethod {
    /// Upper-case wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority. Variants are declared in ascending order so the derived
/// `Ord` gives `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl_domain_status_conversions!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

/// One pending change destined for the remote service.
///
/// `id` is the deduplication key and doubles as the idempotency key sent with
/// every attempt. `payload` is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: String,
    pub entity_kind: EntityKind,
    pub operation: SyncOperation,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl SyncItem {
    /// New item with a time-ordered UUID v7 id and normal priority.
    pub fn new(entity_kind: EntityKind, operation: SyncOperation, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entity_kind,
            operation,
            payload,
            created_at: Utc::now(),
            priority: Priority::Normal,
            retry_count: 0,
            last_error: None,
            last_retry_at: None,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// `true` once any attempt has failed.
    pub fn has_failed(&self) -> bool {
        self.retry_count > 0
    }
}

/// A single transport call derived from a [`SyncItem`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRequest {
    pub path: String,
    pub method: RequestMethod,
    pub body: Option<Value>,
    pub idempotency_key: String,
}

impl SyncRequest {
    /// Map an item to its remote call.
    ///
    /// Update and Delete address the resource by id; Delete carries no body.
    pub fn for_item(item: &SyncItem) -> Self {
        let base = item.entity_kind.remote_path();
        let path = match item.operation {
            SyncOperation::Create => base.to_string(),
            SyncOperation::Update | SyncOperation::Delete => format!("{base}/{}", item.id),
        };
        let body = match item.operation {
            SyncOperation::Create | SyncOperation::Update => {
                Some(Value::Object(item.payload.clone()))
            }
            SyncOperation::Delete => None,
        };

        Self { path, method: item.operation.method(), body, idempotency_key: item.id.clone() }
    }
}

/// Coarse engine status published with every [`SyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Offline,
}

impl_domain_status_conversions!(SyncStatus {
    Idle => "idle",
    Syncing => "syncing",
    Error => "error",
    Offline => "offline",
});

/// Immutable snapshot of the engine published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub pending_count: usize,
    pub failed_count: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub is_online: bool,
}

impl SyncState {
    /// State before the first drain.
    pub fn initial(is_online: bool) -> Self {
        Self {
            status: if is_online { SyncStatus::Idle } else { SyncStatus::Offline },
            pending_count: 0,
            failed_count: 0,
            last_sync_at: None,
            error_message: None,
            is_online,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::initial(true)
    }
}

/// Link type reported by the host's connectivity primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Wifi,
    Mobile,
    Ethernet,
    Vpn,
    Bluetooth,
    Other,
    None,
}

impl_domain_status_conversions!(ConnectionKind {
    Wifi => "wifi",
    Mobile => "mobile",
    Ethernet => "ethernet",
    Vpn => "vpn",
    Bluetooth => "bluetooth",
    Other => "other",
    None => "none",
});

impl ConnectionKind {
    /// Whether this link can reach the remote service.
    pub const fn is_routable(&self) -> bool {
        match self {
            Self::Wifi | Self::Mobile | Self::Ethernet | Self::Vpn => true,
            Self::Bluetooth | Self::Other | Self::None => false,
        }
    }

    /// Online iff at least one routable link is reported.
    pub fn any_online<'a>(kinds: impl IntoIterator<Item = &'a Self>) -> bool {
        kinds.into_iter().any(Self::is_routable)
    }
}
