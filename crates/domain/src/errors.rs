//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Outpost
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OutpostError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for OutpostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Outpost operations
pub type Result<T> = std::result::Result<T, OutpostError>;

/// Classified failure of a single delivery attempt.
///
/// Every variant is treated as transient: the item is re-queued or
/// dead-lettered, never dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("server responded with status {0}")]
    ServerError(u16),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl From<TransportError> for OutpostError {
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}
