// Error types for retry module
use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring backoff
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    #[error("base_delay ({base:?}) cannot be greater than max_delay ({max:?})")]
    InvalidDelayRange { base: Duration, max: Duration },

    #[error("invalid backoff configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for backoff configuration
pub type BackoffResult<T> = Result<T, BackoffError>;
