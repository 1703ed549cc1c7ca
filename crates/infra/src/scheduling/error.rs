//! Scheduler error types

use std::time::Duration;

use outpost_domain::OutpostError;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// A background task did not finish in time
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: Elapsed,
    },

    /// A background task panicked or was aborted
    #[error("Task join failed: {0}")]
    TaskJoin(#[from] JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let outpost_err = match err {
            SchedulerError::AlreadyRunning => OutpostError::InvalidInput(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoin(_) => {
                OutpostError::Internal(err.to_string())
            }
        };
        InfraError(outpost_err)
    }
}

impl From<SchedulerError> for OutpostError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
