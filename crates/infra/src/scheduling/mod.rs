//! Scheduling infrastructure for automatic sync triggers
//!
//! The sync scheduler follows the workspace runtime rules:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on joins
//! - Structured tracing with `SchedulerMetrics` integration

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{SyncScheduler, SyncSchedulerConfig};
