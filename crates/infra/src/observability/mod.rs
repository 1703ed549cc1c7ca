//! Observability infrastructure: tracing setup and scheduler metrics
//!
//! ## Design Principles
//!
//! 1. **Future-Proof Returns**: All record methods return `MetricsResult<()>`
//!    so limits can be added later without API breakage. They currently
//!    always succeed.
//!
//! 2. **Never Block the Engine**: a failed metric is logged by the caller and
//!    dropped.
//!
//! ## Error Handling
//!
//! ```rust
//! use outpost_infra::observability::metrics::SchedulerMetrics;
//!
//! let metrics = SchedulerMetrics::new();
//!
//! if let Err(e) = metrics.record_tick() {
//!     tracing::warn!("Failed to record metric: {}", e);
//! }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat};

/// Metrics error type
///
/// Recording currently always succeeds; the variants reserve room for
/// validation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Counter would overflow
    #[error("Counter '{metric}' saturated")]
    Saturated {
        /// Metric name
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
