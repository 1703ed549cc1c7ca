//! Metrics collection modules

pub mod scheduler;

pub use scheduler::{SchedulerMetrics, SchedulerSnapshot};
