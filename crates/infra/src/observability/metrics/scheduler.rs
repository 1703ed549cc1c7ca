//! Counters for the sync scheduler's triggers
//!
//! ## Design
//! - **Atomic counters**, no locks on the hot path
//! - **Saturating** increments: a counter pins at `u64::MAX` and reports
//!   `MetricsError::Saturated` instead of wrapping

use std::sync::atomic::{AtomicU64, Ordering};

use crate::observability::{MetricsError, MetricsResult};

/// Trigger counters for one [`SyncScheduler`](crate::scheduling::SyncScheduler).
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Periodic loop wake-ups
    ticks: AtomicU64,
    /// Offline→online transitions that armed the debounce
    reconnect_triggers: AtomicU64,
    /// Drains actually requested from the orchestrator
    drain_requests: AtomicU64,
}

/// Point-in-time copy of [`SchedulerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub ticks: u64,
    pub reconnect_triggers: u64,
    pub drain_requests: u64,
}

impl SchedulerMetrics {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a periodic tick.
    pub fn record_tick(&self) -> MetricsResult<()> {
        bump(&self.ticks, "scheduler.ticks")
    }

    /// Count a transition to online.
    pub fn record_reconnect_trigger(&self) -> MetricsResult<()> {
        bump(&self.reconnect_triggers, "scheduler.reconnect_triggers")
    }

    /// Count a drain requested by the scheduler.
    pub fn record_drain_request(&self) -> MetricsResult<()> {
        bump(&self.drain_requests, "scheduler.drain_requests")
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            ticks: self.ticks.load(Ordering::Acquire),
            reconnect_triggers: self.reconnect_triggers.load(Ordering::Acquire),
            drain_requests: self.drain_requests.load(Ordering::Acquire),
        }
    }
}

fn bump(counter: &AtomicU64, metric: &'static str) -> MetricsResult<()> {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_add(1))
        .map(|_| ())
        .map_err(|_| MetricsError::Saturated { metric })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let metrics = SchedulerMetrics::new();
        metrics.record_tick().unwrap();
        metrics.record_tick().unwrap();
        metrics.record_drain_request().unwrap();

        assert_eq!(
            metrics.snapshot(),
            SchedulerSnapshot { ticks: 2, reconnect_triggers: 0, drain_requests: 1 }
        );
    }

    #[test]
    fn saturated_counter_reports_error() {
        let metrics = SchedulerMetrics::new();
        metrics.reconnect_triggers.store(u64::MAX, Ordering::Release);

        let err = metrics.record_reconnect_trigger().unwrap_err();
        assert!(matches!(err, MetricsError::Saturated { metric: "scheduler.reconnect_triggers" }));
        assert_eq!(metrics.snapshot().reconnect_triggers, u64::MAX);
    }
}
