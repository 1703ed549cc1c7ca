//! Health report for the engine's components
//!
//! [`EngineContext::health_check`](crate::EngineContext::health_check) builds a
//! [`HealthStatus`] from one [`ComponentHealth`] per component.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Share of healthy components at or above which the engine is healthy.
pub const HEALTHY_THRESHOLD: f64 = 0.75;

/// Overall health of the engine
///
/// # Example
/// ```
/// use outpost_lib::utils::health::{ComponentHealth, HealthStatus};
///
/// let mut status = HealthStatus::new()
///     .add_component(ComponentHealth::healthy("storage"))
///     .add_component(ComponentHealth::unhealthy("connectivity", "offline"));
/// status.calculate_score();
///
/// assert_eq!(status.score, 0.5);
/// assert!(!status.is_healthy);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,

    /// From 0.0 (nothing healthy) to 1.0 (everything healthy)
    pub score: f64,

    pub message: Option<String>,

    pub components: Vec<ComponentHealth>,

    /// Unix timestamp of the check
    pub timestamp: i64,
}

impl HealthStatus {
    /// Healthy, score 1.0, no components yet.
    pub fn new() -> Self {
        Self {
            is_healthy: true,
            score: 1.0,
            message: None,
            components: Vec::new(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Add a component and recompute the overall score.
    #[must_use]
    pub fn add_component(mut self, component: ComponentHealth) -> Self {
        self.components.push(component);
        self
    }

    /// Score = healthy / total; healthy when the score reaches
    /// [`HEALTHY_THRESHOLD`]. Call after every component is added.
    pub fn calculate_score(&mut self) {
        if self.components.is_empty() {
            return;
        }

        let healthy_count = self.components.iter().filter(|c| c.is_healthy).count();

        self.score = healthy_count as f64 / self.components.len() as f64;
        self.is_healthy = self.score >= HEALTHY_THRESHOLD;

        let degraded: Vec<&str> =
            self.components.iter().filter(|c| !c.is_healthy).map(|c| c.name.as_str()).collect();
        self.message =
            (!degraded.is_empty()).then(|| format!("degraded: {}", degraded.join(", ")));
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Health of a single component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component identifier (e.g. "storage", "scheduler")
    pub name: String,
    pub is_healthy: bool,
    pub message: Option<String>,
}

impl ComponentHealth {
    /// Healthy component with no message.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    /// Healthy, with a note attached (e.g. items waiting in the dead-letter set).
    pub fn healthy_with(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: true, message: Some(message.into()) }
    }

    /// Unhealthy component with a reason.
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }
}
