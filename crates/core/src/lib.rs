//! # Outpost Core
//!
//! Pure engine layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for storage, transport, the local
//!   record store and OS connectivity
//! - The durable outbox queue
//! - The connectivity monitor and the drain orchestrator
//!
//! ## Architecture Principles
//! - Only depends on `outpost-common` and `outpost-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::connectivity::ConnectivityMonitor;
pub use sync::orchestrator::{DrainOutcome, DrainReport, OrchestratorConfig, SyncOrchestrator};
pub use sync::ports::{ConnectivityProbe, KeyValueStore, LocalRecordStore, SyncTransport};
pub use sync::queue::{DurableQueue, FailureOutcome};
