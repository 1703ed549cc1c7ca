//! Outbox sync engine: ports, durable queue, connectivity tracking and the
//! drain orchestrator.

pub mod connectivity;
pub mod orchestrator;
pub mod ports;
pub mod queue;

pub use connectivity::ConnectivityMonitor;
pub use orchestrator::{DrainOutcome, DrainReport, OrchestratorConfig, SyncOrchestrator};
pub use ports::{ConnectivityProbe, KeyValueStore, LocalRecordStore, SyncTransport};
pub use queue::{DurableQueue, FailureOutcome};
