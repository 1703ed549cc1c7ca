//! # Outpost Infrastructure
//!
//! Infrastructure implementations of the core sync ports.
//!
//! This crate contains:
//! - Key-value stores (SQLite via an r2d2 pool, in-memory)
//! - The reqwest-backed HTTP transport
//! - The host-fed connectivity probe
//! - The sync scheduler (periodic and reconnect triggers)
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `outpost-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod platform;
pub mod scheduling;
pub mod storage;

// Re-export commonly used items
pub use database::{DbManager, SqliteKeyValueStore};
pub use errors::InfraError;
pub use http::{HttpClient, HttpSyncTransport};
pub use platform::ManualConnectivityProbe;
pub use scheduling::{SchedulerError, SchedulerResult, SyncScheduler, SyncSchedulerConfig};
pub use storage::MemoryKeyValueStore;
