//! # Outpost App
//!
//! Host-facing layer of the outbox sync engine.
//!
//! This crate contains:
//! - The engine context (explicit lifecycle and dependency wiring)
//! - Bootstrap of environment, logging and configuration
//! - Health reporting
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires the hexagonal architecture: core engine over infra adapters

pub mod context;
pub mod utils;

// Re-export for convenience
pub use context::{bootstrap, EngineContext};
