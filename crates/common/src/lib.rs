//! Modular common utilities shared across Outpost crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: clocks
//! - `runtime`: tokio-backed timers and broadcast channels
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod testing;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod sync;
#[cfg(feature = "runtime")]
pub mod time;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use sync::{BackoffCalculator, ChannelClosed, EventChannel, JitterSource};
#[cfg(feature = "foundation")]
pub use testing::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use time::TimerSlot;
