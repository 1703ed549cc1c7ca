//! Synchronization primitives for the outbox engine
//!
//! ## Submodules
//!
//! - **`retry`**: exponential backoff with bounded growth and jitter
//! - **`channel`**: closable broadcast feed used for state and connectivity
//!   changes

pub mod channel;
pub mod retry;

pub use channel::{ChannelClosed, EventChannel, DEFAULT_CHANNEL_CAPACITY};
pub use retry::{
    BackoffCalculator, BackoffError, BackoffResult, JitterSource, SeededJitter, ThreadRngJitter,
};

// Re-export time abstractions from testing module
pub use crate::testing::time::{Clock, MockClock, SystemClock};
