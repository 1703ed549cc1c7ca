//! Time utilities
//!
//! - **Clock abstractions**: real and mock time (re-exported from testing)
//! - **[`timer`]**: cancellable one-shot timers and the single-slot
//!   [`TimerSlot`]

pub mod timer;

pub use timer::{timeout, TimerHandle, TimerSlot};

// Re-export Clock abstractions from testing module
pub use crate::testing::time::{Clock, MockClock, SystemClock};
