// Retry timing: exponential backoff with a hard cap and symmetric jitter

pub mod backoff;
pub mod constants;
pub mod error;

pub use backoff::{BackoffCalculator, JitterSource, SeededJitter, ThreadRngJitter};
pub use error::{BackoffError, BackoffResult};
