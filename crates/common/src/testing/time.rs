//! Time abstraction for testability
//!
//! Engine components read the wall clock through [`Clock`] so tests can pin
//! `created_at`, `last_retry_at` and `last_sync_at` to known values.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use outpost_common::testing::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.utc_now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!((clock.utc_now() - start).num_seconds(), 5);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Trait for time operations to enable testing
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Current wall clock time as a UTC timestamp.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let millis = self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a clock handed to an engine
/// component can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    base_system_time: SystemTime,
}

impl MockClock {
    /// Create a new mock clock starting at the current real time.
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Create a mock clock whose wall time starts at `base`.
    pub fn starting_at(base: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            base_system_time: base,
        }
    }

    /// Create a mock clock whose wall time starts at the given UTC timestamp.
    pub fn starting_at_utc(base: DateTime<Utc>) -> Self {
        Self::starting_at(SystemTime::from(base))
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.lock();
        *elapsed = elapsed.saturating_add(duration);
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.lock() = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Duration> {
        match self.elapsed.lock() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}
