// Exponential backoff with bounded growth and injectable jitter
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sync::retry::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY, MAX_BACKOFF_EXPONENT,
};
use crate::sync::retry::error::{BackoffError, BackoffResult};

/// Source of uniform random samples used to perturb backoff delays.
///
/// Implementations must return values in `[0, 1)`. Out-of-range samples are
/// clamped by the calculator.
pub trait JitterSource: Send + Sync {
    /// Next uniform sample in `[0, 1)`.
    fn next_unit(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic jitter for reproducible delay sequences.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl JitterSource for SeededJitter {
    fn next_unit(&self) -> f64 {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        };
        rng.gen::<f64>()
    }
}

/// Computes retry delays: `base * 2^min(attempt, 30)`, capped at `max_delay`,
/// optionally perturbed by `±jitter_factor`.
#[derive(Clone)]
pub struct BackoffCalculator {
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    source: Arc<dyn JitterSource>,
}

impl fmt::Debug for BackoffCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffCalculator")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .finish_non_exhaustive()
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            source: Arc::new(ThreadRngJitter),
        }
    }
}

impl BackoffCalculator {
    /// Calculator with the default 1s base, 5 minute cap and 0.2 jitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calculator with validation.
    ///
    /// `jitter_factor` is clamped into `[0, 1]`; a non-finite factor is
    /// rejected.
    pub fn custom(
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> BackoffResult<Self> {
        if base_delay > max_delay {
            return Err(BackoffError::InvalidDelayRange { base: base_delay, max: max_delay });
        }
        if !jitter_factor.is_finite() {
            return Err(BackoffError::InvalidConfig(format!(
                "jitter_factor must be finite, got {jitter_factor}"
            )));
        }

        Ok(Self {
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            source: Arc::new(ThreadRngJitter),
        })
    }

    /// Set the base delay for exponential backoff
    pub fn with_base_delay(mut self, delay: Duration) -> BackoffResult<Self> {
        if delay > self.max_delay {
            return Err(BackoffError::InvalidDelayRange { base: delay, max: self.max_delay });
        }
        self.base_delay = delay;
        Ok(self)
    }

    /// Set the maximum delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> BackoffResult<Self> {
        if delay < self.base_delay {
            return Err(BackoffError::InvalidDelayRange { base: self.base_delay, max: delay });
        }
        self.max_delay = delay;
        Ok(self)
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Replace the random source used for jitter.
    pub fn with_jitter_source(mut self, source: Arc<dyn JitterSource>) -> Self {
        self.source = source;
        self
    }

    /// Delay for attempt 0.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound before jitter.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Jitter factor in `[0, 1]`.
    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Exponential delay for `attempt` without jitter, at nanosecond
    /// resolution.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u32.saturating_pow(exponent);

        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Exponential delay for `attempt` perturbed by `±jitter_factor`.
    ///
    /// The result is `capped + capped * j * (2U - 1)`, never negative, and
    /// saturates at `u64::MAX` nanoseconds.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let capped = self.delay(attempt);
        if self.jitter_factor == 0.0 {
            return capped;
        }

        let unit = sanitize_unit(self.source.next_unit());
        #[allow(clippy::cast_precision_loss)]
        let capped_nanos = capped.as_nanos() as f64;
        let jittered = capped_nanos + capped_nanos * self.jitter_factor * (2.0 * unit - 1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let final_nanos = jittered.max(0.0) as u64;
        Duration::from_nanos(final_nanos)
    }

    /// Jittered delays for attempts `0..count`.
    pub fn sequence(&self, count: u32) -> Vec<Duration> {
        (0..count).map(|attempt| self.delay_with_jitter(attempt)).collect()
    }
}

fn sanitize_unit(sample: f64) -> f64 {
    if sample.is_finite() {
        sample.clamp(0.0, 1.0)
    } else {
        0.5
    }
}
