//! One-shot timers with cancellation support.
//!
//! A [`TimerSlot`] owns at most one pending timer. Arming the slot cancels
//! whatever was armed before, which is what debounce and deferred-sync
//! triggers need.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// Cancel the timer. The callback will not run if it has not started.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run `callback` after `delay` unless the returned handle is cancelled first.
///
/// Cancellation only guards the wait: once the delay elapses the callback runs
/// to completion.
pub fn timeout<F>(delay: Duration, callback: F) -> (TimerHandle, JoinHandle<()>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = TimerHandle::new();
    let token = handle.token.clone();

    let task = tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            () = sleep(delay) => callback.await,
        }
    });

    (handle, task)
}

struct Armed {
    handle: TimerHandle,
    task: JoinHandle<()>,
}

/// Holds at most one pending one-shot timer.
#[derive(Default)]
pub struct TimerSlot {
    current: Mutex<Option<Armed>>,
}

impl std::fmt::Debug for TimerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSlot").field("armed", &self.is_armed()).finish()
    }
}

impl TimerSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot, cancelling any previously armed timer.
    pub fn arm<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (handle, task) = timeout(delay, callback);
        let previous = self.lock().replace(Armed { handle: handle.clone(), task });
        if let Some(previous) = previous {
            if !previous.handle.is_cancelled() && !previous.task.is_finished() {
                trace!(delay_ms = delay.as_millis(), "timer slot re-armed before firing");
            }
            previous.handle.cancel();
        }
        handle
    }

    /// Cancel the armed timer, if any. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(armed) => {
                let pending = !armed.task.is_finished() && !armed.handle.is_cancelled();
                armed.handle.cancel();
                pending
            }
            None => false,
        }
    }

    /// Whether a timer is armed and has not yet fired or been cancelled.
    pub fn is_armed(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|armed| !armed.handle.is_cancelled() && !armed.task.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(armed) = self.lock().take() {
            armed.handle.cancel();
        }
    }
}
