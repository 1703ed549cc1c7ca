//! Closable broadcast channel for state and connectivity feeds.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::broadcast;

/// Default buffer for broadcast feeds. Slow receivers observe `Lagged`.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Emit attempted after [`EventChannel::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event channel is closed")]
pub struct ChannelClosed;

/// Multi-subscriber broadcast feed with a terminal `close()`.
///
/// Emitting with no live subscribers is not an error. After `close()` every
/// existing receiver sees `RecvError::Closed` once drained, later emits are
/// rejected, and new subscriptions observe a closed channel immediately.
#[derive(Debug)]
pub struct EventChannel<T> {
    sender: RwLock<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl<T: Clone + Send + 'static> EventChannel<T> {
    /// Channel buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender: RwLock::new(Some(sender)) }
    }

    /// Publish `value` to every current subscriber.
    ///
    /// Returns the number of receivers reached.
    pub fn emit(&self, value: T) -> Result<usize, ChannelClosed> {
        let guard = self.read();
        let sender = guard.as_ref().ok_or(ChannelClosed)?;
        Ok(sender.send(value).unwrap_or(0))
    }

    /// New receiver; already closed if the channel is.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        if let Some(sender) = self.read().as_ref() {
            return sender.subscribe();
        }
        let (_, receiver) = broadcast::channel(1);
        receiver
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        self.write().take();
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.read().is_none()
    }

    /// Live receivers; zero once closed.
    pub fn receiver_count(&self) -> usize {
        self.read().as_ref().map_or(0, broadcast::Sender::receiver_count)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<broadcast::Sender<T>>> {
        match self.sender.read() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<broadcast::Sender<T>>> {
        match self.sender.write() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        }
    }
}
