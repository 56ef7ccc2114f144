//! Transport contract and scoped status subscriptions.
//!
//! The app implements [`Transport`] on top of its wireless stack. Keeping the
//! link behind a trait keeps the session logic testable with in-memory fakes.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// Boxed future returned by [`Transport`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback receiving raw status notification payloads.
///
/// Invoked on whatever task or thread the transport delivers notifications.
pub type StatusHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Errors reported by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("device not found")]
    DeviceNotFound,

    #[error("operation timed out")]
    Timeout,

    #[error("link error: {0}")]
    Link(String),
}

/// The device a transport connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
    /// Negotiated MTU in bytes.
    pub mtu: u32,
}

/// An active status subscription.
pub trait Subscription: Send {
    /// Stops delivery to the subscribed handler.
    fn remove(&mut self) -> Result<(), TransportError>;
}

/// Link to the companion device.
pub trait Transport: Send + Sync {
    /// Returns `true` if a device link is currently up.
    fn is_connected(&self) -> bool;

    /// Finds and connects to the device.
    fn connect(&self) -> BoxFuture<'_, Result<DeviceHandle, TransportError>>;

    /// Chunk payload size allowed by the current link.
    fn chunk_size(&self) -> u32;

    /// Writes a START frame to the control characteristic.
    fn write_start<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Writes one CHUNK frame to the data characteristic.
    fn write_chunk<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Writes the END frame to the control characteristic.
    fn write_end<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Registers `handler` for status notifications.
    fn subscribe_status(
        &self,
        handler: StatusHandler,
    ) -> Result<Box<dyn Subscription>, TransportError>;
}

/// Shared holder for a subscription that is removed at most once.
///
/// Both the event path (on a terminal event) and the writer path (on exit)
/// release through the same slot; whichever comes first removes it.
#[derive(Clone, Default)]
pub struct SubscriptionSlot {
    inner: Arc<Mutex<Option<Box<dyn Subscription>>>>,
}

impl SubscriptionSlot {
    /// Stores the subscription to release later.
    pub fn fill(&self, subscription: Box<dyn Subscription>) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(subscription);
    }

    /// Removes the subscription if still held. Returns `true` if this call removed it.
    ///
    /// Errors from the transport are logged and swallowed.
    pub fn release(&self) -> bool {
        let taken = {
            let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        let Some(mut subscription) = taken else {
            return false;
        };
        match subscription.remove() {
            Ok(()) => debug!("status subscription removed"),
            Err(e) => warn!(error = %e, "failed to remove status subscription"),
        }
        true
    }

    /// Returns `true` while a subscription is held.
    pub fn is_held(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Releases a [`SubscriptionSlot`] when dropped, including during unwinding.
pub struct SubscriptionGuard {
    slot: SubscriptionSlot,
}

impl SubscriptionGuard {
    pub fn new(slot: SubscriptionSlot) -> Self {
        Self { slot }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.slot.release();
    }
}
