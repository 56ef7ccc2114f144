//! Event path of a transfer: decodes device notifications and latches
//! session flags.
//!
//! The router is shared between the transport's notification callback and
//! the session's writer path. They communicate only through the latches
//! here, each of which moves from `false` to `true` at most once. The first
//! terminal event (`stored` or a failure) wins and everything after it is
//! ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use talkbox_protocol::{RemoteFailure, StatusEvent};
use tracing::{debug, info, warn};

use crate::progress::{ProgressLatch, SessionObserver, chunk_progress};
use crate::transport::SubscriptionSlot;

/// Routes status notifications for one transfer attempt.
pub struct StatusRouter {
    total_chunks: u32,
    start_acked: AtomicBool,
    failed: AtomicBool,
    done: AtomicBool,
    terminal: AtomicBool,
    progress: ProgressLatch,
    failure: Mutex<Option<RemoteFailure>>,
    stored_digest: Mutex<String>,
    observer: Arc<dyn SessionObserver>,
    subscription: SubscriptionSlot,
}

impl StatusRouter {
    pub fn new(
        total_chunks: u32,
        observer: Arc<dyn SessionObserver>,
        subscription: SubscriptionSlot,
    ) -> Self {
        Self {
            total_chunks,
            start_acked: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            done: AtomicBool::new(false),
            terminal: AtomicBool::new(false),
            progress: ProgressLatch::default(),
            failure: Mutex::new(None),
            stored_digest: Mutex::new(String::new()),
            observer,
            subscription,
        }
    }

    /// Decodes a raw notification and applies it. Malformed payloads are dropped.
    pub fn route(&self, payload: &[u8]) {
        match StatusEvent::decode(payload) {
            Ok(event) => self.dispatch(event),
            Err(e) => warn!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "dropping malformed status notification"
            ),
        }
    }

    /// Applies a typed event to the session latches.
    pub fn dispatch(&self, event: StatusEvent) {
        if self.is_terminal() {
            debug!(event = event.tag(), "ignoring status event after terminal event");
            return;
        }

        match event {
            StatusEvent::StartAck => {
                debug!("START acknowledged");
                self.start_acked.store(true, Ordering::Release);
            }
            StatusEvent::ChunkAck {
                seq,
                received_count,
            } => {
                let Some(percent) = chunk_progress(received_count, self.total_chunks) else {
                    return;
                };
                debug!(seq, received_count, percent, "chunk acknowledged");
                if self.progress.advance(percent) {
                    self.observer.on_progress(percent);
                }
            }
            StatusEvent::Stored { digest_hex } => {
                if !self.start_acked() {
                    warn!("ignoring `stored` received before START was acknowledged");
                    return;
                }
                if !self.latch_terminal() {
                    return;
                }
                info!(digest = %digest_hex, "device stored file");
                *self.stored_digest.lock().unwrap_or_else(|e| e.into_inner()) = digest_hex;
                self.done.store(true, Ordering::Release);
                self.complete_progress();
                self.subscription.release();
            }
            StatusEvent::Failed(failure) => {
                if !self.latch_terminal() {
                    return;
                }
                warn!(failure = %failure, "device reported failure");
                *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(failure);
                self.failed.store(true, Ordering::Release);
                self.subscription.release();
            }
            StatusEvent::Unknown(tag) => {
                warn!(event = %tag, "ignoring unknown status event");
            }
        }
    }

    /// Reports 100% unless it was already reported.
    pub(crate) fn complete_progress(&self) {
        if self.progress.complete() {
            self.observer.on_progress(100);
        }
    }

    fn latch_terminal(&self) -> bool {
        self.terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    pub fn start_acked(&self) -> bool {
        self.start_acked.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// The device failure, once the failure latch is set.
    pub fn failure(&self) -> Option<RemoteFailure> {
        if !self.is_failed() {
            return None;
        }
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Digest reported with `stored` (empty until then).
    pub fn stored_digest(&self) -> String {
        self.stored_digest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
