//! Chunked, acknowledged file delivery to the companion device.
//!
//! A [`TransferSession`] turns one local file into a START frame, a run of
//! CHUNK frames and an END frame, then waits for the device to confirm that
//! it stored the file. The wireless link sits behind the [`Transport`] trait.

mod chunker;
mod error;
mod meta;
mod progress;
mod router;
mod session;
mod transport;
mod types;

use std::time::Duration;

pub use chunker::ChunkReader;
pub use error::TransferError;
pub use meta::{ChunkPlan, FileMeta, compute_meta, compute_meta_with, digest_hex, filename_of};
pub use progress::{NoopObserver, SessionObserver, chunk_progress};
pub use router::StatusRouter;
pub use session::TransferSession;
pub use transport::{
    BoxFuture, DeviceHandle, StatusHandler, Subscription, SubscriptionGuard, SubscriptionSlot,
    Transport, TransportError,
};
pub use types::{Chunk, SessionState, TransferReport};

/// How long the device has to acknowledge START.
pub const START_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Poll interval while waiting for the START acknowledgment.
pub const START_ACK_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// How long the device has to confirm storage after END.
pub const STORE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Poll interval while waiting for the storage confirmation.
pub const STORE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pause before END so queued chunk writes drain on the link.
pub const END_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Filename used when a path has no final segment.
pub const DEFAULT_FILENAME: &str = "file.mp3";
