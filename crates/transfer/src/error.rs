//! Transfer error types.

use talkbox_protocol::RemoteFailure;

use crate::transport::TransportError;

/// Errors produced by a transfer attempt.
///
/// Every variant is terminal for the attempt; nothing is retried inside the
/// session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    EmptyInput,

    #[error("invalid file metadata: {0}")]
    Metadata(String),

    #[error("device not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(TransportError),

    #[error("status subscription failed: {0}")]
    Subscribe(TransportError),

    #[error("write failed: {0}")]
    Write(TransportError),

    #[error("device rejected START: {0}")]
    StartRejected(RemoteFailure),

    #[error("START acknowledgment timed out")]
    StartAckTimeout,

    #[error("transfer aborted by device: {0}")]
    TransferAborted(RemoteFailure),

    #[error("device failed to store file: {0}")]
    StoreFailed(RemoteFailure),

    #[error("store confirmation timed out")]
    StoreTimeout,
}

impl TransferError {
    /// Returns `true` for the two timeout failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartAckTimeout | Self::StoreTimeout)
    }
}
