use serde::Serialize;

use crate::meta::FileMeta;

/// One bounded slice of a file tagged with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based, contiguous within a file.
    pub sequence: u32,
    /// At most the chunk size; only the last chunk may be shorter.
    pub payload: Vec<u8>,
}

/// Lifecycle of a [`TransferSession`](crate::TransferSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Prep,
    Connect,
    SendStart,
    WaitStartAck,
    SendChunks,
    SendEnd,
    WaitStored,
    Done,
    Error,
}

impl SessionState {
    /// Label shown to the user for this state.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Prep => "PREP FILE",
            Self::Connect => "CONNECTING",
            Self::SendStart => "SEND START",
            Self::WaitStartAck => "WAIT ACK",
            Self::SendChunks => "SEND CHUNKS",
            Self::SendEnd => "SEND END",
            Self::WaitStored => "WAIT DEVICE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub meta: FileMeta,
    /// Digest the device reported with `stored`. Empty if it sent none.
    pub stored_digest: String,
}

impl TransferReport {
    /// Returns `true` if the device reported the same digest that was sent.
    pub fn digest_confirmed(&self) -> bool {
        self.stored_digest.eq_ignore_ascii_case(&self.meta.digest_hex)
    }
}
