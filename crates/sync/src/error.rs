//! Sync error types.

use std::path::PathBuf;

use talkbox_transfer::TransferError;

/// Errors produced while building a sync plan from the memo.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("memo is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid memo format: {0}")]
    InvalidMemo(String),

    #[error("memo item {index}: invalid audioFile ({reason})")]
    InvalidAudioFile { index: usize, reason: String },

    #[error("missing audio file: {0}")]
    MissingAudio(String),
}

/// Errors produced by a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("file {index} ({}) failed: {source}", path.display())]
    Transfer {
        /// 1-based position in the plan.
        index: usize,
        path: PathBuf,
        source: TransferError,
    },
}
