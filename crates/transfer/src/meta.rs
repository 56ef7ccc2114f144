use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use talkbox_protocol::StartFrame;

use crate::{DEFAULT_FILENAME, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Which chunking parameter the caller fixes; the other one is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Fixed payload size per chunk; the chunk count follows from the file size.
    ChunkSize(u32),
    /// Fixed chunk count; the payload size is `ceil(size / count)`.
    TotalChunks(u32),
}

/// Size, digest and chunking of one file, computed once per transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    pub size_bytes: u64,
    /// SHA-256 of the file content, 64 lowercase hex chars.
    pub digest_hex: String,
    pub total_chunks: u32,
    pub chunk_size: u32,
    pub filename: String,
}

impl FileMeta {
    /// Builds metadata from already-known parts.
    ///
    /// `total_chunks` is `ceil(size / chunk_size)`, which is 0 only for an
    /// empty file.
    pub fn from_parts(
        size_bytes: u64,
        digest_hex: String,
        filename: String,
        plan: ChunkPlan,
    ) -> Result<Self, TransferError> {
        let chunk_size = match plan {
            ChunkPlan::ChunkSize(0) | ChunkPlan::TotalChunks(0) => {
                return Err(TransferError::EmptyInput);
            }
            ChunkPlan::ChunkSize(size) => size,
            ChunkPlan::TotalChunks(count) => {
                let derived = size_bytes.div_ceil(u64::from(count)).max(1);
                u32::try_from(derived).map_err(|_| {
                    TransferError::Metadata(format!(
                        "derived chunk size {derived} does not fit in 32 bits"
                    ))
                })?
            }
        };

        let chunks = size_bytes.div_ceil(u64::from(chunk_size));
        let total_chunks = u32::try_from(chunks).map_err(|_| {
            TransferError::Metadata(format!("{chunks} chunks exceed the sequence range"))
        })?;

        Ok(Self {
            size_bytes,
            digest_hex,
            total_chunks,
            chunk_size,
            filename,
        })
    }

    /// Builds the START frame announcing this file.
    ///
    /// Fails with [`TransferError::Metadata`] when the file cannot be
    /// described within the frame's field widths.
    pub fn start_frame(&self) -> Result<StartFrame, TransferError> {
        StartFrame::new(
            self.total_chunks,
            self.size_bytes,
            self.chunk_size,
            &self.digest_hex,
        )
        .map_err(|e| TransferError::Metadata(format!("{}: {e}", self.filename)))
    }
}

/// Reads `path` and computes its metadata for a fixed chunk size.
pub async fn compute_meta(path: &Path, chunk_size: u32) -> Result<FileMeta, TransferError> {
    compute_meta_with(path, ChunkPlan::ChunkSize(chunk_size)).await
}

/// Reads `path` and computes its metadata for the given chunking plan.
pub async fn compute_meta_with(path: &Path, plan: ChunkPlan) -> Result<FileMeta, TransferError> {
    if matches!(plan, ChunkPlan::ChunkSize(0) | ChunkPlan::TotalChunks(0)) {
        return Err(TransferError::EmptyInput);
    }

    let size = tokio::fs::metadata(path).await?.len();
    let data = tokio::fs::read(path).await?;
    if data.len() as u64 != size {
        return Err(TransferError::Metadata(format!(
            "{} changed while reading: stat {size} bytes, read {}",
            path.display(),
            data.len()
        )));
    }

    FileMeta::from_parts(size, digest_hex(&data), filename_of(path), plan)
}

/// Final path segment, or [`DEFAULT_FILENAME`] when there is none.
pub fn filename_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string()
}
