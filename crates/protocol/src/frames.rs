//! Binary frames written to the device.
//!
//! # Wire format
//!
//! ```text
//! START (17 bytes, big-endian):
//!   [1 byte: 0x01]
//!   [2 bytes: total_chunks]
//!   [4 bytes: total_size]
//!   [2 bytes: chunk_size]
//!   [8 bytes: first 8 bytes of the SHA-256 digest]
//!
//! CHUNK:
//!   [4 bytes: seq]
//!   [payload bytes, at most chunk_size]
//!
//! END:
//!   [1 byte: 0x02]
//! ```

use crate::constants::{
    CHUNK_HEADER_LEN, DIGEST_PREFIX_LEN, FRAME_END, FRAME_START, START_FRAME_LEN,
};

/// Errors produced while building or parsing frames.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{field} out of range: {value} (max {max})")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("unexpected frame tag 0x{0:02x}")]
    BadTag(u8),
}

/// Header frame announcing a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartFrame {
    pub total_chunks: u16,
    pub total_size: u32,
    pub chunk_size: u16,
    pub digest_prefix: [u8; DIGEST_PREFIX_LEN],
}

impl StartFrame {
    /// Builds a START frame from transfer metadata.
    ///
    /// Fails when a field does not fit its wire width or when `digest_hex`
    /// does not start with 16 hex characters.
    pub fn new(
        total_chunks: u32,
        total_size: u64,
        chunk_size: u32,
        digest_hex: &str,
    ) -> Result<Self, FrameError> {
        let total_chunks = narrow_u16("total_chunks", total_chunks)?;
        let chunk_size = narrow_u16("chunk_size", chunk_size)?;
        let total_size = u32::try_from(total_size).map_err(|_| FrameError::FieldOverflow {
            field: "total_size",
            value: total_size,
            max: u64::from(u32::MAX),
        })?;

        let hex_prefix = digest_hex
            .as_bytes()
            .get(..DIGEST_PREFIX_LEN * 2)
            .ok_or_else(|| {
                FrameError::InvalidDigest(format!(
                    "need at least {} hex chars, got {}",
                    DIGEST_PREFIX_LEN * 2,
                    digest_hex.len()
                ))
            })?;
        let mut digest_prefix = [0u8; DIGEST_PREFIX_LEN];
        hex::decode_to_slice(hex_prefix, &mut digest_prefix)
            .map_err(|e| FrameError::InvalidDigest(e.to_string()))?;

        Ok(Self {
            total_chunks,
            total_size,
            chunk_size,
            digest_prefix,
        })
    }

    /// Encodes the frame into its fixed 17-byte wire form.
    pub fn encode(&self) -> [u8; START_FRAME_LEN] {
        let mut buf = [0u8; START_FRAME_LEN];
        buf[0] = FRAME_START;
        buf[1..3].copy_from_slice(&self.total_chunks.to_be_bytes());
        buf[3..7].copy_from_slice(&self.total_size.to_be_bytes());
        buf[7..9].copy_from_slice(&self.chunk_size.to_be_bytes());
        buf[9..].copy_from_slice(&self.digest_prefix);
        buf
    }

    /// Parses a START frame (device side).
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let Some(&tag) = data.first() else {
            return Err(FrameError::Truncated {
                expected: START_FRAME_LEN,
                got: 0,
            });
        };
        if tag != FRAME_START {
            return Err(FrameError::BadTag(tag));
        }
        if data.len() != START_FRAME_LEN {
            return Err(FrameError::Truncated {
                expected: START_FRAME_LEN,
                got: data.len(),
            });
        }

        let mut digest_prefix = [0u8; DIGEST_PREFIX_LEN];
        digest_prefix.copy_from_slice(&data[9..]);

        Ok(Self {
            total_chunks: u16::from_be_bytes([data[1], data[2]]),
            total_size: u32::from_be_bytes([data[3], data[4], data[5], data[6]]),
            chunk_size: u16::from_be_bytes([data[7], data[8]]),
            digest_prefix,
        })
    }

    /// Digest prefix as 16 lowercase hex characters.
    pub fn digest_prefix_hex(&self) -> String {
        hex::encode(self.digest_prefix)
    }
}

fn narrow_u16(field: &'static str, value: u32) -> Result<u16, FrameError> {
    u16::try_from(value).map_err(|_| FrameError::FieldOverflow {
        field,
        value: u64::from(value),
        max: u64::from(u16::MAX),
    })
}

/// One chunk of file data tagged with its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFrame<'a> {
    pub seq: u32,
    pub payload: &'a [u8],
}

impl<'a> ChunkFrame<'a> {
    pub fn new(seq: u32, payload: &'a [u8]) -> Self {
        Self { seq, payload }
    }

    /// Encodes `seq` (big-endian) followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(self.payload);
        buf
    }

    /// Splits a raw chunk write into sequence number and payload.
    pub fn decode(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() < CHUNK_HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: CHUNK_HEADER_LEN,
                got: data.len(),
            });
        }
        let (header, payload) = data.split_at(CHUNK_HEADER_LEN);
        Ok(Self {
            seq: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
            payload,
        })
    }
}

/// Encodes the END frame.
pub fn encode_end_frame() -> [u8; 1] {
    [FRAME_END]
}

/// Returns `true` if a write on the control characteristic is the END frame.
pub fn is_end_frame(data: &[u8]) -> bool {
    data == [FRAME_END]
}
