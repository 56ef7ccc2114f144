/// Tag byte opening a START frame.
pub const FRAME_START: u8 = 0x01;

/// Tag byte of the END frame (the whole frame is this single byte).
pub const FRAME_END: u8 = 0x02;

/// Number of leading digest bytes carried in the START frame.
pub const DIGEST_PREFIX_LEN: usize = 8;

/// Encoded START frame length: tag + chunks (2) + size (4) + chunk size (2) + digest prefix.
pub const START_FRAME_LEN: usize = 1 + 2 + 4 + 2 + DIGEST_PREFIX_LEN;

/// Length of the big-endian sequence header that precedes every chunk payload.
pub const CHUNK_HEADER_LEN: usize = 4;

/// Chunk payload size used until the link negotiates a larger MTU.
pub const DEFAULT_CHUNK_SIZE: u32 = 180;

/// Bytes of each MTU reserved for attribute and frame overhead.
pub const MTU_OVERHEAD: u32 = 64;

/// Largest MTU the companion app requests from the device.
pub const REQUESTED_MTU: u32 = 512;

/// Largest file the device accepts (512 KiB).
pub const MAX_FILE_SIZE: u32 = 512 * 1024;

/// Returns the chunk payload size for a negotiated MTU.
///
/// Never drops below [`DEFAULT_CHUNK_SIZE`], so a small or failed MTU
/// negotiation keeps the baseline payload.
pub fn chunk_size_for_mtu(mtu: u32) -> u32 {
    mtu.saturating_sub(MTU_OVERHEAD).max(DEFAULT_CHUNK_SIZE)
}
