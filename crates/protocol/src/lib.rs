pub mod constants;
pub mod frames;
pub mod status;

// Re-export primary types for convenience.
pub use frames::{ChunkFrame, FrameError, StartFrame, encode_end_frame, is_end_frame};
pub use status::{FailureKind, RemoteFailure, StatusDecodeError, StatusEvent};
