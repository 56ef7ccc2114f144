//! Multi-file sync with the companion device.
//!
//! A sync delivers `memo.json` followed by every voice prompt it references,
//! one [`TransferSession`](talkbox_transfer::TransferSession) at a time, and
//! reports a single progress value across the whole plan.

pub mod error;
pub mod memo;
pub mod orchestrator;
pub mod plan;

use std::time::Duration;

pub use error::{PlanError, SyncError};
pub use memo::build_plan;
pub use orchestrator::{SyncOrchestrator, SyncReport, aggregate_progress};
pub use plan::{FileKind, SyncEntry, SyncPlan};

/// Pause between consecutive files so the link settles.
pub const GUARD_INTERVAL: Duration = Duration::from_millis(300);
