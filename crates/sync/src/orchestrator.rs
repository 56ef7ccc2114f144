//! Sequential delivery of a [`SyncPlan`] with aggregate progress.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use talkbox_transfer::{SessionObserver, TransferReport, TransferSession, Transport};
use tracing::{error, info};

use crate::GUARD_INTERVAL;
use crate::error::SyncError;
use crate::memo::build_plan;
use crate::plan::SyncPlan;

/// Maps a file's local progress onto the whole plan.
///
/// For file `index` of `count` (1-based) this is
/// `floor(((index - 1) / count) * 100 + percent / count)`.
pub fn aggregate_progress(index: usize, count: usize, percent: u8) -> u8 {
    if count == 0 {
        return 100;
    }
    let index = index.clamp(1, count);
    let value = ((index - 1) * 100 + usize::from(percent.min(100))) / count;
    value as u8
}

/// Outcome of a completed sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub files: Vec<TransferReport>,
}

impl SyncReport {
    /// Returns `true` if the device confirmed every digest it stored.
    pub fn all_confirmed(&self) -> bool {
        self.files.iter().all(TransferReport::digest_confirmed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.meta.size_bytes).sum()
    }
}

/// Plan-wide progress, forwarded to the caller only when it changes.
struct PlanProgress {
    observer: Arc<dyn SessionObserver>,
    last: Mutex<Option<u8>>,
}

impl PlanProgress {
    fn new(observer: Arc<dyn SessionObserver>) -> Arc<Self> {
        Arc::new(Self {
            observer,
            last: Mutex::new(None),
        })
    }

    fn report(&self, percent: u8) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(percent) {
            return;
        }
        *last = Some(percent);
        drop(last);
        self.observer.on_progress(percent);
    }
}

/// Session observer for one file of the plan.
struct FileObserver {
    index: usize,
    count: usize,
    plan: Arc<PlanProgress>,
}

impl SessionObserver for FileObserver {
    fn on_progress(&self, percent: u8) {
        self.plan
            .report(aggregate_progress(self.index, self.count, percent));
    }

    fn on_state_change(&self, label: &str) {
        self.plan.observer.on_state_change(label);
    }
}

/// Delivers sync plans over one transport, one file at a time.
pub struct SyncOrchestrator<'a> {
    transport: &'a dyn Transport,
    observer: Arc<dyn SessionObserver>,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(transport: &'a dyn Transport, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            transport,
            observer,
        }
    }

    /// Builds the plan from the memo, then syncs it.
    pub async fn sync_memo(
        &self,
        memo_path: &Path,
        audio_dir: &Path,
    ) -> Result<SyncReport, SyncError> {
        self.observer.on_state_change("PREPARING FILES");
        let progress = PlanProgress::new(Arc::clone(&self.observer));
        progress.report(0);
        let plan = build_plan(memo_path, audio_dir).await.inspect_err(|e| {
            error!(error = %e, "failed to prepare sync plan");
        })?;
        self.deliver(&plan, progress).await
    }

    /// Delivers every file of `plan` in order.
    ///
    /// The first failing file aborts the plan; files after it are not
    /// attempted.
    pub async fn sync(&self, plan: &SyncPlan) -> Result<SyncReport, SyncError> {
        self.deliver(plan, PlanProgress::new(Arc::clone(&self.observer)))
            .await
    }

    async fn deliver(
        &self,
        plan: &SyncPlan,
        progress: Arc<PlanProgress>,
    ) -> Result<SyncReport, SyncError> {
        let count = plan.len();
        let mut files = Vec::with_capacity(count);

        for (i, entry) in plan.entries().iter().enumerate() {
            let index = i + 1;
            if index > 1 {
                tokio::time::sleep(GUARD_INTERVAL).await;
            }

            self.observer
                .on_state_change(&format!("SYNC {} ({index}/{count})", entry.kind.label()));
            info!(index, count, path = %entry.path.display(), "syncing file");

            let observer = Arc::new(FileObserver {
                index,
                count,
                plan: Arc::clone(&progress),
            });
            let report = TransferSession::new(self.transport, &entry.path, observer)
                .run()
                .await
                .map_err(|source| {
                    error!(index, path = %entry.path.display(), error = %source, "sync aborted");
                    SyncError::Transfer {
                        index,
                        path: entry.path.clone(),
                        source,
                    }
                })?;
            files.push(report);
        }

        progress.report(100);
        self.observer.on_state_change("SYNC DONE");
        info!(files = files.len(), "sync complete");
        Ok(SyncReport { files })
    }
}
