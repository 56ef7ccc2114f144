//! Wires the config, the simulated device and the sync orchestrator together.

use std::sync::Arc;

use talkbox_device_sim::SimulatedDevice;
use talkbox_sync::{SyncOrchestrator, SyncReport};
use talkbox_transfer::SessionObserver;

use crate::config::Config;

/// Logs sync progress and state labels.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_progress(&self, percent: u8) {
        tracing::info!(percent, "progress");
    }

    fn on_state_change(&self, label: &str) {
        tracing::info!(state = label, "state");
    }
}

/// Runs one sync of the configured memo against a simulated device.
pub async fn run(config: Config) -> anyhow::Result<SyncReport> {
    let device = SimulatedDevice::new(config.device_name.clone(), config.mtu);
    let orchestrator = SyncOrchestrator::new(&device, Arc::new(LogObserver));

    let report = orchestrator
        .sync_memo(&config.memo_path, &config.audio_dir)
        .await?;

    if !report.all_confirmed() {
        tracing::warn!("device reported a digest that differs from the one sent");
    }
    tracing::info!(
        files = report.files.len(),
        bytes = report.total_bytes(),
        stored = device.stored_files().len(),
        "sync finished"
    );
    Ok(report)
}
