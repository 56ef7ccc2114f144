//! Builds the sync plan from `memo.json`.
//!
//! The memo goes first, then each distinct `audioFile` referenced by
//! `items[]`, in order of first appearance:
//!
//! ```text
//! {"version": 1, "items": [{"memoId": "r1", "audioFile": "tts_r1.wav", ...}]}
//! ```

use std::collections::HashSet;
use std::path::{Component, Path};

use serde_json::Value;
use tracing::debug;

use crate::error::PlanError;
use crate::plan::{FileKind, SyncEntry, SyncPlan};

/// Reads the memo at `memo_path` and resolves its audio files in `audio_dir`.
pub async fn build_plan(memo_path: &Path, audio_dir: &Path) -> Result<SyncPlan, PlanError> {
    let raw = tokio::fs::read(memo_path)
        .await
        .map_err(|source| PlanError::Io {
            path: memo_path.to_path_buf(),
            source,
        })?;
    let memo: Value = serde_json::from_slice(&raw)?;
    let items = memo
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::InvalidMemo("`items` is not an array".into()))?;

    let mut entries = vec![SyncEntry::new(memo_path, FileKind::Memo)];
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let name = item
            .get("audioFile")
            .and_then(Value::as_str)
            .ok_or_else(|| PlanError::InvalidAudioFile {
                index,
                reason: "not a string".into(),
            })?;
        if seen.contains(name) {
            continue;
        }
        validate_audio_name(name).map_err(|reason| PlanError::InvalidAudioFile {
            index,
            reason: reason.into(),
        })?;

        let path = audio_dir.join(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PlanError::MissingAudio(name.to_string()));
        }

        seen.insert(name.to_string());
        entries.push(SyncEntry::new(path, FileKind::Audio));
    }

    debug!(files = entries.len(), memo = %memo_path.display(), "sync plan built");
    Ok(SyncPlan::new(entries))
}

/// Audio names must stay inside the audio directory.
fn validate_audio_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err("parent directory traversal"),
            Component::RootDir | Component::Prefix(_) => return Err("absolute path"),
        }
    }
    Ok(())
}
