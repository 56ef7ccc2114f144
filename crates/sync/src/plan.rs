use std::path::PathBuf;

use serde::Serialize;

/// What a synced file is, as far as the device cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Memo,
    Audio,
}

impl FileKind {
    /// Short tag used in state labels.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Memo => "JSON",
            Self::Audio => "WAV",
        }
    }
}

/// One file of a sync plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEntry {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl SyncEntry {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Ordered, immutable list of files to deliver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    entries: Vec<SyncEntry>,
}

impl SyncPlan {
    pub fn new(entries: Vec<SyncEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
