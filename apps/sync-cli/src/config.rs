//! Sync configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/talkbox/sync.toml`
//! - Windows: `%APPDATA%/talkbox/sync.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use talkbox_protocol::constants::REQUESTED_MTU;

/// Sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The memo to deliver first.
    #[serde(default = "default_memo_path")]
    pub memo_path: PathBuf,

    /// Directory holding the voice prompts the memo references.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Name the simulated device advertises.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// MTU the simulated link negotiates.
    #[serde(default = "default_mtu")]
    pub mtu: u32,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_memo_path() -> PathBuf {
    data_dir().join("storage").join("memo.json")
}

fn default_audio_dir() -> PathBuf {
    data_dir().join("tts")
}

fn default_device_name() -> String {
    "Talkbox".into()
}

fn default_mtu() -> u32 {
    REQUESTED_MTU
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memo_path: default_memo_path(),
            audio_dir: default_audio_dir(),
            device_name: default_device_name(),
            mtu: default_mtu(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("talkbox").join("sync.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".config").join("talkbox").join("sync.toml")
    }
}

/// Where the app keeps the memo and generated prompts.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("LOCALAPPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("talkbox")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".local").join("share").join("talkbox")
    }
}
