//! Configuration file support for songloom
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/songloom/config.toml`
//! - macOS: `~/Library/Application Support/songloom/config.toml`
//! - Windows: `%APPDATA%\songloom\config.toml`

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use songloom_core::DEFAULT_HUMANIZE_SECONDS;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults applied to songs that leave them out
    pub song: SongDefaults,
    /// Realtime transport settings
    pub transport: TransportSettings,
    /// Timeline dump settings
    pub timeline: TimelineSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Err(anyhow!("Config file not found at {}", path.display()));
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "songloom")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| anyhow!("Could not determine config directory"))
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config(&path)?;
        Ok(path)
    }

    fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = r#"# songloom configuration file

[song]
# Tempo used when a song file does not set one
bpm = 120.0

# Maximum humanize offset in seconds (capped below half a sixteenth)
humanize = 0.02

[transport]
# Longest sleep between stop checks during realtime playback
poll_interval_ms = 10

[timeline]
# Loops printed by `songloom timeline` when --loops is not given
loops = 1
"#;

        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Song defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongDefaults {
    /// Tempo in BPM
    pub bpm: f64,
    /// Humanize range in seconds
    pub humanize: f64,
}

impl Default for SongDefaults {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            humanize: DEFAULT_HUMANIZE_SECONDS,
        }
    }
}

/// Realtime transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub poll_interval_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { poll_interval_ms: 10 }
    }
}

impl TransportSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Timeline dump settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    pub loops: u32,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self { loops: 1 }
    }
}
