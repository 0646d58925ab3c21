//! Configuration management.
//!
//! Settings load from an optional `droidflow.toml`; every field has a
//! default so the tool runs without one. The adb binary resolves through
//! PATH unless pinned explicitly.

use crate::constants::android::{
    DEFAULT_ACCOUNT_REMOTE_PATH, DEFAULT_TARGET_ACTIVITY, DEFAULT_TARGET_PACKAGE,
};
use crate::constants::commands::ADB;
use crate::constants::defaults::DEFAULT_ACCOUNT_EXTENSION;
use crate::constants::files::APP_DIR_NAME;
use crate::constants::timeouts::{COLD_START_WAIT, DEVICE_POLL_INTERVAL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Package and launch activity of the automated app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppTarget {
    pub package: String,
    pub activity: String,
}

impl Default for AppTarget {
    fn default() -> Self {
        Self {
            package: DEFAULT_TARGET_PACKAGE.to_string(),
            activity: DEFAULT_TARGET_ACTIVITY.to_string(),
        }
    }
}

/// Device-facing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Remote path the target app reads its account file from
    pub account_remote_path: String,
    #[serde(flatten)]
    pub target: AppTarget,
    /// Seconds to wait after restart_game for the app to cold-start
    pub cold_start_wait_secs: u64,
    /// Registry poll interval in seconds
    pub poll_interval_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            account_remote_path: DEFAULT_ACCOUNT_REMOTE_PATH.to_string(),
            target: AppTarget::default(),
            cold_start_wait_secs: COLD_START_WAIT.as_secs(),
            poll_interval_secs: DEVICE_POLL_INTERVAL.as_secs(),
        }
    }
}

/// Batch-run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// File extension scanned from the account folder
    pub account_extension: String,
    /// Move successful files into the done folder
    pub move_on_complete: bool,
    /// Done folder; `<source>/done/` when unset
    pub done_folder: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            account_extension: DEFAULT_ACCOUNT_EXTENSION.to_string(),
            move_on_complete: true,
            done_folder: None,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Explicit adb binary path; resolved through PATH when unset
    #[serde(default)]
    pub adb_path: Option<PathBuf>,
    /// Data directory for workflow and template stores
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Loads from the given file, or returns defaults when no file exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// The adb binary to invoke: the pinned path, or PATH resolution.
    pub fn resolve_adb(&self) -> Result<PathBuf> {
        if let Some(path) = &self.adb_path {
            return Ok(path.clone());
        }
        which::which(ADB).context("adb not found in PATH; install platform-tools or set adb_path")
    }

    /// Data directory for the workflow and template stores.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR_NAME)
    }

    pub fn cold_start_wait(&self) -> Duration {
        Duration::from_secs(self.device.cold_start_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.device.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.batch.account_extension, "xml");
        assert!(config.batch.move_on_complete);
        assert!(config.device.account_remote_path.starts_with("/sdcard/"));
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(PathBuf::from("/nonexistent/droidflow.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }
}
