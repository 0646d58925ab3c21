//! Account exporter.
//!
//! Pulls the configured remote account file from each selected device into
//! a local folder, one file per serial stamped with a timestamp so repeated
//! exports never clobber each other.

use crate::bridge::channel::DeviceChannel;
use crate::models::error::{EngineError, EngineResult};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One device's export outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedAccount {
    pub serial: String,
    pub file_path: PathBuf,
}

pub struct AccountExporter {
    remote_path: String,
}

impl AccountExporter {
    pub fn new(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
        }
    }

    /// Pulls from every channel into `out_dir`. Failing devices are
    /// reported alongside the successes rather than aborting the batch.
    pub async fn export_all(
        &self,
        channels: &[DeviceChannel],
        out_dir: &Path,
    ) -> EngineResult<(Vec<ExportedAccount>, Vec<(String, EngineError)>)> {
        tokio::fs::create_dir_all(out_dir).await?;
        let mut exported = Vec::new();
        let mut failures = Vec::new();
        for channel in channels {
            match self.export_one(channel, out_dir).await {
                Ok(account) => exported.push(account),
                Err(e) => {
                    log::warn!("export failed on {}: {e}", channel.serial());
                    failures.push((channel.serial().to_string(), e));
                }
            }
        }
        Ok((exported, failures))
    }

    async fn export_one(
        &self,
        channel: &DeviceChannel,
        out_dir: &Path,
    ) -> EngineResult<ExportedAccount> {
        let bytes = channel.pull(&self.remote_path).await?;
        let extension = Path::new(&self.remote_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let serial_safe: String = channel
            .serial()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let file_name = format!(
            "{serial_safe}_{}.{extension}",
            Local::now().format("%Y%m%d%H%M%S")
        );
        let file_path = out_dir.join(file_name);
        tokio::fs::write(&file_path, &bytes).await?;
        log::info!(
            "exported {} bytes from {} to {}",
            bytes.len(),
            channel.serial(),
            file_path.display()
        );
        Ok(ExportedAccount {
            serial: channel.serial().to_string(),
            file_path,
        })
    }
}
