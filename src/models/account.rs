//! Account task records flowing through the shared queue.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One account state file scheduled for processing.
///
/// Lifecycle: scanned from a folder, enqueued, claimed by a worker
/// (stamps `running_on_device`), completed (`processed` with outcome),
/// then optionally moved to the done folder or deleted when bugged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountTask {
    pub filename: String,
    pub filepath: PathBuf,
    pub processed: bool,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Serial of the worker currently holding this task, if any
    #[serde(default)]
    pub running_on_device: Option<String>,
}

impl AccountTask {
    pub fn new(filename: impl Into<String>, filepath: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            filepath: filepath.into(),
            processed: false,
            success: false,
            error_message: None,
            running_on_device: None,
        }
    }

    /// Claimable means not yet processed and not held by any worker.
    pub fn is_claimable(&self) -> bool {
        !self.processed && self.running_on_device.is_none()
    }
}
