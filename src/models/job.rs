//! Job lifecycle types for the multi-device batch run.

use crate::models::account::AccountTask;
use crate::models::device::DeviceRuntime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lifecycle of the process-wide job. At most one job exists; `start`
/// moves it to `Running`, worker drain moves it to `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Completed,
}

/// User-tunable batch behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSettings {
    /// Move successful account files into the done folder after completion
    pub move_on_complete: bool,
    /// Destination for completed files; defaults to `<source>/done/`
    pub done_folder: Option<PathBuf>,
    /// Workers keep claiming until the queue drains
    pub auto_claim_enabled: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            move_on_complete: true,
            done_folder: None,
            auto_claim_enabled: true,
        }
    }
}

/// Read-only view of the current job, safe to hand to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub folder_path: Option<PathBuf>,
    pub total_accounts: usize,
    pub processed_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub accounts: Vec<AccountTask>,
    /// Per-device runtime blocks keyed by serial
    pub workers: HashMap<String, DeviceRuntime>,
}

impl JobSnapshot {
    pub fn idle() -> Self {
        Self {
            state: JobState::Idle,
            folder_path: None,
            total_accounts: 0,
            processed_count: 0,
            success_count: 0,
            error_count: 0,
            accounts: Vec::new(),
            workers: HashMap::new(),
        }
    }
}
