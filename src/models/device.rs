//! Device model definitions for fleet entries tracked by the registry.
//!
//! A device is identified by its adb serial. The registry retains entries
//! for serials that went offline until the user removes them, so status is
//! explicit rather than implied by presence.

use serde::{Deserialize, Serialize};

/// Connection state of a tracked device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Visible to adb and accepting commands
    Online,
    /// No longer attached, or adb reported it offline
    Offline,
}

/// Label for the workload a device is earmarked for. Assigning a task does
/// not start work; the job coordinator does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignedTask {
    #[default]
    None,
    DailyLogin,
    ReId,
}

/// Mutable runtime block updated by the coordinator while a job runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceRuntime {
    /// Whether a worker currently drives this device
    pub is_running: bool,
    /// Filename of the account being processed, if any
    pub current_account: Option<String>,
    /// Accounts completed successfully on this device during the job
    pub success_count: u32,
    /// Accounts that failed on this device during the job
    pub error_count: u32,
}

/// One tracked device in the registry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// adb serial, e.g. "emulator-5554"
    pub serial: String,
    pub status: DeviceStatus,
    /// Native screen size (width, height) as reported by `wm size`
    pub screen_size: Option<(u32, u32)>,
    pub assigned_task: AssignedTask,
    #[serde(default)]
    pub runtime: DeviceRuntime,
}

impl DeviceEntry {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            status: DeviceStatus::Online,
            screen_size: None,
            assigned_task: AssignedTask::None,
            runtime: DeviceRuntime::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}
