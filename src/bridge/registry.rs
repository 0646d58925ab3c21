//! Device discovery and status tracking.
//!
//! The registry polls `adb devices` for attached serials and `wm size` for
//! screen geometry. Entries for serials that disappear are retained as
//! offline until the user removes them; status transitions are published on
//! the status bus. The `assigned_task` field is a pure label; starting work
//! is the job coordinator's business.

use crate::bridge::executor::CommandExecutor;
use crate::constants::android::{ADB_DEVICE_STATE, ADB_OFFLINE_STATE, ADB_UNAUTHORIZED_STATE};
use crate::constants::commands::{DEVICES, SERIAL_FLAG, SHELL, WINDOW_MANAGER, WM_SIZE};
use crate::engine::status::{StatusBus, StatusEvent};
use crate::models::device::{AssignedTask, DeviceEntry, DeviceRuntime, DeviceStatus};
use crate::models::error::{EngineError, EngineResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct DeviceRegistry {
    adb: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    entries: Mutex<BTreeMap<String, DeviceEntry>>,
    bus: StatusBus,
}

impl DeviceRegistry {
    pub fn new(executor: Arc<dyn CommandExecutor>, adb: impl Into<PathBuf>, bus: StatusBus) -> Self {
        Self {
            adb: adb.into(),
            executor,
            entries: Mutex::new(BTreeMap::new()),
            bus,
        }
    }

    pub fn adb_path(&self) -> &PathBuf {
        &self.adb
    }

    /// One discovery pass: refresh attachment states, pick up geometry for
    /// newly online serials, publish transitions. Returns the snapshot.
    pub async fn refresh(&self) -> EngineResult<Vec<DeviceEntry>> {
        let output = self
            .executor
            .run(&self.adb, &[DEVICES])
            .await
            .map_err(|e| EngineError::bridge("host", e.to_string()))?;
        let attached = parse_adb_devices(&output);

        // Geometry queries happen outside the entries lock.
        let mut needs_size: Vec<String> = Vec::new();
        {
            let mut entries = self.entries.lock().unwrap();
            let mut seen: Vec<&str> = Vec::new();

            for (serial, state) in &attached {
                seen.push(serial.as_str());
                let online = state == ADB_DEVICE_STATE;
                let existed = entries.contains_key(serial);
                let entry = entries
                    .entry(serial.clone())
                    .or_insert_with(|| DeviceEntry::new(serial.clone()));
                let was_online = existed && entry.status == DeviceStatus::Online;
                entry.status = if online {
                    DeviceStatus::Online
                } else {
                    DeviceStatus::Offline
                };
                if online && !was_online {
                    self.bus.publish(StatusEvent::DeviceOnline {
                        serial: serial.clone(),
                    });
                }
                if !online && was_online {
                    self.bus.publish(StatusEvent::DeviceOffline {
                        serial: serial.clone(),
                    });
                }
                if online && entry.screen_size.is_none() {
                    needs_size.push(serial.clone());
                }
            }

            // Serials that vanished from the listing go offline.
            for (serial, entry) in entries.iter_mut() {
                if entry.status == DeviceStatus::Online && !seen.contains(&serial.as_str()) {
                    entry.status = DeviceStatus::Offline;
                    self.bus.publish(StatusEvent::DeviceOffline {
                        serial: serial.clone(),
                    });
                }
            }
        }

        for serial in needs_size {
            if let Some(size) = self.query_screen_size(&serial).await {
                let mut entries = self.entries.lock().unwrap();
                if let Some(entry) = entries.get_mut(&serial) {
                    entry.screen_size = Some(size);
                }
            }
        }

        Ok(self.snapshot())
    }

    async fn query_screen_size(&self, serial: &str) -> Option<(u32, u32)> {
        let args = [SERIAL_FLAG, serial, SHELL, WINDOW_MANAGER, WM_SIZE];
        match self.executor.run(&self.adb, &args).await {
            Ok(output) => crate::bridge::channel::parse_wm_size(&output),
            Err(e) => {
                log::warn!("wm size failed for {serial}: {e}");
                None
            }
        }
    }

    /// Spawns the periodic poll task.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = registry.refresh().await {
                    log::warn!("device poll failed: {e}");
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    pub fn snapshot(&self) -> Vec<DeviceEntry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, serial: &str) -> Option<DeviceEntry> {
        self.entries.lock().unwrap().get(serial).cloned()
    }

    /// Flips a device offline; used by channels when the bridge dies.
    pub fn mark_offline(&self, serial: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(serial) {
            if entry.status == DeviceStatus::Online {
                entry.status = DeviceStatus::Offline;
                self.bus.publish(StatusEvent::DeviceOffline {
                    serial: serial.to_string(),
                });
            }
        }
    }

    pub fn set_assigned_task(&self, serial: &str, task: AssignedTask) -> EngineResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(serial)
            .ok_or_else(|| EngineError::DeviceNotFound {
                serial: serial.to_string(),
            })?;
        entry.assigned_task = task;
        Ok(())
    }

    /// Applies a mutation to a device's runtime block.
    pub fn update_runtime<F>(&self, serial: &str, mutate: F)
    where
        F: FnOnce(&mut DeviceRuntime),
    {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(serial) {
            mutate(&mut entry.runtime);
        }
    }

    /// Removes an entry; offline entries are retained until this is called.
    pub fn remove(&self, serial: &str) -> bool {
        self.entries.lock().unwrap().remove(serial).is_some()
    }

    /// Registers a serial directly. Lets tests and one-shot runs skip the
    /// discovery poll.
    pub fn insert(&self, entry: DeviceEntry) {
        self.entries.lock().unwrap().insert(entry.serial.clone(), entry);
    }
}

/// Parses `adb devices` output into (serial, state) pairs.
pub fn parse_adb_devices(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .skip(1) // "List of devices attached"
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            if matches!(
                state,
                ADB_DEVICE_STATE | ADB_OFFLINE_STATE | ADB_UNAUTHORIZED_STATE
            ) {
                Some((serial.to_string(), state.to_string()))
            } else {
                None
            }
        })
        .collect()
}
