//! Per-device serialized command channel.
//!
//! One [`DeviceChannel`] wraps one serial. Every outbound command takes the
//! channel's async lock, so no two operations hit the same device
//! concurrently: adb clients tolerate concurrency poorly, and a screenshot
//! must reflect the input that was injected just before it.
//!
//! Transient bridge errors are retried at the call site; once the retry
//! budget is spent the device is marked offline in the registry and the
//! error propagates. Nothing is swallowed.

use crate::bridge::executor::CommandExecutor;
use crate::bridge::registry::DeviceRegistry;
use crate::config::AppTarget;
use crate::constants::android::KEYCODE_BACK;
use crate::constants::commands::{
    ACTIVITY_MANAGER, AM_FORCE_STOP, AM_START, AM_START_COMPONENT_FLAG, EXEC_OUT, INPUT,
    INPUT_KEYEVENT, INPUT_SWIPE, INPUT_TAP, PULL, PUSH, SCREENCAP, SCREENCAP_PNG_FLAG, SERIAL_FLAG,
    SHELL, WINDOW_MANAGER, WM_SIZE,
};
use crate::constants::files::TRANSFER_SCRATCH_PREFIX;
use crate::constants::timeouts::{BRIDGE_RETRY_DELAY, BRIDGE_RETRY_LIMIT};
use crate::imaging::Frame;
use crate::models::error::{EngineError, EngineResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

lazy_static! {
    static ref PHYSICAL_SIZE_REGEX: Regex = Regex::new(r"Physical size:\s*(\d+)x(\d+)").unwrap();
    static ref OVERRIDE_SIZE_REGEX: Regex = Regex::new(r"Override size:\s*(\d+)x(\d+)").unwrap();
}

/// Monotonic discriminator for scratch file names.
static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct DeviceChannel {
    serial: String,
    adb: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    target: AppTarget,
    registry: Option<Arc<DeviceRegistry>>,
    lock: Mutex<()>,
    screen_size: StdMutex<Option<(u32, u32)>>,
}

impl DeviceChannel {
    pub fn new(
        serial: impl Into<String>,
        adb: impl Into<PathBuf>,
        executor: Arc<dyn CommandExecutor>,
        target: AppTarget,
    ) -> Self {
        Self {
            serial: serial.into(),
            adb: adb.into(),
            executor,
            target,
            registry: None,
            lock: Mutex::new(()),
            screen_size: StdMutex::new(None),
        }
    }

    /// Attach the registry so bridge failures flip the device offline.
    pub fn with_registry(mut self, registry: Arc<DeviceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Runs one adb command against this serial with bounded retries.
    /// Callers must hold the channel lock.
    async fn run_with_retry(&self, args: &[&str]) -> EngineResult<Vec<u8>> {
        let mut full_args: Vec<&str> = vec![SERIAL_FLAG, &self.serial];
        full_args.extend_from_slice(args);

        let mut last_error = String::new();
        for attempt in 1..=BRIDGE_RETRY_LIMIT {
            match self.executor.run_raw(&self.adb, &full_args).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "bridge command failed on {} (attempt {attempt}/{BRIDGE_RETRY_LIMIT}): {last_error}",
                        self.serial
                    );
                    if attempt < BRIDGE_RETRY_LIMIT {
                        tokio::time::sleep(BRIDGE_RETRY_DELAY).await;
                    }
                }
            }
        }

        if let Some(registry) = &self.registry {
            registry.mark_offline(&self.serial);
        }
        Err(EngineError::bridge(&self.serial, last_error))
    }

    async fn exec_raw(&self, args: &[&str]) -> EngineResult<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.run_with_retry(args).await
    }

    async fn exec(&self, args: &[&str]) -> EngineResult<String> {
        let bytes = self.exec_raw(args).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Captures and decodes the current screen.
    pub async fn screenshot(&self) -> EngineResult<Frame> {
        let bytes = self
            .exec_raw(&[EXEC_OUT, SCREENCAP, SCREENCAP_PNG_FLAG])
            .await?;
        Frame::decode_png(&bytes)
    }

    /// Non-blocking screenshot for ad-hoc previews: fails fast with a
    /// device-busy error while a job owns the channel.
    pub async fn try_screenshot(&self) -> EngineResult<Frame> {
        let _guard = self
            .lock
            .try_lock()
            .map_err(|_| EngineError::device_busy(&self.serial))?;
        let bytes = self
            .run_with_retry(&[EXEC_OUT, SCREENCAP, SCREENCAP_PNG_FLAG])
            .await?;
        Frame::decode_png(&bytes)
    }

    pub async fn tap(&self, x: i64, y: i64) -> EngineResult<()> {
        let (xs, ys) = (x.to_string(), y.to_string());
        self.exec(&[SHELL, INPUT, INPUT_TAP, &xs, &ys]).await?;
        Ok(())
    }

    pub async fn swipe(
        &self,
        x: i64,
        y: i64,
        end_x: i64,
        end_y: i64,
        duration_ms: u64,
    ) -> EngineResult<()> {
        let args = [
            x.to_string(),
            y.to_string(),
            end_x.to_string(),
            end_y.to_string(),
            duration_ms.to_string(),
        ];
        self.exec(&[
            SHELL, INPUT, INPUT_SWIPE, &args[0], &args[1], &args[2], &args[3], &args[4],
        ])
        .await?;
        Ok(())
    }

    pub async fn key(&self, code: u32) -> EngineResult<()> {
        let code = code.to_string();
        self.exec(&[SHELL, INPUT, INPUT_KEYEVENT, &code]).await?;
        Ok(())
    }

    pub async fn back(&self) -> EngineResult<()> {
        self.key(KEYCODE_BACK).await
    }

    /// Ad-hoc back key with the same fail-fast lease as `try_screenshot`.
    pub async fn try_back(&self) -> EngineResult<()> {
        let _guard = self
            .lock
            .try_lock()
            .map_err(|_| EngineError::device_busy(&self.serial))?;
        let code = KEYCODE_BACK.to_string();
        self.run_with_retry(&[SHELL, INPUT, INPUT_KEYEVENT, &code])
            .await?;
        Ok(())
    }

    pub async fn launch_app(&self) -> EngineResult<()> {
        let component = format!("{}/{}", self.target.package, self.target.activity);
        self.exec(&[
            SHELL,
            ACTIVITY_MANAGER,
            AM_START,
            AM_START_COMPONENT_FLAG,
            &component,
        ])
        .await?;
        Ok(())
    }

    pub async fn force_stop(&self) -> EngineResult<()> {
        self.exec(&[SHELL, ACTIVITY_MANAGER, AM_FORCE_STOP, &self.target.package])
            .await?;
        Ok(())
    }

    /// force-stop then relaunch. The interpreter adds the cold-start wait
    /// so it stays cancellable.
    pub async fn restart_game(&self) -> EngineResult<()> {
        self.force_stop().await?;
        self.launch_app().await
    }

    pub async fn shell(&self, command: &str) -> EngineResult<String> {
        self.exec(&[SHELL, command]).await
    }

    /// Pushes bytes to a remote path through a local scratch file.
    pub async fn push(&self, bytes: &[u8], remote_path: &str) -> EngineResult<()> {
        let local = self.scratch_path();
        tokio::fs::write(&local, bytes).await?;
        let local_str = local.to_string_lossy().into_owned();
        let result = self.exec(&[PUSH, &local_str, remote_path]).await;
        let _ = tokio::fs::remove_file(&local).await;
        result.map(|_| ())
    }

    /// Pulls a remote file into memory through a local scratch file.
    pub async fn pull(&self, remote_path: &str) -> EngineResult<Vec<u8>> {
        let local = self.scratch_path();
        let local_str = local.to_string_lossy().into_owned();
        let result = self.exec(&[PULL, remote_path, &local_str]).await;
        match result {
            Ok(_) => {
                let bytes = tokio::fs::read(&local).await?;
                let _ = tokio::fs::remove_file(&local).await;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&local).await;
                Err(e)
            }
        }
    }

    /// Native screen size via `wm size`, cached after the first query.
    /// An override size (`adb shell wm size WxH`) wins over the panel size.
    pub async fn screen_size(&self) -> EngineResult<(u32, u32)> {
        if let Some(size) = *self.screen_size.lock().unwrap() {
            return Ok(size);
        }
        let output = self.exec(&[SHELL, WINDOW_MANAGER, WM_SIZE]).await?;
        let size = parse_wm_size(&output).ok_or_else(|| {
            EngineError::bridge(&self.serial, format!("unparseable wm size output: {output}"))
        })?;
        *self.screen_size.lock().unwrap() = Some(size);
        Ok(size)
    }

    fn scratch_path(&self) -> PathBuf {
        let serial_safe: String = self
            .serial
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "{TRANSFER_SCRATCH_PREFIX}-{serial_safe}-{}-{n}",
            std::process::id()
        ))
    }
}

/// Parses `wm size` output, preferring an override size when present.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let captures = OVERRIDE_SIZE_REGEX
        .captures(output)
        .or_else(|| PHYSICAL_SIZE_REGEX.captures(output))?;
    let width = captures.get(1)?.as_str().parse().ok()?;
    let height = captures.get(2)?.as_str().parse().ok()?;
    Some((width, height))
}
