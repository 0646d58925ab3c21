//! Shared account queue.
//!
//! A FIFO of account tasks behind one mutex. Claims are linearizable: the
//! lock is held for the whole pop-and-stamp, so two workers can never hold
//! the same task. Snapshots are copies; nothing escapes the lock by
//! reference.

use crate::models::account::AccountTask;
use crate::models::error::{EngineError, EngineResult};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
pub struct AccountQueue {
    tasks: Mutex<Vec<AccountTask>>,
}

/// Progress counters derived from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl AccountQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `folder` for files with the given extension, resets the queue,
    /// and enqueues tasks in lexicographic filename order. Returns the count.
    pub async fn load(&self, folder: &Path, extension: &str) -> EngineResult<usize> {
        let mut filenames: Vec<(String, std::path::PathBuf)> = Vec::new();
        let mut dir = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));
            if !matches_ext {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                filenames.push((name.to_string(), path.clone()));
            }
        }
        filenames.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tasks = self.tasks.lock().unwrap();
        *tasks = filenames
            .into_iter()
            .map(|(name, path)| AccountTask::new(name, path))
            .collect();
        log::info!("loaded {} account files from {}", tasks.len(), folder.display());
        Ok(tasks.len())
    }

    /// Pops the first claimable task and stamps it with the worker's serial.
    pub fn claim(&self, serial: &str) -> Option<AccountTask> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.iter_mut().find(|t| t.is_claimable())?;
        task.running_on_device = Some(serial.to_string());
        Some(task.clone())
    }

    /// Records a task's outcome and releases the claim. Completed tasks are
    /// never reclaimed.
    pub fn complete(&self, filename: &str, success: bool, error: Option<String>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.filename == filename) {
            task.processed = true;
            task.success = success;
            task.error_message = error;
            task.running_on_device = None;
        }
    }

    /// Returns a claimed task to the queue unprocessed, e.g. when a stop
    /// interrupts it mid-run.
    pub fn release(&self, filename: &str) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.filename == filename && !t.processed) {
            task.running_on_device = None;
        }
    }

    /// Clears stale claims on incomplete tasks, for resume after a crash.
    pub fn reset_running(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.iter_mut().filter(|t| !t.processed) {
            task.running_on_device = None;
        }
    }

    /// Deletes a permanently unusable account file and drops its pending
    /// task. Processed entries stay for the record.
    pub async fn mark_bugged(&self, filename: &str) -> EngineResult<()> {
        let filepath = {
            let mut tasks = self.tasks.lock().unwrap();
            let index = tasks
                .iter()
                .position(|t| t.filename == filename)
                .ok_or_else(|| {
                    EngineError::validation(format!("no account named '{filename}' in queue"))
                })?;
            let filepath = tasks[index].filepath.clone();
            if !tasks[index].processed {
                tasks.remove(index);
            }
            filepath
        };
        tokio::fs::remove_file(&filepath).await?;
        log::info!("bugged account removed: {}", filepath.display());
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<AccountTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn progress(&self) -> QueueProgress {
        let tasks = self.tasks.lock().unwrap();
        let processed = tasks.iter().filter(|t| t.processed).count();
        let succeeded = tasks.iter().filter(|t| t.processed && t.success).count();
        QueueProgress {
            total: tasks.len(),
            processed,
            succeeded,
            failed: processed - succeeded,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }

    /// True when no claimable work remains.
    pub fn is_drained(&self) -> bool {
        !self.tasks.lock().unwrap().iter().any(|t| t.is_claimable())
    }
}
