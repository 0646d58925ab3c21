//! Multi-device job coordination.
//!
//! One coordinator value owns the process-wide job: a shared account queue
//! consumed by one worker task per device. `start` validates, spawns the
//! workers, and returns; a monitor task joins them and finalizes the job.
//! `stop` signals the shared cancel token and workers exit at their next
//! checkpoint; `resume` is `start` again over the same queue, where only
//! unprocessed tasks are claimable.
//!
//! A single device is just a fleet of one; there is no separate
//! single-device path.

use crate::bridge::channel::DeviceChannel;
use crate::bridge::executor::CommandExecutor;
use crate::bridge::registry::DeviceRegistry;
use crate::config::Config;
use crate::constants::files::DONE_DIR_NAME;
use crate::engine::cancel::CancelToken;
use crate::engine::interpreter::WorkflowInterpreter;
use crate::engine::queue::AccountQueue;
use crate::engine::status::{StatusBus, StatusEvent};
use crate::models::error::{EngineError, EngineResult};
use crate::models::job::{JobSettings, JobSnapshot, JobState};
use crate::models::workflow::Workflow;
use crate::store::templates::TemplateStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

struct JobInner {
    state: JobState,
    folder: Option<PathBuf>,
    settings: JobSettings,
    cancel: CancelToken,
    monitor: Option<JoinHandle<()>>,
}

pub struct JobCoordinator {
    registry: Arc<DeviceRegistry>,
    queue: Arc<AccountQueue>,
    templates: Arc<TemplateStore>,
    bus: StatusBus,
    executor: Arc<dyn CommandExecutor>,
    config: Config,
    inner: Mutex<JobInner>,
}

/// Everything a worker task needs, bundled once at spawn.
struct WorkerContext {
    serial: String,
    channel: DeviceChannel,
    workflow: Arc<Workflow>,
    interpreter: Arc<WorkflowInterpreter>,
    queue: Arc<AccountQueue>,
    registry: Arc<DeviceRegistry>,
    bus: StatusBus,
    cancel: CancelToken,
    settings: JobSettings,
    folder: PathBuf,
    remote_path: String,
}

impl JobCoordinator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        queue: Arc<AccountQueue>,
        templates: Arc<TemplateStore>,
        bus: StatusBus,
        executor: Arc<dyn CommandExecutor>,
        config: Config,
    ) -> Self {
        Self {
            registry,
            queue,
            templates,
            bus,
            executor,
            config,
            inner: Mutex::new(JobInner {
                state: JobState::Idle,
                folder: None,
                settings: JobSettings::default(),
                cancel: CancelToken::new(),
                monitor: None,
            }),
        }
    }

    pub fn queue(&self) -> &Arc<AccountQueue> {
        &self.queue
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().unwrap().state
    }

    /// Starts (or resumes) the batch over the given serials. Returns once
    /// the workers are spawned; completion is observable on the status bus
    /// or through [`JobCoordinator::wait`].
    pub async fn start(
        self: &Arc<Self>,
        serials: Vec<String>,
        workflow: Workflow,
        folder: PathBuf,
        settings: JobSettings,
    ) -> EngineResult<()> {
        if serials.is_empty() {
            return Err(EngineError::validation("no devices selected"));
        }
        for serial in &serials {
            let online = self.registry.get(serial).is_some_and(|d| d.is_online());
            if !online {
                return Err(EngineError::validation(format!(
                    "device {serial} is not online"
                )));
            }
        }
        workflow.validate()?;
        let known = self.templates.names().await;
        workflow.validate_templates(|name| known.contains(name))?;
        let adb = self
            .config
            .resolve_adb()
            .map_err(|e| EngineError::validation(format!("cannot resolve adb binary: {e}")))?;

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == JobState::Running {
                return Err(EngineError::validation("a job is already running"));
            }
            // Stale claims from a crashed run must not block resume.
            self.queue.reset_running();
            if self.queue.is_drained() {
                // Nothing claimable: the job completes on the spot.
                inner.state = JobState::Completed;
                let progress = self.queue.progress();
                self.bus.publish(StatusEvent::JobCompleted {
                    processed: progress.processed,
                    succeeded: progress.succeeded,
                    failed: progress.failed,
                });
                return Ok(());
            }
            inner.state = JobState::Running;
            inner.folder = Some(folder.clone());
            inner.settings = settings.clone();
            inner.cancel = CancelToken::new();
        }

        let cancel = self.inner.lock().unwrap().cancel.clone();
        let workflow = Arc::new(workflow);
        let interpreter = Arc::new(
            WorkflowInterpreter::new(Arc::clone(&self.templates))
                .with_cold_start_wait(self.config.cold_start_wait()),
        );

        let progress = self.queue.progress();
        self.bus.publish(StatusEvent::JobStarted {
            total_accounts: progress.total,
            devices: serials.clone(),
        });

        let mut handles = Vec::with_capacity(serials.len());
        for serial in &serials {
            self.registry.update_runtime(serial, |runtime| {
                runtime.is_running = true;
                runtime.current_account = None;
                runtime.success_count = 0;
                runtime.error_count = 0;
            });
            let channel = DeviceChannel::new(
                serial.clone(),
                adb.clone(),
                Arc::clone(&self.executor),
                self.config.device.target.clone(),
            )
            .with_registry(Arc::clone(&self.registry));

            let ctx = WorkerContext {
                serial: serial.clone(),
                channel,
                workflow: Arc::clone(&workflow),
                interpreter: Arc::clone(&interpreter),
                queue: Arc::clone(&self.queue),
                registry: Arc::clone(&self.registry),
                bus: self.bus.clone(),
                cancel: cancel.clone(),
                settings: settings.clone(),
                folder: folder.clone(),
                remote_path: self.config.device.account_remote_path.clone(),
            };
            handles.push(tokio::spawn(worker_loop(ctx)));
        }

        let coordinator = Arc::clone(self);
        let monitor = tokio::spawn(async move {
            for handle in handles {
                let _ = handle.await;
            }
            coordinator.finalize();
        });
        self.inner.lock().unwrap().monitor = Some(monitor);

        Ok(())
    }

    /// Transitions to completed once every worker has exited.
    fn finalize(&self) {
        self.queue.reset_running();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = JobState::Completed;
        }
        let progress = self.queue.progress();
        log::info!(
            "job completed: {}/{} processed, {} succeeded, {} failed",
            progress.processed,
            progress.total,
            progress.succeeded,
            progress.failed
        );
        self.bus.publish(StatusEvent::JobCompleted {
            processed: progress.processed,
            succeeded: progress.succeeded,
            failed: progress.failed,
        });
    }

    /// Signals cancellation. Workers exit at their next checkpoint; pair
    /// with [`JobCoordinator::wait`] to block until they have.
    pub fn stop(&self) {
        let inner = self.inner.lock().unwrap();
        if inner.state == JobState::Running {
            log::info!("stop requested, cancelling workers");
            inner.cancel.cancel();
        }
    }

    /// Waits for the current run's monitor to finish, if one is active.
    pub async fn wait(&self) {
        let monitor = self.inner.lock().unwrap().monitor.take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }
    }

    /// Read-only view of the job for observers.
    pub fn snapshot(&self) -> JobSnapshot {
        let (state, folder) = {
            let inner = self.inner.lock().unwrap();
            (inner.state, inner.folder.clone())
        };
        let progress = self.queue.progress();
        let workers: HashMap<_, _> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|d| (d.serial, d.runtime))
            .collect();
        JobSnapshot {
            state,
            folder_path: folder,
            total_accounts: progress.total,
            processed_count: progress.processed,
            success_count: progress.succeeded,
            error_count: progress.failed,
            accounts: self.queue.snapshot(),
            workers,
        }
    }
}

/// Per-device worker: claim, push, interpret, record, post-process.
async fn worker_loop(ctx: WorkerContext) {
    log::info!("worker started on {}", ctx.serial);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Some(task) = ctx.queue.claim(&ctx.serial) else {
            log::info!("queue drained, worker on {} exiting", ctx.serial);
            break;
        };

        ctx.registry.update_runtime(&ctx.serial, |runtime| {
            runtime.current_account = Some(task.filename.clone());
        });
        ctx.bus.publish(StatusEvent::AccountClaimed {
            serial: ctx.serial.clone(),
            filename: task.filename.clone(),
        });

        let result = process_account(&ctx, &task.filepath).await;
        match result {
            Ok(()) => {
                ctx.queue.complete(&task.filename, true, None);
                ctx.registry
                    .update_runtime(&ctx.serial, |runtime| runtime.success_count += 1);
                ctx.bus.publish(StatusEvent::AccountCompleted {
                    serial: ctx.serial.clone(),
                    filename: task.filename.clone(),
                    success: true,
                    error: None,
                });
                if let Err(e) = post_process(&ctx, &task.filepath).await {
                    log::warn!("post-processing {} failed: {e}", task.filename);
                }
            }
            Err(EngineError::Cancelled) => {
                // Interrupted mid-account: the claim goes back so resume
                // can pick it up.
                ctx.queue.release(&task.filename);
                log::info!("worker on {} cancelled during {}", ctx.serial, task.filename);
                break;
            }
            Err(e) => {
                let fatal = e.is_bridge();
                ctx.queue
                    .complete(&task.filename, false, Some(e.to_string()));
                ctx.registry
                    .update_runtime(&ctx.serial, |runtime| runtime.error_count += 1);
                ctx.bus.publish(StatusEvent::AccountCompleted {
                    serial: ctx.serial.clone(),
                    filename: task.filename.clone(),
                    success: false,
                    error: Some(e.to_string()),
                });
                if fatal {
                    log::error!("bridge failure on {}, worker exiting: {e}", ctx.serial);
                    break;
                }
                log::warn!("account {} failed on {}: {e}", task.filename, ctx.serial);
            }
        }

        ctx.registry.update_runtime(&ctx.serial, |runtime| {
            runtime.current_account = None;
        });

        if !ctx.settings.auto_claim_enabled {
            break;
        }
    }

    ctx.registry.update_runtime(&ctx.serial, |runtime| {
        runtime.is_running = false;
        runtime.current_account = None;
    });
}

/// Pushes the account file to the device and runs the workflow.
async fn process_account(ctx: &WorkerContext, filepath: &std::path::Path) -> EngineResult<()> {
    let bytes = tokio::fs::read(filepath).await?;
    ctx.channel.push(&bytes, &ctx.remote_path).await?;
    ctx.interpreter
        .run(&ctx.workflow, &ctx.channel, &ctx.cancel)
        .await
}

/// Moves a successful account file into the done folder when configured.
async fn post_process(ctx: &WorkerContext, filepath: &std::path::Path) -> EngineResult<()> {
    if !ctx.settings.move_on_complete {
        return Ok(());
    }
    let done_dir = ctx
        .settings
        .done_folder
        .clone()
        .unwrap_or_else(|| ctx.folder.join(DONE_DIR_NAME));
    tokio::fs::create_dir_all(&done_dir).await?;
    let file_name = filepath
        .file_name()
        .ok_or_else(|| EngineError::other("account file has no name"))?;
    tokio::fs::rename(filepath, done_dir.join(file_name)).await?;
    Ok(())
}
