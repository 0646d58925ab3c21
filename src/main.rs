//! Droidflow - one-shot CLI for the multi-device automation engine.

use anyhow::Result;
use clap::{Parser, Subcommand};
use droidflow::batch::{AccountExporter, DuplicateFinder};
use droidflow::bridge::{CommandRunner, DeviceChannel, DeviceRegistry};
use droidflow::config::Config;
use droidflow::constants::files::{TEMPLATES_DIR, WORKFLOWS_FILE};
use droidflow::engine::{JobCoordinator, StatusBus, StatusEvent, WorkflowInterpreter};
use droidflow::engine::{AccountQueue, CancelToken};
use droidflow::models::job::JobSettings;
use droidflow::models::workflow::Workflow;
use droidflow::models::{EngineError, EngineResult};
use droidflow::store::templates::CaptureRegion;
use droidflow::store::{TemplateStore, WorkflowRepo};
use droidflow::utils::setup_logger;
use std::path::PathBuf;
use std::sync::Arc;

/// Exit codes: 0 all targets succeeded, 1 at least one failure,
/// 2 invalid input, 3 unrecoverable bridge failure.
const EXIT_FAILURE: i32 = 1;
const EXIT_INVALID_INPUT: i32 = 2;
const EXIT_BRIDGE_FAILURE: i32 = 3;

#[derive(Parser)]
#[command(
    name = "droidflow",
    version,
    about = "Drive fleets of Android emulators through adb with image-matching workflows"
)]
struct Cli {
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to droidflow.toml; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List attached devices and their screen sizes
    Devices,

    /// Execute a workflow once on one or more devices
    Run {
        /// Device serials; one flag per device
        #[arg(short, long, required = true)]
        serial: Vec<String>,
        #[command(flatten)]
        workflow: WorkflowSelector,
    },

    /// Run the account batch: push each file, run the workflow, repeat
    Batch {
        /// Folder of account files
        #[arg(short, long)]
        folder: PathBuf,
        #[arg(short, long, required = true)]
        serial: Vec<String>,
        #[command(flatten)]
        workflow: WorkflowSelector,
        /// Destination for completed files; <folder>/done/ when omitted
        #[arg(long)]
        done_folder: Option<PathBuf>,
        /// Leave successful files in place
        #[arg(long)]
        no_move: bool,
    },

    /// Capture a screen region as a named template
    Capture {
        #[arg(short, long)]
        serial: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Workflow resolution the region is expressed in
        #[arg(long, default_value_t = 1080)]
        screen_width: u32,
        #[arg(long, default_value_t = 1920)]
        screen_height: u32,
    },

    /// Find files in CANDIDATE duplicating content in MASTER
    Dupes {
        #[arg(long)]
        master: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        /// Delete the duplicates instead of only listing them
        #[arg(long)]
        delete: bool,
    },

    /// Pull the current account file from each device
    Export {
        #[arg(short, long, required = true)]
        serial: Vec<String>,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Manage stored workflows
    Workflows {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(clap::Args)]
struct WorkflowSelector {
    /// Workflow JSON file to execute directly
    #[arg(long)]
    workflow_file: Option<PathBuf>,
    /// Stored workflow id
    #[arg(long)]
    workflow_id: Option<i64>,
    /// Mode lookup, e.g. "daily_login"; pairs with --month
    #[arg(long)]
    mode: Option<String>,
    /// "YYYY-MM"; current month when omitted
    #[arg(long)]
    month: Option<String>,
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List stored workflows
    List,
    /// Import a workflow from a JSON file
    Import { file: PathBuf },
    /// Export a stored workflow to a JSON file
    Export { id: i64, file: PathBuf },
    /// Make a stored workflow the master
    SetMaster { id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = setup_logger(&cli.log_level) {
        eprintln!("logger setup failed: {e}");
    }

    let config = match Config::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_INVALID_INPUT);
        }
    };

    match dispatch(cli.command, config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn exit_code_for(error: &EngineError) -> i32 {
    match error {
        EngineError::Validation { .. }
        | EngineError::WorkflowLoad { .. }
        | EngineError::WorkflowNotFound { .. }
        | EngineError::TemplateNotFound { .. }
        | EngineError::DeviceNotFound { .. } => EXIT_INVALID_INPUT,
        EngineError::Bridge { .. } => EXIT_BRIDGE_FAILURE,
        _ => EXIT_FAILURE,
    }
}

async fn dispatch(command: Command, config: Config) -> EngineResult<i32> {
    let executor = Arc::new(CommandRunner::new());
    let bus = StatusBus::new();
    let data_dir = config.resolve_data_dir();
    // adb resolves lazily: workflow and duplicate management must work on
    // machines without platform-tools.
    let resolve_adb = || {
        config
            .resolve_adb()
            .map_err(|e| EngineError::validation(e.to_string()))
    };

    match command {
        Command::Devices => {
            let registry = Arc::new(DeviceRegistry::new(
                executor.clone(),
                resolve_adb()?,
                bus.clone(),
            ));
            let devices = registry.refresh().await?;
            if devices.is_empty() {
                println!("no devices attached");
            }
            for device in devices {
                let size = device
                    .screen_size
                    .map(|(w, h)| format!("{w}x{h}"))
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{:?}\t{}", device.serial, device.status, size);
            }
            Ok(0)
        }

        Command::Run { serial, workflow } => {
            let registry = Arc::new(DeviceRegistry::new(
                executor.clone(),
                resolve_adb()?,
                bus.clone(),
            ));
            let templates = Arc::new(TemplateStore::open(data_dir.join(TEMPLATES_DIR)).await?);
            let repo = WorkflowRepo::open(data_dir.join(WORKFLOWS_FILE)).await?;
            let workflow = resolve_workflow(&repo, &workflow).await?;
            run_once(&config, executor, registry, templates, workflow, serial).await
        }

        Command::Batch {
            folder,
            serial,
            workflow,
            done_folder,
            no_move,
        } => {
            let registry = Arc::new(DeviceRegistry::new(
                executor.clone(),
                resolve_adb()?,
                bus.clone(),
            ));
            let templates = Arc::new(TemplateStore::open(data_dir.join(TEMPLATES_DIR)).await?);
            let repo = WorkflowRepo::open(data_dir.join(WORKFLOWS_FILE)).await?;
            let workflow = resolve_workflow(&repo, &workflow).await?;

            registry.refresh().await?;
            let queue = Arc::new(AccountQueue::new());
            queue
                .load(&folder, &config.batch.account_extension)
                .await?;

            let settings = JobSettings {
                move_on_complete: !no_move && config.batch.move_on_complete,
                done_folder: done_folder.or_else(|| config.batch.done_folder.clone()),
                auto_claim_enabled: true,
            };

            let coordinator = Arc::new(JobCoordinator::new(
                registry,
                queue.clone(),
                templates,
                bus.clone(),
                executor,
                config,
            ));

            let mut events = bus.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let StatusEvent::AccountCompleted {
                        serial,
                        filename,
                        success,
                        ..
                    } = event
                    {
                        let mark = if success { "ok" } else { "FAILED" };
                        println!("{serial}\t{filename}\t{mark}");
                    }
                }
            });

            coordinator
                .start(serial, workflow, folder, settings)
                .await?;
            coordinator.wait().await;

            let progress = queue.progress();
            println!(
                "processed {}/{} ({} ok, {} failed)",
                progress.processed, progress.total, progress.succeeded, progress.failed
            );
            Ok(if progress.failed > 0 { EXIT_FAILURE } else { 0 })
        }

        Command::Capture {
            serial,
            name,
            x,
            y,
            width,
            height,
            screen_width,
            screen_height,
        } => {
            let templates = TemplateStore::open(data_dir.join(TEMPLATES_DIR)).await?;
            let channel = DeviceChannel::new(
                serial,
                resolve_adb()?,
                executor,
                config.device.target.clone(),
            );
            let region = CaptureRegion {
                x,
                y,
                width,
                height,
            };
            let template = templates
                .capture(&channel, &name, region, (screen_width, screen_height))
                .await?;
            println!(
                "captured '{}' ({}x{}) -> {}",
                template.name,
                template.width,
                template.height,
                template.file_path.display()
            );
            Ok(0)
        }

        Command::Dupes {
            master,
            candidate,
            delete,
        } => {
            let finder = DuplicateFinder::new(config.batch.account_extension.clone());
            let report = finder.run(&master, &candidate, !delete).await?;
            for pair in &report.duplicates {
                println!("{}\t(matches {})", pair.file_b_name, pair.matches_with_name);
            }
            println!(
                "{} duplicates, {} removed",
                report.duplicates.len(),
                report.removed_count
            );
            Ok(0)
        }

        Command::Export { serial, out } => {
            let adb = resolve_adb()?;
            let channels: Vec<DeviceChannel> = serial
                .into_iter()
                .map(|s| {
                    DeviceChannel::new(s, adb.clone(), executor.clone(), config.device.target.clone())
                })
                .collect();
            let exporter = AccountExporter::new(config.device.account_remote_path.clone());
            let (exported, failures) = exporter.export_all(&channels, &out).await?;
            for account in &exported {
                println!("{}\t{}", account.serial, account.file_path.display());
            }
            for (serial, error) in &failures {
                eprintln!("{serial}\tfailed: {error}");
            }
            Ok(if failures.is_empty() { 0 } else { EXIT_FAILURE })
        }

        Command::Workflows { action } => {
            let repo = WorkflowRepo::open(data_dir.join(WORKFLOWS_FILE)).await?;
            match action {
                WorkflowAction::List => {
                    for workflow in repo.list().await {
                        let master = if workflow.is_master { " [master]" } else { "" };
                        let mode = workflow.mode_name.as_deref().unwrap_or("-");
                        println!(
                            "{}\t{}{}\tmode={} steps={}",
                            workflow.id.unwrap_or(0),
                            workflow.name,
                            master,
                            mode,
                            workflow.steps.len()
                        );
                    }
                }
                WorkflowAction::Import { file } => {
                    let text = tokio::fs::read_to_string(&file).await?;
                    let workflow: Workflow = serde_json::from_str(&text)?;
                    let stored = repo.create(workflow).await?;
                    println!("imported '{}' as id {}", stored.name, stored.id.unwrap_or(0));
                }
                WorkflowAction::Export { id, file } => {
                    let workflow = repo.get(id).await.ok_or(EngineError::WorkflowNotFound {
                        name: format!("id {id}"),
                    })?;
                    tokio::fs::write(&file, serde_json::to_string_pretty(&workflow)?).await?;
                    println!("exported id {id} to {}", file.display());
                }
                WorkflowAction::SetMaster { id } => {
                    repo.set_master(id).await?;
                    println!("workflow {id} is now the master");
                }
            }
            Ok(0)
        }
    }
}

/// Resolves which workflow to execute: explicit file, stored id, mode
/// lookup, or the master as the default.
async fn resolve_workflow(
    repo: &WorkflowRepo,
    selector: &WorkflowSelector,
) -> EngineResult<Workflow> {
    if let Some(file) = &selector.workflow_file {
        let text = tokio::fs::read_to_string(file).await?;
        let workflow: Workflow = serde_json::from_str(&text)?;
        workflow.validate()?;
        return Ok(workflow);
    }
    if let Some(id) = selector.workflow_id {
        return repo.get(id).await.ok_or(EngineError::WorkflowNotFound {
            name: format!("id {id}"),
        });
    }
    if let Some(mode) = &selector.mode {
        return repo
            .find_by_mode(mode, selector.month.as_deref())
            .await
            .ok_or(EngineError::WorkflowNotFound {
                name: format!("mode {mode}"),
            });
    }
    repo.master().await.ok_or(EngineError::WorkflowNotFound {
        name: "master".to_string(),
    })
}

/// Runs the workflow once per device concurrently; exit code reflects the
/// worst outcome across the fleet.
async fn run_once(
    config: &Config,
    executor: Arc<CommandRunner>,
    registry: Arc<DeviceRegistry>,
    templates: Arc<TemplateStore>,
    workflow: Workflow,
    serials: Vec<String>,
) -> EngineResult<i32> {
    registry.refresh().await?;
    for serial in &serials {
        let online = registry.get(serial).is_some_and(|d| d.is_online());
        if !online {
            return Err(EngineError::validation(format!(
                "device {serial} is not online"
            )));
        }
    }

    let adb = config
        .resolve_adb()
        .map_err(|e| EngineError::validation(e.to_string()))?;
    let interpreter = Arc::new(
        WorkflowInterpreter::new(templates).with_cold_start_wait(config.cold_start_wait()),
    );
    let workflow = Arc::new(workflow);
    let cancel = CancelToken::new();

    let mut join_set = tokio::task::JoinSet::new();
    for serial in serials {
        let channel = DeviceChannel::new(
            serial.clone(),
            adb.clone(),
            executor.clone(),
            config.device.target.clone(),
        )
        .with_registry(registry.clone());
        let interpreter = interpreter.clone();
        let workflow = workflow.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let result = interpreter.run(&workflow, &channel, &cancel).await;
            (serial, result)
        });
    }

    let mut worst = 0;
    while let Some(joined) = join_set.join_next().await {
        let Ok((serial, result)) = joined else {
            worst = worst.max(EXIT_FAILURE);
            continue;
        };
        match result {
            Ok(()) => println!("{serial}\tok"),
            Err(e) => {
                eprintln!("{serial}\tfailed: {e}");
                worst = worst.max(exit_code_for(&e));
            }
        }
    }
    Ok(worst)
}
