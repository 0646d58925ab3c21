//! Multi-device job coordination tests: claim/push/interpret loops, bridge
//! failure handling, stop/resume, and post-processing.

use droidflow::bridge::executor::mock::MockCommandExecutor;
use droidflow::bridge::DeviceRegistry;
use droidflow::config::Config;
use droidflow::engine::{AccountQueue, JobCoordinator, StatusBus, StatusEvent};
use droidflow::models::device::DeviceEntry;
use droidflow::models::job::{JobSettings, JobState};
use droidflow::models::workflow::{StepAction, Workflow, WorkflowStep};
use droidflow::store::TemplateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEVICE_X: &str = "emulator-5554";
const DEVICE_Y: &str = "emulator-5556";

fn click_workflow() -> Workflow {
    Workflow {
        id: None,
        name: "push-and-tap".into(),
        description: String::new(),
        screen_width: 64,
        screen_height: 48,
        is_master: false,
        mode_name: None,
        month_year: None,
        steps: vec![WorkflowStep {
            order_index: 0,
            description: None,
            group_name: None,
            action: StepAction::Click { x: 10, y: 10 },
        }],
    }
}

fn slow_workflow() -> Workflow {
    let mut workflow = click_workflow();
    workflow.steps.push(WorkflowStep {
        order_index: 1,
        description: None,
        group_name: None,
        action: StepAction::Wait {
            wait_duration_ms: 200,
        },
    });
    workflow
}

/// Mock rules one device needs for a push-and-tap batch.
fn device_rules(mock: MockCommandExecutor, serial: &str) -> MockCommandExecutor {
    mock.with_success(
        "adb",
        &["-s", serial, "shell", "wm", "size"],
        "Physical size: 64x48\n",
    )
    .with_success_prefix("adb", &["-s", serial, "shell", "input", "tap"], "")
    .with_success_prefix("adb", &["-s", serial, "push"], "1 file pushed")
}

async fn write_accounts(folder: &Path, names: &[&str]) {
    for name in names {
        tokio::fs::write(folder.join(name), format!("<account id=\"{name}\"/>"))
            .await
            .unwrap();
    }
}

struct Fixture {
    coordinator: Arc<JobCoordinator>,
    queue: Arc<AccountQueue>,
    registry: Arc<DeviceRegistry>,
    bus: StatusBus,
    folder: PathBuf,
    _data_dir: tempfile::TempDir,
    _account_dir: tempfile::TempDir,
}

async fn fixture(mock: MockCommandExecutor, serials: &[&str], accounts: &[&str]) -> Fixture {
    let data_dir = tempfile::tempdir().unwrap();
    let account_dir = tempfile::tempdir().unwrap();
    let folder = account_dir.path().to_path_buf();
    write_accounts(&folder, accounts).await;

    let executor = Arc::new(mock);
    let bus = StatusBus::new();
    let registry = Arc::new(DeviceRegistry::new(executor.clone(), "adb", bus.clone()));
    for serial in serials {
        registry.insert(DeviceEntry::new(*serial));
    }

    let queue = Arc::new(AccountQueue::new());
    if !accounts.is_empty() {
        queue.load(&folder, "xml").await.unwrap();
    }

    let templates = Arc::new(TemplateStore::open(data_dir.path().join("templates")).await.unwrap());
    let config = Config {
        adb_path: Some(PathBuf::from("adb")),
        ..Config::default()
    };

    let coordinator = Arc::new(JobCoordinator::new(
        registry.clone(),
        queue.clone(),
        templates,
        bus.clone(),
        executor,
        config,
    ));

    Fixture {
        coordinator,
        queue,
        registry,
        bus,
        folder,
        _data_dir: data_dir,
        _account_dir: account_dir,
    }
}

#[tokio::test]
async fn single_device_batch_completes_and_moves_files() {
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock.clone(), &[DEVICE_X], &["a.xml", "b.xml", "c.xml"]).await;

    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap();
    fx.coordinator.wait().await;

    assert_eq!(fx.coordinator.state(), JobState::Completed);
    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 3);
    assert_eq!(progress.succeeded, 3);
    assert_eq!(progress.failed, 0);

    // One push per account, and every file moved into <src>/done/.
    assert_eq!(mock.calls_matching(&["-s", DEVICE_X, "push"]).len(), 3);
    for name in ["a.xml", "b.xml", "c.xml"] {
        assert!(fx.folder.join("done").join(name).exists());
        assert!(!fx.folder.join(name).exists());
    }

    let device = fx.registry.get(DEVICE_X).unwrap();
    assert!(!device.runtime.is_running);
    assert_eq!(device.runtime.success_count, 3);
}

#[tokio::test]
async fn bridge_failure_fails_account_and_frees_rest_for_resume() {
    // Device X pushes two accounts, then its bridge dies.
    let mock = MockCommandExecutor::new()
        .with_success(
            "adb",
            &["-s", DEVICE_X, "shell", "wm", "size"],
            "Physical size: 64x48\n",
        )
        .with_success_prefix("adb", &["-s", DEVICE_X, "shell", "input", "tap"], "")
        .with_sequence_prefix(
            "adb",
            &["-s", DEVICE_X, "push"],
            vec![
                Ok(b"1 file pushed".to_vec()),
                Ok(b"1 file pushed".to_vec()),
                Err("device 'emulator-5554' not found".to_string()),
            ],
        );
    let mock = device_rules(mock, DEVICE_Y);
    let fx = fixture(
        mock.clone(),
        &[DEVICE_X, DEVICE_Y],
        &["a.xml", "b.xml", "c.xml", "d.xml", "e.xml"],
    )
    .await;

    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap();
    fx.coordinator.wait().await;

    // The in-flight account is marked failed; the worker exits; the bridge
    // failure flips the device offline.
    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 3);
    assert_eq!(progress.succeeded, 2);
    assert_eq!(progress.failed, 1);
    assert!(!fx.registry.get(DEVICE_X).unwrap().is_online());

    let snapshot = fx.queue.snapshot();
    let failed: Vec<_> = snapshot.iter().filter(|t| t.processed && !t.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].filename, "c.xml");

    // Resume on the healthy device drains the remaining two.
    fx.coordinator
        .start(
            vec![DEVICE_Y.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap();
    fx.coordinator.wait().await;

    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 5);
    assert_eq!(progress.succeeded, 4);
    assert_eq!(progress.failed, 1);
}

#[tokio::test]
async fn stop_releases_in_flight_work_and_resume_finishes_it() {
    let names: Vec<String> = (0..10).map(|i| format!("acc{i:02}.xml")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock, &[DEVICE_X], &name_refs).await;

    let mut events = fx.bus.subscribe();
    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            slow_workflow(),
            fx.folder.clone(),
            JobSettings {
                move_on_complete: false,
                ..JobSettings::default()
            },
        )
        .await
        .unwrap();

    let mut completions = 0;
    while completions < 3 {
        if let StatusEvent::AccountCompleted { .. } = events.recv().await.unwrap() {
            completions += 1;
        }
    }
    fx.coordinator.stop();
    fx.coordinator.wait().await;

    // Three processed; the interrupted account went back to the queue.
    assert_eq!(fx.coordinator.state(), JobState::Completed);
    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 3);
    assert_eq!(progress.succeeded, 3);
    let snapshot = fx.queue.snapshot();
    let pending: Vec<_> = snapshot.iter().filter(|t| !t.processed).collect();
    assert_eq!(pending.len(), 7);
    assert!(pending.iter().all(|t| t.running_on_device.is_none()));

    // Resume is start over the same queue.
    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings {
                move_on_complete: false,
                ..JobSettings::default()
            },
        )
        .await
        .unwrap();
    fx.coordinator.wait().await;

    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 10);
    assert_eq!(progress.succeeded, 10);
}

#[tokio::test]
async fn empty_queue_completes_immediately() {
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock.clone(), &[DEVICE_X], &[]).await;

    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(fx.coordinator.state(), JobState::Completed);
    // No worker ever touched the device.
    assert!(mock.calls_matching(&["-s", DEVICE_X, "push"]).is_empty());
}

#[tokio::test]
async fn offline_device_is_a_validation_error() {
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock, &[], &["a.xml"]).await;

    let err = fx
        .coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        droidflow::models::EngineError::Validation { .. }
    ));
    assert_eq!(fx.coordinator.state(), JobState::Idle);
}

#[tokio::test]
async fn auto_claim_disabled_stops_after_one_account() {
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock, &[DEVICE_X], &["a.xml", "b.xml"]).await;

    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings {
                auto_claim_enabled: false,
                move_on_complete: false,
                ..JobSettings::default()
            },
        )
        .await
        .unwrap();
    fx.coordinator.wait().await;

    let progress = fx.queue.progress();
    assert_eq!(progress.processed, 1);
    assert_eq!(progress.succeeded, 1);
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let names: Vec<String> = (0..4).map(|i| format!("acc{i}.xml")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mock = device_rules(MockCommandExecutor::new(), DEVICE_X);
    let fx = fixture(mock, &[DEVICE_X], &name_refs).await;

    fx.coordinator
        .start(
            vec![DEVICE_X.to_string()],
            slow_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap();

    let err = fx
        .coordinator
        .start(
            vec![DEVICE_X.to_string()],
            click_workflow(),
            fx.folder.clone(),
            JobSettings::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        droidflow::models::EngineError::Validation { .. }
    ));

    fx.coordinator.stop();
    fx.coordinator.wait().await;
}
