//! Batch utility tests: duplicate finder, account exporter, and
//! filesystem-facing queue operations.

use droidflow::batch::{AccountExporter, DuplicateFinder};
use droidflow::bridge::executor::mock::MockCommandExecutor;
use droidflow::bridge::DeviceChannel;
use droidflow::config::AppTarget;
use droidflow::engine::AccountQueue;
use std::path::Path;
use std::sync::Arc;

async fn write(folder: &Path, name: &str, content: &str) {
    tokio::fs::write(folder.join(name), content).await.unwrap();
}

#[tokio::test]
async fn dry_run_lists_duplicates_without_touching_files() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    write(a.path(), "x.xml", "<account id=\"1\"/>").await;
    write(a.path(), "y.xml", "<account id=\"2\"/>").await;
    write(b.path(), "x.xml", "<account id=\"1\"/>").await;
    write(b.path(), "z.xml", "<account id=\"3\"/>").await;

    let finder = DuplicateFinder::new("xml");
    let report = finder.run(a.path(), b.path(), true).await.unwrap();

    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].file_b_name, "x.xml");
    assert_eq!(report.duplicates[0].matches_with_name, "x.xml");
    assert_eq!(report.removed_count, 0);
    assert!(b.path().join("x.xml").exists());
    assert!(b.path().join("z.xml").exists());
}

#[tokio::test]
async fn real_run_deletes_only_the_duplicates() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    write(a.path(), "x.xml", "<account id=\"1\"/>").await;
    write(b.path(), "x.xml", "<account id=\"1\"/>").await;
    write(b.path(), "z.xml", "<account id=\"3\"/>").await;

    let finder = DuplicateFinder::new("xml");
    let report = finder.run(a.path(), b.path(), false).await.unwrap();

    assert_eq!(report.removed_count, 1);
    assert!(!b.path().join("x.xml").exists());
    assert!(b.path().join("z.xml").exists());
    // the master folder is never modified
    assert!(a.path().join("x.xml").exists());
}

#[tokio::test]
async fn duplicate_detection_is_by_content_not_name() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    write(a.path(), "original.xml", "<account id=\"7\"/>").await;
    write(b.path(), "renamed.xml", "<account id=\"7\"/>").await;
    write(b.path(), "same-name.xml", "<different/>").await;
    write(a.path(), "same-name.xml", "<account id=\"8\"/>").await;

    let finder = DuplicateFinder::new("xml");
    let report = finder.run(a.path(), b.path(), true).await.unwrap();

    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].file_b_name, "renamed.xml");
    assert_eq!(report.duplicates[0].matches_with_name, "original.xml");
}

#[tokio::test]
async fn exporter_pulls_one_file_per_device() {
    let out = tempfile::tempdir().unwrap();
    // pull succeeds but produces no local file, which surfaces as an IO
    // failure for that device rather than aborting the batch
    let mock = MockCommandExecutor::new().with_success_prefix(
        "adb",
        &["-s", "emulator-5554", "pull"],
        "1 file pulled",
    );
    let channels = vec![DeviceChannel::new(
        "emulator-5554",
        "adb",
        Arc::new(mock),
        AppTarget::default(),
    )];

    let exporter = AccountExporter::new("/sdcard/data/account.xml");
    let (exported, failures) = exporter.export_all(&channels, out.path()).await.unwrap();
    assert!(exported.is_empty());
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "emulator-5554");
}

#[tokio::test]
async fn queue_load_scans_sorted_and_filters_extension() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.xml", "b").await;
    write(dir.path(), "a.xml", "a").await;
    write(dir.path(), "notes.txt", "skip me").await;

    let queue = AccountQueue::new();
    let count = queue.load(dir.path(), "xml").await.unwrap();
    assert_eq!(count, 2);

    let first = queue.claim("emulator-5554").unwrap();
    assert_eq!(first.filename, "a.xml");
    let second = queue.claim("emulator-5554").unwrap();
    assert_eq!(second.filename, "b.xml");
}

#[tokio::test]
async fn mark_bugged_deletes_the_file_and_drops_the_task() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.xml", "a").await;
    write(dir.path(), "broken.xml", "b").await;

    let queue = AccountQueue::new();
    queue.load(dir.path(), "xml").await.unwrap();

    queue.mark_bugged("broken.xml").await.unwrap();
    assert!(!dir.path().join("broken.xml").exists());
    assert_eq!(queue.snapshot().len(), 1);

    assert!(queue.mark_bugged("missing.xml").await.is_err());
}
