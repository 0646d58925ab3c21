//! Template store tests, including the capture/match round-trip law.

mod common;

use common::{needle_frame, screen_png, NEEDLE_H, NEEDLE_W};
use droidflow::bridge::executor::mock::MockCommandExecutor;
use droidflow::bridge::DeviceChannel;
use droidflow::config::AppTarget;
use droidflow::imaging::{best_match, Frame};
use droidflow::store::templates::CaptureRegion;
use droidflow::store::TemplateStore;
use std::sync::Arc;

const SERIAL: &str = "emulator-5554";

fn channel_with_screen(png: Vec<u8>) -> (MockCommandExecutor, DeviceChannel) {
    let mock = MockCommandExecutor::new().with_raw(
        "adb",
        &["-s", SERIAL, "exec-out", "screencap", "-p"],
        png,
    );
    let channel = DeviceChannel::new(SERIAL, "adb", Arc::new(mock.clone()), AppTarget::default());
    (mock, channel)
}

#[tokio::test]
async fn captured_region_matches_its_source_screen() {
    let dir = tempfile::tempdir().unwrap();
    let store = TemplateStore::open(dir.path()).await.unwrap();

    // Screen with the reference pattern stamped at (20, 10).
    let png = screen_png(64, 48, &[(20, 10)]);
    let (_, channel) = channel_with_screen(png.clone());

    let template = store
        .capture(
            &channel,
            "button",
            CaptureRegion {
                x: 20,
                y: 10,
                width: NEEDLE_W,
                height: NEEDLE_H,
            },
            (64, 48),
        )
        .await
        .unwrap();
    assert_eq!((template.width, template.height), (NEEDLE_W, NEEDLE_H));
    assert!(template.file_path.exists());

    // Matching the capture against the same screen finds the region's
    // top-left within a pixel at near-perfect confidence.
    let haystack = Frame::decode_png(&png).unwrap();
    let needle = store.load("button").await.unwrap();
    let found = best_match(&haystack.to_gray(), &needle.to_gray(), 0.9).expect("match");
    assert!(found.confidence >= 0.98);
    assert!(found.x.abs_diff(20) <= 1);
    assert!(found.y.abs_diff(10) <= 1);
}

#[tokio::test]
async fn replacement_writes_new_file_and_keeps_old() {
    let dir = tempfile::tempdir().unwrap();
    let store = TemplateStore::open(dir.path()).await.unwrap();

    let first = store.save_frame("button", &needle_frame()).await.unwrap();
    let replacement = Frame::new(image::RgbImage::from_pixel(
        4,
        4,
        image::Rgb([1, 2, 3]),
    ));
    let second = store.save_frame("button", &replacement).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.file_path, second.file_path);
    assert!(first.file_path.exists());
    assert!(second.file_path.exists());
    assert_eq!((second.width, second.height), (4, 4));

    // The store still lists one record under the name, now the new pixels.
    assert_eq!(store.list().await.len(), 1);
    let loaded = store.load("button").await.unwrap();
    assert_eq!((loaded.width(), loaded.height()), (4, 4));
}

#[tokio::test]
async fn metadata_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = TemplateStore::open(dir.path()).await.unwrap();
        store.save_frame("button", &needle_frame()).await.unwrap();
        store.save_frame("popup_close", &needle_frame()).await.unwrap();
    }
    let store = TemplateStore::open(dir.path()).await.unwrap();
    let names = store.names().await;
    assert!(names.contains("button"));
    assert!(names.contains("popup_close"));
    let loaded = store.load("popup_close").await.unwrap();
    assert_eq!((loaded.width(), loaded.height()), (NEEDLE_W, NEEDLE_H));
}

#[tokio::test]
async fn loading_unknown_template_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = TemplateStore::open(dir.path()).await.unwrap();
    assert!(store.load("missing").await.is_err());
}
