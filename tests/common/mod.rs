//! Shared fixtures for integration tests: synthetic screens, a reference
//! template, and mock-executor helpers.

#![allow(dead_code)]

use droidflow::imaging::Frame;
use image::{Rgb, RgbImage};
use std::path::Path;

pub const NEEDLE_W: u32 = 8;
pub const NEEDLE_H: u32 = 8;

/// High-contrast checkerboard needle; gradients in the background do not
/// correlate with it.
pub fn needle_frame() -> Frame {
    let img = RgbImage::from_fn(NEEDLE_W, NEEDLE_H, |x, y| {
        let v = if (x + y) % 2 == 0 { 240 } else { 60 };
        Rgb([v, v, v])
    });
    Frame::new(img)
}

fn background_pixel(x: u32, y: u32) -> Rgb<u8> {
    let v = ((x * 2 + y * 3) % 90) as u8 + 20;
    Rgb([v, v, v])
}

fn compose_screen(width: u32, height: u32, patches: &[(u32, u32)]) -> RgbImage {
    let mut img = RgbImage::from_fn(width, height, |x, y| background_pixel(x, y));
    let needle = needle_frame();
    for &(px, py) in patches {
        for y in 0..NEEDLE_H {
            for x in 0..NEEDLE_W {
                let [b, g, r] = needle.bgr_at(x, y).unwrap();
                img.put_pixel(px + x, py + y, Rgb([r, g, b]));
            }
        }
    }
    img
}

/// PNG of a gradient screen with the needle stamped at each position.
pub fn screen_png(width: u32, height: u32, patches: &[(u32, u32)]) -> Vec<u8> {
    Frame::new(compose_screen(width, height, patches))
        .encode_png()
        .unwrap()
}

/// PNG of a gradient screen with one pixel forced to an exact RGB value.
pub fn screen_png_with_pixel(width: u32, height: u32, x: u32, y: u32, rgb: [u8; 3]) -> Vec<u8> {
    let mut img = compose_screen(width, height, &[]);
    img.put_pixel(x, y, Rgb(rgb));
    Frame::new(img).encode_png().unwrap()
}

/// Opens a template store under `dir` with the needle saved as `name`.
pub async fn store_with_template(dir: &Path, name: &str) -> droidflow::store::TemplateStore {
    let store = droidflow::store::TemplateStore::open(dir).await.unwrap();
    store.save_frame(name, &needle_frame()).await.unwrap();
    store
}

/// adb argument prefixes used by assertions.
pub fn tap_prefix(serial: &str) -> Vec<String> {
    ["-s", serial, "shell", "input", "tap"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn screencap_args(serial: &str) -> Vec<String> {
    ["-s", serial, "exec-out", "screencap", "-p"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
