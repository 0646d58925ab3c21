//! Decoded screenshot frames.
//!
//! A [`Frame`] wraps an RGB8 pixel buffer decoded from the PNG bytes a
//! device returns. Workflow color fields use (B, G, R) channel order, so
//! sampling is exposed in that order; storage stays RGB as the `image`
//! crate produces it.

use crate::models::error::{EngineError, EngineResult};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// An (H, W, 3) pixel buffer with workflow-oriented accessors.
#[derive(Debug, Clone)]
pub struct Frame {
    img: RgbImage,
}

impl Frame {
    pub fn new(img: RgbImage) -> Self {
        Self { img }
    }

    /// Decodes PNG bytes as pulled from `screencap -p`.
    pub fn decode_png(bytes: &[u8]) -> EngineResult<Self> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
        Ok(Self {
            img: img.to_rgb8(),
        })
    }

    pub fn encode_png(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.img.clone()).write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// Samples a pixel in (B, G, R) order. `None` when out of bounds.
    pub fn bgr_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.img.width() || y >= self.img.height() {
            return None;
        }
        let [r, g, b] = self.img.get_pixel(x, y).0;
        Some([b, g, r])
    }

    /// Rescales to the given resolution. Returns a clone when the size
    /// already matches, so callers can rescale unconditionally.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.width() == width && self.height() == height {
            return self.clone();
        }
        Frame {
            img: image::imageops::resize(&self.img, width, height, FilterType::Triangle),
        }
    }

    /// Crops a rectangle; the rectangle must lie within the frame.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> EngineResult<Frame> {
        if width == 0
            || height == 0
            || x.checked_add(width).is_none_or(|r| r > self.width())
            || y.checked_add(height).is_none_or(|b| b > self.height())
        {
            return Err(EngineError::validation(format!(
                "crop {x},{y} {width}x{height} outside {}x{} frame",
                self.width(),
                self.height()
            )));
        }
        Ok(Frame {
            img: image::imageops::crop_imm(&self.img, x, y, width, height).to_image(),
        })
    }

    /// Grayscale view used by the template matcher.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let frame = solid(8, 6, [10, 20, 30]);
        let bytes = frame.encode_png().unwrap();
        let back = Frame::decode_png(&bytes).unwrap();
        assert_eq!(back.width(), 8);
        assert_eq!(back.height(), 6);
        assert_eq!(back.bgr_at(3, 3), Some([30, 20, 10]));
    }

    #[test]
    fn bgr_sampling_swaps_channels() {
        let frame = solid(2, 2, [200, 100, 50]);
        assert_eq!(frame.bgr_at(0, 0), Some([50, 100, 200]));
        assert_eq!(frame.bgr_at(2, 0), None);
    }

    #[test]
    fn resize_noop_keeps_dimensions() {
        let frame = solid(10, 10, [0, 0, 0]);
        let same = frame.resized(10, 10);
        assert_eq!((same.width(), same.height()), (10, 10));
        let smaller = frame.resized(5, 5);
        assert_eq!((smaller.width(), smaller.height()), (5, 5));
    }

    #[test]
    fn crop_rejects_out_of_bounds() {
        let frame = solid(10, 10, [0, 0, 0]);
        assert!(frame.crop(8, 8, 4, 4).is_err());
        assert!(frame.crop(0, 0, 10, 10).is_ok());
    }
}
