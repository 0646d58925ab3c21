//! Template matching.
//!
//! Zero-mean normalized cross-correlation over grayscale, with the same
//! semantics as OpenCV's `TM_CCOEFF_NORMED`: confidence lies in [-1, 1]
//! and 1.0 is an exact match. Positions are the needle's top-left corner
//! in haystack coordinates.
//!
//! Callers rescale the haystack to the workflow's declared resolution
//! before matching; templates are stored at that resolution already.

use image::GrayImage;

/// One match candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Top-left corner in haystack coordinates
    pub x: u32,
    pub y: u32,
    /// Normalized correlation in [-1, 1]
    pub confidence: f32,
}

impl Match {
    /// Center of the matched region given the needle dimensions.
    pub fn center(&self, needle_width: u32, needle_height: u32) -> (u32, u32) {
        (self.x + needle_width / 2, self.y + needle_height / 2)
    }
}

/// Returns the single best match at or above `threshold`, or `None`.
pub fn best_match(haystack: &GrayImage, needle: &GrayImage, threshold: f32) -> Option<Match> {
    let scores = score_map(haystack, needle)?;
    let mut best: Option<Match> = None;
    for candidate in scores.iter() {
        if candidate.confidence >= threshold
            && best.is_none_or(|b| candidate.confidence > b.confidence)
        {
            best = Some(candidate);
        }
    }
    best
}

/// Returns all peaks at or above `threshold`, non-maximum-suppressed with
/// radius `min(needle_w, needle_h) / 2`, in descending confidence order.
pub fn match_all(haystack: &GrayImage, needle: &GrayImage, threshold: f32) -> Vec<Match> {
    let Some(scores) = score_map(haystack, needle) else {
        return Vec::new();
    };
    let mut candidates: Vec<Match> = scores
        .iter()
        .filter(|m| m.confidence >= threshold)
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let radius = (needle.width().min(needle.height()) / 2) as i64;
    let mut kept: Vec<Match> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            (candidate.x as i64 - k.x as i64).abs() <= radius
                && (candidate.y as i64 - k.y as i64).abs() <= radius
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Dense correlation scores for every needle placement.
struct ScoreMap {
    scores: Vec<f32>,
    width: u32,
    height: u32,
}

impl ScoreMap {
    fn iter(&self) -> impl Iterator<Item = Match> + '_ {
        self.scores.iter().enumerate().map(|(i, &confidence)| Match {
            x: i as u32 % self.width,
            y: i as u32 / self.width,
            confidence,
        })
    }
}

fn score_map(haystack: &GrayImage, needle: &GrayImage) -> Option<ScoreMap> {
    let (hw, hh) = haystack.dimensions();
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let pixels = (nw * nh) as f64;

    // Zero-mean needle and its norm, computed once.
    let needle_px: Vec<f64> = needle.pixels().map(|p| p.0[0] as f64).collect();
    let needle_mean = needle_px.iter().sum::<f64>() / pixels;
    let needle_zm: Vec<f64> = needle_px.iter().map(|v| v - needle_mean).collect();
    let needle_norm_sq: f64 = needle_zm.iter().map(|v| v * v).sum();

    let out_w = hw - nw + 1;
    let out_h = hh - nh + 1;
    let mut scores = vec![0.0f32; (out_w * out_h) as usize];

    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut window_sum = 0.0f64;
            for ny in 0..nh {
                for nx in 0..nw {
                    window_sum += haystack.get_pixel(ox + nx, oy + ny).0[0] as f64;
                }
            }
            let window_mean = window_sum / pixels;

            let mut dot = 0.0f64;
            let mut window_norm_sq = 0.0f64;
            for ny in 0..nh {
                for nx in 0..nw {
                    let hv = haystack.get_pixel(ox + nx, oy + ny).0[0] as f64 - window_mean;
                    let tv = needle_zm[(ny * nw + nx) as usize];
                    dot += hv * tv;
                    window_norm_sq += hv * hv;
                }
            }

            let denom = (window_norm_sq * needle_norm_sq).sqrt();
            // Flat windows or a flat needle have no correlation signal.
            let score = if denom > f64::EPSILON { dot / denom } else { 0.0 };
            scores[(oy * out_w + ox) as usize] = score as f32;
        }
    }

    Some(ScoreMap {
        scores,
        width: out_w,
        height: out_h,
    })
}
