// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-pixel wall likelihood estimation.
//!
//! An injected [`WallClassifier`] is tried first. Any failure drops back to
//! the classical run-length heuristic, so the stage always produces a map.

use crate::config::LikelihoodConfig;
use crate::error::ClassifierError;
use crate::image_ops::{gaussian_blur_map, FloatMap};
use image::imageops::{resize, FilterType};
use image::{GrayImage, Luma};
use rayon::prelude::*;

/// External neural wall classifier.
///
/// Receives the grayscale plan resized to `input_size x input_size` and
/// returns one probability per pixel in row-major order.
pub trait WallClassifier: Send + Sync {
    fn input_size(&self) -> u32;

    fn predict(&self, input: &GrayImage) -> Result<Vec<f32>, ClassifierError>;
}

/// Produce the wall likelihood map for a plan.
///
/// `gray` feeds the classifier, `mask` feeds the classical fallback. Both
/// must have the same dimensions.
pub fn estimate_likelihood(
    gray: &GrayImage,
    mask: &GrayImage,
    config: &LikelihoodConfig,
    classifier: Option<&dyn WallClassifier>,
) -> FloatMap {
    if config.use_classifier {
        if let Some(model) = classifier {
            match neural_likelihood(gray, model) {
                Ok(map) => {
                    tracing::debug!("Using neural wall likelihood");
                    return map;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Wall classifier failed, using classical fallback");
                }
            }
        }
    }
    classical_likelihood(mask, config)
}

/// Run the classifier at its fixed input size and resize the map back.
pub fn neural_likelihood(
    gray: &GrayImage,
    model: &dyn WallClassifier,
) -> Result<FloatMap, ClassifierError> {
    let size = model.input_size();
    if size == 0 {
        return Err(ClassifierError::Unavailable);
    }
    let input = resize(gray, size, size, FilterType::Triangle);
    let output = model.predict(&input)?;

    let expected = size as usize * size as usize;
    if output.len() != expected {
        return Err(ClassifierError::OutputShape {
            expected,
            actual: output.len(),
        });
    }
    if output.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::Inference(
            "non-finite probability in output".into(),
        ));
    }

    let small = FloatMap::from_raw(size, size, output).ok_or(ClassifierError::OutputShape {
        expected,
        actual: 0,
    })?;
    let mut full = resize(&small, gray.width(), gray.height(), FilterType::Triangle);
    for p in full.pixels_mut() {
        p.0[0] = p.0[0].clamp(0.0, 1.0);
    }
    Ok(full)
}

/// Horizontal and vertical ink run length through every pixel.
struct RunLengths {
    horizontal: Vec<u32>,
    vertical: Vec<u32>,
}

impl RunLengths {
    fn measure(mask: &GrayImage) -> Self {
        let w = mask.width() as usize;
        let h = mask.height() as usize;
        let raw = mask.as_raw();

        let mut horizontal = vec![0u32; w * h];
        horizontal
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                let line = &raw[y * w..(y + 1) * w];
                let mut x = 0;
                while x < w {
                    if line[x] == 0 {
                        x += 1;
                        continue;
                    }
                    let start = x;
                    while x < w && line[x] != 0 {
                        x += 1;
                    }
                    let run = (x - start) as u32;
                    for v in &mut row[start..x] {
                        *v = run;
                    }
                }
            });

        let mut vertical = vec![0u32; w * h];
        for x in 0..w {
            let mut y = 0;
            while y < h {
                if raw[y * w + x] == 0 {
                    y += 1;
                    continue;
                }
                let start = y;
                while y < h && raw[y * w + x] != 0 {
                    y += 1;
                }
                let run = (y - start) as u32;
                for yy in start..y {
                    vertical[yy * w + x] = run;
                }
            }
        }

        Self {
            horizontal,
            vertical,
        }
    }
}

/// Classical wall score from run-length geometry.
///
/// A pixel inside a long thin stroke scores high: its extent along the
/// stroke divided by the perpendicular thickness, capped at `ratio_cap` and
/// normalized to `[0, 1]`. The max over the two axes is then blurred.
/// Deterministic for a given mask and config.
pub fn classical_likelihood(mask: &GrayImage, config: &LikelihoodConfig) -> FloatMap {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    if w == 0 || h == 0 {
        return FloatMap::new(mask.width(), mask.height());
    }
    let runs = RunLengths::measure(mask);
    let cap = config.ratio_cap;
    let min_extent = config.min_extent;

    let score = |extent: u32, thickness: u32| -> f32 {
        if extent < min_extent || thickness == 0 {
            return 0.0;
        }
        (extent as f32 / thickness as f32).min(cap) / cap
    };

    let mut data = vec![0f32; w * h];
    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let idx = y * w + x;
            let hr = runs.horizontal[idx];
            let vr = runs.vertical[idx];
            if hr == 0 {
                continue;
            }
            *out = score(hr, vr).max(score(vr, hr));
        }
    });

    let map = FloatMap::from_raw(mask.width(), mask.height(), data)
        .unwrap_or_else(|| FloatMap::new(mask.width(), mask.height()));
    let mut blurred = gaussian_blur_map(&map, config.blur_sigma);
    for p in blurred.pixels_mut() {
        *p = Luma([p.0[0].clamp(0.0, 1.0)]);
    }
    blurred
}
