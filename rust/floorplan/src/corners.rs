// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Harris corner detection for interactive vertex snapping.
//!
//! Runs on the grayscale plan and is independent of the wall pipeline.

use crate::config::CornerConfig;
use crate::image_ops::FloatMap;
use crate::types::Point2D;
use image::GrayImage;
use imageproc::filter::separable_filter_equal;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Largest absolute 3x3 Sobel response on 8-bit input
const SOBEL_SCALE: f32 = 1020.0;

/// A detected corner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Corner {
    pub x: f64,
    pub y: f64,
    /// Harris response
    pub response: f32,
}

impl Corner {
    pub fn point(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// Box-sum a row-major map over a `(2r+1)^2` window. Borders repeat the edge
/// pixels.
fn box_sum(data: Vec<f32>, w: usize, h: usize, r: usize) -> Vec<f32> {
    let Some(map) = FloatMap::from_raw(w as u32, h as u32, data) else {
        return vec![0.0; w * h];
    };
    let kernel = vec![1.0f32; 2 * r + 1];
    separable_filter_equal(&map, &kernel).into_raw()
}

/// Per-pixel Harris response `det(M) - k * trace(M)^2`.
pub fn harris_response(gray: &GrayImage, k: f32, window_radius: u32) -> Vec<f32> {
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let mut ixx = vec![0f32; w * h];
    let mut iyy = vec![0f32; w * h];
    let mut ixy = vec![0f32; w * h];
    for (i, (px, py)) in gx.pixels().zip(gy.pixels()).enumerate() {
        let dx = px.0[0] as f32 / SOBEL_SCALE;
        let dy = py.0[0] as f32 / SOBEL_SCALE;
        ixx[i] = dx * dx;
        iyy[i] = dy * dy;
        ixy[i] = dx * dy;
    }

    let r = window_radius as usize;
    let sxx = box_sum(ixx, w, h, r);
    let syy = box_sum(iyy, w, h, r);
    let sxy = box_sum(ixy, w, h, r);

    let mut response = vec![0f32; w * h];
    response
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let i = y * w + x;
                let det = sxx[i] * syy[i] - sxy[i] * sxy[i];
                let trace = sxx[i] + syy[i];
                *out = det - k * trace * trace;
            }
        });
    response
}

/// Greedy radius suppression over corners sorted by descending response.
/// A grid of `radius`-sized cells keeps lookups local.
fn suppress(candidates: Vec<Corner>, radius: f64, max_corners: usize) -> Vec<Corner> {
    let cell = radius.max(1.0);
    let key = |x: f64, y: f64| ((x / cell).floor() as i64, (y / cell).floor() as i64);
    let mut grid: FxHashMap<(i64, i64), Vec<usize>> = FxHashMap::default();
    let mut kept: Vec<Corner> = Vec::new();

    for c in candidates {
        if kept.len() >= max_corners {
            break;
        }
        let (cx, cy) = key(c.x, c.y);
        let blocked = (-1..=1).any(|dy| {
            (-1..=1).any(|dx| {
                grid.get(&(cx + dx, cy + dy)).map_or(false, |idxs| {
                    idxs.iter().any(|&i| {
                        let k = &kept[i];
                        let ddx = k.x - c.x;
                        let ddy = k.y - c.y;
                        ddx * ddx + ddy * ddy <= radius * radius
                    })
                })
            })
        });
        if blocked {
            continue;
        }
        grid.entry((cx, cy)).or_default().push(kept.len());
        kept.push(c);
    }
    kept
}

/// Detect corners sorted by descending response, at most
/// `config.max_corners` of them.
pub fn detect_corners(gray: &GrayImage, config: &CornerConfig) -> Vec<Corner> {
    let w = gray.width() as usize;
    let response = harris_response(gray, config.k, config.window_radius);
    if response.is_empty() {
        return Vec::new();
    }

    let max_response = response.iter().copied().fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = max_response * config.threshold_ratio;

    let mut candidates: Vec<Corner> = response
        .iter()
        .enumerate()
        .filter(|(_, &r)| r > threshold)
        .map(|(i, &r)| Corner {
            x: (i % w) as f64,
            y: (i / w) as f64,
            response: r,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then_with(|| a.y.total_cmp(&b.y))
            .then_with(|| a.x.total_cmp(&b.x))
    });

    let corners = suppress(candidates, config.nms_radius, config.max_corners);
    tracing::debug!(count = corners.len(), "Detected corners");
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn rectangle_plan() -> GrayImage {
        let mut img = GrayImage::from_pixel(160, 120, Luma([255]));
        for x in 40..120 {
            for y in 30..90 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        img
    }

    #[test]
    fn test_rectangle_corners() {
        let corners = detect_corners(&rectangle_plan(), &CornerConfig::default());
        assert_eq!(corners.len(), 4, "{corners:?}");
        for (ex, ey) in [(40.0, 30.0), (119.0, 30.0), (40.0, 89.0), (119.0, 89.0)] {
            assert!(
                corners
                    .iter()
                    .any(|c| (c.x - ex).abs() <= 4.0 && (c.y - ey).abs() <= 4.0),
                "no corner near ({ex}, {ey})"
            );
        }
        assert!(corners.windows(2).all(|p| p[0].response >= p[1].response));
    }

    #[test]
    fn test_box_sum_window() {
        let mut data = vec![0f32; 7 * 5];
        data[2 * 7 + 3] = 1.0;
        let sums = box_sum(data, 7, 5, 1);
        for y in 0..5 {
            for x in 0..7 {
                let inside = (2..=4).contains(&x) && (1..=3).contains(&y);
                assert_eq!(sums[y * 7 + x], if inside { 1.0 } else { 0.0 }, "({x}, {y})");
            }
        }
        assert_eq!(box_sum(vec![2.0; 12], 4, 3, 2), vec![50.0; 12]);
    }

    #[test]
    fn test_blank_image_has_no_corners() {
        let img = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(detect_corners(&img, &CornerConfig::default()).is_empty());
    }

    #[test]
    fn test_max_corners_cap() {
        let config = CornerConfig {
            max_corners: 2,
            ..Default::default()
        };
        assert_eq!(detect_corners(&rectangle_plan(), &config).len(), 2);
    }

    #[test]
    fn test_straight_edge_is_not_a_corner() {
        let mut img = GrayImage::from_pixel(80, 80, Luma([255]));
        for x in 0..80 {
            for y in 40..80 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let response = harris_response(&img, 0.04, 2);
        assert!(response[40 * 80 + 40] < 0.0);
    }
}
