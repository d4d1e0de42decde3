// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line segment extraction from a wall likelihood map.
//!
//! Sobel gradients are thinned by non-maximum suppression, edge pixels are
//! grouped into orientation-coherent chains, and every chain is fitted with
//! its principal axis.

use crate::config::LineExtractConfig;
use crate::image_ops::{sample_clamped, unit_map_to_gray, FloatMap};
use crate::types::{line_angle_difference, LineSegment, Orientation, Point2D};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use nalgebra::{Matrix2, SymmetricEigen};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Largest Sobel response on an 8-bit image (one axis)
const SOBEL_MAX: f32 = 4.0 * 255.0;

const TAN_22_5_DEG: f32 = 0.414_213_57;

/// Thinned edge pixels with gradient orientation
pub struct EdgeMap {
    width: usize,
    height: usize,
    magnitude: Vec<f32>,
    /// Gradient direction folded into `[0, PI)`
    orientation: Vec<f64>,
    edge: Vec<bool>,
}

impl EdgeMap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        self.edge[y * self.width + x]
    }

    pub fn magnitude(&self, x: usize, y: usize) -> f32 {
        self.magnitude[y * self.width + x]
    }

    pub fn edge_count(&self) -> usize {
        self.edge.iter().filter(|&&e| e).count()
    }
}

/// Sobel gradients, non-maximum suppression and magnitude threshold.
pub fn detect_edges(likelihood: &FloatMap, edge_threshold: f32) -> EdgeMap {
    let width = likelihood.width() as usize;
    let height = likelihood.height() as usize;
    let gray = unit_map_to_gray(likelihood);
    let gx_img = horizontal_sobel(&gray);
    let gy_img = vertical_sobel(&gray);

    let n = width * height;
    let mut gx = vec![0f32; n];
    let mut gy = vec![0f32; n];
    let mut magnitude = vec![0f32; n];
    let mut orientation = vec![0f64; n];
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let sx = gx_img.get_pixel(x as u32, y as u32).0[0] as f32 / SOBEL_MAX;
            let sy = gy_img.get_pixel(x as u32, y as u32).0[0] as f32 / SOBEL_MAX;
            gx[idx] = sx;
            gy[idx] = sy;
            magnitude[idx] = (sx * sx + sy * sy).sqrt();
            orientation[idx] = (sy as f64).atan2(sx as f64).rem_euclid(PI);
        }
    }

    let mut edge = vec![false; n];
    if width >= 3 && height >= 3 {
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let idx = y * width + x;
                let mag = magnitude[idx];
                if mag < edge_threshold {
                    continue;
                }
                let (n1, n2) = nms_neighbours(&magnitude, width, x, y, gx[idx], gy[idx]);
                // Ties keep the pixel so plateaus of equal response are not lost.
                if mag >= n1 && mag >= n2 && (mag > n1 || mag > n2) {
                    edge[idx] = true;
                }
            }
        }
    }

    EdgeMap {
        width,
        height,
        magnitude,
        orientation,
        edge,
    }
}

fn nms_neighbours(mag: &[f32], w: usize, x: usize, y: usize, gx: f32, gy: f32) -> (f32, f32) {
    let at = |xx: usize, yy: usize| mag[yy * w + xx];
    let abs_gx = gx.abs();
    let abs_gy = gy.abs();
    let same_sign = (gx >= 0.0 && gy >= 0.0) || (gx <= 0.0 && gy <= 0.0);

    if abs_gx >= abs_gy {
        if abs_gy <= abs_gx * TAN_22_5_DEG {
            (at(x - 1, y), at(x + 1, y))
        } else if same_sign {
            (at(x - 1, y - 1), at(x + 1, y + 1))
        } else {
            (at(x + 1, y - 1), at(x - 1, y + 1))
        }
    } else if abs_gx <= abs_gy * TAN_22_5_DEG {
        (at(x, y - 1), at(x, y + 1))
    } else if same_sign {
        (at(x - 1, y - 1), at(x + 1, y + 1))
    } else {
        (at(x + 1, y - 1), at(x - 1, y + 1))
    }
}

/// Group edge pixels into chains by breadth-first search.
///
/// Neighbours within `max_gap` pixels (Chebyshev distance) join the chain
/// when their gradient orientation stays within `angle_tolerance` of the
/// seed, so a closed outline breaks into one chain per straight side.
pub fn trace_chains(edges: &EdgeMap, max_gap: u32, angle_tolerance: f64) -> Vec<Vec<(usize, usize)>> {
    let w = edges.width;
    let h = edges.height;
    let r = max_gap.max(1) as isize;
    let mut visited = vec![false; w * h];
    let mut queue = VecDeque::new();
    let mut chains = Vec::new();

    for seed in 0..w * h {
        if !edges.edge[seed] || visited[seed] {
            continue;
        }
        let seed_angle = edges.orientation[seed];
        visited[seed] = true;
        queue.push_back(seed);
        let mut chain = Vec::new();

        while let Some(idx) = queue.pop_front() {
            let x = idx % w;
            let y = idx / w;
            chain.push((x, y));

            for dy in -r..=r {
                for dx in -r..=r {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if visited[nidx] || !edges.edge[nidx] {
                        continue;
                    }
                    if line_angle_difference(edges.orientation[nidx], seed_angle) > angle_tolerance
                    {
                        continue;
                    }
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }
        }

        chains.push(chain);
    }

    chains
}

/// Least-squares line through a pixel chain along its principal axis.
///
/// Returns `None` for chains with no spread. The segment spans the extreme
/// projections of the chain pixels; its score is the mean likelihood sampled
/// at unit steps along it.
pub fn fit_chain(chain: &[(usize, usize)], likelihood: &FloatMap) -> Option<LineSegment> {
    if chain.len() < 2 {
        return None;
    }
    let count = chain.len() as f64;
    let (sum_x, sum_y) = chain
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x as f64, sy + y as f64));
    let cx = sum_x / count;
    let cy = sum_y / count;

    let (mut cxx, mut cyy, mut cxy) = (0.0, 0.0, 0.0);
    for &(x, y) in chain {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        cxx += dx * dx;
        cyy += dy * dy;
        cxy += dx * dy;
    }
    let cov = Matrix2::new(cxx / count, cxy / count, cxy / count, cyy / count);
    let eig = SymmetricEigen::new(cov);
    let major = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        eig.eigenvectors.column(0)
    } else {
        eig.eigenvectors.column(1)
    };
    let (mut tx, mut ty) = (major[0], major[1]);
    let norm = (tx * tx + ty * ty).sqrt();
    if !norm.is_finite() || norm < 1e-9 {
        return None;
    }
    tx /= norm;
    ty /= norm;

    let mut smin = f64::INFINITY;
    let mut smax = f64::NEG_INFINITY;
    for &(x, y) in chain {
        let s = (x as f64 - cx) * tx + (y as f64 - cy) * ty;
        smin = smin.min(s);
        smax = smax.max(s);
    }
    if !(smax - smin).is_finite() || smax - smin <= 0.0 {
        return None;
    }

    let start = Point2D::new(cx + smin * tx, cy + smin * ty);
    let end = Point2D::new(cx + smax * tx, cy + smax * ty);
    let score = mean_along(likelihood, &start, &end);
    Some(LineSegment::from_points(start, end, score).canonical())
}

/// Mean map value sampled every pixel along a segment.
pub fn mean_along(map: &FloatMap, start: &Point2D, end: &Point2D) -> f32 {
    let length = start.distance_to(end);
    let steps = length.ceil().max(1.0) as usize;
    let mut total = 0.0f32;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = start.x + (end.x - start.x) * t;
        let y = start.y + (end.y - start.y) * t;
        total += sample_clamped(map, x, y);
    }
    total / (steps + 1) as f32
}

/// Extract scored line segments from a wall likelihood map.
pub fn extract_lines(likelihood: &FloatMap, config: &LineExtractConfig) -> Vec<LineSegment> {
    let edges = detect_edges(likelihood, config.edge_threshold);
    let chains = trace_chains(&edges, config.max_gap, config.chain_angle_tolerance);
    let chain_count = chains.len();

    let lines: Vec<LineSegment> = chains
        .iter()
        .filter(|chain| chain.len() >= config.min_chain_pixels)
        .filter_map(|chain| fit_chain(chain, likelihood))
        .filter(|line| line.length() >= config.min_length)
        .filter(|line| {
            !config.orientation_constraint
                || line.orientation(config.orientation_tolerance) != Orientation::Diagonal
        })
        .collect();

    tracing::debug!(
        edge_pixels = edges.edge_count(),
        chains = chain_count,
        lines = lines.len(),
        "Extracted line segments"
    );

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Luma;

    /// Likelihood map with a filled band, 1.0 inside and 0.0 outside.
    fn band_map(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> FloatMap {
        let mut map = FloatMap::new(w, h);
        for y in y0..y1 {
            for x in x0..x1 {
                map.put_pixel(x, y, Luma([1.0]));
            }
        }
        map
    }

    #[test]
    fn test_edges_sit_on_band_faces() {
        let edges = detect_edges(&band_map(100, 60, 10, 20, 90, 30), 0.1);
        assert_eq!((edges.width(), edges.height()), (100, 60));

        let column: Vec<usize> = (0..60).filter(|&y| edges.is_edge(50, y)).collect();
        assert!(column.iter().any(|&y| (18..=21).contains(&y)), "{column:?}");
        assert!(column.iter().any(|&y| (28..=31).contains(&y)), "{column:?}");
        assert!(column.iter().all(|&y| (18..=21).contains(&y) || (28..=31).contains(&y)));

        assert_eq!(edges.magnitude(50, 25), 0.0);
        assert_eq!(edges.magnitude(50, 5), 0.0);
        assert!(edges.magnitude(50, 20) > 0.5);
        assert!(edges.edge_count() > 0);
    }

    #[test]
    fn test_fit_chain_horizontal() {
        let chain: Vec<(usize, usize)> = (10..60).map(|x| (x, 20)).collect();
        let map = FloatMap::from_pixel(80, 40, Luma([0.5]));
        let line = fit_chain(&chain, &map).unwrap();
        assert_abs_diff_eq!(line.start.x, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.end.x, 59.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.start.y, 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.score, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_fit_chain_rejects_single_point() {
        let map = FloatMap::new(10, 10);
        assert!(fit_chain(&[(3, 3)], &map).is_none());
        assert!(fit_chain(&[(3, 3), (3, 3)], &map).is_none());
    }

    #[test]
    fn test_band_produces_two_face_lines() {
        let map = band_map(200, 100, 20, 40, 180, 48);
        let config = LineExtractConfig::default();
        let lines = extract_lines(&map, &config);

        let horizontal: Vec<_> = lines
            .iter()
            .filter(|l| l.orientation(config.orientation_tolerance) == Orientation::Horizontal)
            .filter(|l| l.length() > 100.0)
            .collect();
        assert_eq!(horizontal.len(), 2, "lines: {lines:?}");
        let mut ys: Vec<f64> = horizontal.iter().map(|l| l.midpoint().y).collect();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((ys[0] - 39.5).abs() < 1.5, "top face at {}", ys[0]);
        assert!((ys[1] - 47.5).abs() < 1.5, "bottom face at {}", ys[1]);
    }

    #[test]
    fn test_rectangle_outline_splits_into_sides() {
        let mut map = band_map(200, 200, 30, 30, 170, 170);
        for y in 34..166 {
            for x in 34..166 {
                map.put_pixel(x, y, Luma([0.0]));
            }
        }
        let config = LineExtractConfig::default();
        let lines = extract_lines(&map, &config);
        let long: Vec<_> = lines.iter().filter(|l| l.length() > 100.0).collect();
        // outer and inner face for each of the four sides
        assert_eq!(long.len(), 8, "lines: {long:?}");
        assert!(long
            .iter()
            .all(|l| l.orientation(config.orientation_tolerance) != Orientation::Diagonal));
    }

    #[test]
    fn test_short_and_diagonal_lines_dropped() {
        let mut map = FloatMap::new(120, 120);
        for i in 10..100 {
            for t in 0..4 {
                map.put_pixel(i, i + t, Luma([1.0]));
            }
        }
        let config = LineExtractConfig::default();
        assert!(extract_lines(&map, &config).is_empty());

        let unconstrained = LineExtractConfig {
            orientation_constraint: false,
            ..Default::default()
        };
        assert!(!extract_lines(&map, &unconstrained).is_empty());
    }
}
