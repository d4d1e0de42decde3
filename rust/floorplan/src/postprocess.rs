// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Post-processing filters that turn consolidated line segments into
//! classified walls.
//!
//! The filter list is ordered and each entry is optional:
//! - Length: drop segments that are too short or too long
//! - SnapOrientation: make near-axis segments exactly horizontal/vertical
//! - Grid: quantize endpoints
//! - Dedupe: collapse near-identical detections, keeping the best score
//! - PairFaces: replace the two faces of a thick wall by its centerline
//! - RemoveIsolated: prune segments that touch nothing
//! - Spacing: reject segments whose nearest parallel neighbour is implausible
//!
//! Surviving segments are then split into exterior and interior walls by
//! their distance from the image border.

use crate::config::{PostFilter, PostProcessConfig};
use crate::consolidate::touches;
use crate::image_ops::is_ink;
use crate::types::{
    line_angle_difference, LineSegment, Orientation, Point2D, WallSegment, WallType,
};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Angle tolerance for treating two segments as parallel faces (radians)
const PARALLEL_TOLERANCE: f64 = 0.1;

/// Shortest overlap, as a fraction of the shorter segment, for face pairing
const MIN_FACE_OVERLAP: f64 = 0.3;

/// How far off the line the thickness scan looks for ink (pixels)
const INK_SEARCH: i64 = 2;

/// Longest perpendicular run accepted as a wall cross-section (pixels)
const MAX_INK_RUN: i64 = 100;

/// Statistics from the filtering pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessStats {
    pub input_count: usize,
    pub removed_short: usize,
    pub removed_degenerate: usize,
    pub removed_duplicates: usize,
    pub merged_faces: usize,
    pub removed_isolated: usize,
    pub removed_spacing: usize,
    pub final_count: usize,
}

/// Post-processed segments partitioned by orientation and wall type.
///
/// `horizontal`/`vertical` and `exterior`/`interior` are views over `all`;
/// diagonal segments appear only in `all` and the wall-type lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifiedSegments {
    pub all: Vec<LineSegment>,
    pub horizontal: Vec<LineSegment>,
    pub vertical: Vec<LineSegment>,
    pub exterior: Vec<LineSegment>,
    pub interior: Vec<LineSegment>,
    pub stats: PostProcessStats,
}

/// Run the configured filters in order, then classify the survivors.
pub fn postprocess(
    segments: &[LineSegment],
    image_width: u32,
    image_height: u32,
    config: &PostProcessConfig,
) -> ClassifiedSegments {
    let mut stats = PostProcessStats {
        input_count: segments.len(),
        ..Default::default()
    };

    let mut current: Vec<LineSegment> = segments.to_vec();
    for filter in &config.filters {
        let before = current.len();
        current = apply_filter(&current, filter);
        let removed = before - current.len();
        match filter {
            PostFilter::Length { .. } => stats.removed_short += removed,
            PostFilter::Grid { .. } | PostFilter::SnapOrientation { .. } => {
                stats.removed_degenerate += removed
            }
            PostFilter::Dedupe { .. } => stats.removed_duplicates += removed,
            PostFilter::PairFaces { .. } => stats.merged_faces += removed,
            PostFilter::RemoveIsolated { .. } => stats.removed_isolated += removed,
            PostFilter::Spacing { .. } => stats.removed_spacing += removed,
        }
    }
    stats.final_count = current.len();

    let mut classified = ClassifiedSegments {
        stats,
        ..Default::default()
    };
    for seg in &current {
        match seg.orientation(config.orientation_tolerance) {
            Orientation::Horizontal => classified.horizontal.push(*seg),
            Orientation::Vertical => classified.vertical.push(*seg),
            Orientation::Diagonal => {}
        }
        match classify_wall_type(
            seg,
            config.orientation_tolerance,
            image_width,
            image_height,
            config.exterior_edge_ratio,
        ) {
            WallType::Exterior => classified.exterior.push(*seg),
            WallType::Interior => classified.interior.push(*seg),
        }
    }
    classified.all = current;

    tracing::debug!(
        input = classified.stats.input_count,
        output = classified.stats.final_count,
        exterior = classified.exterior.len(),
        interior = classified.interior.len(),
        "Post-processed segments"
    );

    classified
}

/// Apply one filter to a segment list.
pub fn apply_filter(segments: &[LineSegment], filter: &PostFilter) -> Vec<LineSegment> {
    match *filter {
        PostFilter::Length { min, max } => filter_by_length(segments, min, max),
        PostFilter::SnapOrientation { tolerance } => snap_to_axes(segments, tolerance),
        PostFilter::Grid { size } => snap_to_grid(segments, size),
        PostFilter::Dedupe { tolerance } => remove_duplicates(segments, tolerance),
        PostFilter::PairFaces { max_thickness } => pair_faces(segments, max_thickness),
        PostFilter::RemoveIsolated { threshold } => remove_isolated(segments, threshold),
        PostFilter::Spacing { min, max } => filter_by_spacing(segments, min, max),
    }
}

/// Keep segments with `min <= length <= max`.
pub fn filter_by_length(segments: &[LineSegment], min: f64, max: Option<f64>) -> Vec<LineSegment> {
    segments
        .iter()
        .filter(|s| {
            let len = s.length();
            len >= min && max.map_or(true, |m| len <= m)
        })
        .copied()
        .collect()
}

/// Force near-axis segments exactly horizontal or vertical by averaging the
/// off-axis coordinate. Diagonal segments pass through.
pub fn snap_to_axes(segments: &[LineSegment], tolerance: f64) -> Vec<LineSegment> {
    segments
        .iter()
        .map(|seg| match seg.orientation(tolerance) {
            Orientation::Horizontal => {
                let y = (seg.start.y + seg.end.y) / 2.0;
                LineSegment::from_points(
                    Point2D::new(seg.start.x, y),
                    Point2D::new(seg.end.x, y),
                    seg.score,
                )
            }
            Orientation::Vertical => {
                let x = (seg.start.x + seg.end.x) / 2.0;
                LineSegment::from_points(
                    Point2D::new(x, seg.start.y),
                    Point2D::new(x, seg.end.y),
                    seg.score,
                )
            }
            Orientation::Diagonal => *seg,
        })
        .filter(|s| !s.is_degenerate())
        .collect()
}

/// Round endpoints to the nearest multiple of `size`. Segments collapsing
/// to a point are dropped.
pub fn snap_to_grid(segments: &[LineSegment], size: f64) -> Vec<LineSegment> {
    if size <= 0.0 {
        return segments.to_vec();
    }
    let q = |v: f64| (v / size).round() * size;
    segments
        .iter()
        .map(|s| {
            LineSegment::from_points(
                Point2D::new(q(s.start.x), q(s.start.y)),
                Point2D::new(q(s.end.x), q(s.end.y)),
                s.score,
            )
        })
        .filter(|s| !s.is_degenerate())
        .collect()
}

/// Endpoints match within `tolerance`, in either direction.
pub fn is_duplicate(a: &LineSegment, b: &LineSegment, tolerance: f64) -> bool {
    let same = a.start.distance_to(&b.start) <= tolerance && a.end.distance_to(&b.end) <= tolerance;
    let reversed =
        a.start.distance_to(&b.end) <= tolerance && a.end.distance_to(&b.start) <= tolerance;
    same || reversed
}

/// Collapse near-identical segments, keeping the highest score of each
/// cluster. Survivors keep their input order.
pub fn remove_duplicates(segments: &[LineSegment], tolerance: f64) -> Vec<LineSegment> {
    let mut order: Vec<usize> = (0..segments.len()).collect();
    // Stable sort keeps the earlier of two equal scores.
    order.sort_by(|&a, &b| segments[b].score.total_cmp(&segments[a].score));

    let mut kept: Vec<usize> = Vec::new();
    for idx in order {
        if kept
            .iter()
            .all(|&k| !is_duplicate(&segments[k], &segments[idx], tolerance))
        {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept.into_iter().map(|i| segments[i]).collect()
}

/// Check if two segments are parallel, nearby, and overlapping in extent
fn faces_overlap(a: &LineSegment, b: &LineSegment, max_thickness: f64) -> bool {
    if line_angle_difference(a.angle(), b.angle()) > PARALLEL_TOLERANCE {
        return false;
    }

    let (tx, ty) = a.direction();
    let (nx, ny) = (-ty, tx);
    let offset = |p: &Point2D| p.x * nx + p.y * ny;
    let separation = (offset(&b.midpoint()) - offset(&a.midpoint())).abs();
    if separation > max_thickness {
        return false;
    }

    let proj = |p: &Point2D| p.x * tx + p.y * ty;
    let (min1, max1) = ordered(proj(&a.start), proj(&a.end));
    let (min2, max2) = ordered(proj(&b.start), proj(&b.end));

    // Must overlap by at least 30% of the shorter segment
    let overlap = (max1.min(max2) - min1.max(min2)).max(0.0);
    let shorter = (max1 - min1).min(max2 - min2);
    overlap > shorter * MIN_FACE_OVERLAP
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Merge a group of faces into the centerline spanning all of them
fn merge_face_group(group: &[LineSegment]) -> LineSegment {
    if group.len() == 1 {
        return group[0];
    }

    let longest = group
        .iter()
        .copied()
        .max_by(|a, b| a.length().total_cmp(&b.length()))
        .unwrap_or(group[0]);
    let (tx, ty) = longest.direction();
    let (nx, ny) = (-ty, tx);

    let mut min_proj = f64::INFINITY;
    let mut max_proj = f64::NEG_INFINITY;
    let mut min_off = f64::INFINITY;
    let mut max_off = f64::NEG_INFINITY;
    for seg in group {
        for p in [seg.start, seg.end] {
            let s = p.x * tx + p.y * ty;
            min_proj = min_proj.min(s);
            max_proj = max_proj.max(s);
        }
        let mid = seg.midpoint();
        let o = mid.x * nx + mid.y * ny;
        min_off = min_off.min(o);
        max_off = max_off.max(o);
    }
    let offset = (min_off + max_off) / 2.0;
    let score = group.iter().map(|s| s.score).fold(0.0f32, f32::max);

    LineSegment::from_points(
        Point2D::new(min_proj * tx + offset * nx, min_proj * ty + offset * ny),
        Point2D::new(max_proj * tx + offset * nx, max_proj * ty + offset * ny),
        score,
    )
    .canonical()
}

/// Replace parallel face pairs of thick walls by their centerline.
///
/// Edge detection sees both sides of a filled wall. This merges parallel,
/// nearby, overlapping segments so each physical wall yields one segment.
pub fn pair_faces(segments: &[LineSegment], max_thickness: f64) -> Vec<LineSegment> {
    if segments.len() <= 1 {
        return segments.to_vec();
    }

    let mut merged = Vec::new();
    let mut used = vec![false; segments.len()];

    for i in 0..segments.len() {
        if used[i] {
            continue;
        }
        let mut group = vec![segments[i]];
        used[i] = true;

        for j in (i + 1)..segments.len() {
            if used[j] {
                continue;
            }
            if faces_overlap(&segments[i], &segments[j], max_thickness) {
                group.push(segments[j]);
                used[j] = true;
            }
        }

        merged.push(merge_face_group(&group));
    }

    merged
}

/// Drop segments with no other segment within `threshold` of any endpoint.
///
/// A segment counts as connected when one of its endpoints is near another
/// segment or another segment's endpoint is near it (T-junctions).
pub fn remove_isolated(segments: &[LineSegment], threshold: f64) -> Vec<LineSegment> {
    segments
        .iter()
        .enumerate()
        .filter(|(i, seg)| {
            segments.iter().enumerate().any(|(j, other)| {
                *i != j && (touches(seg, other, threshold) || touches(other, seg, threshold))
            })
        })
        .map(|(_, s)| *s)
        .collect()
}

/// Reject segments whose nearest overlapping parallel neighbour lies
/// outside `[min, max]`. Segments without such a neighbour are kept.
pub fn filter_by_spacing(segments: &[LineSegment], min: f64, max: f64) -> Vec<LineSegment> {
    segments
        .iter()
        .enumerate()
        .filter(|(i, seg)| {
            let (tx, ty) = seg.direction();
            let (nx, ny) = (-ty, tx);
            let offset = |p: &Point2D| p.x * nx + p.y * ny;
            let proj = |p: &Point2D| p.x * tx + p.y * ty;
            let (a0, a1) = ordered(proj(&seg.start), proj(&seg.end));

            let nearest = segments
                .iter()
                .enumerate()
                .filter(|(j, other)| {
                    if *i == *j
                        || line_angle_difference(seg.angle(), other.angle()) > PARALLEL_TOLERANCE
                    {
                        return false;
                    }
                    let (b0, b1) = ordered(proj(&other.start), proj(&other.end));
                    a1.min(b1) > a0.max(b0)
                })
                .map(|(_, other)| (offset(&other.midpoint()) - offset(&seg.midpoint())).abs())
                .min_by(|a, b| a.total_cmp(b));

            nearest.map_or(true, |d| d >= min && d <= max)
        })
        .map(|(_, s)| *s)
        .collect()
}

/// Exterior when the segment lies within `ratio * min(width, height)` of
/// the image border.
pub fn classify_wall_type(
    segment: &LineSegment,
    orientation_tolerance: f64,
    image_width: u32,
    image_height: u32,
    ratio: f64,
) -> WallType {
    let w = image_width as f64;
    let h = image_height as f64;
    let threshold = ratio * w.min(h);

    let edge_distance = match segment.orientation(orientation_tolerance) {
        Orientation::Horizontal => {
            let y = segment.perpendicular_position(Orientation::Horizontal);
            y.min(h - y)
        }
        Orientation::Vertical => {
            let x = segment.perpendicular_position(Orientation::Vertical);
            x.min(w - x)
        }
        Orientation::Diagonal => [segment.start, segment.end]
            .iter()
            .map(|p| p.x.min(w - p.x).min(p.y).min(h - p.y))
            .fold(f64::INFINITY, f64::min),
    };

    if edge_distance <= threshold {
        WallType::Exterior
    } else {
        WallType::Interior
    }
}

/// Length of the ink run through `(x, y)` along `(dx, dy)`.
fn ink_run(mask: &GrayImage, x: i64, y: i64, dx: i64, dy: i64) -> i64 {
    let mut run = 1;
    for dir in [1, -1] {
        let mut step = 1;
        while step < MAX_INK_RUN && is_ink(mask, x + dir * dx * step, y + dir * dy * step) {
            step += 1;
            run += 1;
        }
    }
    run
}

/// Median perpendicular ink run at samples along an axis-aligned segment.
///
/// Each sample looks up to a couple of pixels off the line for ink, so face
/// lines sitting on the ink boundary still measure. `None` when no sample
/// hits ink.
pub fn estimate_thickness(segment: &LineSegment, orientation: Orientation, mask: &GrayImage) -> Option<f64> {
    let (px, py) = match orientation {
        Orientation::Horizontal => (0, 1),
        Orientation::Vertical => (1, 0),
        Orientation::Diagonal => return None,
    };

    let len = segment.length();
    let samples = ((len / 4.0).ceil() as usize).clamp(1, 32);
    let mut runs: Vec<i64> = Vec::with_capacity(samples);
    for k in 0..samples {
        let t = (k as f64 + 0.5) / samples as f64;
        let x = (segment.start.x + t * (segment.end.x - segment.start.x)).round() as i64;
        let y = (segment.start.y + t * (segment.end.y - segment.start.y)).round() as i64;
        let hit = (0..=INK_SEARCH)
            .flat_map(|d| if d == 0 { vec![0] } else { vec![d, -d] })
            .map(|d| (x + px * d, y + py * d))
            .find(|&(sx, sy)| is_ink(mask, sx, sy));
        if let Some((sx, sy)) = hit {
            runs.push(ink_run(mask, sx, sy, px, py));
        }
    }

    if runs.is_empty() {
        return None;
    }
    runs.sort_unstable();
    Some(runs[runs.len() / 2] as f64)
}

/// Ink pixels inside the band of `thickness` around an axis-aligned segment.
fn band_pixels(
    segment: &LineSegment,
    orientation: Orientation,
    thickness: f64,
    mask: &GrayImage,
) -> Vec<(u32, u32)> {
    let half = thickness / 2.0;
    let (x0, x1, y0, y1) = match orientation {
        Orientation::Horizontal => {
            let (a, b) = segment.axis_range(orientation);
            let c = segment.perpendicular_position(orientation);
            (a, b, c - half, c + half)
        }
        Orientation::Vertical => {
            let (a, b) = segment.axis_range(orientation);
            let c = segment.perpendicular_position(orientation);
            (c - half, c + half, a, b)
        }
        Orientation::Diagonal => return Vec::new(),
    };

    let max_x = mask.width() as f64 - 1.0;
    let max_y = mask.height() as f64 - 1.0;
    let (x0, x1) = (x0.floor().max(0.0), x1.ceil().min(max_x));
    let (y0, y1) = (y0.floor().max(0.0), y1.ceil().min(max_y));
    if x0 > x1 || y0 > y1 {
        return Vec::new();
    }

    let mut pixels = Vec::new();
    for y in y0 as u32..=y1 as u32 {
        for x in x0 as u32..=x1 as u32 {
            if mask.get_pixel(x, y).0[0] != 0 {
                pixels.push((x, y));
            }
        }
    }
    pixels
}

/// Build immutable wall records from classified segments and the ink mask.
///
/// Thickness comes from the mask; when no sample hits ink it falls back to
/// `default_thickness`.
pub fn build_walls(
    classified: &ClassifiedSegments,
    mask: &GrayImage,
    config: &PostProcessConfig,
    default_thickness: f64,
) -> Vec<WallSegment> {
    let (w, h) = mask.dimensions();
    classified
        .all
        .iter()
        .map(|seg| {
            let orientation = seg.orientation(config.orientation_tolerance);
            let wall_type = classify_wall_type(
                seg,
                config.orientation_tolerance,
                w,
                h,
                config.exterior_edge_ratio,
            );
            let thickness =
                estimate_thickness(seg, orientation, mask).unwrap_or(default_thickness);
            let pixels = band_pixels(seg, orientation, thickness, mask);
            WallSegment::new(*seg, orientation, wall_type, thickness, pixels)
        })
        .collect()
}
