// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room rectangles anchored on OCR dimension labels.
//!
//! Two strategies are exposed. Flood fill grows the open space around the
//! label and snaps the result to the surrounding wall faces. Wall-pair
//! search picks one wall per side from the detected walls. Callers usually
//! go through [`refine_room_box`], which chains them.

use crate::config::RoomBoxConfig;
use crate::image_ops::is_ink;
use crate::types::{LabelBox, Orientation, RoomBox, WallSegment};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rows or columns sampled per side when snapping to walls
const SNAP_SAMPLES: usize = 15;

/// Strategy that produced a room box
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomBoxMethod {
    FloodFill,
    WallPair,
}

/// Inclusive pixel bounds of a filled region
#[derive(Debug, Clone, Copy)]
struct PixelBounds {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

/// Label rectangle in whole pixels, clamped to the image.
fn label_pixels(label: &LabelBox, width: u32, height: u32) -> (i64, i64, i64, i64) {
    let x0 = label.x.floor().max(0.0) as i64;
    let y0 = label.y.floor().max(0.0) as i64;
    let x1 = ((label.x + label.width).ceil() as i64).min(width as i64) - 1;
    let y1 = ((label.y + label.height).ceil() as i64).min(height as i64) - 1;
    (x0, y0, x1, y1)
}

/// BFS over open space from the label centroid. The label rectangle itself
/// counts as open so its text ink does not block the seed.
fn fill_open_space(mask: &GrayImage, label: &LabelBox, max_pixels: usize) -> Option<PixelBounds> {
    let (w, h) = (mask.width() as i64, mask.height() as i64);
    if w == 0 || h == 0 {
        return None;
    }
    let (lx0, ly0, lx1, ly1) = label_pixels(label, mask.width(), mask.height());
    let in_label = |x: i64, y: i64| x >= lx0 && x <= lx1 && y >= ly0 && y <= ly1;
    let open = |x: i64, y: i64| {
        x >= 0 && y >= 0 && x < w && y < h && (in_label(x, y) || !is_ink(mask, x, y))
    };

    let c = label.centroid();
    let sx = (c.x.floor() as i64).clamp(0, w - 1);
    let sy = (c.y.floor() as i64).clamp(0, h - 1);
    if !open(sx, sy) {
        return None;
    }

    let mut visited = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();
    visited[(sy * w + sx) as usize] = true;
    queue.push_back((sx, sy));
    let mut bounds = PixelBounds {
        min_x: sx,
        min_y: sy,
        max_x: sx,
        max_y: sy,
    };
    let mut count = 0usize;

    while let Some((x, y)) = queue.pop_front() {
        count += 1;
        if count > max_pixels {
            tracing::debug!(count, "Room flood fill leaked past its cap");
            return None;
        }
        bounds.min_x = bounds.min_x.min(x);
        bounds.min_y = bounds.min_y.min(y);
        bounds.max_x = bounds.max_x.max(x);
        bounds.max_y = bounds.max_y.max(y);

        for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let nx = x + dx;
            let ny = y + dy;
            if !open(nx, ny) {
                continue;
            }
            let idx = (ny * w + nx) as usize;
            if !visited[idx] {
                visited[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    Some(bounds)
}

/// Evenly spaced sample positions over `[lo, hi]`.
fn sample_positions(lo: i64, hi: i64) -> Vec<i64> {
    if hi <= lo {
        return vec![lo];
    }
    let n = SNAP_SAMPLES.min((hi - lo + 1) as usize);
    (0..n)
        .map(|k| lo + ((hi - lo) as f64 * (k as f64 + 0.5) / n as f64).floor() as i64)
        .collect()
}

fn median(mut values: Vec<i64>) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
}

/// Move one side outward to the nearest wall face.
///
/// `start` is the first coordinate outside the current box; the scan steps
/// by `step` and stops at ink. Returns the coordinate of the first ink
/// pixel per sample, medianed, or `None` when no sample hits ink within
/// `max_distance`.
fn snap_side(
    mask: &GrayImage,
    samples: &[i64],
    start: i64,
    step: i64,
    horizontal_scan: bool,
    max_distance: u32,
) -> Option<i64> {
    let hits: Vec<i64> = samples
        .iter()
        .filter_map(|&s| {
            (0..=max_distance as i64).find_map(|d| {
                let p = start + step * d;
                let ink = if horizontal_scan {
                    is_ink(mask, p, s)
                } else {
                    is_ink(mask, s, p)
                };
                ink.then_some(p)
            })
        })
        .collect();
    median(hits)
}

/// Strategy A: flood fill the open space around the label, then snap each
/// side of the filled region's bounding box to the nearest wall face.
///
/// Returns `None` when the fill leaks beyond `max_fill_ratio` of the image
/// or the result is smaller than `min_room_size`.
pub fn flood_fill_room_box(
    mask: &GrayImage,
    label: &LabelBox,
    config: &RoomBoxConfig,
) -> Option<RoomBox> {
    let area = mask.width() as f64 * mask.height() as f64;
    let cap = (area * config.max_fill_ratio).floor() as usize;
    let b = fill_open_space(mask, label, cap)?;

    let rows = sample_positions(b.min_y, b.max_y);
    let cols = sample_positions(b.min_x, b.max_x);
    let max_d = config.max_snap_distance;

    // Box edges sit on pixel boundaries: x1 is the first open column,
    // x2 one past the last.
    let x1 = snap_side(mask, &rows, b.min_x - 1, -1, true, max_d).map_or(b.min_x, |ink| ink + 1);
    let x2 = snap_side(mask, &rows, b.max_x + 1, 1, true, max_d).unwrap_or(b.max_x + 1);
    let y1 = snap_side(mask, &cols, b.min_y - 1, -1, false, max_d).map_or(b.min_y, |ink| ink + 1);
    let y2 = snap_side(mask, &cols, b.max_y + 1, 1, false, max_d).unwrap_or(b.max_y + 1);

    let room = RoomBox::new(x1 as f64, y1 as f64, x2 as f64, y2 as f64)?;
    if room.width() < config.min_room_size || room.height() < config.min_room_size {
        return None;
    }
    Some(room)
}

/// Wall candidate for one side: inner face coordinate and distance from
/// the label.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    face: f64,
    distance: f64,
}

fn overlaps(range: (f64, f64), lo: f64, hi: f64) -> bool {
    range.0 <= hi && range.1 >= lo
}

fn nearest(mut candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates.truncate(n);
    candidates
}

/// Strategy B: pick one wall per side so the inner rectangle contains the
/// label, meets the minimum size and aspect limits, and has the largest
/// area. Only the nearest `candidates_per_side` walls on each side are
/// considered.
pub fn wall_pair_room_box(
    walls: &[WallSegment],
    label: &LabelBox,
    config: &RoomBoxConfig,
) -> Option<RoomBox> {
    let (lx0, ly0) = (label.x, label.y);
    let (lx1, ly1) = (label.x + label.width, label.y + label.height);

    let mut top = Vec::new();
    let mut bottom = Vec::new();
    let mut left = Vec::new();
    let mut right = Vec::new();

    for wall in walls {
        let half = wall.thickness() / 2.0;
        match wall.orientation() {
            Orientation::Horizontal => {
                if !overlaps(wall.line().axis_range(Orientation::Horizontal), lx0, lx1) {
                    continue;
                }
                let y = wall.line().perpendicular_position(Orientation::Horizontal);
                if y <= ly0 {
                    top.push(Candidate {
                        face: y + half,
                        distance: ly0 - y,
                    });
                } else if y >= ly1 {
                    bottom.push(Candidate {
                        face: y - half,
                        distance: y - ly1,
                    });
                }
            }
            Orientation::Vertical => {
                if !overlaps(wall.line().axis_range(Orientation::Vertical), ly0, ly1) {
                    continue;
                }
                let x = wall.line().perpendicular_position(Orientation::Vertical);
                if x <= lx0 {
                    left.push(Candidate {
                        face: x + half,
                        distance: lx0 - x,
                    });
                } else if x >= lx1 {
                    right.push(Candidate {
                        face: x - half,
                        distance: x - lx1,
                    });
                }
            }
            Orientation::Diagonal => {}
        }
    }

    let n = config.candidates_per_side;
    let (top, bottom) = (nearest(top, n), nearest(bottom, n));
    let (left, right) = (nearest(left, n), nearest(right, n));

    let mut best: Option<RoomBox> = None;
    for t in &top {
        for b in &bottom {
            for l in &left {
                for r in &right {
                    let Some(room) = RoomBox::new(l.face, t.face, r.face, b.face) else {
                        continue;
                    };
                    let (w, h) = (room.width(), room.height());
                    if !room.contains_label(label)
                        || w < config.min_room_size
                        || h < config.min_room_size
                        || w.max(h) / w.min(h) > config.max_aspect_ratio
                    {
                        continue;
                    }
                    if best.map_or(true, |current| room.area() > current.area()) {
                        best = Some(room);
                    }
                }
            }
        }
    }
    best
}

/// Flood fill first, wall-pair search second.
pub fn refine_room_box(
    mask: Option<&GrayImage>,
    walls: &[WallSegment],
    label: &LabelBox,
    config: &RoomBoxConfig,
) -> Option<(RoomBox, RoomBoxMethod)> {
    if let Some(room) = mask.and_then(|m| flood_fill_room_box(m, label, config)) {
        return Some((room, RoomBoxMethod::FloodFill));
    }
    tracing::debug!("Flood fill found no room, trying wall pairs");
    wall_pair_room_box(walls, label, config).map(|room| (room, RoomBoxMethod::WallPair))
}
