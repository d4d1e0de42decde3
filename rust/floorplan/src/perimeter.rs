// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exterior perimeter construction.
//!
//! The primary strategy traces the inner faces of the extreme exterior
//! walls. When it cannot find four sides the caller falls through the
//! configured strategy list: mask contour, line bounding box, and finally
//! an inset image rectangle.

use crate::config::PerimeterConfig;
use crate::geometry::{douglas_peucker, perpendicular_distance, polygon_area};
use crate::image_ops::morphological_close;
use crate::types::{LineSegment, Orientation, Perimeter, PerimeterStrategy, Point2D, WallSegment};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

/// Everything the perimeter strategies may draw on.
#[derive(Debug, Clone, Copy)]
pub struct PerimeterInput<'a> {
    /// Exterior walls for the wall-based strategy
    pub walls: &'a [WallSegment],
    /// All post-processed segments for the line-based strategy
    pub segments: &'a [LineSegment],
    /// Binary ink mask for the contour strategy
    pub mask: &'a GrayImage,
    pub image_width: u32,
    pub image_height: u32,
}

/// One side of the outline: its inner-face coordinate and the walls on it.
struct Side<'a> {
    face: f64,
    walls: Vec<&'a WallSegment>,
}

fn collect_side<'a>(
    walls: &[&'a WallSegment],
    orientation: Orientation,
    extreme: &'a WallSegment,
    inward: f64,
    tolerance: f64,
) -> Side<'a> {
    let position = extreme.line().perpendicular_position(orientation);
    let members: Vec<&WallSegment> = walls
        .iter()
        .copied()
        .filter(|w| (w.line().perpendicular_position(orientation) - position).abs() <= tolerance)
        .collect();
    Side {
        face: position + inward * extreme.thickness() / 2.0,
        walls: members,
    }
}

fn extreme_by<'a>(
    walls: &[&'a WallSegment],
    orientation: Orientation,
    max: bool,
) -> Option<&'a WallSegment> {
    let key = |w: &&WallSegment| w.line().perpendicular_position(orientation);
    if max {
        walls.iter().copied().max_by(|a, b| key(a).total_cmp(&key(b)))
    } else {
        walls.iter().copied().min_by(|a, b| key(a).total_cmp(&key(b)))
    }
}

/// Trace the inner faces of the extreme exterior walls into a closed outline.
///
/// Returns `None` when any of the four extreme walls is missing, when the
/// inner faces do not enclose a positive area, or when fewer than three
/// vertices survive simplification.
pub fn build_perimeter(walls: &[WallSegment], config: &PerimeterConfig) -> Option<Perimeter> {
    let horizontal: Vec<&WallSegment> = walls.iter().filter(|w| w.is_horizontal()).collect();
    let vertical: Vec<&WallSegment> = walls.iter().filter(|w| w.is_vertical()).collect();

    let top_wall = extreme_by(&horizontal, Orientation::Horizontal, false)?;
    let bottom_wall = extreme_by(&horizontal, Orientation::Horizontal, true)?;
    let left_wall = extreme_by(&vertical, Orientation::Vertical, false)?;
    let right_wall = extreme_by(&vertical, Orientation::Vertical, true)?;
    if std::ptr::eq(top_wall, bottom_wall) || std::ptr::eq(left_wall, right_wall) {
        return None;
    }

    let tol = config.side_tolerance;
    let top = collect_side(&horizontal, Orientation::Horizontal, top_wall, 1.0, tol);
    let bottom = collect_side(&horizontal, Orientation::Horizontal, bottom_wall, -1.0, tol);
    let left = collect_side(&vertical, Orientation::Vertical, left_wall, 1.0, tol);
    let right = collect_side(&vertical, Orientation::Vertical, right_wall, -1.0, tol);

    if top.face >= bottom.face || left.face >= right.face {
        tracing::debug!("Extreme wall faces do not enclose an area");
        return None;
    }

    let (x0, x1, y0, y1) = (left.face, right.face, top.face, bottom.face);
    let mut ring = Vec::new();

    // Clockwise from top-left (image y grows downward).
    ring.push(Point2D::new(x0, y0));
    for (a, b) in side_spans(&top.walls, Orientation::Horizontal, false) {
        ring.push(Point2D::new(a.clamp(x0, x1), y0));
        ring.push(Point2D::new(b.clamp(x0, x1), y0));
    }
    ring.push(Point2D::new(x1, y0));
    for (a, b) in side_spans(&right.walls, Orientation::Vertical, false) {
        ring.push(Point2D::new(x1, a.clamp(y0, y1)));
        ring.push(Point2D::new(x1, b.clamp(y0, y1)));
    }
    ring.push(Point2D::new(x1, y1));
    for (a, b) in side_spans(&bottom.walls, Orientation::Horizontal, true) {
        ring.push(Point2D::new(a.clamp(x0, x1), y1));
        ring.push(Point2D::new(b.clamp(x0, x1), y1));
    }
    ring.push(Point2D::new(x0, y1));
    for (a, b) in side_spans(&left.walls, Orientation::Vertical, true) {
        ring.push(Point2D::new(x0, a.clamp(y0, y1)));
        ring.push(Point2D::new(x0, b.clamp(y0, y1)));
    }

    let simplified = simplify_ring(
        &ring,
        config.min_vertex_distance,
        config.collinear_tolerance,
    );
    Perimeter::new(simplified)
}

/// Axis ranges of the walls on one side in walking order.
fn side_spans(walls: &[&WallSegment], orientation: Orientation, reverse: bool) -> Vec<(f64, f64)> {
    let mut spans: Vec<(f64, f64)> = walls
        .iter()
        .map(|w| w.line().axis_range(orientation))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    if reverse {
        spans.reverse();
        for span in &mut spans {
            *span = (span.1, span.0);
        }
    }
    spans
}

/// Drop vertices too close to their successor, then vertices lying on the
/// line through their neighbours. Both passes wrap around the ring.
pub fn simplify_ring(ring: &[Point2D], min_distance: f64, collinear_tolerance: f64) -> Vec<Point2D> {
    let mut points: Vec<Point2D> = Vec::with_capacity(ring.len());
    for p in ring {
        if points
            .last()
            .map_or(true, |last: &Point2D| last.distance_to(p) >= min_distance)
        {
            points.push(*p);
        }
    }
    while points.len() > 1 {
        let first = points[0];
        match points.last() {
            Some(last) if last.distance_to(&first) < min_distance => {
                points.pop();
            }
            _ => break,
        }
    }

    loop {
        let n = points.len();
        if n < 3 {
            break;
        }
        let removable = (0..n).find(|&i| {
            let prev = &points[(i + n - 1) % n];
            let next = &points[(i + 1) % n];
            perpendicular_distance(&points[i], prev, next) < collinear_tolerance
        });
        match removable {
            Some(i) => {
                points.remove(i);
            }
            None => break,
        }
    }
    points
}

/// Largest outer contour of the closed ink mask, simplified.
pub fn contour_perimeter(mask: &GrayImage, config: &PerimeterConfig) -> Option<Perimeter> {
    let closed = if config.contour_closing_radius > 0 {
        morphological_close(mask, config.contour_closing_radius)
    } else {
        mask.clone()
    };

    let contours = find_contours::<u32>(&closed);
    let best = contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.points.len() >= 3)
        .map(|c| {
            let mut ring: Vec<Point2D> = c
                .points
                .iter()
                .map(|p| Point2D::new(p.x as f64, p.y as f64))
                .collect();
            ring.push(ring[0]);
            let mut simplified = douglas_peucker(&ring, config.contour_epsilon);
            simplified.pop();
            simplified
        })
        .filter(|ring| ring.len() >= 3)
        .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))?;

    Perimeter::new(best)
}

/// Bounding rectangle of all segments. Needs at least one horizontal and one
/// vertical segment.
pub fn line_bounds_perimeter(segments: &[LineSegment], orientation_tolerance: f64) -> Option<Perimeter> {
    let has_h = segments
        .iter()
        .any(|s| s.orientation(orientation_tolerance) == Orientation::Horizontal);
    let has_v = segments
        .iter()
        .any(|s| s.orientation(orientation_tolerance) == Orientation::Vertical);
    if !has_h || !has_v {
        return None;
    }

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in segments.iter().flat_map(|s| [s.start, s.end]) {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if max_x <= min_x || max_y <= min_y {
        return None;
    }
    rectangle(min_x, min_y, max_x, max_y)
}

/// Image rectangle inset by `margin_ratio` of each dimension.
pub fn default_rectangle(width: u32, height: u32, margin_ratio: f64) -> Option<Perimeter> {
    let w = width as f64;
    let h = height as f64;
    let mx = w * margin_ratio;
    let my = h * margin_ratio;
    if w - mx <= mx || h - my <= my {
        return None;
    }
    rectangle(mx, my, w - mx, h - my)
}

fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<Perimeter> {
    Perimeter::new(vec![
        Point2D::new(x0, y0),
        Point2D::new(x1, y0),
        Point2D::new(x1, y1),
        Point2D::new(x0, y1),
    ])
}

/// Run a single strategy.
pub fn run_strategy(
    strategy: PerimeterStrategy,
    input: &PerimeterInput<'_>,
    config: &PerimeterConfig,
    orientation_tolerance: f64,
) -> Option<Perimeter> {
    match strategy {
        PerimeterStrategy::WallBased => build_perimeter(input.walls, config),
        PerimeterStrategy::MorphologicalContour => contour_perimeter(input.mask, config),
        PerimeterStrategy::LineBased => line_bounds_perimeter(input.segments, orientation_tolerance),
        PerimeterStrategy::DefaultRectangle => default_rectangle(
            input.image_width,
            input.image_height,
            config.default_margin_ratio,
        ),
    }
}

/// Try each configured strategy in order and accept the first outline with
/// at least three vertices and a non-zero area.
pub fn build_perimeter_with_fallback(
    input: &PerimeterInput<'_>,
    config: &PerimeterConfig,
    orientation_tolerance: f64,
) -> Option<(Perimeter, PerimeterStrategy)> {
    for &strategy in &config.strategies {
        match run_strategy(strategy, input, config, orientation_tolerance) {
            Some(perimeter) if perimeter.area() > 0.0 => {
                tracing::debug!(
                    ?strategy,
                    vertices = perimeter.vertices().len(),
                    self_intersecting = perimeter.is_self_intersecting(),
                    "Perimeter built"
                );
                return Some((perimeter, strategy));
            }
            _ => {
                tracing::warn!(?strategy, "Perimeter strategy failed, trying next");
            }
        }
    }
    None
}
