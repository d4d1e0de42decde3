// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar geometry helpers for segments and polygons

use crate::types::{Intersection, LineSegment, Point2D};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

/// Calculate perpendicular distance from a point to a line segment
pub fn point_to_line_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    // Project point onto the segment, clamped to its ends
    let t = ((point.x - line_start.x) * dx + (point.y - line_start.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    let proj_x = line_start.x + t * dx;
    let proj_y = line_start.y + t * dy;

    let px = point.x - proj_x;
    let py = point.y - proj_y;
    (px * px + py * py).sqrt()
}

/// Shoelace sum; positive for counter-clockwise rings in a y-up frame.
pub fn signed_area(vertices: &[Point2D]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let n = vertices.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = &vertices[i];
        let b = &vertices[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

pub fn polygon_area(vertices: &[Point2D]) -> f64 {
    signed_area(vertices).abs()
}

/// Length of the closed ring, including the closing edge.
pub fn perimeter_length(vertices: &[Point2D]) -> f64 {
    if vertices.len() < 2 {
        return 0.0;
    }
    let n = vertices.len();
    (0..n)
        .map(|i| vertices[i].distance_to(&vertices[(i + 1) % n]))
        .sum()
}

/// Area-weighted centroid, falling back to the vertex mean for
/// degenerate rings.
pub fn centroid(vertices: &[Point2D]) -> Option<Point2D> {
    if vertices.is_empty() {
        return None;
    }
    let area = signed_area(vertices);
    if area.abs() < EPSILON {
        let n = vertices.len() as f64;
        let sx: f64 = vertices.iter().map(|p| p.x).sum();
        let sy: f64 = vertices.iter().map(|p| p.y).sum();
        return Some(Point2D::new(sx / n, sy / n));
    }

    let n = vertices.len();
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let a = &vertices[i];
        let b = &vertices[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Some(Point2D::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Ray casting point-in-polygon test. Points on the boundary may land on
/// either side.
pub fn point_in_polygon(point: &Point2D, vertices: &[Point2D]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = &vertices[i];
        let b = &vertices[j];
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn cross(o: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: &Point2D, a: &Point2D, b: &Point2D) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Whether closed segments `p1-p2` and `q1-q2` share at least one point.
pub fn segments_intersect(p1: &Point2D, p2: &Point2D, q1: &Point2D, q2: &Point2D) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }

    (d1.abs() <= EPSILON && on_segment(p1, q1, q2))
        || (d2.abs() <= EPSILON && on_segment(p2, q1, q2))
        || (d3.abs() <= EPSILON && on_segment(q1, p1, p2))
        || (d4.abs() <= EPSILON && on_segment(q2, p1, p2))
}

/// Index pairs of non-adjacent ring edges that cross each other.
///
/// Edge `i` runs from vertex `i` to vertex `i + 1` (wrapping).
pub fn self_intersections(vertices: &[Point2D]) -> Vec<(usize, usize)> {
    let n = vertices.len();
    let mut pairs = Vec::new();
    if n < 4 {
        return pairs;
    }
    for i in 0..n {
        let a1 = &vertices[i];
        let a2 = &vertices[(i + 1) % n];
        for j in (i + 2)..n {
            // first and last edges share vertex 0
            if i == 0 && j == n - 1 {
                continue;
            }
            let b1 = &vertices[j];
            let b2 = &vertices[(j + 1) % n];
            if segments_intersect(a1, a2, b1, b2) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Intersection point of the infinite lines through two segments, `None`
/// when they are parallel.
pub fn line_intersection(a: &LineSegment, b: &LineSegment) -> Option<Point2D> {
    let (x1, y1, x2, y2) = (a.start.x, a.start.y, a.end.x, a.end.y);
    let (x3, y3, x4, y4) = (b.start.x, b.start.y, b.end.x, b.end.y);
    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    Some(Point2D::new(x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
}

/// Pairwise crossings of line segments.
///
/// Lines are extended by `extension` pixels at both ends before testing,
/// so nearly-touching corners still produce a crossing.
pub fn find_intersections(lines: &[LineSegment], extension: f64) -> Vec<Intersection> {
    let extended: Vec<(Point2D, Point2D)> = lines
        .iter()
        .map(|line| {
            let (tx, ty) = line.direction();
            (
                Point2D::new(line.start.x - tx * extension, line.start.y - ty * extension),
                Point2D::new(line.end.x + tx * extension, line.end.y + ty * extension),
            )
        })
        .collect();

    let mut result = Vec::new();
    for i in 0..lines.len() {
        for j in (i + 1)..lines.len() {
            let (a1, a2) = &extended[i];
            let (b1, b2) = &extended[j];
            if !segments_intersect(a1, a2, b1, b2) {
                continue;
            }
            if let Some(point) = line_intersection(&lines[i], &lines[j]) {
                result.push(Intersection {
                    point,
                    first: i,
                    second: j,
                });
            }
        }
    }
    result
}

/// Move `point` to the nearest target within `max_distance`, or leave it.
pub fn snap_point(point: &Point2D, targets: &[Point2D], max_distance: f64) -> Point2D {
    targets
        .iter()
        .map(|t| (t, point.distance_to(t)))
        .filter(|(_, d)| *d <= max_distance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(t, _)| *t)
        .unwrap_or(*point)
}

/// Simplify a polyline with the Douglas-Peucker algorithm.
pub fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = &points[0];
    let last = &points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let mut result = douglas_peucker(&points[..=max_idx], epsilon);
        let right = douglas_peucker(&points[max_idx..], epsilon);
        result.extend_from_slice(&right[1..]);
        result
    } else {
        vec![*first, *last]
    }
}

/// Distance from a point to the infinite line through two points
pub fn perpendicular_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs() / length_sq.sqrt()
}

/// Summary measurements of a closed polygon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PolygonMetrics {
    pub area: f64,
    pub perimeter: f64,
    pub centroid: Point2D,
    pub vertex_count: usize,
    /// `4 * PI * area / perimeter^2`, 1.0 for a circle
    pub compactness: f64,
    pub is_clockwise: bool,
    pub self_intersecting: bool,
}

impl PolygonMetrics {
    pub fn compute(vertices: &[Point2D]) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let signed = signed_area(vertices);
        let area = signed.abs();
        let perimeter = perimeter_length(vertices);
        let compactness = if perimeter > EPSILON {
            4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
        } else {
            0.0
        };
        Some(Self {
            area,
            perimeter,
            centroid: centroid(vertices)?,
            vertex_count: vertices.len(),
            compactness,
            // Image rows grow downward, so a positive shoelace sum is clockwise on screen.
            is_clockwise: signed > 0.0,
            self_intersecting: !self_intersections(vertices).is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(size: f64) -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(size, 0.0),
            Point2D::new(size, size),
            Point2D::new(0.0, size),
        ]
    }

    #[test]
    fn test_point_to_line_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(10.0, 0.0);
        assert_abs_diff_eq!(point_to_line_distance(&Point2D::new(5.0, 3.0), &a, &b), 3.0);
        assert_abs_diff_eq!(point_to_line_distance(&Point2D::new(13.0, 4.0), &a, &b), 5.0);
        assert_abs_diff_eq!(perpendicular_distance(&Point2D::new(13.0, 4.0), &a, &b), 4.0);
    }

    #[test]
    fn test_area_perimeter_centroid() {
        let sq = square(10.0);
        assert_abs_diff_eq!(polygon_area(&sq), 100.0);
        assert_abs_diff_eq!(perimeter_length(&sq), 40.0);
        let c = centroid(&sq).unwrap();
        assert_abs_diff_eq!(c.x, 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y, 5.0, epsilon = 1e-9);
    }

    fn pentagon() -> Vec<Point2D> {
        (0..5)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / 5.0 + 0.3;
                Point2D::new(50.0 + 20.0 * a.cos(), 40.0 + 20.0 * a.sin())
            })
            .collect()
    }

    fn l_shape() -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(60.0, 0.0),
            Point2D::new(60.0, 20.0),
            Point2D::new(25.0, 20.0),
            Point2D::new(25.0, 45.0),
            Point2D::new(0.0, 45.0),
        ]
    }

    #[test]
    fn test_area_scales_with_square_of_factor() {
        for polygon in [square(10.0), pentagon(), l_shape()] {
            let base = polygon_area(&polygon);
            for k in [0.5, 2.0, 3.7] {
                let scaled: Vec<Point2D> =
                    polygon.iter().map(|p| Point2D::new(p.x * k, p.y * k)).collect();
                assert_abs_diff_eq!(polygon_area(&scaled), base * k * k, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_area_ignores_start_vertex_and_winding() {
        for polygon in [pentagon(), l_shape()] {
            let base = polygon_area(&polygon);
            for shift in 1..polygon.len() {
                let mut rotated = polygon.clone();
                rotated.rotate_left(shift);
                assert_abs_diff_eq!(polygon_area(&rotated), base, epsilon = 1e-9);
            }
            let mut reversed = polygon.clone();
            reversed.reverse();
            assert_abs_diff_eq!(polygon_area(&reversed), base, epsilon = 1e-9);
            assert_abs_diff_eq!(signed_area(&reversed), -signed_area(&polygon), epsilon = 1e-9);
        }
        assert_abs_diff_eq!(polygon_area(&l_shape()), 60.0 * 20.0 + 25.0 * 25.0);
    }

    #[test]
    fn test_regular_pentagon_area() {
        // (5/2) r^2 sin(72°)
        let expected = 2.5 * 400.0 * 72f64.to_radians().sin();
        assert_abs_diff_eq!(polygon_area(&pentagon()), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_convex_centroid_is_inside() {
        let kite = vec![
            Point2D::new(10.0, 0.0),
            Point2D::new(40.0, 12.0),
            Point2D::new(10.0, 60.0),
            Point2D::new(0.0, 12.0),
        ];
        for polygon in [square(7.0), pentagon(), kite] {
            let c = centroid(&polygon).unwrap();
            assert!(point_in_polygon(&c, &polygon), "{c:?}");
            let mut reversed = polygon.clone();
            reversed.reverse();
            let cr = centroid(&reversed).unwrap();
            assert_abs_diff_eq!(c.x, cr.x, epsilon = 1e-9);
            assert_abs_diff_eq!(c.y, cr.y, epsilon = 1e-9);
        }
        let c = centroid(&pentagon()).unwrap();
        assert_abs_diff_eq!(c.x, 50.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.y, 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_point_in_polygon() {
        let sq = square(10.0);
        assert!(point_in_polygon(&Point2D::new(5.0, 5.0), &sq));
        assert!(!point_in_polygon(&Point2D::new(15.0, 5.0), &sq));
    }

    #[test]
    fn test_self_intersections() {
        assert!(self_intersections(&square(10.0)).is_empty());
        let bowtie = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 10.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(0.0, 10.0),
        ];
        assert_eq!(self_intersections(&bowtie), vec![(0, 2)]);
    }

    #[test]
    fn test_find_intersections_with_extension() {
        let h = LineSegment::new(0.0, 50.0, 100.0, 50.0);
        let v = LineSegment::new(103.0, 0.0, 103.0, 100.0);
        assert!(find_intersections(&[h, v], 0.0).is_empty());

        let found = find_intersections(&[h, v], 5.0);
        assert_eq!(found.len(), 1);
        assert_abs_diff_eq!(found[0].point.x, 103.0, epsilon = 1e-9);
        assert_abs_diff_eq!(found[0].point.y, 50.0, epsilon = 1e-9);
        assert_eq!((found[0].first, found[0].second), (0, 1));
    }

    #[test]
    fn test_snap_point() {
        let targets = [Point2D::new(10.0, 10.0), Point2D::new(20.0, 20.0)];
        let snapped = snap_point(&Point2D::new(11.0, 9.0), &targets, 3.0);
        assert_eq!(snapped, Point2D::new(10.0, 10.0));
        let kept = snap_point(&Point2D::new(15.0, 15.0), &targets, 3.0);
        assert_eq!(kept, Point2D::new(15.0, 15.0));
    }

    #[test]
    fn test_douglas_peucker_drops_collinear() {
        let pts = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(5.0, 0.1),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ];
        let simplified = douglas_peucker(&pts, 1.0);
        assert_eq!(simplified.len(), 3);
    }

    #[test]
    fn test_polygon_metrics() {
        let m = PolygonMetrics::compute(&square(10.0)).unwrap();
        assert_abs_diff_eq!(m.area, 100.0);
        assert_eq!(m.vertex_count, 4);
        assert_abs_diff_eq!(m.compactness, std::f64::consts::PI / 4.0, epsilon = 1e-9);
        assert!(m.is_clockwise);
        assert!(!m.self_intersecting);
        assert!(PolygonMetrics::compute(&square(10.0)[..2]).is_none());
    }
}
