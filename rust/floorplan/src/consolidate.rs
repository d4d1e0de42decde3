// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment consolidation: collinear merging and gap bridging.
//!
//! Doors and windows interrupt wall ink. Both passes here reconnect the
//! pieces so the perimeter builder can find continuous sides. Each pass is
//! idempotent and independent of input order.

use crate::config::ConsolidateConfig;
use crate::geometry::point_to_line_distance;
use crate::image_ops::separable_close;
use crate::types::{line_angle_difference, LineSegment, Orientation, Point2D};
use image::GrayImage;

/// Minimal union-find over segment indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        // Smaller index becomes the root so grouping is order-stable.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        true
    }

    fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            let r = self.find(i);
            by_root[r].push(i);
        }
        by_root.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

/// Distance from a point to the infinite line through a segment.
fn distance_to_infinite_line(point: &Point2D, line: &LineSegment) -> f64 {
    let (tx, ty) = line.direction();
    let dx = point.x - line.start.x;
    let dy = point.y - line.start.y;
    (dx * ty - dy * tx).abs()
}

/// Whether two segments lie on one line with at most `max_gap` between them.
pub fn are_mergeable(
    a: &LineSegment,
    b: &LineSegment,
    angle_tolerance: f64,
    max_distance: f64,
    max_gap: f64,
) -> bool {
    if line_angle_difference(a.angle(), b.angle()) > angle_tolerance {
        return false;
    }

    let perpendicular_ok = [b.start, b.end]
        .iter()
        .all(|p| distance_to_infinite_line(p, a) <= max_distance)
        && [a.start, a.end]
            .iter()
            .all(|p| distance_to_infinite_line(p, b) <= max_distance);
    if !perpendicular_ok {
        return false;
    }

    let (tx, ty) = a.direction();
    let proj = |p: &Point2D| p.x * tx + p.y * ty;
    let (a0, a1) = min_max(proj(&a.start), proj(&a.end));
    let (b0, b1) = min_max(proj(&b.start), proj(&b.end));
    let gap = (b0 - a1).max(a0 - b1).max(0.0);
    gap <= max_gap
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Merge a group of collinear segments into one spanning the extremes.
///
/// The direction comes from the longest member, the offset is the
/// length-weighted mean of the members, and the score is the plain mean.
pub fn merge_group(group: &[LineSegment]) -> LineSegment {
    if group.len() == 1 {
        return group[0].canonical();
    }

    let reference = group
        .iter()
        .copied()
        .max_by(|a, b| {
            a.length()
                .total_cmp(&b.length())
                .then_with(|| b.start.x.total_cmp(&a.start.x))
                .then_with(|| b.start.y.total_cmp(&a.start.y))
        })
        .unwrap_or(group[0])
        .canonical();
    let (tx, ty) = reference.direction();
    let (nx, ny) = (-ty, tx);

    let mut smin = f64::INFINITY;
    let mut smax = f64::NEG_INFINITY;
    let mut offset_sum = 0.0;
    let mut weight_sum = 0.0;
    for seg in group {
        for p in [seg.start, seg.end] {
            let s = p.x * tx + p.y * ty;
            smin = smin.min(s);
            smax = smax.max(s);
        }
        let mid = seg.midpoint();
        let weight = seg.length().max(1e-9);
        offset_sum += (mid.x * nx + mid.y * ny) * weight;
        weight_sum += weight;
    }
    let offset = offset_sum / weight_sum;
    let score = group.iter().map(|s| s.score).sum::<f32>() / group.len() as f32;

    let start = Point2D::new(smin * tx + offset * nx, smin * ty + offset * ny);
    let end = Point2D::new(smax * tx + offset * nx, smax * ty + offset * ny);
    LineSegment::from_points(start, end, score).canonical()
}

fn sort_segments(segments: &mut [LineSegment]) {
    segments.sort_by(|a, b| {
        a.start
            .y
            .total_cmp(&b.start.y)
            .then_with(|| a.start.x.total_cmp(&b.start.x))
            .then_with(|| a.end.y.total_cmp(&b.end.y))
            .then_with(|| a.end.x.total_cmp(&b.end.x))
    });
}

/// Merge collinear segments until no mergeable pair remains.
///
/// Pairs are grouped transitively each round, so the result does not
/// depend on input order. Output is sorted by start point.
pub fn merge_collinear(segments: &[LineSegment], config: &ConsolidateConfig) -> Vec<LineSegment> {
    let mut current: Vec<LineSegment> = segments
        .iter()
        .filter(|s| !s.is_degenerate())
        .map(|s| s.canonical())
        .collect();
    sort_segments(&mut current);

    loop {
        let n = current.len();
        let mut sets = DisjointSet::new(n);
        let mut merged_any = false;
        for i in 0..n {
            for j in (i + 1)..n {
                if are_mergeable(
                    &current[i],
                    &current[j],
                    config.merge_angle_tolerance,
                    config.merge_max_distance,
                    config.merge_max_gap,
                ) && sets.union(i, j)
                {
                    merged_any = true;
                }
            }
        }
        if !merged_any {
            break;
        }

        let mut next: Vec<LineSegment> = sets
            .groups()
            .iter()
            .map(|g| {
                let members: Vec<LineSegment> = g.iter().map(|&i| current[i]).collect();
                merge_group(&members)
            })
            .collect();
        sort_segments(&mut next);
        current = next;
    }

    tracing::debug!(input = segments.len(), output = current.len(), "Merged collinear segments");
    current
}

/// Bridge openings between aligned horizontal or vertical segments.
///
/// Within each orientation, segments whose perpendicular positions agree
/// within `gap_alignment_tolerance` and whose along-axis gap is at most
/// `max_gap_length` form a chain. Every chain is replaced by one segment
/// spanning it. Diagonal segments pass through unchanged.
pub fn fill_gaps(segments: &[LineSegment], config: &ConsolidateConfig) -> Vec<LineSegment> {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    let mut output = Vec::new();
    for seg in segments.iter().filter(|s| !s.is_degenerate()) {
        match seg.orientation(config.orientation_tolerance) {
            Orientation::Horizontal => horizontal.push(*seg),
            Orientation::Vertical => vertical.push(*seg),
            Orientation::Diagonal => output.push(seg.canonical()),
        }
    }

    output.extend(chain_axis(&horizontal, Orientation::Horizontal, config));
    output.extend(chain_axis(&vertical, Orientation::Vertical, config));
    sort_segments(&mut output);

    tracing::debug!(input = segments.len(), output = output.len(), "Bridged wall gaps");
    output
}

fn chain_axis(
    segments: &[LineSegment],
    orientation: Orientation,
    config: &ConsolidateConfig,
) -> Vec<LineSegment> {
    let n = segments.len();
    let mut sets = DisjointSet::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let a = &segments[i];
            let b = &segments[j];
            let offset =
                (a.perpendicular_position(orientation) - b.perpendicular_position(orientation)).abs();
            if offset > config.gap_alignment_tolerance {
                continue;
            }
            let (a0, a1) = a.axis_range(orientation);
            let (b0, b1) = b.axis_range(orientation);
            let gap = (b0 - a1).max(a0 - b1).max(0.0);
            if gap <= config.max_gap_length {
                sets.union(i, j);
            }
        }
    }

    sets.groups()
        .iter()
        .map(|group| {
            let chain: Vec<&LineSegment> = group.iter().map(|&i| &segments[i]).collect();
            bridge_chain(&chain, orientation)
        })
        .collect()
}

fn bridge_chain(chain: &[&LineSegment], orientation: Orientation) -> LineSegment {
    if let [single] = chain {
        return single.canonical();
    }

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut position_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut score_sum = 0.0;
    let mut covered = 0.0;
    for seg in chain.iter().copied() {
        let (a, b) = seg.axis_range(orientation);
        lo = lo.min(a);
        hi = hi.max(b);
        let weight = seg.length().max(1e-9);
        position_sum += seg.perpendicular_position(orientation) * weight;
        weight_sum += weight;
        score_sum += seg.score as f64 * weight;
        covered += weight;
    }
    let position = position_sum / weight_sum;
    // Bridged spans carry no evidence, so the score is diluted by them.
    let span = (hi - lo).max(1e-9);
    let score = (score_sum / span.max(covered)) as f32;

    match orientation {
        Orientation::Horizontal => {
            LineSegment::from_points(Point2D::new(lo, position), Point2D::new(hi, position), score)
        }
        _ => LineSegment::from_points(Point2D::new(position, lo), Point2D::new(position, hi), score),
    }
}

/// Pixel-level bridging: separable closing along rows then columns.
///
/// Used when openings are too dense or irregular for segment chaining.
pub fn bridge_gaps_morphological(mask: &GrayImage, config: &ConsolidateConfig) -> GrayImage {
    separable_close(mask, config.bridge_kernel)
}

/// Whether any endpoint of `segment` lies within `tolerance` of `other`.
pub fn touches(segment: &LineSegment, other: &LineSegment, tolerance: f64) -> bool {
    [segment.start, segment.end]
        .iter()
        .any(|p| point_to_line_distance(p, &other.start, &other.end) <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config() -> ConsolidateConfig {
        ConsolidateConfig::default()
    }

    #[test]
    fn test_touching_segments_merge_to_sum_of_lengths() {
        let a = LineSegment::new(0.0, 10.0, 40.0, 10.0).with_score(0.8);
        let b = LineSegment::new(40.0, 10.0, 100.0, 10.0).with_score(0.4);
        let merged = merge_collinear(&[a, b], &config());
        assert_eq!(merged.len(), 1);
        assert_abs_diff_eq!(merged[0].length(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(merged[0].score, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_overlapping_segments_merge_to_union() {
        let a = LineSegment::new(0.0, 10.0, 60.0, 10.0);
        let b = LineSegment::new(40.0, 10.0, 100.0, 10.0);
        let merged = merge_collinear(&[a, b], &config());
        assert_eq!(merged.len(), 1);
        // 60 + 60 - 20 overlap
        assert_abs_diff_eq!(merged[0].length(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_merge_is_order_insensitive() {
        let segs = vec![
            LineSegment::new(0.0, 50.0, 30.0, 50.0),
            LineSegment::new(45.0, 51.0, 80.0, 51.0),
            LineSegment::new(95.0, 50.0, 140.0, 50.0),
            LineSegment::new(200.0, 0.0, 200.0, 90.0),
            LineSegment::new(201.0, 100.0, 201.0, 150.0),
        ];
        let forward = merge_collinear(&segs, &config());
        let mut reversed_input = segs.clone();
        reversed_input.reverse();
        let backward = merge_collinear(&reversed_input, &config());
        let shuffled_input = vec![segs[2], segs[4], segs[0], segs[3], segs[1]];
        let shuffled = merge_collinear(&shuffled_input, &config());

        assert_eq!(forward.len(), 2);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_parallel_but_offset_segments_stay_apart() {
        let a = LineSegment::new(0.0, 10.0, 100.0, 10.0);
        let b = LineSegment::new(0.0, 30.0, 100.0, 30.0);
        assert_eq!(merge_collinear(&[a, b], &config()).len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let segs = vec![
            LineSegment::new(0.0, 10.0, 50.0, 10.0),
            LineSegment::new(60.0, 10.0, 120.0, 10.0),
        ];
        let once = merge_collinear(&segs, &config());
        let twice = merge_collinear(&once, &config());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fill_gaps_bridges_door_opening() {
        let segs = vec![
            LineSegment::new(10.0, 100.0, 150.0, 100.0),
            LineSegment::new(210.0, 102.0, 400.0, 102.0),
            LineSegment::new(10.0, 300.0, 400.0, 300.0),
        ];
        let filled = fill_gaps(&segs, &config());
        assert_eq!(filled.len(), 2);
        let top = filled
            .iter()
            .find(|s| s.midpoint().y < 200.0)
            .expect("top wall");
        assert_abs_diff_eq!(top.start.x, 10.0);
        assert_abs_diff_eq!(top.end.x, 400.0);
        assert!(top.score < 1.0);

        let again = fill_gaps(&filled, &config());
        assert_eq!(filled, again);
    }

    #[test]
    fn test_fill_gaps_respects_max_gap() {
        let segs = vec![
            LineSegment::new(0.0, 0.0, 100.0, 0.0),
            LineSegment::new(300.0, 0.0, 400.0, 0.0),
        ];
        assert_eq!(fill_gaps(&segs, &config()).len(), 2);
    }

    #[test]
    fn test_fill_gaps_keeps_diagonals() {
        let segs = vec![LineSegment::new(0.0, 0.0, 100.0, 100.0)];
        assert_eq!(fill_gaps(&segs, &config()), segs);
    }

    #[test]
    fn test_touches() {
        let a = LineSegment::new(0.0, 0.0, 100.0, 0.0);
        let b = LineSegment::new(50.0, 3.0, 50.0, 80.0);
        assert!(touches(&b, &a, 5.0));
        assert!(!touches(&b, &a, 2.0));
    }
}
