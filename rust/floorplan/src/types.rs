// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for floor plan geometry extraction

use crate::geometry;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A 2D point in pixel space
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Orientation class of a segment under an angle tolerance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
    Diagonal,
}

/// Classify a direction angle (radians) as horizontal, vertical or diagonal.
pub fn classify_angle(angle: f64, tolerance: f64) -> Orientation {
    let a = angle.abs();
    if a <= tolerance || a >= PI - tolerance {
        Orientation::Horizontal
    } else if (a - PI / 2.0).abs() <= tolerance {
        Orientation::Vertical
    } else {
        Orientation::Diagonal
    }
}

/// Smallest angle between two undirected lines, in `[0, PI/2]`.
pub fn line_angle_difference(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).abs() % PI;
    if diff > PI / 2.0 {
        diff = PI - diff;
    }
    diff
}

/// Scored line segment produced by the line extractor.
///
/// Stages drop degenerate segments before emitting them, and deserialization
/// rejects them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "LineSegmentData")]
pub struct LineSegment {
    pub start: Point2D,
    pub end: Point2D,
    /// Mean wall likelihood along the segment (0.0 - 1.0)
    pub score: f32,
}

#[derive(Deserialize)]
struct LineSegmentData {
    start: Point2D,
    end: Point2D,
    score: f32,
}

impl TryFrom<LineSegmentData> for LineSegment {
    type Error = String;

    fn try_from(data: LineSegmentData) -> std::result::Result<Self, Self::Error> {
        let segment = LineSegment::from_points(data.start, data.end, data.score);
        if segment.is_degenerate() {
            return Err(format!(
                "line segment from ({}, {}) has zero length",
                data.start.x, data.start.y
            ));
        }
        Ok(segment)
    }
}

impl LineSegment {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            start: Point2D::new(x1, y1),
            end: Point2D::new(x2, y2),
            score: 1.0,
        }
    }

    pub fn from_points(start: Point2D, end: Point2D, score: f32) -> Self {
        Self {
            start,
            end,
            score: score.clamp(0.0, 1.0),
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score.clamp(0.0, 1.0);
        self
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    /// Direction angle in `(-PI, PI]`
    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }

    pub fn midpoint(&self) -> Point2D {
        Point2D::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    pub fn orientation(&self, tolerance: f64) -> Orientation {
        classify_angle(self.angle(), tolerance)
    }

    /// Whether the segment is effectively a point. Such segments are never
    /// emitted.
    pub fn is_degenerate(&self) -> bool {
        self.length() < 1e-6
    }

    /// Unit direction vector, `(1, 0)` for degenerate segments.
    pub fn direction(&self) -> (f64, f64) {
        let len = self.length();
        if len < 1e-12 {
            return (1.0, 0.0);
        }
        (
            (self.end.x - self.start.x) / len,
            (self.end.y - self.start.y) / len,
        )
    }

    /// Coordinate across an axis-aligned segment: mean y for horizontal
    /// lines, mean x for everything else.
    pub fn perpendicular_position(&self, orientation: Orientation) -> f64 {
        match orientation {
            Orientation::Horizontal => (self.start.y + self.end.y) / 2.0,
            _ => (self.start.x + self.end.x) / 2.0,
        }
    }

    /// `(min, max)` extent along the main axis of an axis-aligned segment.
    pub fn axis_range(&self, orientation: Orientation) -> (f64, f64) {
        match orientation {
            Orientation::Horizontal => (
                self.start.x.min(self.end.x),
                self.start.x.max(self.end.x),
            ),
            _ => (
                self.start.y.min(self.end.y),
                self.start.y.max(self.end.y),
            ),
        }
    }

    /// Endpoints ordered so that the direction points right, or down for
    /// vertical lines.
    pub fn canonical(&self) -> LineSegment {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        if dx < 0.0 || (dx == 0.0 && dy < 0.0) {
            LineSegment {
                start: self.end,
                end: self.start,
                score: self.score,
            }
        } else {
            *self
        }
    }
}

/// Wall classification relative to the building envelope
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WallType {
    Exterior,
    Interior,
}

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Bounding box of a set of pixel coordinates, `None` when empty.
    pub fn from_pixels(pixels: &[(u32, u32)]) -> Option<Self> {
        let (&(x0, y0), rest) = pixels.split_first()?;
        let mut bbox = BoundingBox {
            min_x: x0,
            min_y: y0,
            max_x: x0,
            max_y: y0,
        };
        for &(x, y) in rest {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }
}

/// Classified wall built from a post-processed line and the source mask.
///
/// Immutable once built: fields are only readable through accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallSegment {
    line: LineSegment,
    orientation: Orientation,
    wall_type: WallType,
    thickness: f64,
    bbox: BoundingBox,
    pixels: Vec<(u32, u32)>,
}

impl WallSegment {
    /// Build a wall from its centerline, a thickness estimate and the ink
    /// pixels that support it. The bounding box covers the pixels, or the
    /// thickened centerline when no pixels were collected.
    pub fn new(
        line: LineSegment,
        orientation: Orientation,
        wall_type: WallType,
        thickness: f64,
        pixels: Vec<(u32, u32)>,
    ) -> Self {
        let bbox = BoundingBox::from_pixels(&pixels).unwrap_or_else(|| {
            let half = thickness.max(0.0) / 2.0;
            let min_x = (line.start.x.min(line.end.x) - half).max(0.0);
            let min_y = (line.start.y.min(line.end.y) - half).max(0.0);
            let max_x = (line.start.x.max(line.end.x) + half).max(min_x);
            let max_y = (line.start.y.max(line.end.y) + half).max(min_y);
            BoundingBox {
                min_x: min_x.floor() as u32,
                min_y: min_y.floor() as u32,
                max_x: max_x.ceil() as u32,
                max_y: max_y.ceil() as u32,
            }
        });
        Self {
            line,
            orientation,
            wall_type,
            thickness: thickness.max(0.0),
            bbox,
            pixels,
        }
    }

    pub fn line(&self) -> &LineSegment {
        &self.line
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn wall_type(&self) -> WallType {
        self.wall_type
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels
    }

    pub fn length(&self) -> f64 {
        self.line.length()
    }

    pub fn is_horizontal(&self) -> bool {
        self.orientation == Orientation::Horizontal
    }

    pub fn is_vertical(&self) -> bool {
        self.orientation == Orientation::Vertical
    }

    pub fn is_exterior(&self) -> bool {
        self.wall_type == WallType::Exterior
    }
}

/// Crossing of two lines, used only as a snap target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Intersection {
    pub point: Point2D,
    /// Index of the first contributing line
    pub first: usize,
    /// Index of the second contributing line
    pub second: usize,
}

/// Closed exterior outline. The last vertex connects back to the first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "PerimeterData")]
pub struct Perimeter {
    vertices: Vec<Point2D>,
    self_intersecting: bool,
}

/// Serialized form of [`Perimeter`]. The self-intersection flag is
/// recomputed on load.
#[derive(Deserialize)]
struct PerimeterData {
    vertices: Vec<Point2D>,
}

impl TryFrom<PerimeterData> for Perimeter {
    type Error = String;

    fn try_from(data: PerimeterData) -> std::result::Result<Self, Self::Error> {
        let count = data.vertices.len();
        Perimeter::new(data.vertices)
            .ok_or_else(|| format!("perimeter needs at least 3 vertices, got {count}"))
    }
}

impl Perimeter {
    /// Wrap a vertex ring, `None` with fewer than 3 vertices.
    /// Self-intersection is recorded, not repaired.
    pub fn new(vertices: Vec<Point2D>) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let self_intersecting = !geometry::self_intersections(&vertices).is_empty();
        Some(Self {
            vertices,
            self_intersecting,
        })
    }

    pub fn vertices(&self) -> &[Point2D] {
        &self.vertices
    }

    pub fn into_vertices(self) -> Vec<Point2D> {
        self.vertices
    }

    pub fn is_self_intersecting(&self) -> bool {
        self.self_intersecting
    }

    pub fn area(&self) -> f64 {
        geometry::polygon_area(&self.vertices)
    }

    pub fn length(&self) -> f64 {
        geometry::perimeter_length(&self.vertices)
    }
}

/// Axis-aligned room rectangle. Always `x2 > x1` and `y2 > y1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RoomBoxData")]
pub struct RoomBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

#[derive(Deserialize)]
struct RoomBoxData {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl TryFrom<RoomBoxData> for RoomBox {
    type Error = String;

    fn try_from(data: RoomBoxData) -> std::result::Result<Self, Self::Error> {
        RoomBox::new(data.x1, data.y1, data.x2, data.y2).ok_or_else(|| {
            format!(
                "room box ({}, {}) - ({}, {}) is empty or inverted",
                data.x1, data.y1, data.x2, data.y2
            )
        })
    }
}

impl RoomBox {
    /// `None` unless `x2 > x1` and `y2 > y1`.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        if x2 > x1 && y2 > y1 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Whether the label rectangle lies fully inside this box.
    pub fn contains_label(&self, label: &LabelBox) -> bool {
        label.x >= self.x1
            && label.y >= self.y1
            && label.x + label.width <= self.x2
            && label.y + label.height <= self.y2
    }

    pub fn vertices(&self) -> Vec<Point2D> {
        vec![
            Point2D::new(self.x1, self.y1),
            Point2D::new(self.x2, self.y1),
            Point2D::new(self.x2, self.y2),
            Point2D::new(self.x1, self.y2),
        ]
    }
}

/// Pixel-space bounding box of a recognised text line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LabelBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LabelBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centroid(&self) -> Point2D {
        Point2D::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// OCR text line with its pixel bounding box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAnchor {
    pub text: String,
    pub bbox: LabelBox,
}

/// Strategy used to build the exterior outline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerimeterStrategy {
    /// Trace the extreme exterior walls
    WallBased,
    /// Largest outer contour of the closed ink mask
    MorphologicalContour,
    /// Bounding rectangle of all extracted lines
    LineBased,
    /// Image rectangle inset by a margin
    DefaultRectangle,
}

/// Wall counts per category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WallCounts {
    pub total: usize,
    pub horizontal: usize,
    pub vertical: usize,
    pub exterior: usize,
    pub interior: usize,
}

/// Result of one detection run. Read-only once built; a new image gets a
/// new result rather than an update to this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    walls: Vec<WallSegment>,
    perimeter: Option<Perimeter>,
    perimeter_strategy: Option<PerimeterStrategy>,
    image_width: u32,
    image_height: u32,
}

impl DetectionResult {
    pub fn new(
        walls: Vec<WallSegment>,
        perimeter: Option<(Perimeter, PerimeterStrategy)>,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let (perimeter, perimeter_strategy) = match perimeter {
            Some((p, s)) => (Some(p), Some(s)),
            None => (None, None),
        };
        Self {
            walls,
            perimeter,
            perimeter_strategy,
            image_width,
            image_height,
        }
    }

    pub fn walls(&self) -> &[WallSegment] {
        &self.walls
    }

    pub fn horizontal(&self) -> impl Iterator<Item = &WallSegment> {
        self.walls.iter().filter(|w| w.is_horizontal())
    }

    pub fn vertical(&self) -> impl Iterator<Item = &WallSegment> {
        self.walls.iter().filter(|w| w.is_vertical())
    }

    pub fn exterior(&self) -> impl Iterator<Item = &WallSegment> {
        self.walls.iter().filter(|w| w.is_exterior())
    }

    pub fn interior(&self) -> impl Iterator<Item = &WallSegment> {
        self.walls.iter().filter(|w| !w.is_exterior())
    }

    pub fn counts(&self) -> WallCounts {
        WallCounts {
            total: self.walls.len(),
            horizontal: self.horizontal().count(),
            vertical: self.vertical().count(),
            exterior: self.exterior().count(),
            interior: self.interior().count(),
        }
    }

    pub fn perimeter(&self) -> Option<&Perimeter> {
        self.perimeter.as_ref()
    }

    pub fn perimeter_strategy(&self) -> Option<PerimeterStrategy> {
        self.perimeter_strategy
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_orientation_classes() {
        let tol = 10f64.to_radians();
        assert_eq!(
            LineSegment::new(0.0, 0.0, 100.0, 5.0).orientation(tol),
            Orientation::Horizontal
        );
        assert_eq!(
            LineSegment::new(100.0, 5.0, 0.0, 0.0).orientation(tol),
            Orientation::Horizontal
        );
        assert_eq!(
            LineSegment::new(10.0, 0.0, 12.0, 80.0).orientation(tol),
            Orientation::Vertical
        );
        assert_eq!(
            LineSegment::new(0.0, 0.0, 50.0, 50.0).orientation(tol),
            Orientation::Diagonal
        );
    }

    #[test]
    fn test_line_angle_difference_ignores_direction() {
        let a = LineSegment::new(0.0, 0.0, 10.0, 0.0).angle();
        let b = LineSegment::new(10.0, 0.0, 0.0, 0.0).angle();
        assert_abs_diff_eq!(line_angle_difference(a, b), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_canonical_orders_endpoints() {
        let seg = LineSegment::new(50.0, 10.0, 0.0, 10.0).canonical();
        assert_eq!(seg.start, Point2D::new(0.0, 10.0));
        let seg = LineSegment::new(5.0, 90.0, 5.0, 10.0).canonical();
        assert_eq!(seg.start, Point2D::new(5.0, 10.0));
    }

    #[test]
    fn test_room_box_invariant() {
        assert!(RoomBox::new(10.0, 10.0, 10.0, 20.0).is_none());
        assert!(RoomBox::new(10.0, 10.0, 5.0, 20.0).is_none());
        let rb = RoomBox::new(0.0, 0.0, 40.0, 30.0).unwrap();
        assert_abs_diff_eq!(rb.area(), 1200.0);
        assert!(rb.contains_label(&LabelBox::new(5.0, 5.0, 10.0, 5.0)));
        assert!(!rb.contains_label(&LabelBox::new(35.0, 5.0, 10.0, 5.0)));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let empty = serde_json::from_str::<Perimeter>(r#"{"vertices":[]}"#);
        assert!(empty.is_err());
        let inverted =
            serde_json::from_str::<RoomBox>(r#"{"x1":10.0,"y1":0.0,"x2":5.0,"y2":20.0}"#);
        assert!(inverted.is_err());
        let point = serde_json::from_str::<LineSegment>(
            r#"{"start":{"x":3.0,"y":4.0},"end":{"x":3.0,"y":4.0},"score":1.0}"#,
        );
        assert!(point.is_err());
    }

    #[test]
    fn test_valid_json_goes_through_constructors() {
        let bowtie: Perimeter = serde_json::from_str(
            r#"{"vertices":[{"x":0.0,"y":0.0},{"x":10.0,"y":10.0},{"x":10.0,"y":0.0},{"x":0.0,"y":10.0}],
                "self_intersecting":false}"#,
        )
        .unwrap();
        assert!(bowtie.is_self_intersecting(), "flag is recomputed");

        let rb = RoomBox::new(1.0, 2.0, 30.0, 40.0).unwrap();
        let back: RoomBox = serde_json::from_str(&serde_json::to_string(&rb).unwrap()).unwrap();
        assert_eq!(back, rb);
        assert_abs_diff_eq!(back.x2(), 30.0);

        let seg: LineSegment = serde_json::from_str(
            r#"{"start":{"x":0.0,"y":0.0},"end":{"x":0.0,"y":5.0},"score":2.0}"#,
        )
        .unwrap();
        assert_eq!(seg.score, 1.0);
    }

    #[test]
    fn test_perimeter_requires_three_vertices() {
        assert!(Perimeter::new(vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0)]).is_none());
        let p = Perimeter::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ])
        .unwrap();
        assert!(!p.is_self_intersecting());
        assert_abs_diff_eq!(p.area(), 50.0);
    }

    #[test]
    fn test_detection_result_counts() {
        let h = WallSegment::new(
            LineSegment::new(0.0, 10.0, 100.0, 10.0),
            Orientation::Horizontal,
            WallType::Exterior,
            4.0,
            Vec::new(),
        );
        let v = WallSegment::new(
            LineSegment::new(50.0, 0.0, 50.0, 80.0),
            Orientation::Vertical,
            WallType::Interior,
            4.0,
            Vec::new(),
        );
        let result = DetectionResult::new(vec![h, v], None, 200, 100);
        let counts = result.counts();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.horizontal, 1);
        assert_eq!(counts.vertical, 1);
        assert_eq!(counts.exterior, 1);
        assert_eq!(counts.interior, 1);
        assert!(result.perimeter().is_none());
        assert_eq!(result.walls()[0].bbox().min_y, 8);
    }
}
