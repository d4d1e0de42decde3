// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end detection on a synthetic three-room plan.

use approx::assert_abs_diff_eq;
use ifc_lite_floorplan::{
    find_intersections, geometry::point_in_polygon, snap_point, Detector, LabelBox,
    PerimeterStrategy, PipelineConfig, Point2D, PolygonMetrics, RoomBoxMethod, TextAnchor,
};
use image::{GrayImage, Luma};

/// 600x400 plan with 6 px walls.
///
/// Outer walls enclose 30..570 x 30..370 with a 50 px door in the top
/// wall at x = 400..450. A vertical wall at x = 300..306 splits the plan,
/// and a horizontal wall at y = 200..206 splits the left half, so the
/// top-left room is closed with interior 36..300 x 36..200.
fn three_room_plan() -> GrayImage {
    let mut img = GrayImage::from_pixel(600, 400, Luma([255]));
    let mut fill = |x0: u32, x1: u32, y0: u32, y1: u32| {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    };
    fill(30, 400, 30, 36);
    fill(450, 570, 30, 36);
    fill(30, 570, 364, 370);
    fill(30, 36, 30, 370);
    fill(564, 570, 30, 370);
    fill(300, 306, 30, 370);
    fill(30, 306, 200, 206);
    img
}

/// 600x400 plan with one room: solid walls of `thickness` px whose outer
/// faces enclose 40..560 x 40..360.
fn thick_wall_room(thickness: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(600, 400, Luma([255]));
    for y in 40..360 {
        for x in 40..560 {
            let in_wall = x < 40 + thickness
                || x >= 560 - thickness
                || y < 40 + thickness
                || y >= 360 - thickness;
            if in_wall {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }
    img
}

fn detector() -> Detector {
    Detector::new(PipelineConfig::default()).unwrap()
}

#[test]
fn test_perimeter_follows_inner_faces() {
    let result = detector().detect(&three_room_plan()).unwrap();

    assert_eq!(result.perimeter_strategy(), Some(PerimeterStrategy::WallBased));
    let perimeter = result.perimeter().unwrap();
    let metrics = PolygonMetrics::compute(perimeter.vertices()).unwrap();
    assert!(!metrics.self_intersecting);

    let expected = 528.0 * 328.0;
    assert!(
        (metrics.area - expected).abs() < expected * 0.1,
        "area {} vs {}",
        metrics.area,
        expected
    );
    assert!(point_in_polygon(&Point2D::new(300.0, 200.0), perimeter.vertices()));
    assert!(!point_in_polygon(&Point2D::new(5.0, 5.0), perimeter.vertices()));
}

#[test]
fn test_thick_filled_walls_give_inner_face_perimeter() {
    for thickness in [20u32, 26] {
        let result = detector().detect(&thick_wall_room(thickness)).unwrap();
        assert_eq!(
            result.perimeter_strategy(),
            Some(PerimeterStrategy::WallBased),
            "thickness {thickness}"
        );
        let vertices = result.perimeter().unwrap().vertices();
        let t = thickness as f64;
        let min_x = vertices.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = vertices.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = vertices.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = vertices.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        assert_abs_diff_eq!(min_x, 40.0 + t, epsilon = 4.0);
        assert_abs_diff_eq!(max_x, 560.0 - t, epsilon = 4.0);
        assert_abs_diff_eq!(min_y, 40.0 + t, epsilon = 4.0);
        assert_abs_diff_eq!(max_y, 360.0 - t, epsilon = 4.0);

        let expected = (520.0 - 2.0 * t) * (320.0 - 2.0 * t);
        let area = result.perimeter().unwrap().area();
        assert!(
            (area - expected).abs() < expected * 0.05,
            "thickness {thickness}: area {area} vs {expected}"
        );
    }
}

#[test]
fn test_walls_are_classified() {
    let result = detector().detect(&three_room_plan()).unwrap();
    let counts = result.counts();

    assert!(counts.exterior >= 4, "{counts:?}");
    assert!(
        result
            .interior()
            .any(|w| w.is_vertical() && (w.line().midpoint().x - 303.0).abs() < 6.0),
        "missing interior vertical wall"
    );
    assert!(
        result
            .interior()
            .any(|w| w.is_horizontal() && (w.line().midpoint().y - 203.0).abs() < 6.0),
        "missing interior horizontal wall"
    );
    assert!(result.walls().iter().all(|w| w.thickness() >= 0.0));
}

#[test]
fn test_door_opening_is_bridged() {
    let result = detector().detect(&three_room_plan()).unwrap();
    let bridged = result.exterior().any(|w| {
        let (lo, hi) = w.line().axis_range(w.orientation());
        w.is_horizontal() && (w.line().midpoint().y - 33.0).abs() < 6.0 && lo < 400.0 && hi > 450.0
    });
    assert!(bridged, "top wall should span the door");
}

#[test]
fn test_room_box_around_label() {
    let detector = detector();
    let analysis = detector.analyze(&three_room_plan()).unwrap();

    let label = LabelBox::new(120.0, 100.0, 50.0, 16.0);
    let (room, method) = detector.room_box(&analysis, &label).unwrap();
    assert_eq!(method, RoomBoxMethod::FloodFill);
    assert_abs_diff_eq!(room.x1(), 36.0, epsilon = 2.0);
    assert_abs_diff_eq!(room.y1(), 36.0, epsilon = 2.0);
    assert_abs_diff_eq!(room.x2(), 300.0, epsilon = 2.0);
    assert_abs_diff_eq!(room.y2(), 200.0, epsilon = 2.0);
    assert!(room.contains_label(&label));
}

#[test]
fn test_rooms_for_dimension_labels() {
    let detector = detector();
    let analysis = detector.analyze(&three_room_plan()).unwrap();
    let lines = vec![
        TextAnchor {
            text: "KITCHEN".into(),
            bbox: LabelBox::new(120.0, 80.0, 60.0, 14.0),
        },
        TextAnchor {
            text: "12'6\" x 10'".into(),
            bbox: LabelBox::new(120.0, 100.0, 50.0, 16.0),
        },
    ];

    let rooms = detector.rooms_for_labels(&analysis, &lines);
    assert_eq!(rooms.len(), 1);
    assert_abs_diff_eq!(rooms[0].anchor.dimension.first, 12.5);
    assert_abs_diff_eq!(rooms[0].room.x1(), 36.0, epsilon = 2.0);
}

#[test]
fn test_corners_and_snapping() {
    let plan = three_room_plan();
    let detector = detector();
    let corners = detector.corners(&plan);

    assert!(!corners.is_empty());
    assert!(corners.len() <= detector.config().corners.max_corners);
    assert!(corners.windows(2).all(|p| p[0].response >= p[1].response));

    let targets: Vec<Point2D> = corners.iter().map(|c| c.point()).collect();
    let snapped = snap_point(&Point2D::new(33.0, 33.0), &targets, 10.0);
    // Outer and inner corner of the top-left wall joint are both near
    assert!(targets.contains(&snapped));
    assert!(snapped.distance_to(&Point2D::new(33.0, 33.0)) <= 8.0, "{snapped:?}");

    let far = Point2D::new(150.0, 300.0);
    assert_eq!(snap_point(&far, &targets, 5.0), far);
}

#[test]
fn test_segments_cross_at_wall_junctions() {
    let analysis = detector().analyze(&three_room_plan()).unwrap();
    let crossings = find_intersections(&analysis.segments.all, 10.0);
    assert!(crossings
        .iter()
        .any(|c| (c.point.x - 303.0).abs() < 8.0 && (c.point.y - 203.0).abs() < 8.0));
}

#[test]
fn test_result_serializes_to_json() {
    let result = detector().detect(&three_room_plan()).unwrap();
    let json = serde_json::to_string(&result).unwrap();
    let back: ifc_lite_floorplan::DetectionResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.counts(), result.counts());
    assert_eq!(
        back.perimeter().map(|p| p.vertices().len()),
        result.perimeter().map(|p| p.vertices().len())
    );
}

#[test]
fn test_partial_json_config() {
    let config = PipelineConfig::from_json_str(
        r#"{ "consolidate": { "bridge_mode": "both" }, "room_box": { "candidates_per_side": 4 } }"#,
    )
    .unwrap();
    assert_eq!(config.room_box.candidates_per_side, 4);
    assert_eq!(config.corners.max_corners, 500);

    let result = Detector::new(config).unwrap().detect(&three_room_plan()).unwrap();
    assert!(result.perimeter().is_some());
}
