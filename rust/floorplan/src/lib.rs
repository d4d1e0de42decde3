// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall, perimeter and room extraction from raster floor plans
//!
//! This crate provides a classical computer vision pipeline for:
//! 1. Binarizing a drawn or scanned floor plan
//! 2. Estimating a per-pixel wall likelihood (neural model or heuristic)
//! 3. Extracting, consolidating and classifying wall line segments
//! 4. Tracing the exterior perimeter for floor area computation
//! 5. Detecting corners for interactive vertex snapping
//! 6. Refining room rectangles around OCR dimension labels
//!
//! # Usage
//!
//! ```rust,ignore
//! use ifc_lite_floorplan::{detect_floor_plan, geometry::PolygonMetrics, PipelineConfig};
//!
//! // Process a grayscale floor plan image
//! let result = detect_floor_plan(&grayscale_image, &PipelineConfig::default())?;
//!
//! // Floor area of the exterior outline, in square pixels
//! if let Some(perimeter) = result.perimeter() {
//!     let metrics = PolygonMetrics::compute(perimeter.vertices());
//! }
//! ```

pub mod config;
pub mod consolidate;
pub mod corners;
pub mod error;
pub mod geometry;
pub mod image_ops;
pub mod labels;
pub mod likelihood;
pub mod line_extract;
pub mod observer;
pub mod perimeter;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod room_box;
pub mod types;

// Re-export commonly used types and functions
pub use config::{
    BridgeMode, Binarization, ConsolidateConfig, CornerConfig, LikelihoodConfig,
    LineExtractConfig, PerimeterConfig, PipelineConfig, PostFilter, PostProcessConfig,
    PreprocessConfig, RoomBoxConfig, DEFAULT_ORIENTATION_TOLERANCE,
};
pub use corners::{detect_corners, Corner};
pub use error::{ClassifierError, Error, Result};
pub use geometry::{find_intersections, snap_point, PolygonMetrics};
pub use image_ops::rgba_to_grayscale;
pub use labels::{find_dimension_anchors, parse_dimension, LengthUnit, RoomDimension};
pub use likelihood::WallClassifier;
pub use observer::{DetectionObserver, Stage};
pub use pipeline::{Analysis, Detector, LabelledRoom};
pub use room_box::{refine_room_box, RoomBoxMethod};
pub use types::{
    DetectionResult, Intersection, LabelBox, LineSegment, Orientation, Perimeter,
    PerimeterStrategy, Point2D, RoomBox, TextAnchor, WallSegment, WallType,
};

use image::GrayImage;

/// Detect walls and the exterior perimeter of a grayscale floor plan
///
/// This runs the full detection pipeline:
/// 1. Binarization and mask cleanup
/// 2. Classical wall likelihood
/// 3. Line extraction, merging and gap bridging
/// 4. Post-processing filters and exterior/interior classification
/// 5. Perimeter construction with strategy fallback
///
/// # Arguments
///
/// * `grayscale` - Grayscale image of the floor plan
/// * `config` - Pipeline configuration, validated before use
///
/// # Errors
///
/// Fails only on invalid input: a zero-size image or an invalid config.
pub fn detect_floor_plan(grayscale: &GrayImage, config: &PipelineConfig) -> Result<DetectionResult> {
    Detector::new(config.clone())?.detect(grayscale)
}

/// Process RGBA image data and detect the floor plan
///
/// Convenience function that converts RGBA to grayscale and runs detection.
///
/// # Arguments
///
/// * `rgba_data` - RGBA pixel data (4 bytes per pixel)
/// * `width` - Image width
/// * `height` - Image height
/// * `config` - Pipeline configuration
pub fn detect_floor_plan_from_rgba(
    rgba_data: &[u8],
    width: u32,
    height: u32,
    config: &PipelineConfig,
) -> Result<DetectionResult> {
    let grayscale = rgba_to_grayscale(rgba_data, width, height)?;
    detect_floor_plan(&grayscale, config)
}
