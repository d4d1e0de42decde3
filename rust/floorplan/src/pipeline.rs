// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection orchestration.
//!
//! [`Detector`] chains the stages in dependency order and owns the optional
//! collaborators: a neural [`WallClassifier`] and a [`DetectionObserver`].
//! It holds no per-image state, so one detector can serve many images
//! concurrently.

use crate::config::{BridgeMode, PipelineConfig};
use crate::consolidate::{bridge_gaps_morphological, fill_gaps, merge_collinear};
use crate::corners::{detect_corners, Corner};
use crate::error::Result;
use crate::image_ops::{rgba_to_grayscale, FloatMap, INK};
use crate::labels::{find_dimension_anchors, DimensionAnchor};
use crate::likelihood::{estimate_likelihood, WallClassifier};
use crate::line_extract::extract_lines;
use crate::observer::{DetectionObserver, Stage};
use crate::perimeter::{build_perimeter_with_fallback, PerimeterInput};
use crate::postprocess::{build_walls, postprocess, ClassifiedSegments};
use crate::preprocess::preprocess;
use crate::room_box::{refine_room_box, RoomBoxMethod};
use crate::types::{DetectionResult, LabelBox, RoomBox, TextAnchor, WallSegment};
use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;

/// Thickness used when a wall's band never touches ink; faces then fall
/// back to the centerline.
const UNMEASURED_THICKNESS: f64 = 0.0;

/// Intermediate products of one run, kept for room refinement and debugging
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: DetectionResult,
    /// Binary ink mask the walls were measured on
    pub mask: GrayImage,
    pub likelihood: FloatMap,
    /// Post-processed segments before wall construction
    pub segments: ClassifiedSegments,
}

/// Room box found for an OCR dimension label
#[derive(Debug, Clone, Serialize)]
pub struct LabelledRoom {
    pub anchor: DimensionAnchor,
    pub room: RoomBox,
    pub method: RoomBoxMethod,
}

/// Floor plan detector
pub struct Detector {
    config: PipelineConfig,
    classifier: Option<Box<dyn WallClassifier>>,
    observer: Option<Box<dyn DetectionObserver>>,
}

impl Detector {
    /// Create a detector after validating `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: None,
            observer: None,
        })
    }

    /// Use a neural classifier for the likelihood stage. Failures fall back
    /// to the classical estimate.
    pub fn with_classifier(mut self, classifier: impl WallClassifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    pub fn with_observer(mut self, observer: impl DetectionObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn started(&self, stage: Stage) {
        if let Some(observer) = &self.observer {
            observer.stage_started(stage);
        }
    }

    fn finished(&self, stage: Stage, items: usize) {
        if let Some(observer) = &self.observer {
            observer.stage_finished(stage, items);
        }
    }

    /// Run every stage and keep the intermediate products.
    pub fn analyze(&self, gray: &GrayImage) -> Result<Analysis> {
        let (width, height) = gray.dimensions();
        let config = &self.config;

        self.started(Stage::Preprocess);
        let mut mask = preprocess(gray, &config.preprocess)?;
        if matches!(
            config.consolidate.bridge_mode,
            BridgeMode::Pixels | BridgeMode::Both
        ) {
            mask = bridge_gaps_morphological(&mask, &config.consolidate);
        }
        let ink = mask.pixels().filter(|p| p.0[0] == INK).count();
        self.finished(Stage::Preprocess, ink);

        self.started(Stage::Likelihood);
        let likelihood = estimate_likelihood(
            gray,
            &mask,
            &config.likelihood,
            self.classifier.as_deref(),
        );
        self.finished(Stage::Likelihood, likelihood.len());

        self.started(Stage::LineExtraction);
        let lines = extract_lines(&likelihood, &config.lines);
        self.finished(Stage::LineExtraction, lines.len());

        self.started(Stage::Consolidation);
        let mut consolidated = merge_collinear(&lines, &config.consolidate);
        if matches!(
            config.consolidate.bridge_mode,
            BridgeMode::Segments | BridgeMode::Both
        ) {
            consolidated = fill_gaps(&consolidated, &config.consolidate);
        }
        tracing::debug!(
            input = lines.len(),
            output = consolidated.len(),
            "Consolidated segments"
        );
        self.finished(Stage::Consolidation, consolidated.len());

        self.started(Stage::PostProcess);
        let segments = postprocess(&consolidated, width, height, &config.postprocess);
        let walls = build_walls(&segments, &mask, &config.postprocess, UNMEASURED_THICKNESS);
        self.finished(Stage::PostProcess, walls.len());

        self.started(Stage::Perimeter);
        let exterior: Vec<WallSegment> = walls.iter().filter(|w| w.is_exterior()).cloned().collect();
        let input = PerimeterInput {
            walls: &exterior,
            segments: &segments.all,
            mask: &mask,
            image_width: width,
            image_height: height,
        };
        let perimeter = build_perimeter_with_fallback(
            &input,
            &config.perimeter,
            config.postprocess.orientation_tolerance,
        );
        if perimeter.is_none() {
            tracing::warn!("Every perimeter strategy failed");
        }
        self.finished(
            Stage::Perimeter,
            perimeter.as_ref().map_or(0, |(p, _)| p.vertices().len()),
        );

        let result = DetectionResult::new(walls, perimeter, width, height);
        let counts = result.counts();
        tracing::info!(
            width,
            height,
            walls = counts.total,
            horizontal = counts.horizontal,
            vertical = counts.vertical,
            exterior = counts.exterior,
            interior = counts.interior,
            perimeter = ?result.perimeter_strategy(),
            "Floor plan detection complete"
        );

        Ok(Analysis {
            result,
            mask,
            likelihood,
            segments,
        })
    }

    /// Detect walls and the exterior perimeter in a grayscale plan.
    pub fn detect(&self, gray: &GrayImage) -> Result<DetectionResult> {
        self.analyze(gray).map(|analysis| analysis.result)
    }

    /// Detect from a raw RGBA buffer.
    pub fn detect_rgba(&self, rgba: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let gray = rgba_to_grayscale(rgba, width, height)?;
        self.detect(&gray)
    }

    /// Detect several plans in parallel. Each entry is independent.
    pub fn detect_batch(&self, images: &[GrayImage]) -> Vec<Result<DetectionResult>> {
        images.par_iter().map(|gray| self.detect(gray)).collect()
    }

    /// Harris corners of the plan, for vertex snapping.
    pub fn corners(&self, gray: &GrayImage) -> Vec<Corner> {
        self.started(Stage::Corners);
        let corners = detect_corners(gray, &self.config.corners);
        self.finished(Stage::Corners, corners.len());
        corners
    }

    /// Room rectangle around one label box, reusing a finished analysis.
    pub fn room_box(
        &self,
        analysis: &Analysis,
        label: &LabelBox,
    ) -> Option<(RoomBox, RoomBoxMethod)> {
        self.started(Stage::RoomBox);
        let room = refine_room_box(
            Some(&analysis.mask),
            analysis.result.walls(),
            label,
            &self.config.room_box,
        );
        self.finished(Stage::RoomBox, usize::from(room.is_some()));
        room
    }

    /// Refine a room for every OCR line that carries a dimension.
    ///
    /// Lines without a dimension and labels with no enclosing room are
    /// skipped. Rooms are refined in parallel.
    pub fn rooms_for_labels(&self, analysis: &Analysis, lines: &[TextAnchor]) -> Vec<LabelledRoom> {
        find_dimension_anchors(lines)
            .into_par_iter()
            .filter_map(|anchor| {
                let (room, method) = self.room_box(analysis, &anchor.anchor.bbox)?;
                Some(LabelledRoom {
                    anchor,
                    room,
                    method,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("config", &self.config)
            .field("classifier", &self.classifier.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostFilter;
    use crate::error::{ClassifierError, Error};
    use crate::types::PerimeterStrategy;
    use image::Luma;
    use std::sync::{Arc, Mutex};

    /// 200x200 plan: 5 px walls on a 20..180 rectangle, one interior wall
    /// at x = 100..105.
    fn plan() -> GrayImage {
        let mut img = GrayImage::from_pixel(200, 200, Luma([255]));
        for i in 20..180 {
            for t in 0..5 {
                img.put_pixel(i, 20 + t, Luma([0]));
                img.put_pixel(i, 175 + t, Luma([0]));
                img.put_pixel(20 + t, i, Luma([0]));
                img.put_pixel(175 + t, i, Luma([0]));
                img.put_pixel(100 + t, i, Luma([0]));
            }
        }
        img
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(Stage, bool)>>>,
    }

    impl DetectionObserver for Recorder {
        fn stage_started(&self, stage: Stage) {
            self.events.lock().unwrap().push((stage, false));
        }

        fn stage_finished(&self, stage: Stage, _items: usize) {
            self.events.lock().unwrap().push((stage, true));
        }
    }

    struct Unloaded;

    impl WallClassifier for Unloaded {
        fn input_size(&self) -> u32 {
            64
        }

        fn predict(&self, _input: &GrayImage) -> std::result::Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::Unavailable)
        }
    }

    #[test]
    fn test_detects_walls_and_perimeter() {
        let detector = Detector::new(PipelineConfig::default()).unwrap();
        let result = detector.detect(&plan()).unwrap();

        let counts = result.counts();
        assert!(counts.horizontal >= 2, "{counts:?}");
        assert!(counts.vertical >= 3, "{counts:?}");
        assert!(counts.interior >= 1, "{counts:?}");
        assert_eq!(result.image_width(), 200);
        assert!(result.perimeter().is_some());
        assert!(result.perimeter_strategy().is_some());
    }

    #[test]
    fn test_empty_image_is_an_error() {
        let detector = Detector::new(PipelineConfig::default()).unwrap();
        let err = detector.detect(&GrayImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, Error::EmptyImage { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.consolidate.bridge_kernel = 0;
        assert!(matches!(
            Detector::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_plan_falls_back_to_default_rectangle() {
        let detector = Detector::new(PipelineConfig::default()).unwrap();
        let blank = GrayImage::from_pixel(120, 100, Luma([255]));
        let result = detector.detect(&blank).unwrap();
        assert!(result.walls().is_empty());
        assert_eq!(
            result.perimeter_strategy(),
            Some(PerimeterStrategy::DefaultRectangle)
        );
    }

    #[test]
    fn test_observer_sees_every_stage_in_order() {
        let recorder = Recorder::default();
        let detector = Detector::new(PipelineConfig::default())
            .unwrap()
            .with_observer(recorder.clone());
        detector.detect(&plan()).unwrap();

        let events = recorder.events.lock().unwrap().clone();
        let expected = [
            Stage::Preprocess,
            Stage::Likelihood,
            Stage::LineExtraction,
            Stage::Consolidation,
            Stage::PostProcess,
            Stage::Perimeter,
        ];
        let flattened: Vec<(Stage, bool)> = expected
            .iter()
            .flat_map(|&s| [(s, false), (s, true)])
            .collect();
        assert_eq!(events, flattened);
    }

    #[test]
    fn test_failing_classifier_matches_classical_run() {
        let classical = Detector::new(PipelineConfig::default()).unwrap();
        let neural = Detector::new(PipelineConfig::default())
            .unwrap()
            .with_classifier(Unloaded);
        let a = classical.analyze(&plan()).unwrap();
        let b = neural.analyze(&plan()).unwrap();
        assert_eq!(a.likelihood.as_raw(), b.likelihood.as_raw());
        assert_eq!(a.result.walls().len(), b.result.walls().len());
    }

    #[test]
    fn test_pixel_bridging_still_detects() {
        let mut config = PipelineConfig::default();
        config.consolidate.bridge_mode = BridgeMode::Both;
        let result = Detector::new(config).unwrap().detect(&plan()).unwrap();
        assert!(result.counts().total >= 4);
    }

    #[test]
    fn test_batch_matches_single_runs() {
        let detector = Detector::new(PipelineConfig::default()).unwrap();
        let images = vec![plan(), GrayImage::new(0, 0), plan()];
        let results = detector.detect_batch(&images);
        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());
        let single = detector.detect(&plan()).unwrap();
        for r in [&results[0], &results[2]] {
            let r = r.as_ref().unwrap();
            assert_eq!(r.counts(), single.counts());
        }
    }

    #[test]
    fn test_length_filter_only_config() {
        let mut config = PipelineConfig::default();
        config.postprocess.filters = vec![PostFilter::Length {
            min: 1000.0,
            max: None,
        }];
        let result = Detector::new(config).unwrap().detect(&plan()).unwrap();
        assert!(result.walls().is_empty());
    }

    #[test]
    fn test_rgba_entry_point() {
        let gray = plan();
        let rgba: Vec<u8> = gray
            .pixels()
            .flat_map(|p| [p.0[0], p.0[0], p.0[0], 255])
            .collect();
        let detector = Detector::new(PipelineConfig::default()).unwrap();
        let from_rgba = detector.detect_rgba(&rgba, 200, 200).unwrap();
        let from_gray = detector.detect(&gray).unwrap();
        assert_eq!(from_rgba.counts(), from_gray.counts());

        assert!(matches!(
            detector.detect_rgba(&rgba[..10], 200, 200),
            Err(Error::BufferSizeMismatch { .. })
        ));
    }
}
