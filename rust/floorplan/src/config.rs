// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-stage configuration with documented defaults.
//!
//! Every struct is `#[serde(default)]`, so a partial JSON document only
//! overrides the fields it names. Call [`PipelineConfig::validate`] (done by
//! [`PipelineConfig::from_json_str`] and the detector constructor) before use.

use crate::error::{Error, Result};
use crate::types::PerimeterStrategy;
use serde::{Deserialize, Serialize};

/// Default angle tolerance for horizontal/vertical classification (10°)
pub const DEFAULT_ORIENTATION_TOLERANCE: f64 = std::f64::consts::PI / 18.0;

/// Adaptive binarization window used when none is given
pub const DEFAULT_ADAPTIVE_WINDOW: u32 = 15;

/// Adaptive binarization offset used when none is given
pub const DEFAULT_ADAPTIVE_CONSTANT: f64 = 10.0;

fn default_adaptive_window() -> u32 {
    DEFAULT_ADAPTIVE_WINDOW
}

fn default_adaptive_constant() -> f64 {
    DEFAULT_ADAPTIVE_CONSTANT
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfig(message()))
    }
}

/// Binarization method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Binarization {
    /// Pixels darker than `threshold` are ink
    Global { threshold: u8 },
    /// Threshold chosen by maximising inter-class variance
    Otsu,
    /// Pixels darker than the local window mean minus `constant` are ink.
    ///
    /// Filled strokes wider than `window` come out hollow, so this suits thin
    /// line drawings and uneven scans. Defaults: window 15, constant 10
    AdaptiveMean {
        #[serde(default = "default_adaptive_window")]
        window: u32,
        #[serde(default = "default_adaptive_constant")]
        constant: f64,
    },
    /// Same as `AdaptiveMean` with a Gaussian-weighted window
    AdaptiveGaussian {
        #[serde(default = "default_adaptive_window")]
        window: u32,
        #[serde(default = "default_adaptive_constant")]
        constant: f64,
    },
}

impl Default for Binarization {
    /// Otsu keeps filled walls of any thickness solid.
    fn default() -> Self {
        Binarization::Otsu
    }
}

/// Configuration for the preprocessor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Binarization method; `None` treats any non-white pixel as ink. Default: Otsu
    pub binarization: Option<Binarization>,
    /// Square closing kernel size in pixels; `None` disables closing. Default: 3
    pub closing_kernel: Option<u32>,
    /// Components with fewer pixels are removed; `None` disables. Default: 40
    pub min_component_size: Option<usize>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            binarization: Some(Binarization::default()),
            closing_kernel: Some(3),
            min_component_size: Some(40),
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        match self.binarization {
            Some(Binarization::AdaptiveMean { window, .. })
            | Some(Binarization::AdaptiveGaussian { window, .. }) => {
                ensure(window >= 3 && window % 2 == 1, || {
                    format!("adaptive window must be odd and >= 3, got {window}")
                })?;
            }
            _ => {}
        }
        if let Some(k) = self.closing_kernel {
            ensure((1..=255).contains(&k), || {
                format!("closing kernel must be in 1..=255, got {k}")
            })?;
        }
        Ok(())
    }
}

/// Configuration for the wall likelihood estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LikelihoodConfig {
    /// Try the injected neural classifier first. Default: true
    pub use_classifier: bool,
    /// Extent/thickness ratio that maps to likelihood 1.0. Default: 10
    pub ratio_cap: f32,
    /// Runs shorter than this never count as walls (pixels). Default: 10
    pub min_extent: u32,
    /// Gaussian smoothing sigma; `0` disables. Default: 1.5
    pub blur_sigma: f32,
}

impl Default for LikelihoodConfig {
    fn default() -> Self {
        Self {
            use_classifier: true,
            ratio_cap: 10.0,
            min_extent: 10,
            blur_sigma: 1.5,
        }
    }
}

impl LikelihoodConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.ratio_cap > 0.0, || {
            format!("ratio_cap must be positive, got {}", self.ratio_cap)
        })?;
        ensure(self.blur_sigma >= 0.0 && self.blur_sigma.is_finite(), || {
            format!("blur_sigma must be finite and >= 0, got {}", self.blur_sigma)
        })
    }
}

/// Configuration for the line extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineExtractConfig {
    /// Minimum normalized gradient magnitude of an edge pixel. Default: 0.1
    pub edge_threshold: f32,
    /// Neighbour search radius when tracing chains (pixels). Default: 2
    pub max_gap: u32,
    /// Maximum gradient orientation change inside one chain (radians). Default: 22.5°
    pub chain_angle_tolerance: f64,
    /// Chains with fewer pixels are ignored. Default: 8
    pub min_chain_pixels: usize,
    /// Minimum fitted segment length (pixels). Default: 20
    pub min_length: f64,
    /// Drop diagonal segments. Default: true
    pub orientation_constraint: bool,
    /// Angle tolerance for horizontal/vertical classification (radians). Default: 10°
    pub orientation_tolerance: f64,
}

impl Default for LineExtractConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 0.1,
            max_gap: 2,
            chain_angle_tolerance: 22.5f64.to_radians(),
            min_chain_pixels: 8,
            min_length: 20.0,
            orientation_constraint: true,
            orientation_tolerance: DEFAULT_ORIENTATION_TOLERANCE,
        }
    }
}

impl LineExtractConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.max_gap >= 1, || "max_gap must be at least 1".into())?;
        ensure(self.min_length >= 0.0, || {
            format!("min_length must be >= 0, got {}", self.min_length)
        })?;
        ensure(
            self.orientation_tolerance > 0.0
                && self.orientation_tolerance < std::f64::consts::FRAC_PI_4,
            || {
                format!(
                    "orientation_tolerance must be in (0, PI/4), got {}",
                    self.orientation_tolerance
                )
            },
        )
    }
}

/// How wall interruptions are bridged
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMode {
    /// Chain aligned segments across gaps
    Segments,
    /// Separable morphological closing of the mask before line extraction
    Pixels,
    /// Both of the above
    Both,
}

/// Configuration for the segment consolidator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
    /// Maximum angle between merged segments (radians). Default: 5°
    pub merge_angle_tolerance: f64,
    /// Maximum endpoint distance from the other segment's line (pixels). Default: 6
    pub merge_max_distance: f64,
    /// Maximum gap along the shared axis (pixels). Default: 20
    pub merge_max_gap: f64,
    /// Bridging mode. Default: segments
    pub bridge_mode: BridgeMode,
    /// Maximum perpendicular misalignment for gap chaining (pixels). Default: 6
    pub gap_alignment_tolerance: f64,
    /// Longest opening bridged (pixels). Default: 80
    pub max_gap_length: f64,
    /// Horizontal/vertical closing kernel length for pixel bridging. Default: 25
    pub bridge_kernel: u32,
    /// Angle tolerance for grouping by orientation (radians). Default: 10°
    pub orientation_tolerance: f64,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            merge_angle_tolerance: 5f64.to_radians(),
            merge_max_distance: 6.0,
            merge_max_gap: 20.0,
            bridge_mode: BridgeMode::Segments,
            gap_alignment_tolerance: 6.0,
            max_gap_length: 80.0,
            bridge_kernel: 25,
            orientation_tolerance: DEFAULT_ORIENTATION_TOLERANCE,
        }
    }
}

impl ConsolidateConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.merge_angle_tolerance >= 0.0, || {
            "merge_angle_tolerance must be >= 0".into()
        })?;
        ensure(self.merge_max_distance >= 0.0 && self.merge_max_gap >= 0.0, || {
            "merge distances must be >= 0".into()
        })?;
        ensure(self.max_gap_length >= 0.0, || {
            "max_gap_length must be >= 0".into()
        })?;
        ensure(self.bridge_kernel >= 1, || "bridge_kernel must be >= 1".into())
    }
}

/// One post-processing filter. Filters run in list order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum PostFilter {
    /// Drop segments outside `[min, max]` length
    Length { min: f64, max: Option<f64> },
    /// Force near-axis segments exactly horizontal/vertical
    SnapOrientation { tolerance: f64 },
    /// Round endpoints to a grid
    Grid { size: f64 },
    /// Collapse segments whose endpoints match within `tolerance`
    Dedupe { tolerance: f64 },
    /// Replace the two parallel faces of a thick wall by its centerline
    PairFaces { max_thickness: f64 },
    /// Drop segments with no neighbour within `threshold` of an endpoint
    RemoveIsolated { threshold: f64 },
    /// Drop segments whose nearest parallel neighbour is outside `[min, max]`
    Spacing { min: f64, max: f64 },
}

/// Configuration for the post-processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub filters: Vec<PostFilter>,
    /// Angle tolerance for orientation classes (radians). Default: 10°
    pub orientation_tolerance: f64,
    /// Exterior band as a fraction of `min(width, height)`. Default: 0.15
    pub exterior_edge_ratio: f64,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            filters: vec![
                PostFilter::Length {
                    min: 20.0,
                    max: None,
                },
                PostFilter::SnapOrientation {
                    tolerance: DEFAULT_ORIENTATION_TOLERANCE,
                },
                PostFilter::Grid { size: 5.0 },
                PostFilter::Dedupe { tolerance: 5.0 },
                PostFilter::PairFaces {
                    max_thickness: 30.0,
                },
                PostFilter::RemoveIsolated { threshold: 25.0 },
            ],
            orientation_tolerance: DEFAULT_ORIENTATION_TOLERANCE,
            exterior_edge_ratio: 0.15,
        }
    }
}

impl PostProcessConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.exterior_edge_ratio >= 0.0 && self.exterior_edge_ratio <= 0.5,
            || {
                format!(
                    "exterior_edge_ratio must be in [0, 0.5], got {}",
                    self.exterior_edge_ratio
                )
            },
        )?;
        for filter in &self.filters {
            match *filter {
                PostFilter::Length { min, max } => {
                    ensure(max.map_or(true, |m| m >= min), || {
                        format!("length filter max below min ({min})")
                    })?;
                }
                PostFilter::Grid { size } => {
                    ensure(size > 0.0, || format!("grid size must be > 0, got {size}"))?;
                }
                PostFilter::Spacing { min, max } => {
                    ensure(min <= max, || {
                        format!("spacing range is empty: [{min}, {max}]")
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Configuration for the perimeter builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerimeterConfig {
    /// Strategies tried in order; the first valid outline wins
    pub strategies: Vec<PerimeterStrategy>,
    /// Walls within this distance of an extreme wall belong to its side. Default: 10
    pub side_tolerance: f64,
    /// Vertices closer than this to their successor are dropped. Default: 2
    pub min_vertex_distance: f64,
    /// Cross products below this mark a vertex as collinear. Default: 1.0
    pub collinear_tolerance: f64,
    /// Closing radius for the contour strategy (pixels). Default: 5
    pub contour_closing_radius: u8,
    /// Douglas-Peucker tolerance for the contour strategy. Default: 3
    pub contour_epsilon: f64,
    /// Inset of the default rectangle as a fraction of each dimension. Default: 0.05
    pub default_margin_ratio: f64,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                PerimeterStrategy::WallBased,
                PerimeterStrategy::MorphologicalContour,
                PerimeterStrategy::LineBased,
                PerimeterStrategy::DefaultRectangle,
            ],
            side_tolerance: 10.0,
            min_vertex_distance: 2.0,
            collinear_tolerance: 1.0,
            contour_closing_radius: 5,
            contour_epsilon: 3.0,
            default_margin_ratio: 0.05,
        }
    }
}

impl PerimeterConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(!self.strategies.is_empty(), || {
            "at least one perimeter strategy is required".into()
        })?;
        ensure(
            (0.0..0.5).contains(&self.default_margin_ratio),
            || {
                format!(
                    "default_margin_ratio must be in [0, 0.5), got {}",
                    self.default_margin_ratio
                )
            },
        )
    }
}

/// Configuration for the Harris corner detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    /// Harris sensitivity. Default: 0.04
    pub k: f32,
    /// Structure tensor window radius. Default: 2
    pub window_radius: u32,
    /// Responses below this fraction of the strongest one are dropped. Default: 0.01
    pub threshold_ratio: f32,
    /// Non-maximum suppression radius (pixels). Default: 10
    pub nms_radius: f64,
    /// Maximum number of corners returned. Default: 500
    pub max_corners: usize,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            k: 0.04,
            window_radius: 2,
            threshold_ratio: 0.01,
            nms_radius: 10.0,
            max_corners: 500,
        }
    }
}

impl CornerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.k > 0.0 && self.k < 0.25, || {
            format!("harris k must be in (0, 0.25), got {}", self.k)
        })?;
        ensure(self.window_radius >= 1, || "window_radius must be >= 1".into())
    }
}

/// Configuration for the room box refiner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomBoxConfig {
    /// Flood fill gives up beyond this fraction of the image area. Default: 0.25
    pub max_fill_ratio: f64,
    /// Furthest outward scan when snapping sides to walls (pixels). Default: 40
    pub max_snap_distance: u32,
    /// Wall candidates tried per side in the wall-pair search. Default: 3
    pub candidates_per_side: usize,
    /// Minimum room width and height (pixels). Default: 20
    pub min_room_size: f64,
    /// Maximum long/short side ratio. Default: 5
    pub max_aspect_ratio: f64,
}

impl Default for RoomBoxConfig {
    fn default() -> Self {
        Self {
            max_fill_ratio: 0.25,
            max_snap_distance: 40,
            candidates_per_side: 3,
            min_room_size: 20.0,
            max_aspect_ratio: 5.0,
        }
    }
}

impl RoomBoxConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.max_fill_ratio > 0.0 && self.max_fill_ratio <= 1.0, || {
            format!("max_fill_ratio must be in (0, 1], got {}", self.max_fill_ratio)
        })?;
        ensure(self.candidates_per_side >= 1, || {
            "candidates_per_side must be >= 1".into()
        })?;
        ensure(self.max_aspect_ratio >= 1.0, || {
            format!("max_aspect_ratio must be >= 1, got {}", self.max_aspect_ratio)
        })
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub likelihood: LikelihoodConfig,
    pub lines: LineExtractConfig,
    pub consolidate: ConsolidateConfig,
    pub postprocess: PostProcessConfig,
    pub perimeter: PerimeterConfig,
    pub corners: CornerConfig,
    pub room_box: RoomBoxConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        self.likelihood.validate()?;
        self.lines.validate()?;
        self.consolidate.validate()?;
        self.postprocess.validate()?;
        self.perimeter.validate()?;
        self.corners.validate()?;
        self.room_box.validate()
    }

    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
