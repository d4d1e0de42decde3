// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for floor plan extraction.
//!
//! Only invalid input is an error. Missing geometry is reported as `None`
//! or an empty list by the individual stages.

/// Result type alias for floor plan extraction.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a detection call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The image has no pixels.
    #[error("image has zero size: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// The pixel buffer does not match the stated dimensions.
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration document could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Failures of an external wall classifier. These never escape the
/// likelihood stage.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// No model is loaded.
    #[error("wall classifier unavailable")]
    Unavailable,

    /// The model ran but failed.
    #[error("wall classifier inference failed: {0}")]
    Inference(String),

    /// The model returned a map of the wrong size.
    #[error("wall classifier returned {actual} values, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
}
