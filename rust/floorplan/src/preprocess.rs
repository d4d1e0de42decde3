// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Preprocessing: grayscale image to a clean binary ink mask

use crate::config::{Binarization, PreprocessConfig};
use crate::error::{Error, Result};
use crate::image_ops::{
    adaptive_threshold_gaussian, adaptive_threshold_mean, morphological_close, otsu_threshold,
    remove_small_components, threshold,
};
use image::GrayImage;

/// Any pixel darker than this counts as ink when binarization is disabled.
const DEFAULT_INK_LEVEL: u8 = 250;

/// Binarize a grayscale image and clean the resulting mask.
///
/// Steps (each optional): threshold, square closing, small component
/// removal. The result holds `INK` for foreground.
pub fn preprocess(gray: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(Error::EmptyImage {
            width: gray.width(),
            height: gray.height(),
        });
    }

    let mask = binarize(gray, config.binarization);

    let mask = match config.closing_kernel {
        Some(kernel) if kernel > 1 => {
            let radius = (kernel / 2).clamp(1, u8::MAX as u32) as u8;
            morphological_close(&mask, radius)
        }
        _ => mask,
    };

    let mask = match config.min_component_size {
        Some(min_size) => remove_small_components(&mask, min_size),
        None => mask,
    };

    tracing::debug!(
        width = mask.width(),
        height = mask.height(),
        ink = mask.pixels().filter(|p| p.0[0] != 0).count(),
        "Preprocessed ink mask"
    );

    Ok(mask)
}

/// Apply the configured binarization method.
pub fn binarize(gray: &GrayImage, method: Option<Binarization>) -> GrayImage {
    match method {
        None => threshold(gray, DEFAULT_INK_LEVEL),
        Some(Binarization::Global { threshold: t }) => threshold(gray, t),
        Some(Binarization::Otsu) => otsu_threshold(gray),
        Some(Binarization::AdaptiveMean { window, constant }) => {
            adaptive_threshold_mean(gray, window, constant)
        }
        Some(Binarization::AdaptiveGaussian { window, constant }) => {
            adaptive_threshold_gaussian(gray, window, constant)
        }
    }
}
