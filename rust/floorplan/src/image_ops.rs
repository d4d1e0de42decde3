// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pixel buffer primitives shared by the pipeline stages.
//!
//! Binary masks are `GrayImage`s holding [`INK`] for foreground and `0` for
//! background. Float maps hold one `f32` per pixel. Every function returns a
//! new buffer; inputs are never modified.

use crate::error::{Error, Result};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::region_labelling::{connected_components, Connectivity};
use rayon::prelude::*;

/// Foreground value in binary masks
pub const INK: u8 = 255;

/// Per-pixel `f32` map (likelihoods, gradient magnitudes)
pub type FloatMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Whether `(x, y)` is inside the mask and set. Out-of-range reads are
/// background.
#[inline]
pub fn is_ink(mask: &GrayImage, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= mask.width() as i64 || y >= mask.height() as i64 {
        return false;
    }
    mask.get_pixel(x as u32, y as u32).0[0] != 0
}

/// Read a float map with coordinates clamped to the border.
#[inline]
pub fn sample_clamped(map: &FloatMap, x: f64, y: f64) -> f32 {
    let max_x = map.width().saturating_sub(1) as f64;
    let max_y = map.height().saturating_sub(1) as f64;
    let xi = x.round().clamp(0.0, max_x) as u32;
    let yi = y.round().clamp(0.0, max_y) as u32;
    map.get_pixel(xi, yi).0[0]
}

/// Convert RGBA bytes to a grayscale image using BT.601 luminance weights.
pub fn rgba_to_grayscale(rgba: &[u8], width: u32, height: u32) -> Result<GrayImage> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(Error::BufferSizeMismatch {
            expected,
            actual: rgba.len(),
        });
    }

    let gray: Vec<u8> = rgba
        .chunks_exact(4)
        .map(|px| {
            let r = px[0] as f32;
            let g = px[1] as f32;
            let b = px[2] as f32;
            (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8
        })
        .collect();

    GrayImage::from_raw(width, height, gray).ok_or(Error::BufferSizeMismatch {
        expected: width as usize * height as usize,
        actual: 0,
    })
}

/// Global threshold: pixels darker than `threshold_value` become ink.
pub fn threshold(image: &GrayImage, threshold_value: u8) -> GrayImage {
    let mut result = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = if pixel.0[0] < threshold_value { INK } else { 0 };
        result.put_pixel(x, y, Luma([value]));
    }
    result
}

/// Otsu binarization: pixels at or below the optimal level become ink.
pub fn otsu_threshold(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    threshold(image, level.saturating_add(1))
}

/// Calculate Otsu's optimal threshold level
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = image.width() as f64 * image.height() as f64;
    if total_pixels == 0.0 {
        return 128;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0.0;
    let mut max_variance = 0.0;
    let mut best_threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }

        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        sum_background += t as f64 * count as f64;

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;

        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

/// Summed-area table with a zero row and column prepended.
struct IntegralImage {
    width: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let w = image.width() as usize;
        let h = image.height() as usize;
        let width = w + 1;
        let mut sums = vec![0u64; width * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += raw[y * w + x] as u64;
                sums[(y + 1) * width + x + 1] = sums[y * width + x + 1] + row_sum;
            }
        }
        Self { width, sums }
    }

    /// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]`.
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let w = self.width;
        self.sums[(y1 + 1) * w + x1 + 1] + self.sums[y0 * w + x0]
            - self.sums[y0 * w + x1 + 1]
            - self.sums[(y1 + 1) * w + x0]
    }
}

/// Adaptive threshold against the local window mean.
///
/// A pixel is ink when it is darker than `mean - constant` over a
/// `window x window` neighbourhood clipped to the image.
pub fn adaptive_threshold_mean(image: &GrayImage, window: u32, constant: f64) -> GrayImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let radius = (window / 2) as usize;
    let integral = IntegralImage::new(image);
    let raw = image.as_raw();

    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(h - 1);
            for (x, value) in row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(radius);
                let x1 = (x + radius).min(w - 1);
                let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
                let mean = integral.sum(x0, y0, x1, y1) as f64 / count;
                if (raw[y * w + x] as f64) < mean - constant {
                    *value = INK;
                }
            }
        });

    GrayImage::from_raw(image.width(), image.height(), out)
        .unwrap_or_else(|| GrayImage::new(image.width(), image.height()))
}

/// Adaptive threshold against a Gaussian-weighted local mean.
pub fn adaptive_threshold_gaussian(image: &GrayImage, window: u32, constant: f64) -> GrayImage {
    // Same sigma rule as OpenCV for a given aperture.
    let sigma = 0.3 * ((window as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let as_float = gray_to_float(image);
    let local_mean = gaussian_blur_map(&as_float, sigma);

    let mut result = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y).0[0] as f64;
        if (pixel.0[0] as f64) < mean - constant {
            result.put_pixel(x, y, Luma([INK]));
        }
    }
    result
}

/// Morphological dilation with a square kernel of side `2 * radius + 1`
pub fn dilate(image: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::dilate(image, Norm::LInf, radius)
}

/// Morphological erosion with a square kernel of side `2 * radius + 1`
pub fn erode(image: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::erode(image, Norm::LInf, radius)
}

/// Morphological closing (dilate then erode) - fills small gaps
pub fn morphological_close(image: &GrayImage, radius: u8) -> GrayImage {
    let dilated = dilate(image, radius);
    erode(&dilated, radius)
}

/// Invert a binary image
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        pixel.0[0] = 255 - pixel.0[0];
    }
    result
}

/// Remove 4-connected ink components smaller than `min_size` pixels.
pub fn remove_small_components(mask: &GrayImage, min_size: usize) -> GrayImage {
    if min_size <= 1 {
        return mask.clone();
    }
    let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; max_label + 1];
    for p in labels.pixels() {
        sizes[p.0[0] as usize] += 1;
    }

    let mut result = GrayImage::new(mask.width(), mask.height());
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p.0[0] as usize;
        if label != 0 && sizes[label] >= min_size {
            result.put_pixel(x, y, Luma([INK]));
        }
    }
    result
}

/// Closing with a `1 x length` kernel followed by a `length x 1` kernel.
///
/// Bridges straight gaps of up to `length - 1` pixels along rows and
/// columns without thickening strokes sideways.
pub fn separable_close(mask: &GrayImage, length: u32) -> GrayImage {
    if length <= 1 {
        return mask.clone();
    }
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let mut data = mask.as_raw().clone();
    close_rows(&mut data, w, h, length as usize);
    let mut transposed = transpose(&data, w, h);
    close_rows(&mut transposed, h, w, length as usize);
    let data = transpose(&transposed, h, w);
    GrayImage::from_raw(mask.width(), mask.height(), data)
        .unwrap_or_else(|| mask.clone())
}

fn transpose(data: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            out[x * h + y] = data[y * w + x];
        }
    }
    out
}

/// Fill background runs of length `< length` enclosed by ink on both sides
/// of the same row. Equivalent to a 1D closing for interior gaps.
fn close_rows(data: &mut [u8], w: usize, h: usize, length: usize) {
    if w == 0 {
        return;
    }
    data.par_chunks_mut(w).take(h).for_each(|row| {
        let mut last_ink: Option<usize> = None;
        for x in 0..row.len() {
            if row[x] != 0 {
                if let Some(prev) = last_ink {
                    let gap = x - prev - 1;
                    if gap > 0 && gap < length {
                        for v in &mut row[prev + 1..x] {
                            *v = INK;
                        }
                    }
                }
                last_ink = Some(x);
            }
        }
    });
}

/// Convert a grayscale image to a float map in `[0, 255]`.
pub fn gray_to_float(image: &GrayImage) -> FloatMap {
    let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    FloatMap::from_raw(image.width(), image.height(), data)
        .unwrap_or_else(|| FloatMap::new(image.width(), image.height()))
}

/// Quantize a `[0, 1]` map to 8 bits.
pub fn unit_map_to_gray(map: &FloatMap) -> GrayImage {
    let data: Vec<u8> = map
        .as_raw()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(map.width(), map.height(), data)
        .unwrap_or_else(|| GrayImage::new(map.width(), map.height()))
}

/// Gaussian blur of a float map. A non-positive sigma returns the map
/// unchanged.
pub fn gaussian_blur_map(map: &FloatMap, sigma: f32) -> FloatMap {
    if sigma <= 0.0 || map.width() == 0 || map.height() == 0 {
        return map.clone();
    }
    gaussian_blur_f32(map, sigma)
}
