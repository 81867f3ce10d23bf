//! Percentile-stretched 8-bit renderings of simulated images.
//!
//! Simulated pixels are signed floats with NaN holes from defects, so the
//! stretch is computed from the finite pixels only and NaN maps to black.
//!
//! # Coordinate Mapping
//! - Array index `[row, col]` maps to image pixel `(col, row)`
//! - Array dimensions `(height, width)` map to image dimensions `(width, height)`

use std::path::Path;

use image::{GrayImage, Luma};
use ndarray::ArrayView2;

use crate::error::{Result, SimError};
use crate::exposure::{Exposure, Mask};

/// Values at the given lower and upper percentiles of the finite pixels.
///
/// Returns `None` when the image has no finite pixel.
pub fn percentile_limits(
    image: ArrayView2<f32>,
    lower_percentile: f64,
    upper_percentile: f64,
) -> Result<Option<(f32, f32)>> {
    if !(0.0..=100.0).contains(&lower_percentile)
        || !(0.0..=100.0).contains(&upper_percentile)
        || lower_percentile >= upper_percentile
    {
        return Err(SimError::invalid(format!(
            "percentiles must satisfy 0 <= lower < upper <= 100, got {lower_percentile} and {upper_percentile}"
        )));
    }

    let mut values: Vec<f32> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Ok(None);
    }
    values.sort_by(f32::total_cmp);

    let last = values.len() - 1;
    let at = |p: f64| values[((p / 100.0 * last as f64).round() as usize).min(last)];
    Ok(Some((at(lower_percentile), at(upper_percentile))))
}

/// Stretch an exposure image between two percentiles into a grayscale image
pub fn exposure_to_gray_image(
    image: ArrayView2<f32>,
    lower_percentile: f64,
    upper_percentile: f64,
) -> Result<GrayImage> {
    let (height, width) = image.dim();
    let mut img = GrayImage::new(width as u32, height as u32);
    let Some((lo, hi)) = percentile_limits(image, lower_percentile, upper_percentile)? else {
        return Ok(img);
    };

    let range = hi - lo;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let value = image[[y as usize, x as usize]];
        let level = if !value.is_finite() {
            0
        } else if range > 0.0 {
            (((value - lo) / range).clamp(0.0, 1.0) * 255.0).round() as u8
        } else {
            // flat image
            128
        };
        *pixel = Luma([level]);
    }
    Ok(img)
}

/// White wherever any of `bits` is set
pub fn mask_to_gray_image(mask: &Mask, bits: i32) -> GrayImage {
    let (height, width) = mask.array.dim();
    let mut img = GrayImage::new(width as u32, height as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let set = mask.array[[y as usize, x as usize]] & bits != 0;
        *pixel = Luma([if set { 255 } else { 0 }]);
    }
    img
}

/// Save an exposure as a PNG with a 1-99.5 percentile stretch
pub fn save_exposure_png<P: AsRef<Path>>(exposure: &Exposure, path: P) -> Result<()> {
    let img = exposure_to_gray_image(exposure.image.view(), 1.0, 99.5)?;
    img.save(path)?;
    Ok(())
}
