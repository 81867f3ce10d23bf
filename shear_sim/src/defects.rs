//! Detector artefacts: bad columns, cosmic rays, saturation and bleed trails,
//! plus the masks placed around bright stars.
//!
//! Bad columns and cosmic rays replace pixel values with NaN and set the
//! `BAD` or `CR` plane on exactly those pixels. Saturation never produces
//! NaN; it clips values and sets `SAT`.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView2};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::catalogs::layout::draw_count;
use crate::constants::{
    BRIGHT_MAG, COSMIC_RAY_RATE, DEFAULT_SAT_VALUE, MEAN_BAD_COLUMNS, WIDE_BLEED_LENGTH,
};
use crate::exposure::{Mask, MaskPlane};

/// Bad column widths and their relative frequencies
const BAD_COLUMN_WIDTHS: [usize; 4] = [1, 2, 5, 10];
const BAD_COLUMN_PROBS: [f64; 4] = [0.8, 0.1, 0.075, 0.025];
/// Column length as a fraction of the image height, per width class
const BAD_COLUMN_MIN_FRAC: [f64; 4] = [1.0, 1.0, 0.25, 0.25];
const BAD_COLUMN_MAX_FRAC: [f64; 4] = [1.0, 1.0, 0.75, 0.75];
/// Probability that a column has an unaffected gap, per width class
const BAD_COLUMN_GAP_PROB: [f64; 4] = [0.30, 0.30, 0.0, 0.0];
/// Gap length as a fraction of the column length
const BAD_COLUMN_GAP_FRAC: (f64, f64) = (0.1, 0.3);

/// Cosmic ray track lengths in pixels
const COSMIC_RAY_LENGTH: (f64, f64) = (1.0, 10.0);

/// How saturated stars are clipped and bled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationPolicy {
    pub sat_value: f64,
    /// Trails longer than this are drawn `wide_width` columns wide
    pub wide_bleed_length: usize,
    pub narrow_width: usize,
    pub wide_width: usize,
}

impl Default for SaturationPolicy {
    fn default() -> Self {
        Self {
            sat_value: DEFAULT_SAT_VALUE,
            wide_bleed_length: WIDE_BLEED_LENGTH,
            narrow_width: 1,
            wide_width: 3,
        }
    }
}

impl SaturationPolicy {
    /// Width and length of the trail holding `excess` flux above saturation
    pub fn bleed_shape(&self, excess: f64) -> (usize, usize) {
        if !(excess > 0.0) || !(self.sat_value > 0.0) {
            return (0, 0);
        }
        let narrow = self.narrow_width.max(1);
        let length = (excess / (self.sat_value * narrow as f64)).ceil() as usize;
        if length > self.wide_bleed_length {
            let wide = self.wide_width.max(1);
            let length = (excess / (self.sat_value * wide as f64)).ceil() as usize;
            (wide, length)
        } else {
            (narrow, length)
        }
    }
}

fn flag_nan(image: &mut Array2<f64>, mask: &mut Mask, y: usize, x: usize, plane: MaskPlane) {
    image[[y, x]] = f64::NAN;
    mask.set(y, x, plane);
}

/// Add a Poisson number of bad columns; returns the number added
pub fn add_bad_columns<R: Rng + ?Sized>(
    image: &mut Array2<f64>,
    mask: &mut Mask,
    rng: &mut R,
) -> usize {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return 0;
    }
    let n = draw_count(rng, MEAN_BAD_COLUMNS);
    let Ok(kinds) = WeightedIndex::new(BAD_COLUMN_PROBS) else {
        return 0;
    };

    for _ in 0..n {
        let k = kinds.sample(rng);
        let col_width = BAD_COLUMN_WIDTHS[k];
        let x0 = rng.gen_range(0..width);

        let frac = if BAD_COLUMN_MAX_FRAC[k] > BAD_COLUMN_MIN_FRAC[k] {
            rng.gen_range(BAD_COLUMN_MIN_FRAC[k]..BAD_COLUMN_MAX_FRAC[k])
        } else {
            BAD_COLUMN_MIN_FRAC[k]
        };
        let length = ((frac * height as f64).round() as usize).clamp(1, height);
        let y0 = if length < height {
            rng.gen_range(0..=height - length)
        } else {
            0
        };

        let gap = if rng.gen::<f64>() < BAD_COLUMN_GAP_PROB[k] {
            let gap_len = (rng.gen_range(BAD_COLUMN_GAP_FRAC.0..BAD_COLUMN_GAP_FRAC.1)
                * length as f64) as usize;
            let start = y0 + rng.gen_range(0..=length - gap_len);
            Some(start..start + gap_len)
        } else {
            None
        };

        for y in y0..y0 + length {
            if gap.as_ref().is_some_and(|g| g.contains(&y)) {
                continue;
            }
            for x in x0..(x0 + col_width).min(width) {
                flag_nan(image, mask, y, x, MaskPlane::Bad);
            }
        }
    }
    n
}

/// Add short straight cosmic-ray tracks; returns the number added
pub fn add_cosmic_rays<R: Rng + ?Sized>(
    image: &mut Array2<f64>,
    mask: &mut Mask,
    rng: &mut R,
) -> usize {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return 0;
    }
    let n = draw_count(rng, COSMIC_RAY_RATE * (height * width) as f64);

    for _ in 0..n {
        let x0 = rng.gen_range(0.0..width as f64);
        let y0 = rng.gen_range(0.0..height as f64);
        let angle = rng.gen_range(0.0..PI);
        let length = rng.gen_range(COSMIC_RAY_LENGTH.0..COSMIC_RAY_LENGTH.1);
        let (s, c) = angle.sin_cos();

        let steps = (2.0 * length).ceil() as usize;
        for i in 0..=steps {
            let t = length * i as f64 / steps as f64;
            let x = (x0 + t * c).floor();
            let y = (y0 + t * s).floor();
            if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
                continue;
            }
            flag_nan(image, mask, y as usize, x as usize, MaskPlane::Cr);
        }
    }
    n
}

/// Clip pixels above `sat_value` and flag them `SAT`; returns the count
pub fn apply_saturation(image: &mut Array2<f64>, mask: &mut Mask, sat_value: f64) -> usize {
    let mut count = 0;
    for ((y, x), value) in image.indexed_iter_mut() {
        if *value > sat_value {
            *value = sat_value;
            mask.set(y, x, MaskPlane::Sat);
            count += 1;
        }
    }
    count
}

/// Flux above saturation in the pixels of a star with unit-sum PSF image
/// `psf_stamp` scaled to `flux`
pub fn saturation_excess(flux: f64, psf_stamp: ArrayView2<f64>, sat_value: f64) -> f64 {
    psf_stamp
        .iter()
        .map(|&p| (flux * p - sat_value).max(0.0))
        .sum()
}

/// Draw a saturated trail along the column through pixel `(x, y)`.
///
/// Returns the number of pixels set.
pub fn add_bleed(
    image: &mut Array2<f64>,
    mask: &mut Mask,
    x: i64,
    y: i64,
    excess: f64,
    policy: &SaturationPolicy,
) -> usize {
    let (bleed_width, length) = policy.bleed_shape(excess);
    if length == 0 {
        return 0;
    }
    let (height, width) = image.dim();
    let x_lo = x - (bleed_width as i64 - 1) / 2;
    let y_lo = y - length as i64 / 2;

    let mut count = 0;
    for yy in y_lo..y_lo + length as i64 {
        for xx in x_lo..x_lo + bleed_width as i64 {
            if xx < 0 || yy < 0 || xx >= width as i64 || yy >= height as i64 {
                continue;
            }
            let (yu, xu) = (yy as usize, xx as usize);
            image[[yu, xu]] = policy.sat_value;
            mask.set(yu, xu, MaskPlane::Sat);
            count += 1;
        }
    }
    count
}

/// Radius in pixels of the `BRIGHT` mask for a star of magnitude `mag`
pub fn bright_mask_radius(mag: f64, psf_fwhm_pixels: f64) -> f64 {
    (2.0 * psf_fwhm_pixels * 10f64.powf(0.1 * (BRIGHT_MAG - mag))).max(3.0)
}

/// Set `BRIGHT` inside a circle; returns the number of pixels touched
pub fn add_bright_mask(mask: &mut Mask, x: f64, y: f64, radius: f64) -> usize {
    let (height, width) = mask.array.dim();
    let r_sq = radius * radius;
    let x_lo = (x - radius).floor().max(0.0) as usize;
    let y_lo = (y - radius).floor().max(0.0) as usize;
    let x_hi = ((x + radius).ceil() as i64).min(width as i64 - 1);
    let y_hi = ((y + radius).ceil() as i64).min(height as i64 - 1);
    if x_hi < 0 || y_hi < 0 {
        return 0;
    }

    let mut count = 0;
    for yy in y_lo..=y_hi as usize {
        for xx in x_lo..=x_hi as usize {
            let dx = xx as f64 - x;
            let dy = yy as f64 - y;
            if dx * dx + dy * dy <= r_sq {
                mask.set(yy, xx, MaskPlane::Bright);
                count += 1;
            }
        }
    }
    count
}
