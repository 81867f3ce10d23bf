//! Gaussian pixel noise for simulated exposures.

use ndarray::{Array2, ArrayViewMut2};
use rand_distr::{Distribution, Normal};

use crate::algo::parallel::for_each_row_chunk_seeded;
use crate::error::{Result, SimError};

/// Per-epoch noise σ: single-exposure survey noise scaled by `noise_factor`,
/// inflated by √epochs so the coadd keeps full-depth noise.
pub fn epoch_noise(survey_noise: f64, noise_factor: f64, epochs_per_band: usize) -> f64 {
    survey_noise * noise_factor * (epochs_per_band as f64).sqrt()
}

/// Add zero-mean Gaussian noise of width `sigma` to an image in place.
///
/// The noise realization depends only on `seed`.
pub fn add_gaussian_noise(image: ArrayViewMut2<f64>, sigma: f64, seed: u64) -> Result<()> {
    if !(sigma >= 0.0) {
        return Err(SimError::invalid(format!(
            "noise sigma must be non-negative, got {sigma}"
        )));
    }
    if sigma == 0.0 {
        return Ok(());
    }
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| SimError::invalid(format!("noise sigma {sigma}: {e}")))?;

    for_each_row_chunk_seeded(image, seed, None, |_, chunk, rng| {
        chunk.iter_mut().for_each(|p| *p += normal.sample(rng));
    });
    Ok(())
}

/// Uniform variance plane for a noise level
pub fn variance_plane(dim: (usize, usize), sigma: f64) -> Array2<f32> {
    Array2::from_elem(dim, (sigma * sigma) as f32)
}
