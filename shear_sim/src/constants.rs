//! Fixed survey and layout constants shared across the simulator.
//!
//! Fluxes everywhere in this crate are expressed in units where a source of
//! magnitude [`ZERO_POINT`] has a flux of one.

/// Magnitude zero point of the flux units used for all rendered images
pub const ZERO_POINT: f64 = 30.0;

/// Pixel scale in arcseconds per pixel
pub const SCALE: f64 = 0.2;

/// Right ascension of the world origin (field centre) in degrees
pub const WORLD_ORIGIN_RA_DEG: f64 = 200.0;

/// Declination of the world origin (field centre) in degrees
pub const WORLD_ORIGIN_DEC_DEG: f64 = 0.0;

/// Half-range of the uniform sub-pixel dither, in pixels
pub const DITHER_RANGE: f64 = 0.5;

/// Extra single-epoch pixels added on top of the √2 enlargement for rotated epochs
pub const ROTATE_SE_PAD: usize = 20;

/// Default side length of PSF stamps in pixels
pub const DEFAULT_PSF_DIM: usize = 51;

/// Grid layout spacing in arcseconds
pub const GRID_SPACING: f64 = 9.5;

/// Hexagonal layout nearest-neighbour spacing in arcseconds
pub const HEX_SPACING: f64 = 9.5;

/// Number density of fixed galaxies for random layouts, per square arcminute
pub const FIXED_RANDOM_DENSITY: f64 = 80.0;

/// FWHM of the fixed PSFs in arcseconds
pub const FIXED_PSF_FWHM: f64 = 0.8;

/// Moffat β of the fixed Moffat PSF
pub const FIXED_MOFFAT_BETA: f64 = 2.5;

/// Default star density range per square arcminute when none is configured
pub const DEFAULT_MIN_STAR_DENSITY: f64 = 2.0;
pub const DEFAULT_MAX_STAR_DENSITY: f64 = 100.0;

/// Stars brighter than this magnitude receive a `BRIGHT` mask
pub const BRIGHT_MAG: f64 = 18.0;

/// Pixel value at which the detector saturates
pub const DEFAULT_SAT_VALUE: f64 = 1.0e5;

/// Bleed trails longer than this many pixels are drawn three columns wide
pub const WIDE_BLEED_LENGTH: usize = 50;

/// Mean number of cosmic rays per single-epoch pixel
pub const COSMIC_RAY_RATE: f64 = 1.0e-4;

/// Mean number of bad columns per exposure
pub const MEAN_BAD_COLUMNS: f64 = 1.0;

/// Largest FFT stamp (in native pixels) drawn by the `auto` method before
/// falling back to photon shooting
pub const MAX_FFT_STAMP: usize = 255;

/// Upper bound on the number of photons shot per object
pub const MAX_PHOTONS: usize = 200_000;

/// Number of square arcseconds in one square arcminute
pub const ARCSEC2_PER_ARCMIN2: f64 = 3600.0;

/// Convert a magnitude to a flux in [`ZERO_POINT`] units
pub fn mag_to_flux(mag: f64) -> f64 {
    10f64.powf(0.4 * (ZERO_POINT - mag))
}

/// Convert a flux in [`ZERO_POINT`] units to a magnitude
pub fn flux_to_mag(flux: f64) -> f64 {
    ZERO_POINT - 2.5 * flux.log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_point_flux_is_unity() {
        assert_relative_eq!(mag_to_flux(ZERO_POINT), 1.0);
    }

    #[test]
    fn test_five_magnitudes_is_factor_hundred() {
        assert_relative_eq!(mag_to_flux(20.0) / mag_to_flux(25.0), 100.0, epsilon = 1e-9);
        assert_relative_eq!(flux_to_mag(mag_to_flux(17.0)), 17.0, epsilon = 1e-12);
    }
}
