//! Per-band observing conditions: pixel noise and magnitude-to-flux conversion.
//!
//! Images are always in flux units referenced to [`ZERO_POINT`], so a source
//! of magnitude `m` has total flux `10^(0.4 (ZERO_POINT - m))` in every band.
//! Surveys differ only in the per-pixel noise of a single full-depth exposure.
//!
//! For the LSST-like bands used with the wldeblend population the noise is
//! the sky shot noise of one full-depth exposure:
//!
//! ```text
//! sky_e      = zp_e · t · 10^(-0.4 (sky_mag - 24)) · scale²
//! e_per_unit = zp_e · t · 10^(-0.4 (ZERO_POINT - 24))
//! noise      = √sky_e / e_per_unit
//! ```
//!
//! where `zp_e` is the electron rate of a magnitude 24 source.

use crate::constants::{mag_to_flux, SCALE, ZERO_POINT};
use crate::error::{Result, SimError};

/// Per-pixel noise of the fixed galaxy population
pub const BASIC_NOISE: f64 = 1.0;

/// LSST-like band parameters: (band, e-/s at mag 24, exposure seconds, sky mag/arcsec²)
const WLDEBLEND_BANDS: [(&str, f64, f64, f64); 6] = [
    ("u", 9.16, 1680.0, 22.99),
    ("g", 50.70, 2400.0, 22.26),
    ("r", 43.70, 5520.0, 21.2),
    ("i", 32.36, 5520.0, 20.48),
    ("z", 22.68, 4800.0, 19.6),
    ("y", 10.58, 4800.0, 18.61),
];

#[derive(Debug, Clone, PartialEq)]
pub struct BandSurvey {
    pub band: String,
    pub zero_point_rate: f64,
    pub exposure_time: f64,
    pub sky_brightness: f64,
}

impl BandSurvey {
    pub fn lookup(band: &str) -> Result<Self> {
        WLDEBLEND_BANDS
            .iter()
            .find(|(name, ..)| *name == band)
            .map(|&(name, zp, t, sky)| BandSurvey {
                band: name.to_string(),
                zero_point_rate: zp,
                exposure_time: t,
                sky_brightness: sky,
            })
            .ok_or_else(|| SimError::invalid(format!("no survey parameters for band '{band}'")))
    }

    /// Electrons collected per image flux unit
    pub fn electrons_per_unit(&self) -> f64 {
        self.zero_point_rate * self.exposure_time * 10f64.powf(-0.4 * (ZERO_POINT - 24.0))
    }

    /// Sky electrons per pixel
    pub fn sky_electrons(&self) -> f64 {
        self.zero_point_rate
            * self.exposure_time
            * 10f64.powf(-0.4 * (self.sky_brightness - 24.0))
            * SCALE
            * SCALE
    }

    pub fn noise(&self) -> f64 {
        self.sky_electrons().sqrt() / self.electrons_per_unit()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Survey {
    /// Constant noise, band independent
    Basic { noise: f64 },
    WLDeblend(BandSurvey),
}

impl Survey {
    pub fn basic() -> Self {
        Survey::Basic { noise: BASIC_NOISE }
    }

    pub fn wldeblend(band: &str) -> Result<Self> {
        Ok(Survey::WLDeblend(BandSurvey::lookup(band)?))
    }

    /// Per-pixel noise σ of one full-depth exposure
    pub fn noise(&self) -> f64 {
        match self {
            Survey::Basic { noise } => *noise,
            Survey::WLDeblend(b) => b.noise(),
        }
    }

    pub fn flux_for_mag(&self, mag: f64) -> f64 {
        mag_to_flux(mag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(BandSurvey::lookup("i").is_ok());
        assert!(matches!(
            BandSurvey::lookup("k"),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_i_band_noise() {
        let b = BandSurvey::lookup("i").unwrap();
        let expected = (32.36 * 5520.0 * 10f64.powf(-0.4 * (20.48 - 24.0)) * 0.04).sqrt()
            / (32.36 * 5520.0 * 10f64.powf(-2.4));
        assert_relative_eq!(b.noise(), expected, max_relative = 1e-12);
        assert!(b.noise() > 0.0 && b.noise() < 1.0);
    }

    #[test]
    fn test_basic_survey() {
        let s = Survey::basic();
        assert_eq!(s.noise(), BASIC_NOISE);
        assert_relative_eq!(s.flux_for_mag(ZERO_POINT), 1.0);
    }
}
