//! Point spread function models.
//!
//! Two families are provided: a position-independent [`FixedPsf`] (Gaussian or
//! Moffat) and a [`PowerSpectrumPsf`] whose size and shape vary smoothly over
//! the focal plane. The varying model draws Gaussian random fields for the
//! PSF shear `(g1, g2)` and log size from a power-law power spectrum with an
//! inverse FFT, samples them on a coarse grid and interpolates bilinearly.
//!
//! PSF profiles are expressed in tangent-plane arcseconds with unit flux.

use std::str::FromStr;

use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::algo::bilinear::GridInterpolator;
use crate::algo::fft::{fft2_inplace, ifft2_inplace};
use crate::constants::{FIXED_MOFFAT_BETA, FIXED_PSF_FWHM, SCALE};
use crate::draw::{draw_pixelized, to_pixel_frame};
use crate::error::{Result, SimError};
use crate::profile::Profile;
use crate::wcs::TanWcs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedPsfKind {
    Gauss,
    Moffat,
}

impl FromStr for FixedPsfKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauss" => Ok(FixedPsfKind::Gauss),
            "moffat" => Ok(FixedPsfKind::Moffat),
            other => Err(SimError::invalid(format!("unknown fixed psf type '{other}'"))),
        }
    }
}

/// Position-independent PSF
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPsf {
    pub kind: FixedPsfKind,
    pub fwhm: f64,
    profile: Profile,
}

impl FixedPsf {
    pub fn new(kind: FixedPsfKind) -> Self {
        let profile = match kind {
            FixedPsfKind::Gauss => Profile::gaussian_from_fwhm(FIXED_PSF_FWHM, 1.0),
            FixedPsfKind::Moffat => Profile::moffat_from_fwhm(FIXED_MOFFAT_BETA, FIXED_PSF_FWHM, 1.0),
        };
        Self {
            kind,
            fwhm: FIXED_PSF_FWHM,
            profile,
        }
    }
}

/// Tunables for the spatially varying PSF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSpectrumPsfConfig {
    /// Median FWHM in arcseconds
    pub median_fwhm: f64,
    /// Moffat β of the base profile
    pub beta: f64,
    /// RMS of each PSF shear component
    pub g_rms: f64,
    /// RMS of the natural log of the size ratio
    pub size_rms: f64,
    /// Power spectrum slope, `P(k) ∝ k^(-power_law_index)`
    pub power_law_index: f64,
    /// Field sample spacing in pixels
    pub grid_spacing: f64,
    /// Pixels of padding around the requested dimension
    pub buff: usize,
}

impl Default for PowerSpectrumPsfConfig {
    fn default() -> Self {
        Self {
            median_fwhm: FIXED_PSF_FWHM,
            beta: 4.765,
            g_rms: 0.01,
            size_rms: 0.02,
            power_law_index: 2.0,
            grid_spacing: 8.0,
            buff: 20,
        }
    }
}

impl PowerSpectrumPsfConfig {
    fn validate(&self) -> Result<()> {
        if !(self.median_fwhm > 0.0) {
            return Err(SimError::invalid("ps psf median_fwhm must be positive"));
        }
        if !(self.beta > 1.0) {
            return Err(SimError::invalid("ps psf beta must exceed 1"));
        }
        if !(self.grid_spacing > 0.0) {
            return Err(SimError::invalid("ps psf grid_spacing must be positive"));
        }
        if !(self.g_rms >= 0.0 && self.g_rms < 0.2) {
            return Err(SimError::invalid("ps psf g_rms must be in [0, 0.2)"));
        }
        if !(self.size_rms >= 0.0) {
            return Err(SimError::invalid("ps psf size_rms must be non-negative"));
        }
        Ok(())
    }
}

/// PSF whose shear and size follow smooth random fields over the image plane
#[derive(Debug, Clone)]
pub struct PowerSpectrumPsf {
    pub dim: usize,
    pub config: PowerSpectrumPsfConfig,
    g1: GridInterpolator,
    g2: GridInterpolator,
    log_size: GridInterpolator,
}

impl PowerSpectrumPsf {
    /// Draw the random fields covering `dim + 2·buff` pixels
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        dim: usize,
        config: PowerSpectrumPsfConfig,
    ) -> Result<Self> {
        config.validate()?;
        if dim == 0 {
            return Err(SimError::invalid("ps psf dimension must be positive"));
        }

        let span = (dim + 2 * config.buff) as f64;
        let n = (span / config.grid_spacing).ceil() as usize + 2;
        let origin = (-(config.buff as f64), -(config.buff as f64));

        let mut planner = FftPlanner::new();
        let mut field = |rms: f64, rng: &mut R| {
            let data = gaussian_random_field(rng, n, config.power_law_index, rms, &mut planner);
            GridInterpolator::new(origin, config.grid_spacing, data)
        };
        let g1 = field(config.g_rms, rng);
        let g2 = field(config.g_rms, rng);
        let log_size = field(config.size_rms, rng);

        Ok(Self {
            dim,
            config,
            g1,
            g2,
            log_size,
        })
    }

    /// `(g1, g2, fwhm)` at a pixel position
    pub fn params_at(&self, x: f64, y: f64) -> (f64, f64, f64) {
        let g1 = self.g1.interpolate(x, y);
        let g2 = self.g2.interpolate(x, y);
        let fwhm = self.config.median_fwhm * self.log_size.interpolate(x, y).exp();
        (g1, g2, fwhm)
    }

    pub fn profile_at(&self, x: f64, y: f64) -> Profile {
        let (g1, g2, fwhm) = self.params_at(x, y);
        Profile::moffat_from_fwhm(self.config.beta, fwhm, 1.0).shear(g1, g2)
    }
}

/// Real Gaussian random field on an `n × n` grid with power spectrum
/// `P(k) ∝ k^(-index)`, zero mean and the requested RMS.
fn gaussian_random_field<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    index: f64,
    rms: f64,
    planner: &mut FftPlanner<f64>,
) -> Array2<f64> {
    let mut spectrum = Array2::from_shape_simple_fn((n, n), || {
        Complex64::new(rng.sample(StandardNormal), 0.0)
    });
    fft2_inplace(&mut spectrum, planner);

    let freq = |i: usize| {
        let k = if i <= n / 2 { i as f64 } else { i as f64 - n as f64 };
        k / n as f64
    };
    for ((i, j), value) in spectrum.indexed_iter_mut() {
        let k = (freq(i).powi(2) + freq(j).powi(2)).sqrt();
        let amplitude = if k > 0.0 { k.powf(-0.5 * index) } else { 0.0 };
        *value *= amplitude;
    }
    ifft2_inplace(&mut spectrum, planner);

    let mut field = spectrum.mapv(|c| c.re);
    let mean = field.mean().unwrap_or(0.0);
    field -= mean;
    let std = field.std(0.0);
    if std > 0.0 {
        field *= rms / std;
    }
    field
}

#[derive(Debug, Clone)]
pub enum Psf {
    Fixed(FixedPsf),
    PowerSpectrum(PowerSpectrumPsf),
}

impl Psf {
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, Psf::PowerSpectrum(_))
    }

    /// Unit-flux PSF profile at SE pixel position `(x, y)`, in arcseconds
    pub fn profile_at(&self, x: f64, y: f64) -> Profile {
        match self {
            Psf::Fixed(p) => p.profile.clone(),
            Psf::PowerSpectrum(p) => p.profile_at(x, y),
        }
    }

    /// FWHM in arcseconds at `(x, y)`
    pub fn fwhm_at(&self, x: f64, y: f64) -> f64 {
        match self {
            Psf::Fixed(p) => p.fwhm,
            Psf::PowerSpectrum(p) => p.params_at(x, y).2,
        }
    }

    /// Largest image dimension the PSF is defined over, if bounded
    pub fn max_dim(&self) -> Option<usize> {
        match self {
            Psf::Fixed(_) => None,
            Psf::PowerSpectrum(p) => Some(p.dim),
        }
    }

    /// Pixelized PSF image at `(x, y)` on a `psf_dim × psf_dim` stamp.
    ///
    /// The stamp sums to one and its centre is offset from the middle pixel by
    /// the sub-pixel phase of the position.
    pub fn draw_stamp(&self, x: f64, y: f64, psf_dim: usize, wcs: &TanWcs) -> Array2<f64> {
        let profile = to_pixel_frame(&self.profile_at(x, y), &wcs.jacobian())
            .shift(x - x.round(), y - y.round());
        let mut stamp = draw_pixelized(&profile, psf_dim);
        let total = stamp.sum();
        if total > 0.0 {
            stamp /= total;
        }
        stamp
    }
}

/// Build a fixed PSF from its type name (`gauss` or `moffat`)
pub fn make_fixed_psf(psf_type: &str) -> Result<Psf> {
    let kind = psf_type.parse::<FixedPsfKind>()?;
    Ok(Psf::Fixed(FixedPsf::new(kind)))
}

/// Build a spatially varying PSF covering an image of side `dim` pixels
pub fn make_ps_psf<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Result<Psf> {
    make_ps_psf_with_config(rng, dim, PowerSpectrumPsfConfig::default())
}

pub fn make_ps_psf_with_config<R: Rng + ?Sized>(
    rng: &mut R,
    dim: usize,
    config: PowerSpectrumPsfConfig,
) -> Result<Psf> {
    Ok(Psf::PowerSpectrum(PowerSpectrumPsf::new(rng, dim, config)?))
}

/// FWHM in pixels for stamp sizing
pub(crate) fn fwhm_pixels(psf: &Psf, x: f64, y: f64) -> f64 {
    psf.fwhm_at(x, y) / SCALE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{WORLD_ORIGIN_DEC_DEG, WORLD_ORIGIN_RA_DEG};
    use crate::units::{Angle, AngleExt};
    use crate::wcs::SkyCoord;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_wcs(theta: Option<f64>) -> TanWcs {
        TanWcs::new(
            Angle::from_arcseconds(SCALE),
            (50.0, 50.0),
            SkyCoord::from_degrees(WORLD_ORIGIN_RA_DEG, WORLD_ORIGIN_DEC_DEG),
            theta,
        )
    }

    #[test]
    fn test_make_fixed_psf_types() {
        assert!(matches!(
            make_fixed_psf("gauss").unwrap(),
            Psf::Fixed(FixedPsf {
                kind: FixedPsfKind::Gauss,
                ..
            })
        ));
        assert!(make_fixed_psf("moffat").is_ok());
        assert!(matches!(
            make_fixed_psf("airy"),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stamp_unit_sum_and_centred() {
        let psf = make_fixed_psf("gauss").unwrap();
        let stamp = psf.draw_stamp(20.0, 30.0, 51, &test_wcs(None));
        assert_eq!(stamp.dim(), (51, 51));
        assert_relative_eq!(stamp.sum(), 1.0, epsilon = 1e-12);

        let peak = stamp.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(stamp[[25, 25]], peak);
        assert_relative_eq!(stamp[[25, 24]], stamp[[25, 26]], epsilon = 1e-12);
    }

    #[test]
    fn test_stamp_follows_subpixel_phase() {
        let psf = make_fixed_psf("moffat").unwrap();
        let stamp = psf.draw_stamp(20.3, 30.0, 25, &test_wcs(None));
        assert!(stamp[[12, 13]] > stamp[[12, 11]]);
    }

    #[test]
    fn test_ps_psf_varies_and_is_deterministic() {
        let psf_a = make_ps_psf(&mut StdRng::seed_from_u64(1), 200).unwrap();
        let psf_b = make_ps_psf(&mut StdRng::seed_from_u64(1), 200).unwrap();
        assert!(psf_a.is_position_dependent());
        assert_eq!(psf_a.max_dim(), Some(200));

        assert_eq!(psf_a.fwhm_at(10.0, 10.0), psf_b.fwhm_at(10.0, 10.0));
        assert_ne!(psf_a.fwhm_at(10.0, 10.0), psf_a.fwhm_at(180.0, 150.0));

        let f = psf_a.fwhm_at(100.0, 100.0);
        assert!(f > 0.6 && f < 1.0, "fwhm = {f}");
    }

    #[test]
    fn test_random_field_statistics() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut planner = FftPlanner::new();
        let field = gaussian_random_field(&mut rng, 64, 2.0, 0.05, &mut planner);
        assert_relative_eq!(field.mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(field.std(0.0), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_ps_config() {
        let config = PowerSpectrumPsfConfig {
            grid_spacing: 0.0,
            ..Default::default()
        };
        let err = make_ps_psf_with_config(&mut StdRng::seed_from_u64(0), 100, config);
        assert!(matches!(err, Err(SimError::InvalidConfig(_))));
    }
}
