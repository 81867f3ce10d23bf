//! Simulation driver: renders every band and epoch of a scene.
//!
//! For each band the galaxy and star catalogs produce their profiles once.
//! Each epoch then draws a pointing perturbation, builds its own WCS, renders
//! all objects convolved with the PSF and adds noise and detector effects.
//!
//! Random numbers are consumed from the caller's RNG in a fixed order per
//! epoch (dither, rotation, noise seed, defect seed, photon seed). Object
//! rendering only touches a private stream seeded from the photon seed, so
//! the number of objects never shifts the noise or defect realizations.

use std::collections::{BTreeMap, HashSet};
use std::f64::consts::PI;
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::catalogs::{GalaxyCatalog, StarCatalog, StarObject};
use crate::constants::{
    DEFAULT_PSF_DIM, DITHER_RANGE, ROTATE_SE_PAD, SCALE, WORLD_ORIGIN_DEC_DEG,
    WORLD_ORIGIN_RA_DEG,
};
use crate::defects::{
    add_bad_columns, add_bleed, add_bright_mask, add_cosmic_rays, apply_saturation,
    bright_mask_radius, saturation_excess, SaturationPolicy,
};
use crate::draw::{point_stamp_size, stamp_size, to_pixel_frame, DrawMethod, StampDrawer};
use crate::error::{Result, SimError};
use crate::exposure::{Exposure, ExposurePsf, Mask};
use crate::noise::{add_gaussian_noise, epoch_noise, variance_plane};
use crate::profile::Profile;
use crate::psf::{fwhm_pixels, Psf};
use crate::units::{Angle, AngleExt};
use crate::wcs::{BoundingBox, SkyCoord, TanWcs, TangentPlane};

fn default_bands() -> Vec<String> {
    vec!["i".to_string()]
}

fn default_psf_dim() -> usize {
    DEFAULT_PSF_DIM
}

fn default_epochs() -> usize {
    1
}

fn default_noise_factor() -> f64 {
    1.0
}

/// Options for [`make_sim`]; only `coadd_dim` is required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub coadd_dim: usize,
    #[serde(default = "default_bands")]
    pub bands: Vec<String>,
    #[serde(default)]
    pub g1: f64,
    #[serde(default)]
    pub g2: f64,
    #[serde(default = "default_psf_dim")]
    pub psf_dim: usize,
    /// Single-epoch image side; `None` uses [`get_se_dim`]
    #[serde(default)]
    pub se_dim: Option<usize>,
    #[serde(default = "default_epochs")]
    pub epochs_per_band: usize,
    #[serde(default)]
    pub dither: bool,
    #[serde(default)]
    pub rotate: bool,
    #[serde(default)]
    pub cosmic_rays: bool,
    #[serde(default)]
    pub bad_columns: bool,
    #[serde(default)]
    pub star_bleeds: bool,
    #[serde(default)]
    pub draw_method: DrawMethod,
    #[serde(default = "default_noise_factor")]
    pub noise_factor: f64,
    #[serde(default)]
    pub saturation: SaturationPolicy,
}

impl SimConfig {
    pub fn new(coadd_dim: usize) -> Self {
        Self {
            coadd_dim,
            bands: default_bands(),
            g1: 0.0,
            g2: 0.0,
            psf_dim: DEFAULT_PSF_DIM,
            se_dim: None,
            epochs_per_band: default_epochs(),
            dither: false,
            rotate: false,
            cosmic_rays: false,
            bad_columns: false,
            star_bleeds: false,
            draw_method: DrawMethod::Auto,
            noise_factor: default_noise_factor(),
            saturation: SaturationPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.coadd_dim == 0 {
            return Err(SimError::invalid("coadd_dim must be positive"));
        }
        if self.bands.is_empty() {
            return Err(SimError::invalid("at least one band is required"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.bands.iter().find(|b| !seen.insert(b.as_str())) {
            return Err(SimError::invalid(format!("band '{dup}' listed twice")));
        }
        if self.psf_dim == 0 || self.psf_dim % 2 == 0 {
            return Err(SimError::invalid(format!(
                "psf_dim must be odd, got {}",
                self.psf_dim
            )));
        }
        if self.se_dim == Some(0) {
            return Err(SimError::invalid("se_dim must be positive"));
        }
        if self.epochs_per_band == 0 {
            return Err(SimError::invalid("epochs_per_band must be at least 1"));
        }
        if !(self.g1 * self.g1 + self.g2 * self.g2 < 1.0) {
            return Err(SimError::invalid(format!(
                "shear ({}, {}) must have |g| < 1",
                self.g1, self.g2
            )));
        }
        if !(self.noise_factor >= 0.0) {
            return Err(SimError::invalid("noise_factor must be non-negative"));
        }
        if !(self.saturation.sat_value > 0.0) {
            return Err(SimError::invalid("saturation value must be positive"));
        }
        Ok(())
    }
}

/// Bright star record for downstream masking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrightInfo {
    pub ra: f64,
    pub dec: f64,
    /// Mask radius in pixels
    pub radius_pixels: f64,
    pub band: String,
    pub epoch: usize,
}

#[derive(Debug, Clone)]
pub struct SimResult {
    pub band_data: BTreeMap<String, Vec<Exposure>>,
    pub coadd_wcs: TanWcs,
    pub coadd_bbox: BoundingBox,
    pub psf_dims: (usize, usize),
    pub bright_info: Vec<BrightInfo>,
    pub se_dim: usize,
}

/// Single-epoch image side needed to cover the coadd.
///
/// Rotated epochs need the diagonal plus padding, dithered ones one extra
/// pixel for the sub-pixel offset.
pub fn get_se_dim(coadd_dim: usize, dither: bool, rotate: bool) -> usize {
    if rotate {
        (coadd_dim as f64 * std::f64::consts::SQRT_2).ceil() as usize + ROTATE_SE_PAD
    } else if dither {
        coadd_dim + 1
    } else {
        coadd_dim
    }
}

pub fn world_origin() -> SkyCoord {
    SkyCoord::from_degrees(WORLD_ORIGIN_RA_DEG, WORLD_ORIGIN_DEC_DEG)
}

/// Coadd WCS and bounding box, centred on the world origin
pub fn make_coadd_wcs(coadd_dim: usize) -> (TanWcs, BoundingBox) {
    let centre = (coadd_dim as f64 - 1.0) / 2.0;
    let wcs = TanWcs::new(
        Angle::from_arcseconds(SCALE),
        (centre, centre),
        world_origin(),
        None,
    );
    (wcs, BoundingBox::of_dims(coadd_dim, coadd_dim))
}

/// Single-epoch WCS with the world origin at the image centre plus `dither`
pub fn make_se_wcs(se_dim: usize, dither: (f64, f64), theta: Option<f64>) -> TanWcs {
    let centre = (se_dim as f64 - 1.0) / 2.0;
    TanWcs::new(
        Angle::from_arcseconds(SCALE),
        (centre + dither.0, centre + dither.1),
        world_origin(),
        theta,
    )
}

/// Everything an epoch needs that is shared across epochs of a band
struct BandScene<'a> {
    band: &'a str,
    galaxies: Vec<Profile>,
    galaxy_sky: &'a [SkyCoord],
    stars: Vec<StarObject>,
    star_sky: &'a [SkyCoord],
    noise: f64,
}

/// Render a full simulation.
///
/// # Arguments
/// * `rng` - Source of all randomness; consumed in a fixed order
/// * `galaxy_catalog` - Galaxies, sheared by `(config.g1, config.g2)`
/// * `star_catalog` - Optional stars, never sheared
/// * `psf` - PSF model; a power-spectrum PSF must cover the single-epoch size
/// * `config` - Observing options
pub fn make_sim<R: Rng + ?Sized>(
    rng: &mut R,
    galaxy_catalog: &GalaxyCatalog,
    star_catalog: Option<&StarCatalog>,
    psf: &Psf,
    config: &SimConfig,
) -> Result<SimResult> {
    config.validate()?;

    let se_dim = config
        .se_dim
        .unwrap_or_else(|| get_se_dim(config.coadd_dim, config.dither, config.rotate));
    if let Some(psf_dim) = psf.max_dim() {
        if psf_dim < se_dim {
            return Err(SimError::DimensionMismatch {
                what: "power spectrum psf",
                required: se_dim,
                actual: psf_dim,
            });
        }
    }

    let (coadd_wcs, coadd_bbox) = make_coadd_wcs(config.coadd_dim);
    let plane = TangentPlane::new(coadd_wcs.world_origin());
    let galaxy_sky: Vec<SkyCoord> = galaxy_catalog
        .shifts_array()
        .iter()
        .map(|s| plane.deproject(s.dx, s.dy))
        .collect();
    let star_sky: Vec<SkyCoord> = star_catalog
        .map(|c| {
            c.shifts_array()
                .iter()
                .map(|s| plane.deproject(s.dx, s.dy))
                .collect()
        })
        .unwrap_or_default();

    let psf = Arc::new(psf.clone());
    let mut band_data = BTreeMap::new();
    let mut bright_info = Vec::new();

    for band in &config.bands {
        let survey = galaxy_catalog.survey(band)?;
        let galaxies = galaxy_catalog
            .get_objlist(band, &survey)?
            .into_iter()
            .map(|p| p.shear(config.g1, config.g2))
            .collect();
        let stars = match star_catalog {
            Some(c) => c.get_objlist(band, &survey)?,
            None => Vec::new(),
        };
        let scene = BandScene {
            band,
            galaxies,
            galaxy_sky: &galaxy_sky,
            stars,
            star_sky: &star_sky,
            noise: epoch_noise(survey.noise(), config.noise_factor, config.epochs_per_band),
        };

        let mut exposures = Vec::with_capacity(config.epochs_per_band);
        for epoch in 0..config.epochs_per_band {
            let exposure = make_exposure(rng, &scene, &psf, config, se_dim, epoch, &mut bright_info)?;
            exposures.push(exposure);
        }
        band_data.insert(band.clone(), exposures);
    }

    info!(
        "simulated {} band(s) x {} epoch(s): {} galaxies, {} stars, se_dim {}",
        config.bands.len(),
        config.epochs_per_band,
        galaxy_catalog.len(),
        star_catalog.map_or(0, StarCatalog::len),
        se_dim
    );

    Ok(SimResult {
        band_data,
        coadd_wcs,
        coadd_bbox,
        psf_dims: (config.psf_dim, config.psf_dim),
        bright_info,
        se_dim,
    })
}

fn make_exposure<R: Rng + ?Sized>(
    rng: &mut R,
    scene: &BandScene<'_>,
    psf: &Arc<Psf>,
    config: &SimConfig,
    se_dim: usize,
    epoch: usize,
    bright_info: &mut Vec<BrightInfo>,
) -> Result<Exposure> {
    let dither = if config.dither {
        (
            rng.gen_range(-DITHER_RANGE..DITHER_RANGE),
            rng.gen_range(-DITHER_RANGE..DITHER_RANGE),
        )
    } else {
        (0.0, 0.0)
    };
    let theta = if config.rotate {
        Some(rng.gen_range(0.0..2.0 * PI))
    } else {
        None
    };
    let noise_seed: u64 = rng.gen();
    let defect_seed: u64 = rng.gen();
    let photon_seed: u64 = rng.gen();

    debug!(
        "band {} epoch {}: dither ({:.3}, {:.3}) rotation {:?}",
        scene.band, epoch, dither.0, dither.1, theta
    );

    let wcs = make_se_wcs(se_dim, dither, theta);
    let jac = wcs.jacobian();
    let cache_psf = !psf.is_position_dependent();
    let mut image = Array2::<f64>::zeros((se_dim, se_dim));
    let mut mask = Mask::new((se_dim, se_dim));
    let mut drawer = StampDrawer::new();
    let mut photon_rng = StdRng::seed_from_u64(photon_seed);

    let mut off_image = 0usize;
    for (galaxy, sky) in scene.galaxies.iter().zip(scene.galaxy_sky) {
        let Some((x, y)) = wcs.sky_to_pixel(sky) else {
            off_image += 1;
            continue;
        };
        let object = to_pixel_frame(galaxy, &jac);
        let psf_profile = to_pixel_frame(&psf.profile_at(x, y), &jac);
        let size = stamp_size(&object, fwhm_pixels(psf, x, y));
        let drawn = drawer.render(
            config.draw_method,
            &object,
            &psf_profile,
            (x, y),
            size,
            cache_psf,
            &mut image,
            &mut photon_rng,
        );
        if !drawn {
            off_image += 1;
        }
    }

    // (x, y, excess) of saturated stars, bled after noise
    let mut bleeds = Vec::new();
    let mut bright = Vec::new();
    for (star, sky) in scene.stars.iter().zip(scene.star_sky) {
        let Some((x, y)) = wcs.sky_to_pixel(sky) else {
            off_image += 1;
            continue;
        };
        let object = to_pixel_frame(&star.profile, &jac);
        let psf_profile = to_pixel_frame(&psf.profile_at(x, y), &jac);
        let fwhm = fwhm_pixels(psf, x, y);
        let flux = star.profile.flux();
        let size = point_stamp_size(flux, fwhm);
        let drawn = drawer.render(
            config.draw_method,
            &object,
            &psf_profile,
            (x, y),
            size,
            cache_psf,
            &mut image,
            &mut photon_rng,
        );
        if !drawn {
            off_image += 1;
            continue;
        }

        if config.star_bleeds {
            let stamp = psf.draw_stamp(x, y, config.psf_dim, &wcs);
            let excess = saturation_excess(flux, stamp.view(), config.saturation.sat_value);
            if excess > 0.0 {
                bleeds.push((x.round() as i64, y.round() as i64, excess));
            }
        }
        let centre_on_image = (-0.5..se_dim as f64 - 0.5).contains(&x)
            && (-0.5..se_dim as f64 - 0.5).contains(&y);
        if star.is_bright() && centre_on_image {
            bright.push((x, y, bright_mask_radius(star.mag, fwhm), *sky));
        }
    }
    if off_image > 0 {
        warn!(
            "band {} epoch {}: {} object(s) fell entirely off the {}x{} exposure",
            scene.band, epoch, off_image, se_dim, se_dim
        );
    }

    add_gaussian_noise(image.view_mut(), scene.noise, noise_seed)?;

    let n_sat = apply_saturation(&mut image, &mut mask, config.saturation.sat_value);
    let n_bleed: usize = bleeds
        .iter()
        .map(|&(x, y, excess)| add_bleed(&mut image, &mut mask, x, y, excess, &config.saturation))
        .sum();

    for (x, y, radius, sky) in bright {
        add_bright_mask(&mut mask, x, y, radius);
        bright_info.push(BrightInfo {
            ra: sky.ra_degrees(),
            dec: sky.dec_degrees(),
            radius_pixels: radius,
            band: scene.band.to_string(),
            epoch,
        });
    }

    let mut defect_rng = StdRng::seed_from_u64(defect_seed);
    let n_bad = if config.bad_columns {
        add_bad_columns(&mut image, &mut mask, &mut defect_rng)
    } else {
        0
    };
    let n_cr = if config.cosmic_rays {
        add_cosmic_rays(&mut image, &mut mask, &mut defect_rng)
    } else {
        0
    };
    debug!(
        "band {} epoch {}: {} saturated, {} bleed, {} bad columns, {} cosmic rays",
        scene.band, epoch, n_sat, n_bleed, n_bad, n_cr
    );

    Ok(Exposure {
        band: scene.band.to_string(),
        epoch,
        image: image.mapv(|v| v as f32),
        variance: variance_plane((se_dim, se_dim), scene.noise),
        mask,
        wcs,
        psf: ExposurePsf::new(Arc::clone(psf), wcs, config.psf_dim),
    })
}
