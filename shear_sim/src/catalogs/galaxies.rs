//! Galaxy populations: a fixed-morphology set and one drawn from the wldeblend table.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::catsim::{load_galaxy_table, GalaxyEntry, GALAXY_TABLE_AREA_ARCMIN2};
use super::layout::{get_shifts, Layout, Shift};
use crate::constants::FIXED_RANDOM_DENSITY;
use crate::error::{Result, SimError};
use crate::profile::{Profile, GAUSSIAN_HLR_PER_SIGMA};
use crate::survey::Survey;

/// Number of star-forming knots added to `bdk` galaxies
const KNOTS_PER_GALAXY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GalaxyType {
    Fixed,
    WLDeblend,
}

impl FromStr for GalaxyType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(GalaxyType::Fixed),
            "wldeblend" => Ok(GalaxyType::WLDeblend),
            other => Err(SimError::invalid(format!("unknown galaxy type '{other}'"))),
        }
    }
}

/// Morphology of the fixed galaxy population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Morphology {
    Exp,
    Dev,
    /// Bulge plus disk
    Bd,
    /// Bulge plus disk plus knots
    Bdk,
}

impl FromStr for Morphology {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exp" => Ok(Morphology::Exp),
            "dev" => Ok(Morphology::Dev),
            "bd" => Ok(Morphology::Bd),
            "bdk" => Ok(Morphology::Bdk),
            other => Err(SimError::invalid(format!("unknown morphology '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedGalaxyConfig {
    pub mag: f64,
    /// Half-light radius in arcseconds
    pub hlr: f64,
    pub morph: Morphology,
}

pub const DEFAULT_FIXED_GAL_CONFIG: FixedGalaxyConfig = FixedGalaxyConfig {
    mag: 17.0,
    hlr: 0.5,
    morph: Morphology::Exp,
};

impl Default for FixedGalaxyConfig {
    fn default() -> Self {
        DEFAULT_FIXED_GAL_CONFIG
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyCatalogConfig {
    pub gal_type: GalaxyType,
    pub coadd_dim: usize,
    /// Pixels kept free of objects at each coadd edge
    #[serde(default)]
    pub buff: usize,
    pub layout: Layout,
    #[serde(default)]
    pub fixed: FixedGalaxyConfig,
    /// Object density of random layouts per square arcminute; defaults to
    /// the population's own density
    #[serde(default)]
    pub density: Option<f64>,
    /// Overrides `CATSIM_DIR` for the wldeblend table
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl GalaxyCatalogConfig {
    pub fn new(gal_type: GalaxyType, coadd_dim: usize, buff: usize, layout: Layout) -> Self {
        Self {
            gal_type,
            coadd_dim,
            buff,
            layout,
            fixed: FixedGalaxyConfig::default(),
            density: None,
            data_dir: None,
        }
    }
}

/// Per-object shape parameters drawn for composite fixed morphologies
#[derive(Debug, Clone, PartialEq)]
struct CompositeShape {
    bulge_frac: f64,
    knot_frac: f64,
    knots: Vec<(f64, f64)>,
}

/// Identical galaxies placed according to a layout
#[derive(Debug, Clone)]
pub struct FixedGalaxyCatalog {
    pub config: FixedGalaxyConfig,
    shifts: Vec<Shift>,
    shapes: Vec<CompositeShape>,
}

impl FixedGalaxyCatalog {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        coadd_dim: usize,
        buff: usize,
        layout: Layout,
        config: FixedGalaxyConfig,
        density: Option<f64>,
    ) -> Result<Self> {
        if !(config.hlr > 0.0) {
            return Err(SimError::invalid("fixed galaxy hlr must be positive"));
        }
        let density = density.unwrap_or(FIXED_RANDOM_DENSITY);
        let shifts = get_shifts(rng, layout, coadd_dim, buff, density)?;

        let shapes = match config.morph {
            Morphology::Exp | Morphology::Dev => Vec::new(),
            Morphology::Bd | Morphology::Bdk => shifts
                .iter()
                .map(|_| {
                    let bulge_frac = rng.gen::<f64>();
                    let (knot_frac, knots) = if config.morph == Morphology::Bdk {
                        let sigma = config.hlr / GAUSSIAN_HLR_PER_SIGMA;
                        let knots = (0..KNOTS_PER_GALAXY)
                            .map(|_| {
                                let x: f64 = rng.sample(StandardNormal);
                                let y: f64 = rng.sample(StandardNormal);
                                (x * sigma, y * sigma)
                            })
                            .collect();
                        (rng.gen::<f64>(), knots)
                    } else {
                        (0.0, Vec::new())
                    };
                    CompositeShape {
                        bulge_frac,
                        knot_frac,
                        knots,
                    }
                })
                .collect(),
        };

        Ok(Self {
            config,
            shifts,
            shapes,
        })
    }

    fn profile(&self, index: usize, flux: f64) -> Profile {
        let hlr = self.config.hlr;
        match self.config.morph {
            Morphology::Exp => Profile::Exponential {
                half_light_radius: hlr,
                flux,
            },
            Morphology::Dev => Profile::DeVaucouleurs {
                half_light_radius: hlr,
                flux,
            },
            Morphology::Bd | Morphology::Bdk => {
                let shape = &self.shapes[index];
                let disk_flux = flux * (1.0 - shape.bulge_frac);
                let knot_flux = disk_flux * shape.knot_frac;
                let mut parts = vec![
                    Profile::DeVaucouleurs {
                        half_light_radius: hlr,
                        flux: flux * shape.bulge_frac,
                    },
                    Profile::Exponential {
                        half_light_radius: hlr,
                        flux: disk_flux - knot_flux,
                    },
                ];
                if !shape.knots.is_empty() {
                    parts.push(Profile::Knots {
                        points: shape.knots.clone(),
                        flux: knot_flux,
                    });
                }
                Profile::Sum(parts)
            }
        }
    }
}

/// Galaxies drawn with replacement from the wldeblend table
#[derive(Debug, Clone)]
pub struct WLDeblendGalaxyCatalog {
    table: Arc<Vec<GalaxyEntry>>,
    shifts: Vec<Shift>,
    indices: Vec<usize>,
    angles: Vec<f64>,
}

impl WLDeblendGalaxyCatalog {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        coadd_dim: usize,
        buff: usize,
        layout: Layout,
        density: Option<f64>,
        data_dir: Option<&std::path::Path>,
    ) -> Result<Self> {
        if density.is_some_and(|d| !(d >= 0.0)) {
            return Err(SimError::invalid("galaxy density must be non-negative"));
        }
        let table = load_galaxy_table(data_dir)?;
        let density =
            density.unwrap_or_else(|| table.len() as f64 / GALAXY_TABLE_AREA_ARCMIN2);

        let shifts = get_shifts(rng, layout, coadd_dim, buff, density)?;
        let indices = (0..shifts.len())
            .map(|_| rng.gen_range(0..table.len()))
            .collect();
        let angles = (0..shifts.len())
            .map(|_| rng.gen_range(0.0..std::f64::consts::PI))
            .collect();

        Ok(Self {
            table,
            shifts,
            indices,
            angles,
        })
    }

    fn profile(&self, index: usize, band: &str, survey: &Survey) -> Result<Profile> {
        let entry = &self.table[self.indices[index]];
        let mag = entry
            .mags
            .get(band)
            .ok_or_else(|| SimError::invalid(format!("catalog has no magnitude for band '{band}'")))?;
        let flux = survey.flux_for_mag(mag);
        let angle = self.angles[index];

        let norm = entry.fluxnorm_bulge + entry.fluxnorm_disk + entry.fluxnorm_agn;
        if !(norm > 0.0) {
            return Ok(Profile::delta(flux));
        }

        let mut parts = Vec::with_capacity(3);
        if entry.fluxnorm_disk > 0.0 && entry.a_d > 0.0 && entry.b_d > 0.0 {
            let disk = Profile::Exponential {
                half_light_radius: (entry.a_d * entry.b_d).sqrt(),
                flux: flux * entry.fluxnorm_disk / norm,
            };
            parts.push(ellipse(disk, entry.b_d / entry.a_d, angle));
        }
        if entry.fluxnorm_bulge > 0.0 && entry.a_b > 0.0 && entry.b_b > 0.0 {
            let bulge = Profile::DeVaucouleurs {
                half_light_radius: (entry.a_b * entry.b_b).sqrt(),
                flux: flux * entry.fluxnorm_bulge / norm,
            };
            parts.push(ellipse(bulge, entry.b_b / entry.a_b, angle));
        }
        if entry.fluxnorm_agn > 0.0 {
            parts.push(Profile::delta(flux * entry.fluxnorm_agn / norm));
        }
        if parts.is_empty() {
            return Ok(Profile::delta(flux));
        }
        Ok(Profile::Sum(parts))
    }
}

/// Shear a round profile to axis ratio `q` with the major axis at `angle`
fn ellipse(profile: Profile, q: f64, angle: f64) -> Profile {
    let q = q.clamp(0.05, 1.0);
    let g = (1.0 - q) / (1.0 + q);
    let (s, c) = (2.0 * angle).sin_cos();
    profile.shear(g * c, g * s)
}

/// Galaxy population: shifts plus a way to build each object's profile
#[derive(Debug, Clone)]
pub enum GalaxyCatalog {
    Fixed(FixedGalaxyCatalog),
    WLDeblend(WLDeblendGalaxyCatalog),
}

impl GalaxyCatalog {
    pub fn len(&self) -> usize {
        self.shifts_array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shifts_array(&self) -> &[Shift] {
        match self {
            GalaxyCatalog::Fixed(c) => &c.shifts,
            GalaxyCatalog::WLDeblend(c) => &c.shifts,
        }
    }

    pub fn gal_type(&self) -> GalaxyType {
        match self {
            GalaxyCatalog::Fixed(_) => GalaxyType::Fixed,
            GalaxyCatalog::WLDeblend(_) => GalaxyType::WLDeblend,
        }
    }

    /// Observing conditions of this population in `band`
    pub fn survey(&self, band: &str) -> Result<Survey> {
        match self {
            GalaxyCatalog::Fixed(_) => Ok(Survey::basic()),
            GalaxyCatalog::WLDeblend(_) => Survey::wldeblend(band),
        }
    }

    /// Unsheared tangent-plane profiles, one per shift, with fluxes for `band`
    pub fn get_objlist(&self, band: &str, survey: &Survey) -> Result<Vec<Profile>> {
        match self {
            GalaxyCatalog::Fixed(c) => {
                let flux = survey.flux_for_mag(c.config.mag);
                Ok((0..c.shifts.len()).map(|i| c.profile(i, flux)).collect())
            }
            GalaxyCatalog::WLDeblend(c) => (0..c.shifts.len())
                .map(|i| c.profile(i, band, survey))
                .collect(),
        }
    }
}

/// Build a galaxy catalog.
///
/// The wldeblend table is loaded before any random numbers are drawn, so a
/// missing data directory fails without disturbing `rng`.
pub fn make_galaxy_catalog<R: Rng + ?Sized>(
    rng: &mut R,
    config: &GalaxyCatalogConfig,
) -> Result<GalaxyCatalog> {
    let catalog = match config.gal_type {
        GalaxyType::Fixed => GalaxyCatalog::Fixed(FixedGalaxyCatalog::new(
            rng,
            config.coadd_dim,
            config.buff,
            config.layout,
            config.fixed,
            config.density,
        )?),
        GalaxyType::WLDeblend => GalaxyCatalog::WLDeblend(WLDeblendGalaxyCatalog::new(
            rng,
            config.coadd_dim,
            config.buff,
            config.layout,
            config.density,
            config.data_dir.as_deref(),
        )?),
    };
    debug!(
        "built {:?} galaxy catalog with {} objects ({:?} layout)",
        config.gal_type,
        catalog.len(),
        config.layout
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::mag_to_flux;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_catalog_defaults() {
        let mut rng = StdRng::seed_from_u64(10);
        let config = GalaxyCatalogConfig::new(GalaxyType::Fixed, 301, 30, Layout::Grid);
        let cat = make_galaxy_catalog(&mut rng, &config).unwrap();
        assert_eq!(cat.len(), 25);
        assert_eq!(cat.len(), cat.shifts_array().len());
        assert_eq!(cat.gal_type(), GalaxyType::Fixed);

        let survey = cat.survey("i").unwrap();
        let objs = cat.get_objlist("i", &survey).unwrap();
        assert_eq!(objs.len(), 25);
        assert_relative_eq!(objs[0].flux(), mag_to_flux(17.0), max_relative = 1e-12);
        assert!(matches!(objs[0], Profile::Exponential { .. }));
    }

    #[test]
    fn test_composite_morphologies_keep_flux() {
        for morph in [Morphology::Bd, Morphology::Bdk, Morphology::Dev] {
            let mut rng = StdRng::seed_from_u64(11);
            let mut config = GalaxyCatalogConfig::new(GalaxyType::Fixed, 201, 10, Layout::Hex);
            config.fixed.morph = morph;
            config.fixed.mag = 20.0;
            let cat = make_galaxy_catalog(&mut rng, &config).unwrap();
            let survey = cat.survey("r").unwrap();
            for obj in cat.get_objlist("r", &survey).unwrap() {
                assert_relative_eq!(obj.flux(), mag_to_flux(20.0), max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("wldeblend".parse::<GalaxyType>().unwrap(), GalaxyType::WLDeblend);
        assert_eq!("bdk".parse::<Morphology>().unwrap(), Morphology::Bdk);
        assert!("spiral".parse::<Morphology>().is_err());
        assert!("cosmos".parse::<GalaxyType>().is_err());
    }

    #[test]
    fn test_wldeblend_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GalaxyCatalogConfig::new(GalaxyType::WLDeblend, 201, 30, Layout::Random);
        config.data_dir = Some(dir.path().join("absent"));
        let err = make_galaxy_catalog(&mut StdRng::seed_from_u64(0), &config).unwrap_err();
        assert!(matches!(err, SimError::MissingCatalogData { .. }));
    }

    #[test]
    fn test_ellipse_axis_ratio() {
        let p = ellipse(
            Profile::Gaussian {
                sigma: 1.0,
                flux: 1.0,
            },
            0.5,
            0.0,
        );
        // Major axis along x
        assert!(p.xvalue(1.2, 0.0) > p.xvalue(0.0, 1.2));
    }
}
