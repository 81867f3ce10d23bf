//! Star populations drawn from the star table at a fixed or random density.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::catsim::{load_star_table, StarEntry};
use super::layout::{get_shifts, Layout, Shift};
use crate::constants::{BRIGHT_MAG, DEFAULT_MAX_STAR_DENSITY, DEFAULT_MIN_STAR_DENSITY};
use crate::error::{Result, SimError};
use crate::profile::Profile;
use crate::survey::Survey;

/// Star density options, per square arcminute.
///
/// Either a fixed `density` or a `min_density`/`max_density` range to draw
/// from may be given, but not both. With neither, the default range is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarConfig {
    pub density: Option<f64>,
    pub min_density: Option<f64>,
    pub max_density: Option<f64>,
    /// Overrides `CATSIM_DIR` for the star table
    pub data_dir: Option<PathBuf>,
}

/// How the star density will be chosen, validated up front
#[derive(Debug, Clone, Copy, PartialEq)]
enum DensitySpec {
    Fixed(f64),
    Range(f64, f64),
}

fn resolve_density_spec(
    density: Option<f64>,
    min_density: Option<f64>,
    max_density: Option<f64>,
) -> Result<DensitySpec> {
    let spec = match (density, min_density, max_density) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(SimError::invalid(
                "star density: give either density or min_density/max_density, not both",
            ))
        }
        (Some(d), None, None) => DensitySpec::Fixed(d),
        (None, Some(lo), Some(hi)) => DensitySpec::Range(lo, hi),
        (None, None, None) => {
            DensitySpec::Range(DEFAULT_MIN_STAR_DENSITY, DEFAULT_MAX_STAR_DENSITY)
        }
        (None, _, _) => {
            return Err(SimError::invalid(
                "star density: min_density and max_density must be given together",
            ))
        }
    };

    match spec {
        DensitySpec::Fixed(d) if !(d >= 0.0) => Err(SimError::invalid(format!(
            "star density must be non-negative, got {d}"
        ))),
        DensitySpec::Range(lo, hi) if !(lo >= 0.0 && lo <= hi) => Err(SimError::invalid(
            format!("star density range [{lo}, {hi}] is invalid"),
        )),
        ok => Ok(ok),
    }
}

/// A star ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct StarObject {
    pub profile: Profile,
    pub mag: f64,
}

impl StarObject {
    pub fn is_bright(&self) -> bool {
        self.mag < BRIGHT_MAG
    }
}

/// Stars placed uniformly at random, drawn with replacement from the star table
#[derive(Debug, Clone)]
pub struct StarCatalog {
    pub density: f64,
    table: Arc<Vec<StarEntry>>,
    shifts: Vec<Shift>,
    indices: Vec<usize>,
}

impl StarCatalog {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        coadd_dim: usize,
        buff: usize,
        density: Option<f64>,
        min_density: Option<f64>,
        max_density: Option<f64>,
        data_dir: Option<&Path>,
    ) -> Result<Self> {
        let spec = resolve_density_spec(density, min_density, max_density)?;
        let table = load_star_table(data_dir)?;

        let density = match spec {
            DensitySpec::Fixed(d) => d,
            DensitySpec::Range(lo, hi) if hi > lo => rng.gen_range(lo..hi),
            DensitySpec::Range(lo, _) => lo,
        };

        let shifts = get_shifts(rng, Layout::Random, coadd_dim, buff, density)?;
        let indices = (0..shifts.len())
            .map(|_| rng.gen_range(0..table.len()))
            .collect();

        debug!(
            "built star catalog with {} stars at density {density:.1}/arcmin^2",
            shifts.len()
        );
        Ok(Self {
            density,
            table,
            shifts,
            indices,
        })
    }

    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    pub fn shifts_array(&self) -> &[Shift] {
        &self.shifts
    }

    /// Point-source stars with fluxes for `band`
    pub fn get_objlist(&self, band: &str, survey: &Survey) -> Result<Vec<StarObject>> {
        self.indices
            .iter()
            .map(|&idx| {
                let mag = self.table[idx].mags.get(band).ok_or_else(|| {
                    SimError::invalid(format!("star table has no magnitude for band '{band}'"))
                })?;
                Ok(StarObject {
                    profile: Profile::delta(survey.flux_for_mag(mag)),
                    mag,
                })
            })
            .collect()
    }
}

/// Build a star catalog from a [`StarConfig`]; identical to calling
/// [`StarCatalog::new`] with the same values.
pub fn make_star_catalog<R: Rng + ?Sized>(
    rng: &mut R,
    coadd_dim: usize,
    buff: usize,
    star_config: &StarConfig,
) -> Result<StarCatalog> {
    StarCatalog::new(
        rng,
        coadd_dim,
        buff,
        star_config.density,
        star_config.min_density,
        star_config.max_density,
        star_config.data_dir.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_resolution() {
        assert_eq!(
            resolve_density_spec(Some(20.0), None, None).unwrap(),
            DensitySpec::Fixed(20.0)
        );
        assert_eq!(
            resolve_density_spec(None, Some(40.0), Some(100.0)).unwrap(),
            DensitySpec::Range(40.0, 100.0)
        );
        assert_eq!(
            resolve_density_spec(None, None, None).unwrap(),
            DensitySpec::Range(DEFAULT_MIN_STAR_DENSITY, DEFAULT_MAX_STAR_DENSITY)
        );
    }

    #[test]
    fn test_density_conflicts_rejected() {
        let bad = [
            (Some(20.0), Some(1.0), Some(5.0)),
            (Some(20.0), Some(1.0), None),
            (Some(20.0), None, Some(5.0)),
            (None, Some(1.0), None),
            (None, None, Some(5.0)),
            (None, Some(10.0), Some(5.0)),
            (Some(-1.0), None, None),
        ];
        for (d, lo, hi) in bad {
            assert!(
                matches!(resolve_density_spec(d, lo, hi), Err(SimError::InvalidConfig(_))),
                "{d:?} {lo:?} {hi:?}"
            );
        }
    }

    #[test]
    fn test_conflict_detected_before_data_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = rand::thread_rng();
        let err = StarCatalog::new(
            &mut rng,
            201,
            30,
            Some(10.0),
            Some(1.0),
            Some(2.0),
            Some(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_bright_threshold() {
        let star = StarObject {
            profile: Profile::delta(1.0),
            mag: BRIGHT_MAG - 0.1,
        };
        assert!(star.is_bright());
    }
}
