//! Loading of external catalog tables from the `CATSIM_DIR` data directory.
//!
//! Tables are JSON arrays of records. Each file is parsed once per process and
//! shared through an `Arc`, so repeated catalog construction is cheap.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Environment variable naming the catalog data directory
pub const CATSIM_DIR_ENV: &str = "CATSIM_DIR";

/// Galaxy table covering one square degree
pub const GALAXY_TABLE_FILE: &str = "OneDegSq.json";

/// Star table
pub const STAR_TABLE_FILE: &str = "stars_med_june2018.json";

/// Sky area covered by the galaxy table, in square arcminutes
pub const GALAXY_TABLE_AREA_ARCMIN2: f64 = 3600.0;

/// AB magnitudes in the six LSST-like bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMagnitudes {
    pub u_ab: f64,
    pub g_ab: f64,
    pub r_ab: f64,
    pub i_ab: f64,
    pub z_ab: f64,
    pub y_ab: f64,
}

impl BandMagnitudes {
    pub fn get(&self, band: &str) -> Option<f64> {
        match band {
            "u" => Some(self.u_ab),
            "g" => Some(self.g_ab),
            "r" => Some(self.r_ab),
            "i" => Some(self.i_ab),
            "z" => Some(self.z_ab),
            "y" => Some(self.y_ab),
            _ => None,
        }
    }
}

/// One galaxy of the wldeblend table.
///
/// Component sizes are semi-major and semi-minor axes in arcseconds; flux
/// norms are relative weights of bulge, disk and point-like AGN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyEntry {
    #[serde(flatten)]
    pub mags: BandMagnitudes,
    pub fluxnorm_bulge: f64,
    pub fluxnorm_disk: f64,
    #[serde(default)]
    pub fluxnorm_agn: f64,
    pub a_b: f64,
    pub b_b: f64,
    pub a_d: f64,
    pub b_d: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarEntry {
    #[serde(flatten)]
    pub mags: BandMagnitudes,
}

type TableCache<T> = Lazy<Mutex<HashMap<PathBuf, Arc<Vec<T>>>>>;

static GALAXY_TABLES: TableCache<GalaxyEntry> = Lazy::new(|| Mutex::new(HashMap::new()));
static STAR_TABLES: TableCache<StarEntry> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Resolve the data directory from an explicit override or `CATSIM_DIR`
pub fn resolve_data_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = data_dir {
        return Ok(dir.to_path_buf());
    }
    match std::env::var_os(CATSIM_DIR_ENV) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Err(SimError::MissingCatalogData {
            path: PathBuf::from(format!("${CATSIM_DIR_ENV}")),
            reason: format!("environment variable {CATSIM_DIR_ENV} is not set"),
        }),
    }
}

fn load_cached<T: DeserializeOwned>(
    cache: &Mutex<HashMap<PathBuf, Arc<Vec<T>>>>,
    path: PathBuf,
) -> Result<Arc<Vec<T>>> {
    let mut tables = cache.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(table) = tables.get(&path) {
        return Ok(Arc::clone(table));
    }

    let text = fs::read_to_string(&path).map_err(|e| SimError::MissingCatalogData {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let rows: Vec<T> = serde_json::from_str(&text)?;
    if rows.is_empty() {
        return Err(SimError::MissingCatalogData {
            path,
            reason: "table has no rows".to_string(),
        });
    }
    debug!("loaded {} rows from {}", rows.len(), path.display());

    let table = Arc::new(rows);
    tables.insert(path, Arc::clone(&table));
    Ok(table)
}

pub fn load_galaxy_table(data_dir: Option<&Path>) -> Result<Arc<Vec<GalaxyEntry>>> {
    let dir = resolve_data_dir(data_dir)?;
    load_cached(&GALAXY_TABLES, dir.join(GALAXY_TABLE_FILE))
}

pub fn load_star_table(data_dir: Option<&Path>) -> Result<Arc<Vec<StarEntry>>> {
    let dir = resolve_data_dir(data_dir)?;
    load_cached(&STAR_TABLES, dir.join(STAR_TABLE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mags(i: f64) -> BandMagnitudes {
        BandMagnitudes {
            u_ab: i + 1.0,
            g_ab: i + 0.5,
            r_ab: i + 0.2,
            i_ab: i,
            z_ab: i - 0.1,
            y_ab: i - 0.2,
        }
    }

    #[test]
    fn test_star_table_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![StarEntry { mags: mags(20.0) }, StarEntry { mags: mags(15.0) }];
        let mut f = fs::File::create(dir.path().join(STAR_TABLE_FILE)).unwrap();
        f.write_all(serde_json::to_string(&rows).unwrap().as_bytes())
            .unwrap();

        let a = load_star_table(Some(dir.path())).unwrap();
        let b = load_star_table(Some(dir.path())).unwrap();
        assert_eq!(a.len(), 2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a[1].mags.get("i"), Some(15.0));
        assert_eq!(a[1].mags.get("q"), None);
    }

    #[test]
    fn test_missing_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_galaxy_table(Some(dir.path())).unwrap_err();
        match err {
            SimError::MissingCatalogData { path, .. } => {
                assert!(path.ends_with(GALAXY_TABLE_FILE));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_galaxy_entry_flattened_json() {
        let json = r#"[{"u_ab": 25.0, "g_ab": 24.5, "r_ab": 24.2, "i_ab": 24.0,
            "z_ab": 23.9, "y_ab": 23.8, "fluxnorm_bulge": 0.3, "fluxnorm_disk": 0.7,
            "a_b": 0.4, "b_b": 0.3, "a_d": 0.8, "b_d": 0.5}]"#;
        let rows: Vec<GalaxyEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].mags.get("i"), Some(24.0));
        assert_eq!(rows[0].fluxnorm_agn, 0.0);
    }
}
