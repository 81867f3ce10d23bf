//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::fs;

use serde_json::json;
use tempfile::TempDir;

use shear_sim::catalogs::catsim::{GALAXY_TABLE_FILE, STAR_TABLE_FILE};

fn mags(i: f64) -> serde_json::Value {
    json!({
        "u_ab": i + 1.2,
        "g_ab": i + 0.6,
        "r_ab": i + 0.2,
        "i_ab": i,
        "z_ab": i - 0.1,
        "y_ab": i - 0.15,
    })
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            b.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Catalog directory holding small galaxy and star tables.
///
/// Stars alternate between magnitude 12 (saturating) and 20.
pub fn catsim_dir() -> TempDir {
    write_tables(|k| if k % 2 == 0 { 12.0 } else { 20.0 })
}

/// Like [`catsim_dir`] but every star is magnitude 20, so none saturate
/// or get a bright mask.
pub fn faint_catsim_dir() -> TempDir {
    write_tables(|_| 20.0)
}

fn write_tables(star_mag: impl Fn(usize) -> f64) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");

    let galaxies: Vec<_> = (0..40)
        .map(|k| {
            let i_mag = 21.0 + 0.08 * k as f64;
            merge(
                mags(i_mag),
                json!({
                    "fluxnorm_bulge": 0.2 + 0.01 * k as f64,
                    "fluxnorm_disk": 0.8 - 0.01 * k as f64,
                    "fluxnorm_agn": if k % 7 == 0 { 0.02 } else { 0.0 },
                    "a_b": 0.3,
                    "b_b": 0.25,
                    "a_d": 0.6 + 0.01 * k as f64,
                    "b_d": 0.35,
                }),
            )
        })
        .collect();
    fs::write(
        dir.path().join(GALAXY_TABLE_FILE),
        serde_json::to_string(&galaxies).expect("galaxy json"),
    )
    .expect("write galaxy table");

    let stars: Vec<_> = (0..20)
        .map(|k| mags(star_mag(k)))
        .collect();
    fs::write(
        dir.path().join(STAR_TABLE_FILE),
        serde_json::to_string(&stars).expect("star json"),
    )
    .expect("write star table");

    dir
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
