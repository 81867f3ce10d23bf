//! Object placement on the tangent plane.
//!
//! Shifts are offsets from the world origin in arcseconds. All layouts are
//! centred on the origin and confined to the square of side
//! `(coadd_dim - 2·buff)·SCALE`; `random_disk` uses the inscribed disk.

use std::f64::consts::PI;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::constants::{ARCSEC2_PER_ARCMIN2, GRID_SPACING, HEX_SPACING, SCALE};
use crate::error::{Result, SimError};

/// Offset from the world origin in arcseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub dx: f64,
    pub dy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Grid,
    Random,
    RandomDisk,
    Hex,
}

impl FromStr for Layout {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grid" => Ok(Layout::Grid),
            "random" => Ok(Layout::Random),
            "random_disk" => Ok(Layout::RandomDisk),
            "hex" => Ok(Layout::Hex),
            other => Err(SimError::invalid(format!("unknown layout '{other}'"))),
        }
    }
}

impl Layout {
    /// Whether the number of objects is drawn from a density
    pub fn is_random(&self) -> bool {
        matches!(self, Layout::Random | Layout::RandomDisk)
    }
}

/// Side of the usable square in arcseconds
pub fn layout_width(coadd_dim: usize, buff: usize) -> Result<f64> {
    if 2 * buff >= coadd_dim {
        return Err(SimError::invalid(format!(
            "buff {buff} leaves no usable area in a coadd of dimension {coadd_dim}"
        )));
    }
    Ok((coadd_dim - 2 * buff) as f64 * SCALE)
}

/// Area available to a layout in square arcminutes
pub fn layout_area_arcmin2(layout: Layout, coadd_dim: usize, buff: usize) -> Result<f64> {
    let width = layout_width(coadd_dim, buff)?;
    let area = match layout {
        Layout::RandomDisk => PI * (0.5 * width).powi(2),
        _ => width * width,
    };
    Ok(area / ARCSEC2_PER_ARCMIN2)
}

/// Poisson-distributed object count with the given mean
pub(crate) fn draw_count<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> usize {
    match Poisson::new(mean) {
        Ok(dist) => {
            let n: f64 = dist.sample(rng);
            n as usize
        }
        Err(_) => 0,
    }
}

/// Generate shifts for a layout.
///
/// `density` (per square arcminute) sets the Poisson mean object count for the
/// random layouts and is ignored by the lattice layouts.
pub fn get_shifts<R: Rng + ?Sized>(
    rng: &mut R,
    layout: Layout,
    coadd_dim: usize,
    buff: usize,
    density: f64,
) -> Result<Vec<Shift>> {
    let width = layout_width(coadd_dim, buff)?;
    let shifts = match layout {
        Layout::Grid => grid_shifts(rng, width, GRID_SPACING),
        Layout::Hex => hex_shifts(rng, width, HEX_SPACING),
        Layout::Random => {
            let area = layout_area_arcmin2(layout, coadd_dim, buff)?;
            let n = draw_count(rng, area * density);
            random_square_shifts(rng, width, n)
        }
        Layout::RandomDisk => {
            let area = layout_area_arcmin2(layout, coadd_dim, buff)?;
            let n = draw_count(rng, area * density);
            random_disk_shifts(rng, 0.5 * width, n)
        }
    };
    Ok(shifts)
}

fn jitter<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(-0.5..0.5) * SCALE
}

fn grid_shifts<R: Rng + ?Sized>(rng: &mut R, width: f64, spacing: f64) -> Vec<Shift> {
    let n = ((width / spacing).floor() as usize).max(1);
    let centre = (n as f64 - 1.0) / 2.0;
    let mut shifts = Vec::with_capacity(n * n);
    for iy in 0..n {
        for ix in 0..n {
            let dx = (ix as f64 - centre) * spacing + jitter(rng);
            let dy = (iy as f64 - centre) * spacing + jitter(rng);
            shifts.push(Shift { dx, dy });
        }
    }
    shifts
}

fn hex_shifts<R: Rng + ?Sized>(rng: &mut R, width: f64, spacing: f64) -> Vec<Shift> {
    let half = 0.5 * width;
    let theta = rng.gen_range(0.0..PI / 3.0);
    let (sin, cos) = theta.sin_cos();

    // Lattice vectors (spacing, 0) and (spacing/2, spacing·√3/2)
    let row_height = spacing * 3f64.sqrt() / 2.0;
    let reach = (width / row_height).ceil() as i64 + 1;

    let mut shifts = Vec::new();
    for j in -reach..=reach {
        for i in -reach..=reach {
            let x = i as f64 * spacing + j as f64 * 0.5 * spacing;
            let y = j as f64 * row_height;
            let xr = cos * x - sin * y;
            let yr = sin * x + cos * y;
            if xr.abs() <= half && yr.abs() <= half {
                let dx = xr + jitter(rng);
                let dy = yr + jitter(rng);
                shifts.push(Shift { dx, dy });
            }
        }
    }
    shifts
}

fn random_square_shifts<R: Rng + ?Sized>(rng: &mut R, width: f64, n: usize) -> Vec<Shift> {
    let half = 0.5 * width;
    (0..n)
        .map(|_| Shift {
            dx: rng.gen_range(-half..half),
            dy: rng.gen_range(-half..half),
        })
        .collect()
}

fn random_disk_shifts<R: Rng + ?Sized>(rng: &mut R, radius: f64, n: usize) -> Vec<Shift> {
    (0..n)
        .map(|_| {
            let r = radius * rng.gen::<f64>().sqrt();
            let phi = rng.gen_range(0.0..2.0 * PI);
            Shift {
                dx: r * phi.cos(),
                dy: r * phi.sin(),
            }
        })
        .collect()
}
