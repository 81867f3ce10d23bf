//! Analytic surface-brightness profiles for galaxies, stars and PSFs.
//!
//! Profiles are immutable values composed from a small set of radial
//! primitives plus affine transforms. Coordinates are in whatever frame the
//! caller works in: catalog and PSF profiles are built in tangent-plane
//! arcseconds and mapped into the pixel frame with [`Profile::transform`]
//! just before drawing.
//!
//! # Primitives
//!
//! ```text
//! Gaussian        I(r) ∝ exp(-r² / 2σ²)
//! Sérsic (n=1,4)  I(r) ∝ exp(-b_n (r / r_e)^(1/n))
//! Moffat          I(r) ∝ (1 + (r / r_d)²)^(-β),  optionally truncated
//! Delta           point source
//! Knots           set of equal-flux point sources
//! ```
//!
//! # Transforms
//!
//! A transformed profile `T = (J, o)` has `I'(p) = I(J⁻¹(p − o)) / |det J|`,
//! so a transform never changes the total flux. Shear uses the area
//! preserving matrix `(1 − g²)^(-½) [[1 + g1, g2], [g2, 1 − g1]]`.
//!
//! # Photon shooting
//!
//! Each primitive can sample photon positions. For Sérsic profiles the radius
//! is `r = r_e (t / b_n)^n` with `t ~ Gamma(2n, 1)`, which follows from the
//! substitution `t = b_n (r / r_e)^(1/n)` in the enclosed-flux integral.

use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use std::f64::consts::PI;

/// Sérsic `b_n` constant for n = 1
const B_EXP: f64 = 1.678_346_990_016_661;
/// Sérsic `b_n` constant for n = 4
const B_DEV: f64 = 7.669_249_443_429_63;

/// Ratio of FWHM to σ for a Gaussian, `2√(2 ln 2)`
pub const GAUSSIAN_FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Ratio of half-light radius to σ for a Gaussian, `√(2 ln 2)`
pub const GAUSSIAN_HLR_PER_SIGMA: f64 = 1.177_410_022_515_474_6;

/// A single weighted photon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    pub x: f64,
    pub y: f64,
    pub flux: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Gaussian {
        sigma: f64,
        flux: f64,
    },
    /// Sérsic n = 1
    Exponential {
        half_light_radius: f64,
        flux: f64,
    },
    /// Sérsic n = 4
    DeVaucouleurs {
        half_light_radius: f64,
        flux: f64,
    },
    Moffat {
        beta: f64,
        scale_radius: f64,
        trunc: Option<f64>,
        flux: f64,
    },
    Delta {
        flux: f64,
    },
    /// Equal-flux point sources at fixed offsets
    Knots {
        points: Vec<(f64, f64)>,
        flux: f64,
    },
    Sum(Vec<Profile>),
    Transformed {
        inner: Box<Profile>,
        jacobian: Matrix2<f64>,
        offset: (f64, f64),
    },
}

/// Area preserving shear matrix for reduced shear `(g1, g2)`
pub fn shear_matrix(g1: f64, g2: f64) -> Matrix2<f64> {
    let g_sq = g1 * g1 + g2 * g2;
    let norm = 1.0 / (1.0 - g_sq).max(f64::EPSILON).sqrt();
    Matrix2::new(1.0 + g1, g2, g2, 1.0 - g1) * norm
}

/// Counter-clockwise rotation by `theta` radians
pub fn rotation_matrix(theta: f64) -> Matrix2<f64> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(c, -s, s, c)
}

impl Profile {
    pub fn gaussian_from_fwhm(fwhm: f64, flux: f64) -> Self {
        Profile::Gaussian {
            sigma: fwhm / GAUSSIAN_FWHM_PER_SIGMA,
            flux,
        }
    }

    pub fn gaussian_from_hlr(half_light_radius: f64, flux: f64) -> Self {
        Profile::Gaussian {
            sigma: half_light_radius / GAUSSIAN_HLR_PER_SIGMA,
            flux,
        }
    }

    /// Untruncated Moffat with the given FWHM
    pub fn moffat_from_fwhm(beta: f64, fwhm: f64, flux: f64) -> Self {
        let scale_radius = fwhm / (2.0 * (2f64.powf(1.0 / beta) - 1.0).sqrt());
        Profile::Moffat {
            beta,
            scale_radius,
            trunc: None,
            flux,
        }
    }

    pub fn delta(flux: f64) -> Self {
        Profile::Delta { flux }
    }

    pub fn flux(&self) -> f64 {
        match self {
            Profile::Gaussian { flux, .. }
            | Profile::Exponential { flux, .. }
            | Profile::DeVaucouleurs { flux, .. }
            | Profile::Moffat { flux, .. }
            | Profile::Delta { flux }
            | Profile::Knots { flux, .. } => *flux,
            Profile::Sum(parts) => parts.iter().map(Profile::flux).sum(),
            Profile::Transformed { inner, .. } => inner.flux(),
        }
    }

    /// Same shape scaled to a new total flux
    pub fn with_flux(&self, new_flux: f64) -> Profile {
        let current = self.flux();
        let ratio = if current != 0.0 { new_flux / current } else { 0.0 };
        self.scale_flux(ratio)
    }

    pub fn scale_flux(&self, ratio: f64) -> Profile {
        let mut out = self.clone();
        out.scale_flux_in_place(ratio);
        out
    }

    fn scale_flux_in_place(&mut self, ratio: f64) {
        match self {
            Profile::Gaussian { flux, .. }
            | Profile::Exponential { flux, .. }
            | Profile::DeVaucouleurs { flux, .. }
            | Profile::Moffat { flux, .. }
            | Profile::Delta { flux }
            | Profile::Knots { flux, .. } => *flux *= ratio,
            Profile::Sum(parts) => parts.iter_mut().for_each(|p| p.scale_flux_in_place(ratio)),
            Profile::Transformed { inner, .. } => inner.scale_flux_in_place(ratio),
        }
    }

    /// Apply a linear map, preserving total flux. Nested transforms are fused.
    pub fn transform(&self, m: &Matrix2<f64>) -> Profile {
        match self {
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => {
                let o = m * Vector2::new(offset.0, offset.1);
                Profile::Transformed {
                    inner: inner.clone(),
                    jacobian: m * jacobian,
                    offset: (o.x, o.y),
                }
            }
            other => Profile::Transformed {
                inner: Box::new(other.clone()),
                jacobian: *m,
                offset: (0.0, 0.0),
            },
        }
    }

    pub fn shear(&self, g1: f64, g2: f64) -> Profile {
        self.transform(&shear_matrix(g1, g2))
    }

    pub fn rotate(&self, theta: f64) -> Profile {
        self.transform(&rotation_matrix(theta))
    }

    /// Scale linear size by `scale` at fixed flux
    pub fn dilate(&self, scale: f64) -> Profile {
        self.transform(&Matrix2::from_diagonal_element(scale))
    }

    pub fn shift(&self, dx: f64, dy: f64) -> Profile {
        match self {
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => Profile::Transformed {
                inner: inner.clone(),
                jacobian: *jacobian,
                offset: (offset.0 + dx, offset.1 + dy),
            },
            other => Profile::Transformed {
                inner: Box::new(other.clone()),
                jacobian: Matrix2::identity(),
                offset: (dx, dy),
            },
        }
    }

    /// Surface brightness of the smooth part of the profile at `(x, y)`.
    ///
    /// Point sources ([`Profile::Delta`], [`Profile::Knots`]) contribute
    /// nothing here; see [`Profile::point_sources`].
    pub fn xvalue(&self, x: f64, y: f64) -> f64 {
        match self {
            Profile::Gaussian { sigma, flux } => {
                let r_sq = x * x + y * y;
                flux / (2.0 * PI * sigma * sigma) * (-0.5 * r_sq / (sigma * sigma)).exp()
            }
            Profile::Exponential {
                half_light_radius,
                flux,
            } => sersic_xvalue(1.0, B_EXP, 1.0, *half_light_radius, *flux, x, y),
            Profile::DeVaucouleurs {
                half_light_radius,
                flux,
            } => sersic_xvalue(4.0, B_DEV, 5040.0, *half_light_radius, *flux, x, y),
            Profile::Moffat {
                beta,
                scale_radius,
                trunc,
                flux,
            } => {
                let r_sq = x * x + y * y;
                if let Some(t) = trunc {
                    if r_sq > t * t {
                        return 0.0;
                    }
                }
                let rd_sq = scale_radius * scale_radius;
                let norm = (beta - 1.0) / (PI * rd_sq * moffat_enclosed(*beta, *scale_radius, *trunc));
                flux * norm * (1.0 + r_sq / rd_sq).powf(-beta)
            }
            Profile::Delta { .. } | Profile::Knots { .. } => 0.0,
            Profile::Sum(parts) => parts.iter().map(|p| p.xvalue(x, y)).sum(),
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => {
                let det = jacobian.determinant();
                if det.abs() < f64::MIN_POSITIVE {
                    return 0.0;
                }
                let inv = Matrix2::new(jacobian.m22, -jacobian.m12, -jacobian.m21, jacobian.m11)
                    / det;
                let p = inv * Vector2::new(x - offset.0, y - offset.1);
                inner.xvalue(p.x, p.y) / det.abs()
            }
        }
    }

    /// Point-source components as `(x, y, flux)` in this profile's frame
    pub fn point_sources(&self) -> Vec<(f64, f64, f64)> {
        let mut out = Vec::new();
        self.collect_points(&Matrix2::identity(), (0.0, 0.0), &mut out);
        out
    }

    fn collect_points(
        &self,
        jac: &Matrix2<f64>,
        off: (f64, f64),
        out: &mut Vec<(f64, f64, f64)>,
    ) {
        let place = |x: f64, y: f64| {
            let p = jac * Vector2::new(x, y);
            (p.x + off.0, p.y + off.1)
        };
        match self {
            Profile::Delta { flux } => {
                let (x, y) = place(0.0, 0.0);
                out.push((x, y, *flux));
            }
            Profile::Knots { points, flux } => {
                if points.is_empty() {
                    return;
                }
                let each = flux / points.len() as f64;
                for &(px, py) in points {
                    let (x, y) = place(px, py);
                    out.push((x, y, each));
                }
            }
            Profile::Sum(parts) => parts
                .iter()
                .for_each(|p| p.collect_points(jac, off, out)),
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => {
                let o = place(offset.0, offset.1);
                inner.collect_points(&(jac * jacobian), o, out);
            }
            _ => {}
        }
    }

    /// Characteristic radius used to size drawing stamps.
    ///
    /// Exact half-light radius for the radial primitives; an upper bound for
    /// composites and transformed profiles.
    pub fn size_hint(&self) -> f64 {
        match self {
            Profile::Gaussian { sigma, .. } => sigma * GAUSSIAN_HLR_PER_SIGMA,
            Profile::Exponential {
                half_light_radius, ..
            }
            | Profile::DeVaucouleurs {
                half_light_radius, ..
            } => *half_light_radius,
            Profile::Moffat {
                beta,
                scale_radius,
                trunc,
                ..
            } => {
                let frac = 0.5 * moffat_enclosed(*beta, *scale_radius, *trunc);
                scale_radius * ((1.0 - frac).powf(1.0 / (1.0 - beta)) - 1.0).sqrt()
            }
            Profile::Delta { .. } => 0.0,
            Profile::Knots { points, .. } => points
                .iter()
                .map(|(x, y)| (x * x + y * y).sqrt())
                .fold(0.0, f64::max),
            Profile::Sum(parts) => parts.iter().map(Profile::size_hint).fold(0.0, f64::max),
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => {
                // Largest singular value bounds the stretch in any direction
                let ata = jacobian.transpose() * jacobian;
                let tr = ata.trace();
                let det = ata.determinant();
                let disc = (0.25 * tr * tr - det).max(0.0).sqrt();
                let stretch = (0.5 * tr + disc).sqrt();
                inner.size_hint() * stretch + (offset.0 * offset.0 + offset.1 * offset.1).sqrt()
            }
        }
    }

    /// Sample `n` photons whose fluxes sum to the profile flux.
    ///
    /// Composite profiles split the photon budget across components in
    /// proportion to their absolute flux, at least one photon each.
    pub fn shoot<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Photon> {
        let mut photons = Vec::with_capacity(n);
        self.shoot_into(n.max(1), rng, &mut photons);
        photons
    }

    fn shoot_into<R: Rng + ?Sized>(&self, n: usize, rng: &mut R, out: &mut Vec<Photon>) {
        match self {
            Profile::Gaussian { sigma, flux } => {
                let w = flux / n as f64;
                for _ in 0..n {
                    let x: f64 = rng.sample(StandardNormal);
                    let y: f64 = rng.sample(StandardNormal);
                    out.push(Photon {
                        x: x * sigma,
                        y: y * sigma,
                        flux: w,
                    });
                }
            }
            Profile::Exponential {
                half_light_radius,
                flux,
            } => shoot_sersic(1, B_EXP, *half_light_radius, *flux, n, rng, out),
            Profile::DeVaucouleurs {
                half_light_radius,
                flux,
            } => shoot_sersic(4, B_DEV, *half_light_radius, *flux, n, rng, out),
            Profile::Moffat {
                beta,
                scale_radius,
                trunc,
                flux,
            } => {
                let w = flux / n as f64;
                let f_max = moffat_enclosed(*beta, *scale_radius, *trunc);
                for _ in 0..n {
                    let u: f64 = rng.gen::<f64>() * f_max;
                    let r = scale_radius * ((1.0 - u).powf(1.0 / (1.0 - beta)) - 1.0).max(0.0).sqrt();
                    let phi = rng.gen_range(0.0..2.0 * PI);
                    out.push(Photon {
                        x: r * phi.cos(),
                        y: r * phi.sin(),
                        flux: w,
                    });
                }
            }
            Profile::Delta { flux } => {
                let w = flux / n as f64;
                out.extend((0..n).map(|_| Photon {
                    x: 0.0,
                    y: 0.0,
                    flux: w,
                }));
            }
            Profile::Knots { points, flux } => {
                if points.is_empty() {
                    return;
                }
                let w = flux / n as f64;
                for _ in 0..n {
                    let (x, y) = points[rng.gen_range(0..points.len())];
                    out.push(Photon { x, y, flux: w });
                }
            }
            Profile::Sum(parts) => {
                let total: f64 = parts.iter().map(|p| p.flux().abs()).sum();
                if total <= 0.0 {
                    return;
                }
                for part in parts {
                    let share = part.flux().abs() / total;
                    let count = ((n as f64 * share).round() as usize).max(1);
                    part.shoot_into(count, rng, out);
                }
            }
            Profile::Transformed {
                inner,
                jacobian,
                offset,
            } => {
                let start = out.len();
                inner.shoot_into(n, rng, out);
                for photon in &mut out[start..] {
                    let p = jacobian * Vector2::new(photon.x, photon.y);
                    photon.x = p.x + offset.0;
                    photon.y = p.y + offset.1;
                }
            }
        }
    }
}

/// Fraction of the untruncated Moffat flux inside the truncation radius
fn moffat_enclosed(beta: f64, scale_radius: f64, trunc: Option<f64>) -> f64 {
    match trunc {
        Some(t) => 1.0 - (1.0 + (t / scale_radius).powi(2)).powf(1.0 - beta),
        None => 1.0,
    }
}

fn sersic_xvalue(n: f64, b: f64, gamma_2n: f64, re: f64, flux: f64, x: f64, y: f64) -> f64 {
    let r = (x * x + y * y).sqrt();
    // Total flux = I0 · 2π n re² Γ(2n) / b^(2n)
    let i0 = flux * b.powf(2.0 * n) / (2.0 * PI * n * re * re * gamma_2n);
    i0 * (-b * (r / re).powf(1.0 / n)).exp()
}

fn shoot_sersic<R: Rng + ?Sized>(
    n: u32,
    b: f64,
    re: f64,
    flux: f64,
    count: usize,
    rng: &mut R,
    out: &mut Vec<Photon>,
) {
    let w = flux / count as f64;
    for _ in 0..count {
        // Gamma(2n, 1) with integer shape is a sum of 2n unit exponentials
        let t: f64 = (0..2 * n).map(|_| rng.sample::<f64, _>(Exp1)).sum();
        let r = re * (t / b).powi(n as i32);
        let phi = rng.gen_range(0.0..2.0 * PI);
        out.push(Photon {
            x: r * phi.cos(),
            y: r * phi.sin(),
            flux: w,
        });
    }
}
