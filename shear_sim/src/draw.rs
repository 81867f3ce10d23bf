//! Stamp rendering of PSF-convolved profiles onto pixel images.
//!
//! Profiles handed to this module must already be in the pixel frame (see
//! [`to_pixel_frame`]) and centred on the origin. FFT drawing samples the
//! object and the PSF on a grid oversampled by [`OVERSAMPLE`], convolves them
//! and bins back to native pixels, which integrates over the pixel response.
//! Photon shooting adds a PSF-sampled offset to every object photon and bins
//! photons straight into the image.

use std::collections::HashMap;
use std::str::FromStr;

use nalgebra::Matrix2;
use ndarray::{s, Array2};
use rand::Rng;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::algo::fft::FftConvolver;
use crate::constants::{MAX_FFT_STAMP, MAX_PHOTONS};
use crate::error::SimError;
use crate::profile::Profile;
use crate::wcs::BoundingBox;

/// Sub-pixel sampling factor for FFT drawing
pub const OVERSAMPLE: usize = 3;

/// Photons shot per object are clamped from below by this count
const MIN_PHOTONS: usize = 1000;

/// How objects are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMethod {
    /// FFT with pixel response, photon shooting for stamps too large to FFT
    #[default]
    Auto,
    Fft,
    /// FFT without integrating over the pixel
    NoPixel,
    Phot,
}

impl FromStr for DrawMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(DrawMethod::Auto),
            "fft" => Ok(DrawMethod::Fft),
            "no_pixel" => Ok(DrawMethod::NoPixel),
            "phot" => Ok(DrawMethod::Phot),
            other => Err(SimError::invalid(format!("unknown draw method '{other}'"))),
        }
    }
}

/// Rendered pixels plus the image position of `data[[0, 0]]`
#[derive(Debug, Clone)]
pub struct Stamp {
    pub data: Array2<f64>,
    pub x0: i64,
    pub y0: i64,
}

impl Stamp {
    pub fn bbox(&self) -> BoundingBox {
        let (h, w) = self.data.dim();
        BoundingBox::new(self.x0, self.y0, w, h)
    }

    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
}

/// Map a tangent-plane profile into the pixel frame of a WCS with Jacobian `jac`
/// (arcsec per pixel).
pub fn to_pixel_frame(profile: &Profile, jac: &Matrix2<f64>) -> Profile {
    let inv = jac.try_inverse().unwrap_or_else(Matrix2::identity);
    profile.transform(&inv)
}

/// Odd native stamp size for an extended object convolved with a PSF of
/// FWHM `psf_fwhm` (both in pixels)
pub fn stamp_size(object: &Profile, psf_fwhm: f64) -> usize {
    let half = (5.0 * object.size_hint() + 3.0 * psf_fwhm).ceil() as usize;
    2 * half.max(4) + 1
}

/// Odd native stamp size for a point source; bright stars get larger stamps
/// to hold their PSF wings.
pub fn point_stamp_size(flux: f64, psf_fwhm: f64) -> usize {
    let boost = (flux.max(1.0) / 1.0e3).log10().max(0.0);
    let half = (psf_fwhm * (4.0 + 2.0 * boost)).ceil() as usize;
    2 * half.max(4) + 1
}

/// Sample `profile` on a `size × size` grid with spacing `1 / oversample`,
/// centred on the middle cell. Each cell holds the flux it contains.
pub fn sample_profile(profile: &Profile, size: usize, oversample: usize) -> Array2<f64> {
    let c = (size as f64 - 1.0) / 2.0;
    let step = 1.0 / oversample as f64;
    let area = step * step;

    let mut grid = Array2::from_shape_fn((size, size), |(i, j)| {
        profile.xvalue((j as f64 - c) * step, (i as f64 - c) * step) * area
    });

    for (x, y, flux) in profile.point_sources() {
        deposit_bilinear(&mut grid, c + x * oversample as f64, c + y * oversample as f64, flux);
    }
    grid
}

/// Spread a point flux over the four cells around `(gx, gy)` so the centroid
/// is preserved
fn deposit_bilinear(grid: &mut Array2<f64>, gx: f64, gy: f64, flux: f64) {
    let (h, w) = grid.dim();
    let ix = gx.floor();
    let iy = gy.floor();
    let fx = gx - ix;
    let fy = gy - iy;
    for (dy, wy) in [(0i64, 1.0 - fy), (1, fy)] {
        for (dx, wx) in [(0i64, 1.0 - fx), (1, fx)] {
            let x = ix as i64 + dx;
            let y = iy as i64 + dy;
            if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                continue;
            }
            grid[[y as usize, x as usize]] += flux * wx * wy;
        }
    }
}

/// Sum `oversample × oversample` blocks
fn bin_down(fine: &Array2<f64>, oversample: usize) -> Array2<f64> {
    let (h, w) = fine.dim();
    Array2::from_shape_fn((h / oversample, w / oversample), |(i, j)| {
        fine.slice(s![
            i * oversample..(i + 1) * oversample,
            j * oversample..(j + 1) * oversample
        ])
        .sum()
    })
}

/// Take the cell at each native pixel centre, rescaled to a per-pixel value
fn sample_centres(fine: &Array2<f64>, oversample: usize) -> Array2<f64> {
    let (h, w) = fine.dim();
    let mid = oversample / 2;
    let scale = (oversample * oversample) as f64;
    Array2::from_shape_fn((h / oversample, w / oversample), |(i, j)| {
        fine[[i * oversample + mid, j * oversample + mid]] * scale
    })
}

/// Render a profile on its own (no further convolution) into an odd
/// `size × size` stamp integrated over pixels
pub fn draw_pixelized(profile: &Profile, size: usize) -> Array2<f64> {
    let fine = sample_profile(profile, size * OVERSAMPLE, OVERSAMPLE);
    bin_down(&fine, OVERSAMPLE)
}

/// Add the overlapping part of a stamp to an image; returns false when the
/// stamp falls entirely off the image
pub fn add_stamp(image: &mut Array2<f64>, stamp: &Stamp) -> bool {
    let (h, w) = image.dim();
    let Some(overlap) = BoundingBox::of_dims(w, h).intersection(&stamp.bbox()) else {
        return false;
    };

    let ix0 = overlap.min_x as usize;
    let iy0 = overlap.min_y as usize;
    let sx0 = (overlap.min_x - stamp.x0) as usize;
    let sy0 = (overlap.min_y - stamp.y0) as usize;

    let mut dst = image.slice_mut(s![iy0..iy0 + overlap.height, ix0..ix0 + overlap.width]);
    let src = stamp.data.slice(s![
        sy0..sy0 + overlap.height,
        sx0..sx0 + overlap.width
    ]);
    dst += &src;
    true
}

/// Stateful renderer holding the FFT planner and a cache of PSF transforms
/// for position-independent PSFs.
#[derive(Default)]
pub struct StampDrawer {
    convolver: FftConvolver,
    kernel_cache: HashMap<usize, Array2<Complex64>>,
}

impl StampDrawer {
    pub fn new() -> Self {
        Self::default()
    }

    fn kernel(&mut self, psf: &Profile, fine_size: usize, cache: bool) -> Array2<Complex64> {
        if cache {
            if let Some(k) = self.kernel_cache.get(&fine_size) {
                return k.clone();
            }
        }
        let mut sampled = sample_profile(psf, fine_size, OVERSAMPLE);
        let total = sampled.sum();
        if total > 0.0 {
            sampled /= total;
        }
        let k = self.convolver.kernel_transform(&sampled);
        if cache {
            self.kernel_cache.insert(fine_size, k.clone());
        }
        k
    }

    /// Draw `object` convolved with `psf` on an odd `native_size` stamp
    /// centred on the pixel nearest `position`.
    ///
    /// The stamp is normalized so that its sum equals the object flux.
    pub fn draw_fft(
        &mut self,
        object: &Profile,
        psf: &Profile,
        position: (f64, f64),
        native_size: usize,
        pixel: bool,
        cache_psf: bool,
    ) -> Stamp {
        let native_size = native_size | 1;
        let fine_size = native_size * OVERSAMPLE;
        let ix = position.0.round();
        let iy = position.1.round();

        let shifted = object.shift(position.0 - ix, position.1 - iy);
        let fine = sample_profile(&shifted, fine_size, OVERSAMPLE);
        let kernel = self.kernel(psf, fine_size, cache_psf);
        let convolved = self.convolver.convolve_with(&fine, &kernel);

        let mut data = if pixel {
            bin_down(&convolved, OVERSAMPLE)
        } else {
            sample_centres(&convolved, OVERSAMPLE)
        };
        let total = data.sum();
        if total.abs() > 0.0 {
            data *= object.flux() / total;
        }

        let half = (native_size / 2) as i64;
        Stamp {
            data,
            x0: ix as i64 - half,
            y0: iy as i64 - half,
        }
    }

    /// Photon-shoot `object` convolved with `psf` directly into `image`.
    ///
    /// Returns false when no photon lands on the image.
    pub fn draw_phot<R: Rng + ?Sized>(
        &mut self,
        object: &Profile,
        psf: &Profile,
        position: (f64, f64),
        image: &mut Array2<f64>,
        rng: &mut R,
    ) -> bool {
        let n = (object.flux().abs().round() as usize).clamp(MIN_PHOTONS, MAX_PHOTONS);
        let photons = object.shoot(n, rng);
        let offsets = psf.with_flux(1.0).shoot(photons.len(), rng);

        let (h, w) = image.dim();
        let mut landed = false;
        for (photon, offset) in photons.iter().zip(offsets.iter()) {
            let x = (position.0 + photon.x + offset.x).round();
            let y = (position.1 + photon.y + offset.y).round();
            if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
                continue;
            }
            image[[y as usize, x as usize]] += photon.flux;
            landed = true;
        }
        landed
    }

    /// Render one object with the requested method, returning whether any
    /// flux landed on the image. `native_size` is the FFT stamp size; `auto`
    /// switches to photon shooting when it exceeds [`MAX_FFT_STAMP`].
    #[allow(clippy::too_many_arguments)]
    pub fn render<R: Rng + ?Sized>(
        &mut self,
        method: DrawMethod,
        object: &Profile,
        psf: &Profile,
        position: (f64, f64),
        native_size: usize,
        cache_psf: bool,
        image: &mut Array2<f64>,
        rng: &mut R,
    ) -> bool {
        let method = match method {
            DrawMethod::Auto if native_size > MAX_FFT_STAMP => DrawMethod::Phot,
            DrawMethod::Auto => DrawMethod::Fft,
            other => other,
        };
        match method {
            DrawMethod::Phot => self.draw_phot(object, psf, position, image, rng),
            DrawMethod::NoPixel => {
                let stamp = self.draw_fft(object, psf, position, native_size, false, cache_psf);
                add_stamp(image, &stamp)
            }
            _ => {
                let stamp = self.draw_fft(object, psf, position, native_size, true, cache_psf);
                add_stamp(image, &stamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn centroid(data: &Array2<f64>) -> (f64, f64) {
        let total = data.sum();
        let mut mx = 0.0;
        let mut my = 0.0;
        for ((i, j), v) in data.indexed_iter() {
            mx += j as f64 * v;
            my += i as f64 * v;
        }
        (mx / total, my / total)
    }

    #[test]
    fn test_draw_method_parse() {
        assert_eq!("auto".parse::<DrawMethod>().unwrap(), DrawMethod::Auto);
        assert_eq!("phot".parse::<DrawMethod>().unwrap(), DrawMethod::Phot);
        assert_eq!("no_pixel".parse::<DrawMethod>().unwrap(), DrawMethod::NoPixel);
        assert!(matches!(
            "raytrace".parse::<DrawMethod>(),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fft_stamp_flux_and_position() {
        let mut drawer = StampDrawer::new();
        let gal = Profile::Exponential {
            half_light_radius: 2.5,
            flux: 1000.0,
        };
        let psf = Profile::gaussian_from_fwhm(4.0, 1.0);
        let stamp = drawer.draw_fft(&gal, &psf, (40.3, 20.8), 41, true, true);

        assert_eq!(stamp.data.dim(), (41, 41));
        assert_eq!((stamp.x0, stamp.y0), (20, 1));
        assert_relative_eq!(stamp.sum(), 1000.0, max_relative = 1e-9);

        let (cx, cy) = centroid(&stamp.data);
        assert_relative_eq!(cx + stamp.x0 as f64, 40.3, epsilon = 0.02);
        assert_relative_eq!(cy + stamp.y0 as f64, 20.8, epsilon = 0.02);
    }

    #[test]
    fn test_point_source_gives_psf() {
        let mut drawer = StampDrawer::new();
        let psf = Profile::gaussian_from_fwhm(4.0, 1.0);
        let stamp = drawer.draw_fft(&Profile::delta(1.0), &psf, (10.0, 10.0), 31, true, false);
        let direct = draw_pixelized(&psf, 31);
        for (a, b) in stamp.data.iter().zip(direct.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_add_stamp_clips_to_image() {
        let mut image = Array2::<f64>::zeros((10, 10));
        let stamp = Stamp {
            data: Array2::ones((5, 5)),
            x0: 7,
            y0: -2,
        };
        assert!(add_stamp(&mut image, &stamp));
        assert_relative_eq!(image.sum(), 9.0);
        assert_eq!(image[[0, 9]], 1.0);
        assert_eq!(image[[3, 9]], 0.0);

        let off = Stamp {
            data: Array2::ones((3, 3)),
            x0: 20,
            y0: 20,
        };
        assert!(!add_stamp(&mut image, &off));
    }

    #[test]
    fn test_phot_conserves_flux_on_image() {
        let mut drawer = StampDrawer::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut image = Array2::<f64>::zeros((64, 64));
        let gal = Profile::Exponential {
            half_light_radius: 2.0,
            flux: 5000.0,
        };
        let psf = Profile::moffat_from_fwhm(4.765, 4.0, 1.0);
        assert!(drawer.draw_phot(&gal, &psf, (32.0, 31.5), &mut image, &mut rng));
        assert_relative_eq!(image.sum(), 5000.0, max_relative = 0.01);

        let (cx, cy) = centroid(&image);
        assert!((cx - 32.0).abs() < 0.2);
        assert!((cy - 31.5).abs() < 0.2);
    }

    #[test]
    fn test_auto_falls_back_to_phot_for_huge_stamps() {
        let mut drawer = StampDrawer::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut image = Array2::<f64>::zeros((32, 32));
        let psf = Profile::gaussian_from_fwhm(3.0, 1.0);
        let drawn = drawer.render(
            DrawMethod::Auto,
            &Profile::delta(100.0),
            &psf,
            (16.0, 16.0),
            MAX_FFT_STAMP + 2,
            false,
            &mut image,
            &mut rng,
        );
        assert!(drawn);
        assert_relative_eq!(image.sum(), 100.0, max_relative = 1e-6);
    }

    #[test]
    fn test_to_pixel_frame_scales_size() {
        let jac = Matrix2::from_diagonal_element(0.2);
        let p = to_pixel_frame(&Profile::gaussian_from_hlr(0.5, 1.0), &jac);
        assert_relative_eq!(p.size_hint(), 2.5, max_relative = 1e-9);
    }
}
