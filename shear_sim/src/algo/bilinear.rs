//! Bilinear interpolation on regular 2D grids.
//!
//! Used to evaluate smoothly varying fields (PSF shear and size) at arbitrary
//! focal-plane positions. Samples are stored as `data[[iy, ix]]` at
//! `origin + spacing * (ix, iy)`.

use ndarray::Array2;

/// Bilinear interpolator over a regularly spaced grid.
///
/// Positions outside the sampled area are clamped to the nearest edge sample.
#[derive(Debug, Clone)]
pub struct GridInterpolator {
    /// Position of sample `[0, 0]`
    origin: (f64, f64),
    /// Distance between neighbouring samples along both axes
    spacing: f64,
    /// Samples indexed as `[y_index, x_index]`
    data: Array2<f64>,
}

impl GridInterpolator {
    /// Create an interpolator.
    ///
    /// # Panics
    /// If `spacing` is not strictly positive or `data` is empty.
    pub fn new(origin: (f64, f64), spacing: f64, data: Array2<f64>) -> Self {
        assert!(spacing > 0.0, "grid spacing must be positive");
        assert!(!data.is_empty(), "grid must contain at least one sample");
        Self {
            origin,
            spacing,
            data,
        }
    }

    /// Extent covered by the samples as `(x_min, x_max, y_min, y_max)`
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let (ny, nx) = self.data.dim();
        (
            self.origin.0,
            self.origin.0 + self.spacing * (nx - 1) as f64,
            self.origin.1,
            self.origin.1 + self.spacing * (ny - 1) as f64,
        )
    }

    /// Lower index and weight along one axis, clamped to the grid
    fn locate(&self, value: f64, origin: f64, n: usize) -> (usize, usize, f64) {
        if n == 1 {
            return (0, 0, 0.0);
        }
        let t = ((value - origin) / self.spacing).clamp(0.0, (n - 1) as f64);
        let low = (t.floor() as usize).min(n - 2);
        (low, low + 1, t - low as f64)
    }

    /// Interpolate the field at `(x, y)`
    pub fn interpolate(&self, x: f64, y: f64) -> f64 {
        let (ny, nx) = self.data.dim();
        let (x0, x1, wx) = self.locate(x, self.origin.0, nx);
        let (y0, y1, wy) = self.locate(y, self.origin.1, ny);

        let q00 = self.data[[y0, x0]];
        let q01 = self.data[[y0, x1]];
        let q10 = self.data[[y1, x0]];
        let q11 = self.data[[y1, x1]];

        q00 * (1.0 - wx) * (1.0 - wy) + q01 * wx * (1.0 - wy) + q10 * (1.0 - wx) * wy + q11 * wx * wy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_grid() -> GridInterpolator {
        // data = x + 2y sampled at origin (10, 20), spacing 5
        let data = Array2::from_shape_fn((4, 3), |(iy, ix)| {
            let x = 10.0 + 5.0 * ix as f64;
            let y = 20.0 + 5.0 * iy as f64;
            x + 2.0 * y
        });
        GridInterpolator::new((10.0, 20.0), 5.0, data)
    }

    #[test]
    fn test_exact_at_samples() {
        let g = plane_grid();
        assert_relative_eq!(g.interpolate(10.0, 20.0), 50.0);
        assert_relative_eq!(g.interpolate(20.0, 35.0), 90.0);
    }

    #[test]
    fn test_linear_field_reproduced() {
        let g = plane_grid();
        for &(x, y) in &[(12.5, 21.0), (17.3, 33.9), (19.99, 20.01)] {
            assert_relative_eq!(g.interpolate(x, y), x + 2.0 * y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_clamped_outside() {
        let g = plane_grid();
        assert_relative_eq!(g.interpolate(-100.0, 20.0), g.interpolate(10.0, 20.0));
        assert_relative_eq!(g.interpolate(100.0, 100.0), g.interpolate(20.0, 35.0));
        assert_eq!(g.extent(), (10.0, 20.0, 20.0, 35.0));
    }
}
