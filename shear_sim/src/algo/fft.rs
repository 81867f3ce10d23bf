//! 2D FFT helpers built on rustfft
//!
//! Arrays are transformed row by row and then column by column. Kernels for
//! convolution are stored centred at index `(ny / 2, nx / 2)`.

use ndarray::Array2;
use rustfft::{num_complex::Complex64, FftPlanner};

fn transform_axes(data: &mut Array2<Complex64>, planner: &mut FftPlanner<f64>, inverse: bool) {
    let (ny, nx) = data.dim();
    if nx == 0 || ny == 0 {
        return;
    }

    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(nx), planner.plan_fft_inverse(ny))
    } else {
        (planner.plan_fft_forward(nx), planner.plan_fft_forward(ny))
    };

    let mut buf = vec![Complex64::default(); nx.max(ny)];

    for mut row in data.rows_mut() {
        let line = &mut buf[..nx];
        line.iter_mut().zip(row.iter()).for_each(|(b, v)| *b = *v);
        row_fft.process(line);
        row.iter_mut().zip(line.iter()).for_each(|(v, b)| *v = *b);
    }

    for mut col in data.columns_mut() {
        let line = &mut buf[..ny];
        line.iter_mut().zip(col.iter()).for_each(|(b, v)| *b = *v);
        col_fft.process(line);
        col.iter_mut().zip(line.iter()).for_each(|(v, b)| *v = *b);
    }
}

/// Forward 2D FFT in place (unnormalized)
pub fn fft2_inplace(data: &mut Array2<Complex64>, planner: &mut FftPlanner<f64>) {
    transform_axes(data, planner, false);
}

/// Inverse 2D FFT in place, normalized by the number of samples
pub fn ifft2_inplace(data: &mut Array2<Complex64>, planner: &mut FftPlanner<f64>) {
    transform_axes(data, planner, true);
    let norm = 1.0 / data.len() as f64;
    data.mapv_inplace(|v| v * norm);
}

/// Roll a centred kernel so its centre lands on index `[0, 0]`
fn ifftshift(kernel: &Array2<f64>) -> Array2<Complex64> {
    let (ny, nx) = kernel.dim();
    let (cy, cx) = (ny / 2, nx / 2);
    Array2::from_shape_fn((ny, nx), |(iy, ix)| {
        Complex64::new(kernel[[(iy + cy) % ny, (ix + cx) % nx]], 0.0)
    })
}

/// Circular convolution by FFT with a reusable kernel transform.
///
/// Build once per kernel and apply to any number of same-shaped images.
pub struct FftConvolver {
    planner: FftPlanner<f64>,
}

impl Default for FftConvolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FftConvolver {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Fourier transform of a centred kernel, ready for [`FftConvolver::convolve_with`]
    pub fn kernel_transform(&mut self, kernel: &Array2<f64>) -> Array2<Complex64> {
        let mut shifted = ifftshift(kernel);
        fft2_inplace(&mut shifted, &mut self.planner);
        shifted
    }

    /// Convolve `image` with a kernel given by its transform.
    ///
    /// # Panics
    /// If the image and kernel transform shapes differ.
    pub fn convolve_with(
        &mut self,
        image: &Array2<f64>,
        kernel_ft: &Array2<Complex64>,
    ) -> Array2<f64> {
        assert_eq!(
            image.dim(),
            kernel_ft.dim(),
            "image and kernel transform must share a shape"
        );
        let mut data = image.mapv(|v| Complex64::new(v, 0.0));
        fft2_inplace(&mut data, &mut self.planner);
        data.zip_mut_with(kernel_ft, |d, k| *d *= *k);
        ifft2_inplace(&mut data, &mut self.planner);
        data.mapv(|c| c.re)
    }

    /// Convolve `image` with a centred kernel of the same shape
    pub fn convolve(&mut self, image: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
        let kernel_ft = self.kernel_transform(kernel);
        self.convolve_with(image, &kernel_ft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_inverse_identity() {
        let mut planner = FftPlanner::new();
        let original = Array2::from_shape_fn((6, 9), |(y, x)| {
            Complex64::new((x * 3 + y) as f64, (y as f64) * 0.5)
        });
        let mut data = original.clone();
        fft2_inplace(&mut data, &mut planner);
        ifft2_inplace(&mut data, &mut planner);

        for (a, b) in data.iter().zip(original.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_delta_kernel_is_identity() {
        let image = Array2::from_shape_fn((7, 7), |(y, x)| (y * 7 + x) as f64);
        let mut kernel = Array2::<f64>::zeros((7, 7));
        kernel[[3, 3]] = 1.0;

        let out = FftConvolver::new().convolve(&image, &kernel);
        for (a, b) in out.iter().zip(image.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_offset_delta_shifts_image() {
        let mut image = Array2::<f64>::zeros((9, 9));
        image[[4, 4]] = 2.0;
        let mut kernel = Array2::<f64>::zeros((9, 9));
        kernel[[5, 3]] = 1.0;

        let out = FftConvolver::new().convolve(&image, &kernel);
        assert_relative_eq!(out[[5, 3]], 2.0, epsilon = 1e-9);
        assert_relative_eq!(out.sum(), 2.0, epsilon = 1e-9);
    }
}
