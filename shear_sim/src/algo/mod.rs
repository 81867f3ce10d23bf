//! Numerical building blocks used by the renderer and PSF models
//!
//! Deterministic parallel array fills, bilinear interpolation on regular
//! grids, and 2D FFT helpers.

pub mod bilinear;
pub mod fft;
pub mod parallel;

pub use bilinear::GridInterpolator;
pub use fft::{fft2_inplace, ifft2_inplace, FftConvolver};
pub use parallel::for_each_row_chunk_seeded;
