//! Export of rendered exposures for inspection.

pub mod png;

pub use png::{exposure_to_gray_image, mask_to_gray_image, percentile_limits, save_exposure_png};
