//! Synthetic multi-band, multi-epoch exposures for weak-lensing shear tests
//!
//! This crate renders galaxies and stars with a known applied shear, convolved
//! with a fixed or spatially varying PSF, onto single-epoch images that may be
//! dithered and rotated relative to a common coadd frame. Detector effects such
//! as saturation, bleed trails, bad columns and cosmic rays can be layered on.

pub mod algo;
pub mod catalogs;
pub mod constants;
pub mod defects;
pub mod draw;
pub mod error;
pub mod exposure;
pub mod io;
pub mod noise;
pub mod profile;
pub mod psf;
pub mod sim;
pub mod survey;
pub mod units;
pub mod wcs;

// Re-exports for easier access
pub use catalogs::{
    make_galaxy_catalog, make_star_catalog, GalaxyCatalog, GalaxyCatalogConfig, GalaxyType,
    Layout, StarCatalog, StarConfig,
};
pub use draw::DrawMethod;
pub use error::{Result, SimError};
pub use exposure::{Exposure, Mask, MaskPlane};
pub use psf::{make_fixed_psf, make_ps_psf, Psf};
pub use sim::{get_se_dim, make_sim, BrightInfo, SimConfig, SimResult};
pub use survey::Survey;
pub use wcs::{BoundingBox, SkyCoord, TanWcs};
