//! Galaxy and star populations.
//!
//! A catalog owns an ordered list of tangent-plane shifts and can produce one
//! profile per shift for a given band. Catalogs are built once from the
//! caller's RNG and are read-only afterwards.

pub mod catsim;
pub mod galaxies;
pub mod layout;
pub mod stars;

pub use galaxies::{
    make_galaxy_catalog, FixedGalaxyConfig, GalaxyCatalog, GalaxyCatalogConfig, GalaxyType,
    Morphology, DEFAULT_FIXED_GAL_CONFIG,
};
pub use layout::{Layout, Shift};
pub use stars::{make_star_catalog, StarCatalog, StarConfig, StarObject};
