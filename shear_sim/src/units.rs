//! Type-safe angles for sky coordinates and pixel scales
//!
//! Wraps the `uom` angle quantity with the conversions the simulator needs:
//! degrees for sky positions, arcseconds for shifts and pixel scales, and
//! radians for trigonometry.

use uom::si::angle::{degree, radian, second};

/// Type alias for plane angles
pub type Angle = uom::si::f64::Angle;

/// Extension trait for angle conversions used in astrometry
pub trait AngleExt {
    /// Create angle from degrees
    fn from_degrees(deg: f64) -> Self;

    /// Get angle in degrees
    fn as_degrees(&self) -> f64;

    /// Create angle from arcseconds
    fn from_arcseconds(arcsec: f64) -> Self;

    /// Get angle in arcseconds
    fn as_arcseconds(&self) -> f64;

    /// Create angle from radians
    fn from_radians(rad: f64) -> Self;

    /// Get angle in radians
    fn as_radians(&self) -> f64;
}

impl AngleExt for Angle {
    fn from_degrees(deg: f64) -> Self {
        Angle::new::<degree>(deg)
    }

    fn as_degrees(&self) -> f64 {
        self.get::<degree>()
    }

    fn from_arcseconds(arcsec: f64) -> Self {
        Angle::new::<second>(arcsec)
    }

    fn as_arcseconds(&self) -> f64 {
        self.get::<second>()
    }

    fn from_radians(rad: f64) -> Self {
        Angle::new::<radian>(rad)
    }

    fn as_radians(&self) -> f64 {
        self.get::<radian>()
    }
}
