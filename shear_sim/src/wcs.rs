//! Sky coordinates, gnomonic (TAN) projection and pixel bounding boxes.
//!
//! Positions on the sky are projected onto the plane tangent to the sphere at
//! a world origin. Tangent-plane coordinates `(u, v)` are in arcseconds with
//! `u` increasing toward the east (increasing RA) and `v` toward the north.
//! An affine CD matrix then maps `(u, v)` to zero-indexed pixel coordinates,
//! where pixel `(x, y)` is the centre of `image[[y, x]]`.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::Serialize;

use crate::units::{Angle, AngleExt};

/// Radians per arcsecond
const ARCSEC_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Equatorial sky position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    pub ra: Angle,
    pub dec: Angle,
}

impl SkyCoord {
    pub fn new(ra: Angle, dec: Angle) -> Self {
        Self { ra, dec }
    }

    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self::new(Angle::from_degrees(ra_deg), Angle::from_degrees(dec_deg))
    }

    pub fn ra_degrees(&self) -> f64 {
        self.ra.as_degrees()
    }

    pub fn dec_degrees(&self) -> f64 {
        self.dec.as_degrees()
    }

    fn to_unit_vector(self) -> Vector3<f64> {
        let (ra, dec) = (self.ra.as_radians(), self.dec.as_radians());
        Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
    }

    fn from_unit_vector(v: &Vector3<f64>) -> Self {
        let dec = v.z.clamp(-1.0, 1.0).asin();
        let mut ra = v.y.atan2(v.x);
        if ra < 0.0 {
            ra += 2.0 * std::f64::consts::PI;
        }
        Self::new(Angle::from_radians(ra), Angle::from_radians(dec))
    }

    /// Great-circle separation from another position
    pub fn separation(&self, other: &SkyCoord) -> Angle {
        let dot = self
            .to_unit_vector()
            .dot(&other.to_unit_vector())
            .clamp(-1.0, 1.0);
        Angle::from_radians(dot.acos())
    }
}

/// Gnomonic projection about a fixed tangent point.
///
/// Holds the rotation whose columns are the local east, north and radial unit
/// vectors at the tangent point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentPlane {
    pub origin: SkyCoord,
    basis: Matrix3<f64>,
}

impl TangentPlane {
    pub fn new(origin: SkyCoord) -> Self {
        let z = origin.to_unit_vector();

        // Fall back to the x axis as "north" exactly at the poles
        let north_pole = Vector3::new(0.0, 0.0, 1.0);
        let reference = if z.cross(&north_pole).norm() < 1e-12 {
            Vector3::new(-1.0, 0.0, 0.0)
        } else {
            north_pole
        };
        let east = reference.cross(&z).normalize();
        let north = z.cross(&east).normalize();

        Self {
            origin,
            basis: Matrix3::from_columns(&[east, north, z]),
        }
    }

    /// Project a sky position to tangent-plane arcseconds.
    ///
    /// Returns `None` for positions on or behind the plane of the sky horizon.
    pub fn project(&self, coord: &SkyCoord) -> Option<(f64, f64)> {
        let local = self.basis.transpose() * coord.to_unit_vector();
        if local.z <= 0.0 {
            return None;
        }
        Some((
            local.x / local.z / ARCSEC_RAD,
            local.y / local.z / ARCSEC_RAD,
        ))
    }

    /// Inverse of [`TangentPlane::project`]
    pub fn deproject(&self, u: f64, v: f64) -> SkyCoord {
        let local = Vector3::new(u * ARCSEC_RAD, v * ARCSEC_RAD, 1.0);
        SkyCoord::from_unit_vector(&(self.basis * local).normalize())
    }
}

/// TAN world coordinate system: gnomonic projection plus affine CD matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TanWcs {
    plane: TangentPlane,
    /// Pixel position of the world origin
    image_origin: (f64, f64),
    /// Arcseconds of (u, v) per pixel of (x, y)
    cd: Matrix2<f64>,
    cd_inv: Matrix2<f64>,
}

impl TanWcs {
    /// Build a WCS with square pixels of side `scale`, optionally rotated by
    /// `theta` radians about the image origin.
    pub fn new(
        scale: Angle,
        image_origin: (f64, f64),
        world_origin: SkyCoord,
        theta: Option<f64>,
    ) -> Self {
        let s = scale.as_arcseconds();
        let mut cd = Matrix2::new(s, 0.0, 0.0, s);
        if let Some(theta) = theta {
            let (sin, cos) = theta.sin_cos();
            cd *= Matrix2::new(cos, -sin, sin, cos);
        }
        // A scaled rotation always has an inverse for s > 0
        let cd_inv = cd.try_inverse().unwrap_or_else(Matrix2::zeros);

        Self {
            plane: TangentPlane::new(world_origin),
            image_origin,
            cd,
            cd_inv,
        }
    }

    pub fn world_origin(&self) -> SkyCoord {
        self.plane.origin
    }

    pub fn image_origin(&self) -> (f64, f64) {
        self.image_origin
    }

    /// Local pixel-to-tangent-plane Jacobian (arcsec per pixel)
    pub fn jacobian(&self) -> Matrix2<f64> {
        self.cd
    }

    /// Pixel area in square arcseconds
    pub fn pixel_area(&self) -> f64 {
        self.cd.determinant().abs()
    }

    pub fn uv_to_pixel(&self, u: f64, v: f64) -> (f64, f64) {
        let p = self.cd_inv * Vector2::new(u, v);
        (p.x + self.image_origin.0, p.y + self.image_origin.1)
    }

    pub fn pixel_to_uv(&self, x: f64, y: f64) -> (f64, f64) {
        let w = self.cd * Vector2::new(x - self.image_origin.0, y - self.image_origin.1);
        (w.x, w.y)
    }

    /// Map a sky position to pixel coordinates
    pub fn sky_to_pixel(&self, coord: &SkyCoord) -> Option<(f64, f64)> {
        self.plane
            .project(coord)
            .map(|(u, v)| self.uv_to_pixel(u, v))
    }

    /// Map pixel coordinates to a sky position
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> SkyCoord {
        let (u, v) = self.pixel_to_uv(x, y);
        self.plane.deproject(u, v)
    }
}

/// Integer pixel box starting at `(min_x, min_y)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_x: i64,
    pub min_y: i64,
    pub width: usize,
    pub height: usize,
}

impl BoundingBox {
    pub fn new(min_x: i64, min_y: i64, width: usize, height: usize) -> Self {
        Self {
            min_x,
            min_y,
            width,
            height,
        }
    }

    /// Box of a full image starting at pixel zero
    pub fn of_dims(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn max_x(&self) -> i64 {
        self.min_x + self.width as i64 - 1
    }

    pub fn max_y(&self) -> i64 {
        self.min_y + self.height as i64 - 1
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x <= self.max_x() && y >= self.min_y && y <= self.max_y()
    }

    /// Overlap with another box, `None` if disjoint
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if max_x < min_x || max_y < min_y {
            return None;
        }
        Some(BoundingBox::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as usize,
            (max_y - min_y + 1) as usize,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_origin_projects_to_zero() {
        let plane = TangentPlane::new(SkyCoord::from_degrees(200.0, 0.0));
        let (u, v) = plane.project(&plane.origin).unwrap();
        assert_relative_eq!(u, 0.0, epsilon = 1e-9);
        assert_relative_eq!(v, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_east_and_north_directions() {
        let plane = TangentPlane::new(SkyCoord::from_degrees(200.0, 0.0));
        let (u, v) = plane
            .project(&SkyCoord::from_degrees(200.0 + 1.0 / 3600.0, 0.0))
            .unwrap();
        assert_relative_eq!(u, 1.0, epsilon = 1e-6);
        assert_relative_eq!(v, 0.0, epsilon = 1e-9);

        let (u, v) = plane
            .project(&SkyCoord::from_degrees(200.0, 2.0 / 3600.0))
            .unwrap();
        assert_relative_eq!(u, 0.0, epsilon = 1e-9);
        assert_relative_eq!(v, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_project_deproject_round_trip() {
        let plane = TangentPlane::new(SkyCoord::from_degrees(10.0, -45.0));
        for &(u, v) in &[(0.0, 0.0), (30.5, -12.25), (-300.0, 250.0)] {
            let sky = plane.deproject(u, v);
            let (u2, v2) = plane.project(&sky).unwrap();
            assert_relative_eq!(u, u2, epsilon = 1e-7);
            assert_relative_eq!(v, v2, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_behind_plane_rejected() {
        let plane = TangentPlane::new(SkyCoord::from_degrees(0.0, 0.0));
        assert!(plane.project(&SkyCoord::from_degrees(180.0, 0.0)).is_none());
    }

    #[test]
    fn test_wcs_origin_and_scale() {
        let wcs = TanWcs::new(
            Angle::from_arcseconds(0.2),
            (100.0, 100.0),
            SkyCoord::from_degrees(200.0, 0.0),
            None,
        );
        let (x, y) = wcs.sky_to_pixel(&wcs.world_origin()).unwrap();
        assert_relative_eq!(x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(y, 100.0, epsilon = 1e-9);

        let (x, y) = wcs.uv_to_pixel(2.0, -1.0);
        assert_relative_eq!(x, 110.0, epsilon = 1e-9);
        assert_relative_eq!(y, 95.0, epsilon = 1e-9);
        assert_relative_eq!(wcs.pixel_area(), 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_wcs_round_trip() {
        let wcs = TanWcs::new(
            Angle::from_arcseconds(0.2),
            (50.3, 49.8),
            SkyCoord::from_degrees(200.0, 0.0),
            Some(0.7),
        );
        let sky = wcs.pixel_to_sky(12.0, 77.0);
        let (x, y) = wcs.sky_to_pixel(&sky).unwrap();
        assert_relative_eq!(x, 12.0, epsilon = 1e-6);
        assert_relative_eq!(y, 77.0, epsilon = 1e-6);

        // Rotation preserves distances from the origin
        let (u, v) = wcs.pixel_to_uv(60.3, 49.8);
        assert_relative_eq!((u * u + v * v).sqrt(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BoundingBox::of_dims(10, 10);
        let b = BoundingBox::new(5, -3, 10, 5);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, BoundingBox::new(5, 0, 5, 2));
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 0));
        assert!(a.intersection(&BoundingBox::new(20, 20, 2, 2)).is_none());
    }
}
