//! Single-epoch exposures and their mask planes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;

use crate::error::SimError;
use crate::psf::Psf;
use crate::wcs::{BoundingBox, TanWcs};

/// Named bit planes of an exposure mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MaskPlane {
    Bad,
    Sat,
    Intrp,
    Cr,
    Edge,
    Detected,
    Bright,
}

impl MaskPlane {
    pub const ALL: [MaskPlane; 7] = [
        MaskPlane::Bad,
        MaskPlane::Sat,
        MaskPlane::Intrp,
        MaskPlane::Cr,
        MaskPlane::Edge,
        MaskPlane::Detected,
        MaskPlane::Bright,
    ];

    pub fn bit(self) -> i32 {
        1 << (self as i32)
    }

    pub fn name(self) -> &'static str {
        match self {
            MaskPlane::Bad => "BAD",
            MaskPlane::Sat => "SAT",
            MaskPlane::Intrp => "INTRP",
            MaskPlane::Cr => "CR",
            MaskPlane::Edge => "EDGE",
            MaskPlane::Detected => "DETECTED",
            MaskPlane::Bright => "BRIGHT",
        }
    }
}

impl fmt::Display for MaskPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaskPlane {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MaskPlane::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| SimError::invalid(format!("unknown mask plane '{s}'")))
    }
}

/// Integer mask image indexed `[y, x]`
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub array: Array2<i32>,
}

impl Mask {
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            array: Array2::zeros(dim),
        }
    }

    /// OR of the bits of several planes
    pub fn plane_bit_mask(planes: &[MaskPlane]) -> i32 {
        planes.iter().fold(0, |acc, p| acc | p.bit())
    }

    pub fn set(&mut self, y: usize, x: usize, plane: MaskPlane) {
        self.array[[y, x]] |= plane.bit();
    }

    pub fn is_set(&self, y: usize, x: usize, plane: MaskPlane) -> bool {
        self.array[[y, x]] & plane.bit() != 0
    }

    /// Number of pixels with any of `bits` set
    pub fn count(&self, bits: i32) -> usize {
        self.array.iter().filter(|&&m| m & bits != 0).count()
    }
}

/// PSF attached to an exposure, queried in that exposure's pixel frame
#[derive(Debug, Clone)]
pub struct ExposurePsf {
    psf: Arc<Psf>,
    wcs: TanWcs,
    dim: usize,
}

impl ExposurePsf {
    pub fn new(psf: Arc<Psf>, wcs: TanWcs, dim: usize) -> Self {
        Self { psf, wcs, dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn model(&self) -> &Psf {
        &self.psf
    }

    /// Unit-sum PSF image at pixel `(x, y)`
    pub fn compute_kernel_image(&self, x: f64, y: f64) -> Array2<f64> {
        self.psf.draw_stamp(x, y, self.dim, &self.wcs)
    }
}

#[derive(Debug, Clone)]
pub struct Exposure {
    pub band: String,
    pub epoch: usize,
    pub image: Array2<f32>,
    pub variance: Array2<f32>,
    pub mask: Mask,
    pub wcs: TanWcs,
    pub psf: ExposurePsf,
}

impl Exposure {
    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }

    pub fn bbox(&self) -> BoundingBox {
        let (h, w) = self.image.dim();
        BoundingBox::of_dims(w, h)
    }

    pub fn nan_count(&self) -> usize {
        self.image.iter().filter(|v| v.is_nan()).count()
    }
}
