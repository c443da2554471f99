//! Pixel-integrated Gaussian spot models.

use serde::{Deserialize, Serialize};

use super::PointSpreadFunction;
use crate::error::{require_positive, ConfigError};

/// FWHM / sigma for a Gaussian, `2 * sqrt(2 ln 2)`
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Convert a full width at half maximum into a standard deviation
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / FWHM_PER_SIGMA
}

/// In-focus symmetric Gaussian
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian2D {
    /// Full width at half maximum in pixels
    pub fwhm: f64,
}

impl Gaussian2D {
    /// Radius of the evaluated neighbourhood, in units of sigma
    pub const RADIUS_IN_SIGMAS: f64 = 3.0;

    pub fn new(fwhm: f64) -> Result<Self, ConfigError> {
        let psf = Self { fwhm };
        psf.validate()?;
        Ok(psf)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("fwhm", self.fwhm).map(|_| ())
    }
}

impl PointSpreadFunction for Gaussian2D {
    fn sigma(&self, _defocus: f64) -> f64 {
        fwhm_to_sigma(self.fwhm)
    }

    fn radius_in_sigmas(&self) -> f64 {
        Self::RADIUS_IN_SIGMAS
    }
}

/// Gaussian whose width grows with distance from the focal plane
///
/// `sigma(dz) = sigma0 * sqrt(1 + (dz / z_r)^2)` with Rayleigh range
/// `z_r = 2 * sigma0 * pixel_size / NA`, sigma0 in pixels and `z_r` in
/// micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian3D {
    /// In-focus full width at half maximum in pixels
    pub fwhm: f64,
    /// Numerical aperture of the objective
    pub numerical_aperture: f64,
    /// Object-space pixel size in micrometres
    pub pixel_size_um: f64,
}

impl Gaussian3D {
    /// Radius of the evaluated neighbourhood, in units of sigma
    pub const RADIUS_IN_SIGMAS: f64 = 5.0;

    pub fn new(fwhm: f64, numerical_aperture: f64, pixel_size_um: f64) -> Result<Self, ConfigError> {
        let psf = Self {
            fwhm,
            numerical_aperture,
            pixel_size_um,
        };
        psf.validate()?;
        Ok(psf)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("fwhm", self.fwhm)?;
        require_positive("numerical_aperture", self.numerical_aperture)?;
        require_positive("pixel_size_um", self.pixel_size_um)?;
        Ok(())
    }

    /// Axial distance (µm) over which sigma grows by sqrt(2)
    pub fn rayleigh_range_um(&self) -> f64 {
        2.0 * fwhm_to_sigma(self.fwhm) * self.pixel_size_um / self.numerical_aperture
    }
}

impl PointSpreadFunction for Gaussian3D {
    fn sigma(&self, defocus: f64) -> f64 {
        let sigma0 = fwhm_to_sigma(self.fwhm);
        let ratio = defocus / self.rayleigh_range_um();
        sigma0 * (1.0 + ratio * ratio).sqrt()
    }

    fn radius_in_sigmas(&self) -> f64 {
        Self::RADIUS_IN_SIGMAS
    }
}
