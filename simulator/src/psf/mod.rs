//! Point spread function rendering.
//!
//! Pixel `(i, j)` covers `[i - 0.5, i + 0.5] x [j - 0.5, j + 0.5]`, so integer
//! coordinates are pixel centres. A spot's expected photon fraction in a
//! pixel is the Gaussian integrated over that square, which separates into a
//! product of two one-dimensional erf differences. Only pixels within the
//! bounding radius of the emitter are evaluated, so the weights of one spot
//! sum to slightly less than one.

pub mod gaussian;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use shared::algo::gaussian_interval_mass;

use crate::error::ConfigError;
use crate::photophysics::Position;

pub use gaussian::{fwhm_to_sigma, Gaussian2D, Gaussian3D};

/// Fraction of a spot's photons landing in one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelWeight {
    pub x: i64,
    pub y: i64,
    pub weight: f64,
}

/// Rectangular block of photon counts anchored at pixel `(x0, y0)`
///
/// `values` is indexed `[row, col]`, i.e. `[y - y0, x - x0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPatch {
    pub x0: i64,
    pub y0: i64,
    pub values: Array2<f64>,
}

impl SpotPatch {
    /// Sum of all values in the patch
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Add the patch onto `frame`, dropping pixels outside it
    pub fn add_to(&self, frame: &mut Array2<f64>) {
        let (height, width) = frame.dim();
        for ((row, col), value) in self.values.indexed_iter() {
            let x = self.x0 + col as i64;
            let y = self.y0 + row as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                continue;
            }
            frame[[y as usize, x as usize]] += value;
        }
    }
}

/// Per-axis pixel masses of a Gaussian centred at `center`
///
/// Returns the first pixel index and the mass of each pixel whose footprint
/// intersects `[center - radius, center + radius]`.
fn axis_masses(center: f64, sigma: f64, radius: f64) -> (i64, Vec<f64>) {
    let lo = (center - radius + 0.5).floor() as i64;
    let hi = (center + radius - 0.5).ceil() as i64;
    let masses = (lo..=hi.max(lo))
        .map(|i| {
            let offset = i as f64 - center;
            gaussian_interval_mass(offset - 0.5, offset + 0.5, sigma)
        })
        .collect();
    (lo, masses)
}

/// Capability shared by every spot model.
///
/// Implementors only supply the width as a function of defocus and the
/// truncation radius; integration and rendering are common.
pub trait PointSpreadFunction {
    /// Gaussian standard deviation in pixels at `defocus` µm from focus
    fn sigma(&self, defocus: f64) -> f64;

    /// Truncation radius in units of sigma
    fn radius_in_sigmas(&self) -> f64;

    /// Truncation radius in pixels
    fn bounding_radius(&self, defocus: f64) -> f64 {
        self.radius_in_sigmas() * self.sigma(defocus)
    }

    /// Expected fraction of photons from an emitter at `(x, y)` landing in
    /// pixel `(px, py)`, ignoring truncation.
    fn pixel_weight(&self, x: f64, y: f64, defocus: f64, px: i64, py: i64) -> f64 {
        let sigma = self.sigma(defocus);
        let dx = px as f64 - x;
        let dy = py as f64 - y;
        gaussian_interval_mass(dx - 0.5, dx + 0.5, sigma)
            * gaussian_interval_mass(dy - 0.5, dy + 0.5, sigma)
    }

    /// Weights of every pixel within `radius` pixels of the emitter
    fn pixel_weights_within(&self, position: Position, stage_z: f64, radius: f64) -> Vec<PixelWeight> {
        let sigma = self.sigma(position.z - stage_z);
        let (x0, wx) = axis_masses(position.x, sigma, radius);
        let (y0, wy) = axis_masses(position.y, sigma, radius);
        let mut weights = Vec::with_capacity(wx.len() * wy.len());
        for (row, my) in wy.iter().enumerate() {
            for (col, mx) in wx.iter().enumerate() {
                weights.push(PixelWeight {
                    x: x0 + col as i64,
                    y: y0 + row as i64,
                    weight: mx * my,
                });
            }
        }
        weights
    }

    /// Weights of every pixel inside the bounding radius
    fn pixel_weights(&self, position: Position, stage_z: f64) -> Vec<PixelWeight> {
        let radius = self.bounding_radius(position.z - stage_z);
        self.pixel_weights_within(position, stage_z, radius)
    }

    /// Photon counts of a spot inside the bounding radius
    fn render_patch(&self, position: Position, stage_z: f64, photons: f64) -> SpotPatch {
        let defocus = position.z - stage_z;
        let sigma = self.sigma(defocus);
        let radius = self.bounding_radius(defocus);
        let (x0, wx) = axis_masses(position.x, sigma, radius);
        let (y0, wy) = axis_masses(position.y, sigma, radius);
        let values = Array2::from_shape_fn((wy.len(), wx.len()), |(row, col)| {
            photons * wy[row] * wx[col]
        });
        SpotPatch { x0, y0, values }
    }

    /// Accumulate `photons x weight` into `frame`, clipping at its edges
    fn render_into(&self, frame: &mut Array2<f64>, position: Position, stage_z: f64, photons: f64) {
        if photons <= 0.0 {
            return;
        }
        self.render_patch(position, stage_z, photons).add_to(frame);
    }
}

/// Spot model selection, tagged by `type` in JSON
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Psf {
    #[serde(rename = "gaussian_2d")]
    Gaussian2D(Gaussian2D),
    #[serde(rename = "gaussian_3d")]
    Gaussian3D(Gaussian3D),
}

impl Psf {
    /// In-focus Gaussian with the given FWHM in pixels
    pub fn gaussian_2d(fwhm: f64) -> Result<Self, ConfigError> {
        Gaussian2D::new(fwhm).map(Psf::Gaussian2D)
    }

    /// Defocus-dependent Gaussian
    pub fn gaussian_3d(fwhm: f64, numerical_aperture: f64, pixel_size_um: f64) -> Result<Self, ConfigError> {
        Gaussian3D::new(fwhm, numerical_aperture, pixel_size_um).map(Psf::Gaussian3D)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Psf::Gaussian2D(psf) => psf.validate(),
            Psf::Gaussian3D(psf) => psf.validate(),
        }
    }
}

impl Default for Psf {
    fn default() -> Self {
        Psf::Gaussian2D(Gaussian2D { fwhm: 2.0 })
    }
}

impl PointSpreadFunction for Psf {
    fn sigma(&self, defocus: f64) -> f64 {
        match self {
            Psf::Gaussian2D(psf) => psf.sigma(defocus),
            Psf::Gaussian3D(psf) => psf.sigma(defocus),
        }
    }

    fn radius_in_sigmas(&self) -> f64 {
        match self {
            Psf::Gaussian2D(psf) => psf.radius_in_sigmas(),
            Psf::Gaussian3D(psf) => psf.radius_in_sigmas(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn total(weights: &[PixelWeight]) -> f64 {
        weights.iter().map(|w| w.weight).sum()
    }

    #[test]
    fn test_weights_bounded_and_converge() {
        let psf = Psf::gaussian_2d(2.0).unwrap();
        let sigma = psf.sigma(0.0);
        let position = Position::new(10.3, 7.8);

        let mut previous = 0.0;
        for multiple in [0.5, 1.0, 2.0, 3.0, 5.0, 8.0] {
            let sum = total(&psf.pixel_weights_within(position, 0.0, multiple * sigma));
            assert!(sum <= 1.0 + 1e-12, "sum {sum} exceeds one");
            assert!(sum >= previous);
            previous = sum;
        }
        assert_relative_eq!(previous, 1.0, epsilon = 1e-9);

        // Default truncation keeps nearly all of the flux
        let bounded = total(&psf.pixel_weights(position, 0.0));
        assert!(bounded > 0.994 && bounded <= 1.0);
    }

    #[test]
    fn test_3d_weights_converge_out_of_focus() {
        let psf = Psf::gaussian_3d(2.0, 1.2, 0.1).unwrap();
        let position = Position::with_z(5.0, 5.0, 0.4);

        let in_focus = psf.pixel_weights(Position::new(5.0, 5.0), 0.0);
        let defocused = psf.pixel_weights(position, 0.0);
        assert!(defocused.len() > in_focus.len());

        let peak = |w: &[PixelWeight]| w.iter().map(|p| p.weight).fold(0.0, f64::max);
        assert!(peak(&defocused) < peak(&in_focus));

        let sum = total(&defocused);
        assert!(sum <= 1.0 && sum > 0.999);

        // Moving the stage onto the emitter brings it back into focus
        let refocused = psf.pixel_weights(position, 0.4);
        assert_relative_eq!(peak(&refocused), peak(&in_focus), epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_weight_matches_enumeration() {
        let psf = Psf::gaussian_2d(2.5).unwrap();
        let position = Position::new(3.2, 4.9);
        for w in psf.pixel_weights(position, 0.0) {
            assert_relative_eq!(
                w.weight,
                psf.pixel_weight(position.x, position.y, 0.0, w.x, w.y),
                epsilon = 1e-15
            );
        }
    }

    #[test]
    fn test_centred_spot_is_symmetric() {
        let psf = Psf::gaussian_2d(2.0).unwrap();
        let weight = |px, py| psf.pixel_weight(4.0, 4.0, 0.0, px, py);
        assert_relative_eq!(weight(3, 4), weight(5, 4), epsilon = 1e-15);
        assert_relative_eq!(weight(4, 3), weight(4, 5), epsilon = 1e-15);
        assert!(weight(4, 4) > weight(5, 5));
    }

    #[test]
    fn test_render_into_clips_at_frame_edge() {
        let psf = Psf::gaussian_2d(2.0).unwrap();
        let mut frame = Array2::<f64>::zeros((16, 16));
        psf.render_into(&mut frame, Position::new(0.0, 0.0), 0.0, 1000.0);

        // Only the quadrant inside the frame is kept
        let kept = frame.sum();
        assert!(kept > 450.0 && kept < 600.0, "kept {kept}");
        assert!(frame[[0, 0]] > frame[[0, 1]]);

        let mut centred = Array2::<f64>::zeros((16, 16));
        psf.render_into(&mut centred, Position::new(8.0, 8.0), 0.0, 1000.0);
        assert!(centred.sum() > 994.0 && centred.sum() <= 1000.0);
    }

    #[test]
    fn test_patch_matches_weights() {
        let psf = Psf::gaussian_2d(1.7).unwrap();
        let position = Position::new(6.4, 2.1);
        let patch = psf.render_patch(position, 0.0, 200.0);
        let weights = psf.pixel_weights(position, 0.0);
        assert_eq!(patch.values.len(), weights.len());
        assert_relative_eq!(patch.total(), 200.0 * total(&weights), epsilon = 1e-9);
    }

    #[test]
    fn test_psf_json_tagging() {
        let psf: Psf = serde_json::from_str(r#"{"type": "gaussian_2d", "fwhm": 2.0}"#).unwrap();
        assert_eq!(psf, Psf::Gaussian2D(Gaussian2D { fwhm: 2.0 }));
        let psf: Psf = serde_json::from_str(
            r#"{"type": "gaussian_3d", "fwhm": 2.0, "numerical_aperture": 1.4, "pixel_size_um": 0.1}"#,
        )
        .unwrap();
        assert!(matches!(psf, Psf::Gaussian3D(_)));
    }
}
