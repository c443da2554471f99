//! Background photon images added to every frame.
//!
//! Values are expected photons per pixel per frame and are added to the
//! emitter image before the camera chain runs.

use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shared::image_proc::load_raster_as_f64;
use shared::PixelShape;

use crate::error::{require_non_negative, ConfigError};

fn unit_scale() -> f64 {
    1.0
}

/// Background source, tagged by `kind` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundConfig {
    /// Same level everywhere
    Uniform { value: f64 },
    /// Smooth random field with features roughly `feature_size` (>= 1) pixels across
    Random { min: f64, max: f64, feature_size: f64 },
    /// Greyscale raster multiplied by `scale`
    File {
        path: PathBuf,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig::Uniform { value: 0.0 }
    }
}

impl BackgroundConfig {
    /// Build the background image for a frame of `shape`
    pub fn generate(&self, shape: PixelShape, seed: u64) -> Result<Array2<f64>, ConfigError> {
        match self {
            BackgroundConfig::Uniform { value } => uniform_background(shape, *value),
            BackgroundConfig::Random {
                min,
                max,
                feature_size,
            } => random_background(shape, *min, *max, *feature_size, seed),
            BackgroundConfig::File { path, scale } => background_from_file(path, shape, *scale),
        }
    }
}

/// Constant background
pub fn uniform_background(shape: PixelShape, value: f64) -> Result<Array2<f64>, ConfigError> {
    require_non_negative("background", value)?;
    Ok(Array2::from_elem(shape.array_dim(), value))
}

/// Bilinear interpolation of a random lattice with `feature_size` spacing.
///
/// Lattice values are uniform in `[0, 1]` and mapped onto `[min, max]`, so
/// every pixel lies in that interval.
pub fn random_background(
    shape: PixelShape,
    min: f64,
    max: f64,
    feature_size: f64,
    seed: u64,
) -> Result<Array2<f64>, ConfigError> {
    require_non_negative("background min", min)?;
    require_non_negative("background max", max)?;
    if !feature_size.is_finite() || feature_size < 1.0 {
        return Err(ConfigError::OutOfRange {
            name: "feature_size",
            value: feature_size,
            min: 1.0,
            max: f64::MAX,
        });
    }
    if min > max {
        return Err(ConfigError::Invalid(format!(
            "background min {min} exceeds max {max}"
        )));
    }

    let nodes_x = (shape.width as f64 / feature_size).ceil() as usize + 2;
    let nodes_y = (shape.height as f64 / feature_size).ceil() as usize + 2;
    let mut rng = StdRng::seed_from_u64(seed);
    let lattice = Array2::from_shape_fn((nodes_y, nodes_x), |_| rng.gen::<f64>());

    let span = max - min;
    Ok(Array2::from_shape_fn(shape.array_dim(), |(row, col)| {
        let gx = col as f64 / feature_size;
        let gy = row as f64 / feature_size;
        let (ix, iy) = (gx.floor() as usize, gy.floor() as usize);
        let (tx, ty) = (gx - ix as f64, gy - iy as f64);

        let top = lattice[[iy, ix]] * (1.0 - tx) + lattice[[iy, ix + 1]] * tx;
        let bottom = lattice[[iy + 1, ix]] * (1.0 - tx) + lattice[[iy + 1, ix + 1]] * tx;
        let v = top * (1.0 - ty) + bottom * ty;
        (min + span * v).clamp(min, max)
    }))
}

/// Crop a larger image to the frame's top-left region
pub fn background_from_array(image: Array2<f64>, shape: PixelShape) -> Result<Array2<f64>, ConfigError> {
    let (rows, cols) = image.dim();
    if rows < shape.height || cols < shape.width {
        return Err(ConfigError::BackgroundTooSmall {
            width: shape.width,
            height: shape.height,
            actual_width: cols,
            actual_height: rows,
        });
    }
    if let Some(bad) = image.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(ConfigError::Negative {
            name: "background",
            value: *bad,
        });
    }
    if rows == shape.height && cols == shape.width {
        return Ok(image);
    }
    debug!(
        "Cropping {}x{} background to {}x{}",
        cols, rows, shape.width, shape.height
    );
    Ok(image.slice(s![..shape.height, ..shape.width]).to_owned())
}

/// Load a greyscale raster and scale it into photons
pub fn background_from_file<P: AsRef<Path>>(
    path: P,
    shape: PixelShape,
    scale: f64,
) -> Result<Array2<f64>, ConfigError> {
    require_non_negative("background scale", scale)?;
    let path = path.as_ref();
    let image = load_raster_as_f64(path)?;
    info!("Loaded background {} ({:?})", path.display(), image.dim());
    let image = if scale == 1.0 { image } else { image * scale };
    background_from_array(image, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_is_exact() {
        let bg = BackgroundConfig::Uniform { value: 12.5 }
            .generate(PixelShape::new(7, 3), 0)
            .unwrap();
        assert_eq!(bg.dim(), (3, 7));
        assert!(bg.iter().all(|&v| v == 12.5));
        assert!(uniform_background(PixelShape::new(2, 2), -1.0).is_err());
    }

    #[test]
    fn test_random_within_bounds_and_smooth() {
        let shape = PixelShape::new(64, 48);
        let bg = random_background(shape, 5.0, 20.0, 16.0, 3).unwrap();
        assert_eq!(bg.dim(), (48, 64));
        assert!(bg.iter().all(|&v| (5.0..=20.0).contains(&v)));

        // Neighbouring pixels differ by at most one lattice step over feature_size
        for row in 0..48 {
            for col in 0..63 {
                assert!((bg[[row, col + 1]] - bg[[row, col]]).abs() <= 15.0 / 16.0 + 1e-9);
            }
        }
        let (mean, _) = shared::algo::mean_and_variance(&bg.iter().copied().collect::<Vec<_>>()).unwrap();
        assert!(mean > 5.0 && mean < 20.0);
    }

    #[test]
    fn test_random_is_seeded() {
        let shape = PixelShape::new(16, 16);
        let a = random_background(shape, 0.0, 1.0, 4.0, 10).unwrap();
        let b = random_background(shape, 0.0, 1.0, 4.0, 10).unwrap();
        let c = random_background(shape, 0.0, 1.0, 4.0, 11).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_degenerate_range() {
        let bg = random_background(PixelShape::new(5, 5), 3.0, 3.0, 2.0, 0).unwrap();
        assert!(bg.iter().all(|&v| v == 3.0));
        assert!(random_background(PixelShape::new(5, 5), 4.0, 3.0, 2.0, 0).is_err());
        assert!(random_background(PixelShape::new(5, 5), 0.0, 3.0, 0.0, 0).is_err());
    }

    #[test]
    fn test_sub_pixel_feature_size_rejected() {
        let shape = PixelShape::new(512, 512);
        for size in [1e-6, 0.5, f64::NAN, f64::INFINITY] {
            let err = random_background(shape, 0.0, 1.0, size, 0).unwrap_err();
            assert!(matches!(err, ConfigError::OutOfRange { name: "feature_size", .. }));
        }
        assert!(random_background(shape, 0.0, 1.0, 1.0, 0).is_ok());
    }

    #[test]
    fn test_crop_and_reject_small() {
        let image = Array2::from_shape_fn((6, 8), |(r, c)| (r * 10 + c) as f64);
        let cropped = background_from_array(image.clone(), PixelShape::new(4, 3)).unwrap();
        assert_eq!(cropped.dim(), (3, 4));
        assert_relative_eq!(cropped[[2, 3]], 23.0);

        let err = background_from_array(image, PixelShape::new(9, 6)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::BackgroundTooSmall {
                width: 9,
                actual_width: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = background_from_file("/nonexistent/background.png", PixelShape::new(4, 4), 1.0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Raster(_)));
    }
}
