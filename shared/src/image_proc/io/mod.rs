//! Raster file I/O for background images and single frames.
//!
//! File format is determined from the extension by the `image` crate, so
//! PNG and TIFF (8 or 16-bit grey) both round-trip exactly.

use ndarray::Array2;
use std::path::Path;
use thiserror::Error;

use super::image::{array2_to_gray16_image, dynamic_image_to_f64_array};

/// Errors raised while reading or writing raster files
#[derive(Error, Debug)]
pub enum RasterError {
    /// Decoding or encoding failed
    #[error("image error for {path}: {source}")]
    Image {
        /// File involved
        path: String,
        /// Underlying codec error
        #[source]
        source: image::ImageError,
    },

    /// The raster is empty
    #[error("raster {0} has no pixels")]
    Empty(String),
}

/// Load a raster file as a grey-level f64 array indexed `[y, x]`.
pub fn load_raster_as_f64<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, RasterError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| RasterError::Image {
        path: path.display().to_string(),
        source,
    })?;
    let arr = dynamic_image_to_f64_array(&img);
    if arr.is_empty() {
        return Err(RasterError::Empty(path.display().to_string()));
    }
    log::debug!("Loaded raster {} with shape {:?}", path.display(), arr.dim());
    Ok(arr)
}

/// Save a u16 array as a 16-bit grayscale raster
pub fn save_u16_image<P: AsRef<Path>>(image: &Array2<u16>, path: P) -> Result<(), RasterError> {
    let path = path.as_ref();
    array2_to_gray16_image(image)
        .save(path)
        .map_err(|source| RasterError::Image {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_png_roundtrip_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");

        let arr = Array2::from_shape_fn((5, 7), |(y, x)| (y * 1000 + x * 3) as u16);
        save_u16_image(&arr, &path).unwrap();

        let loaded = load_raster_as_f64(&path).unwrap();
        assert_eq!(loaded, arr.mapv(|v| v as f64));
    }

    #[test]
    fn test_tiff_roundtrip_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.tif");

        let arr = Array2::from_shape_fn((3, 4), |(y, x)| (60000 - y * 17 - x) as u16);
        save_u16_image(&arr, &path).unwrap();

        let loaded = load_raster_as_f64(&path).unwrap();
        assert_eq!(loaded, arr.mapv(|v| v as f64));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_raster_as_f64("/definitely/not/here.png");
        assert!(matches!(result, Err(RasterError::Image { .. })));
    }
}
