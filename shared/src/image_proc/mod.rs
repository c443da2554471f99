//! Image processing primitives used by the acquisition simulator.
//!
//! - **noise**: per-stage stochastic sensor noise
//! - **image**: conversions between ndarray arrays and `image` buffers
//! - **io**: raster load/save

pub mod image;
pub mod io;
pub mod noise;

pub use image::{array2_to_gray16_image, dynamic_image_to_f64_array, gray16_image_to_array2, Gray16Image};
pub use io::{load_raster_as_f64, save_u16_image, RasterError};
