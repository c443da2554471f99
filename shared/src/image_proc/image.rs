//! Conversions between ndarray images and `image` crate buffers.
//!
//! - **ndarray**: matrix indexing `[row, col] = [y, x]` with `(height, width)` dims
//! - **image crate**: graphics indexing `(x, y)` with `(width, height)` dims

use image::{DynamicImage, ImageBuffer, Luma};
use ndarray::Array2;

/// 16-bit grayscale image buffer
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Convert a u16 Array2 into a 16-bit grayscale image buffer
pub fn array2_to_gray16_image(arr: &Array2<u16>) -> Gray16Image {
    let (height, width) = arr.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([arr[[y as usize, x as usize]]])
    })
}

/// Convert a 16-bit grayscale image buffer into a u16 Array2
pub fn gray16_image_to_array2(img: &Gray16Image) -> Array2<u16> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}

/// Convert any decoded image into an f64 Array2 of grey levels.
///
/// 8-bit and 16-bit grayscale sources keep their raw values exactly; colour
/// images are reduced to luma at 16-bit precision.
pub fn dynamic_image_to_f64_array(img: &DynamicImage) -> Array2<f64> {
    match img {
        DynamicImage::ImageLuma8(buf) => {
            let (width, height) = buf.dimensions();
            Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
                buf.get_pixel(x as u32, y as u32)[0] as f64
            })
        }
        DynamicImage::ImageLuma16(buf) => gray16_image_to_array2(buf).mapv(|v| v as f64),
        other => gray16_image_to_array2(&other.to_luma16()).mapv(|v| v as f64),
    }
}
