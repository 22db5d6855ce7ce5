/*!
Image decode and resize on top of the `image` crate.

Decoded images follow the engine family's convention: HWC float arrays
with values in `[0, 1]`. The raw-scale preprocessing option restores pixel
range where a network expects it.
*/

use std::path::Path;

use image::{imageops, imageops::FilterType, ImageBuffer, Luma};
use ndarray::{Array3, ArrayView3, Axis};

use crate::error::Result;

/// Decode an image file into an RGB HWC float array with values in `[0, 1]`.
pub fn load_image(path: &Path) -> Result<Array3<f32>> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut out = Array3::zeros((height as usize, width as usize, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            out[[y as usize, x as usize, channel]] = pixel.0[channel] as f32 / 255.0;
        }
    }

    Ok(out)
}

/// Resize an HWC float array to `(height, width)` with bilinear
/// interpolation, channel plane by channel plane. Identity when the image
/// is already at the target size.
pub fn resize_image(image: ArrayView3<'_, f32>, dims: (usize, usize)) -> Array3<f32> {
    let (height, width, channels) = image.dim();
    let (target_height, target_width) = dims;

    if (height, width) == (target_height, target_width) {
        return image.to_owned();
    }

    let mut out = Array3::zeros((target_height, target_width, channels));
    for channel in 0..channels {
        let plane: Vec<f32> = image.index_axis(Axis(2), channel).iter().copied().collect();
        let plane: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(width as u32, height as u32, plane)
                .expect("plane length matches dimensions");

        let resized = imageops::resize(
            &plane,
            target_width as u32,
            target_height as u32,
            FilterType::Triangle,
        );

        for (x, y, pixel) in resized.enumerate_pixels() {
            out[[y as usize, x as usize, channel]] = pixel.0[0];
        }
    }

    out
}
