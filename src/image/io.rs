//! Conversions between [`OwnedImage`] and the `image` crate, plus PNG I/O.

use crate::image::{ImageView, OwnedImage};
use crate::util::{WinSsimError, WinSsimResult};
use std::path::Path;

/// Creates an owned RGB image from a dynamic image.
pub fn owned_from_dynamic_image(img: &image::DynamicImage) -> WinSsimResult<OwnedImage> {
    let rgb = img.to_rgb8();
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    OwnedImage::new(rgb.into_raw(), width, height, 3)
}

/// Loads an image from disk as 3-channel RGB.
pub fn load_rgb_image<P: AsRef<Path>>(path: P) -> WinSsimResult<OwnedImage> {
    let img = image::open(path)?;
    owned_from_dynamic_image(&img)
}

/// Converts a view into an `image` buffer suitable for encoding.
pub fn dynamic_from_view(view: ImageView<'_>) -> WinSsimResult<image::DynamicImage> {
    let owned = view.to_owned_image();
    let width = owned.width() as u32;
    let height = owned.height() as u32;
    let data = owned.data().to_vec();
    let too_small = || WinSsimError::BufferTooSmall {
        needed: owned.data().len(),
        got: 0,
    };
    let img = match owned.channels() {
        1 => image::DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, data).ok_or_else(too_small)?,
        ),
        3 => image::DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, data).ok_or_else(too_small)?,
        ),
        4 => image::DynamicImage::ImageRgba8(
            image::RgbaImage::from_raw(width, height, data).ok_or_else(too_small)?,
        ),
        got => return Err(WinSsimError::ChannelMismatch { expected: 3, got }),
    };
    Ok(img)
}

/// Writes a view to `path` as PNG.
pub fn save_png<P: AsRef<Path>>(view: ImageView<'_>, path: P) -> WinSsimResult<()> {
    let img = dynamic_from_view(view)?;
    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}
