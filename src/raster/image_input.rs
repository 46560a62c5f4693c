//! Turns an arbitrary image file into a thresholded [`Bitmap`]: shrink to fit,
//! whiten transparent areas, binarize.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;
use thiserror::Error;

use super::Bitmap;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("target size must be at least 1x1, got {0}x{1}")]
    ZeroSize(u32, u32),
}

/// Largest size that fits in `max` keeping the aspect ratio. Never enlarges.
pub fn fit_within(size: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    if w <= max.0 && h <= max.1 {
        return size;
    }
    let scale = f64::min(max.0 as f64 / w as f64, max.1 as f64 / h as f64);
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    (scaled(w), scaled(h))
}

pub fn load_bitmap<P: AsRef<Path>>(
    path: P,
    max_size: (u32, u32),
    alpha_cutoff: u8,
) -> Result<Bitmap, ConvertError> {
    let path = path.as_ref();
    tracing::info!("Loading image: {}", path.display());
    let image = image::open(path)?.to_rgba8();
    condition(image, max_size, alpha_cutoff)
}

pub fn condition(
    image: RgbaImage,
    max_size: (u32, u32),
    alpha_cutoff: u8,
) -> Result<Bitmap, ConvertError> {
    if max_size.0 == 0 || max_size.1 == 0 {
        return Err(ConvertError::ZeroSize(max_size.0, max_size.1));
    }

    let (width, height) = fit_within(image.dimensions(), max_size);
    let image = if (width, height) == image.dimensions() {
        image
    } else {
        tracing::debug!("Resizing {:?} to {}x{}", image.dimensions(), width, height);
        image::imageops::resize(&image, width, height, FilterType::Triangle)
    };

    let pixels = image
        .pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            if a < alpha_cutoff {
                return 255;
            }
            let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
            if luma < 128 { 0 } else { 255 }
        })
        .collect();

    // Dimensions come from the image itself, so the length always matches.
    Bitmap::from_luma(width, height, pixels).ok_or(ConvertError::ZeroSize(width, height))
}
