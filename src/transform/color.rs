//! Tone and size transforms: grayscale, invert, equalize, autocontrast, upscale.

use super::per_layout;
use crate::error::OcrPrepError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Pixel};

/// Upscale factor applied by [`upscale`].
pub const UPSCALE_FACTOR: u32 = 2;

/// Single-channel luminance copy of `image`.
pub fn grayscale(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(image.to_luma8())
}

/// Photographic negative. Alpha is left untouched.
pub fn invert(image: &DynamicImage) -> DynamicImage {
    per_layout(
        image,
        |g| {
            let mut out = g.clone();
            imageops::invert(&mut out);
            out
        },
        |c| {
            let mut out = c.clone();
            imageops::invert(&mut out);
            out
        },
        |c| {
            let mut out = c.clone();
            imageops::invert(&mut out);
            out
        },
    )
}

/// Histogram equalization. Only defined for single-channel images.
pub fn equalize(image: &DynamicImage) -> Result<DynamicImage, OcrPrepError> {
    let channels = image.color().channel_count();
    if channels != 1 {
        return Err(OcrPrepError::InvalidInput {
            operation: "equalize",
            detail: format!("expected a single-channel image, got {channels} channels"),
        });
    }
    let gray = image.to_luma8();
    Ok(DynamicImage::ImageLuma8(
        imageproc::contrast::equalize_histogram(&gray),
    ))
}

/// Linear stretch of each colour channel so its darkest value maps to 0 and
/// its brightest to 255. Channels with a single value are left as they are.
pub fn autocontrast(image: &DynamicImage) -> DynamicImage {
    per_layout(image, |g| stretch(g, 1), |c| stretch(c, 3), |c| stretch(c, 3))
}

/// Enlarge by [`UPSCALE_FACTOR`] with Lanczos resampling.
pub fn upscale(image: &DynamicImage) -> DynamicImage {
    let w = image.width().saturating_mul(UPSCALE_FACTOR);
    let h = image.height().saturating_mul(UPSCALE_FACTOR);
    image.resize_exact(w, h, FilterType::Lanczos3)
}

/// Stretch the first `color` channels of every pixel; any later channel
/// (alpha) is copied through.
fn stretch<P>(img: &ImageBuffer<P, Vec<u8>>, color: usize) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let n = P::CHANNEL_COUNT as usize;
    let color = color.min(n);
    let mut lo = [u8::MAX; 4];
    let mut hi = [u8::MIN; 4];
    for px in img.as_raw().chunks_exact(n) {
        for c in 0..color {
            lo[c] = lo[c].min(px[c]);
            hi[c] = hi[c].max(px[c]);
        }
    }

    let mut out = img.clone();
    for px in out.chunks_exact_mut(n) {
        for c in 0..color {
            if hi[c] <= lo[c] {
                continue;
            }
            let span = u32::from(hi[c] - lo[c]);
            let v = u32::from(px[c] - lo[c]);
            px[c] = ((v * 255 + span / 2) / span) as u8;
        }
    }
    out
}
