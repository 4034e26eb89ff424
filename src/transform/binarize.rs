//! Binarisation.
//!
//! Both modes work on luminance and produce a single-channel image whose
//! pixels are exactly 0 or 255.

use crate::config::ThresholdMode;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Cut-off for [`ThresholdMode::Global`]: values above it become white.
pub const GLOBAL_CUTOFF: u8 = 127;

/// Gaussian sigma for the local mean in [`ThresholdMode::Adaptive`].
pub const ADAPTIVE_SIGMA: f32 = 2.0;

/// Constant subtracted from the local mean before comparing.
pub const ADAPTIVE_OFFSET: i16 = 2;

pub fn threshold(image: &DynamicImage, mode: ThresholdMode) -> DynamicImage {
    let gray = image.to_luma8();
    let out = match mode {
        ThresholdMode::Global => global(&gray),
        ThresholdMode::Adaptive => adaptive(&gray),
    };
    DynamicImage::ImageLuma8(out)
}

fn global(gray: &GrayImage) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        binary(gray.get_pixel(x, y)[0] > GLOBAL_CUTOFF)
    })
}

fn adaptive(gray: &GrayImage) -> GrayImage {
    let mean = gaussian_blur_f32(gray, ADAPTIVE_SIGMA);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let p = i16::from(gray.get_pixel(x, y)[0]);
        let m = i16::from(mean.get_pixel(x, y)[0]);
        binary(p > m - ADAPTIVE_OFFSET)
    })
}

#[inline]
fn binary(on: bool) -> Luma<u8> {
    Luma([if on { 255 } else { 0 }])
}
