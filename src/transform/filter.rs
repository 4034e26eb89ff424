//! Neighbourhood filters: noise removal and binary morphology.

use super::per_layout;
use crate::config::{DenoiseMode, MorphologyOrder};
use image::DynamicImage;
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology;

/// Median window radius; a 5x5 neighbourhood.
pub const MEDIAN_RADIUS: u32 = 2;

/// Sigma of the smoothing blur, close to a 5x5 kernel.
pub const GAUSSIAN_SIGMA: f32 = 1.1;

/// Structuring element radius under the L-infinity norm; a 5x5 square.
pub const MORPH_RADIUS: u8 = 2;

/// Per-channel noise removal. Channel layout is preserved.
pub fn denoise(image: &DynamicImage, mode: DenoiseMode) -> DynamicImage {
    match mode {
        DenoiseMode::Median => per_layout(
            image,
            |g| median_filter(g, MEDIAN_RADIUS, MEDIAN_RADIUS),
            |c| median_filter(c, MEDIAN_RADIUS, MEDIAN_RADIUS),
            |c| median_filter(c, MEDIAN_RADIUS, MEDIAN_RADIUS),
        ),
        DenoiseMode::Gaussian => per_layout(
            image,
            |g| gaussian_blur_f32(g, GAUSSIAN_SIGMA),
            |c| gaussian_blur_f32(c, GAUSSIAN_SIGMA),
            |c| gaussian_blur_f32(c, GAUSSIAN_SIGMA),
        ),
    }
}

/// Closing or opening on luminance. Non-zero pixels count as foreground.
pub fn morphology(image: &DynamicImage, order: MorphologyOrder) -> DynamicImage {
    let gray = image.to_luma8();
    let out = match order {
        MorphologyOrder::Close => morphology::close(&gray, Norm::LInf, MORPH_RADIUS),
        MorphologyOrder::Open => morphology::open(&gray, Norm::LInf, MORPH_RADIUS),
    };
    DynamicImage::ImageLuma8(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn median_removes_isolated_speck() {
        let mut g = GrayImage::from_pixel(9, 9, Luma([255]));
        g.put_pixel(4, 4, Luma([0]));
        let out = denoise(&DynamicImage::ImageLuma8(g), DenoiseMode::Median).to_luma8();
        assert_eq!(out.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn denoise_keeps_channels() {
        let c = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([10, 20, 30])));
        for mode in [DenoiseMode::Median, DenoiseMode::Gaussian] {
            let out = denoise(&c, mode);
            assert_eq!(out.color().channel_count(), 3);
            assert_eq!((out.width(), out.height()), (6, 6));
        }
    }

    #[test]
    fn open_removes_small_foreground_dot() {
        let mut g = GrayImage::new(15, 15);
        g.put_pixel(7, 7, Luma([255]));
        let out = morphology(&DynamicImage::ImageLuma8(g), MorphologyOrder::Open).to_luma8();
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn close_fills_small_hole() {
        let mut g = GrayImage::from_pixel(15, 15, Luma([255]));
        g.put_pixel(7, 7, Luma([0]));
        let out = morphology(&DynamicImage::ImageLuma8(g), MorphologyOrder::Close).to_luma8();
        assert_eq!(out.get_pixel(7, 7)[0], 255);
    }
}
