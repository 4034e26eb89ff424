//! Skew correction.

use super::per_layout;
use image::{DynamicImage, Luma, Rgb, Rgba};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing::debug;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const HOUGH_VOTES: u32 = 100;
const HOUGH_SUPPRESSION: u32 = 8;

/// Result of [`deskew`].
#[derive(Debug, Clone)]
pub struct Deskewed {
    pub image: DynamicImage,
    /// Average skew that was corrected, in degrees. Zero when nothing rotated.
    pub angle_degrees: f32,
    /// Number of lines the average was taken over.
    pub lines: usize,
}

/// Rotate `image` so its dominant line orientation lies horizontal.
///
/// Lines come from a Hough transform over a Canny edge map. The polar
/// angle of a horizontal line is 90°, so each line's skew is its angle
/// minus 90, folded into (-45°, 45°] so vertical lines (frames, table
/// rules) count as upright rather than as -90°. The image is rotated by the negated mean skew about its
/// centre; corners exposed by the rotation are filled with black.
pub fn deskew(image: &DynamicImage) -> Deskewed {
    let gray = image.to_luma8();
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: HOUGH_VOTES,
            suppression_radius: HOUGH_SUPPRESSION,
        },
    );

    let unchanged = |lines: usize| Deskewed {
        image: image.clone(),
        angle_degrees: 0.0,
        lines,
    };

    if lines.is_empty() {
        debug!("deskew: no lines detected, leaving image unrotated");
        return unchanged(0);
    }

    let skew = lines
        .iter()
        .map(|l| fold_skew(l.angle_in_degrees as f32 - 90.0))
        .sum::<f32>()
        / lines.len() as f32;

    if skew == 0.0 {
        return unchanged(lines.len());
    }

    debug!("deskew: {} lines, mean skew {:.2}°", lines.len(), skew);

    let theta = -skew.to_radians();
    let rotated = per_layout(
        image,
        |g| rotate_about_center(g, theta, Interpolation::Bilinear, Luma([0])),
        |c| rotate_about_center(c, theta, Interpolation::Bilinear, Rgb([0, 0, 0])),
        |c| rotate_about_center(c, theta, Interpolation::Bilinear, Rgba([0, 0, 0, 255])),
    );

    Deskewed {
        image: rotated,
        angle_degrees: skew,
        lines: lines.len(),
    }
}

/// Map a skew in [-90°, 90°) onto the equivalent one in (-45°, 45°].
fn fold_skew(skew: f32) -> f32 {
    if skew > 45.0 {
        skew - 90.0
    } else if skew <= -45.0 {
        skew + 90.0
    } else {
        skew
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn blank_image_is_left_alone() {
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([255])));
        let d = deskew(&white);
        assert_eq!(d.lines, 0);
        assert_eq!(d.angle_degrees, 0.0);
        assert_eq!(d.image.to_luma8(), white.to_luma8());
    }

    #[test]
    fn deskew_is_idempotent_on_blank_color() {
        let c = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([200, 200, 200])));
        let once = deskew(&c).image;
        let twice = deskew(&once).image;
        assert_eq!(once.to_rgb8(), twice.to_rgb8());
        assert_eq!(once.color().channel_count(), 3);
    }

    #[test]
    fn fold_skew_treats_vertical_as_upright() {
        assert_eq!(fold_skew(-90.0), 0.0);
        assert_eq!(fold_skew(0.0), 0.0);
        assert_eq!(fold_skew(10.0), 10.0);
        assert_eq!(fold_skew(-80.0), 10.0);
        assert_eq!(fold_skew(80.0), -10.0);
        assert_eq!(fold_skew(45.0), 45.0);
        assert_eq!(fold_skew(-45.0), 45.0);
    }

    #[test]
    fn framed_page_is_not_rotated() {
        let mut g = GrayImage::from_pixel(400, 300, Luma([255]));
        for x in 20..380 {
            for y in 20..280 {
                let on_border = x < 23 || x >= 377 || y < 23 || y >= 277;
                if on_border {
                    g.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let d = deskew(&DynamicImage::ImageLuma8(g));
        assert!(d.lines > 0);
        assert!(d.angle_degrees.abs() < 1.0, "angle {}", d.angle_degrees);
    }

    #[test]
    fn horizontal_rule_needs_no_rotation() {
        let mut g = GrayImage::from_pixel(200, 120, Luma([255]));
        for x in 10..190 {
            for y in 58..62 {
                g.put_pixel(x, y, Luma([0]));
            }
        }
        let d = deskew(&DynamicImage::ImageLuma8(g));
        assert!(d.angle_degrees.abs() < 1.0, "angle {}", d.angle_degrees);
    }
}
