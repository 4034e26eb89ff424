//! Edge maps, contour drawings and word-box overlays.

use crate::output::WordBox;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::edges::canny;
use imageproc::rect::Rect;

const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;
const CONTOUR_CUTOFF: u8 = 127;
const CONTOUR_THICKNESS: u32 = 3;
const BOX_THICKNESS: i32 = 2;

/// Colour used for contours and word boxes.
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Canny edge map of `image`'s luminance.
pub fn edge_detection(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(canny(&image.to_luma8(), CANNY_LOW, CANNY_HIGH))
}

/// Outer contours of the dark regions in `image`, drawn over an RGB copy.
///
/// Returns the drawing and the number of contours drawn.
pub fn contours(image: &DynamicImage) -> (DynamicImage, usize) {
    let gray = image.to_luma8();
    let inverted = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y)[0] > CONTOUR_CUTOFF { 0 } else { 255 }])
    });

    let outer: Vec<Contour<u32>> = find_contours::<u32>(&inverted)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect();

    let mut canvas = image.to_rgb8();
    let half = (CONTOUR_THICKNESS / 2) as i32;
    for contour in &outer {
        for p in &contour.points {
            let rect = Rect::at(p.x as i32 - half, p.y as i32 - half)
                .of_size(CONTOUR_THICKNESS, CONTOUR_THICKNESS);
            draw_filled_rect_mut(&mut canvas, rect, OUTLINE_COLOR);
        }
    }

    (DynamicImage::ImageRgb8(canvas), outer.len())
}

/// Draw every box with positive confidence over an RGB copy of `image`.
///
/// Returns the drawing and the number of boxes drawn.
pub fn word_boxes(image: &DynamicImage, boxes: &[WordBox]) -> (DynamicImage, usize) {
    let mut canvas = image.to_rgb8();
    let mut drawn = 0;
    for b in boxes.iter().filter(|b| b.confidence > 0.0) {
        if b.width == 0 || b.height == 0 {
            continue;
        }
        draw_thick_rect(&mut canvas, b);
        drawn += 1;
    }
    (DynamicImage::ImageRgb8(canvas), drawn)
}

fn draw_thick_rect(canvas: &mut RgbImage, b: &WordBox) {
    for t in 0..BOX_THICKNESS {
        let rect = Rect::at(b.left as i32 - t, b.top as i32 - t).of_size(
            b.width + (2 * t) as u32,
            b.height + (2 * t) as u32,
        );
        draw_hollow_rect_mut(canvas, rect, OUTLINE_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_square() -> DynamicImage {
        let mut g = GrayImage::from_pixel(40, 40, Luma([255]));
        for y in 10..20 {
            for x in 10..20 {
                g.put_pixel(x, y, Luma([0]));
            }
        }
        DynamicImage::ImageLuma8(g)
    }

    #[test]
    fn edges_are_single_channel_and_binary() {
        let e = edge_detection(&page_with_square()).to_luma8();
        assert!(e.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(e.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn one_dark_square_is_one_contour() {
        let (drawn, count) = contours(&page_with_square());
        assert_eq!(count, 1);
        let rgb = drawn.to_rgb8();
        assert_eq!(*rgb.get_pixel(10, 15), OUTLINE_COLOR);
        assert_eq!(*rgb.get_pixel(30, 30), Rgb([255, 255, 255]));
    }

    #[test]
    fn blank_page_has_no_contours() {
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([255])));
        let (drawn, count) = contours(&white);
        assert_eq!(count, 0);
        assert!(drawn.to_rgb8().pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn zero_confidence_boxes_are_skipped() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])));
        let boxes = vec![
            WordBox {
                text: "TOTAL".into(),
                left: 5,
                top: 5,
                width: 20,
                height: 10,
                confidence: 91.0,
            },
            WordBox {
                text: "".into(),
                left: 30,
                top: 30,
                width: 10,
                height: 10,
                confidence: 0.0,
            },
        ];
        let (drawn, count) = word_boxes(&white, &boxes);
        assert_eq!(count, 1);
        let rgb = drawn.to_rgb8();
        assert_eq!(*rgb.get_pixel(5, 5), OUTLINE_COLOR);
        assert_eq!(*rgb.get_pixel(30, 30), Rgb([255, 255, 255]));
    }
}
