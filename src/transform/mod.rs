//! Transform library: pure image-to-image operations.
//!
//! Every operation takes a decoded image, validates its own parameters and
//! input shape, and returns a derived image plus metadata. None of them
//! touch the filesystem; persistence is the artifact store's job.
//!
//! ## Families
//!
//! | Module | Transforms |
//! |--------|------------|
//! | [`color`]    | grayscale, invert, equalize, autocontrast, upscale |
//! | [`binarize`] | threshold (global / adaptive) |
//! | [`filter`]   | denoise (median / gaussian), morphology (close / open) |
//! | [`geometry`] | deskew |
//! | [`outline`]  | edge detection, contours, word-box overlays |
//!
//! All numeric constants (window sizes, Canny thresholds, Hough votes) are
//! fixed per transform; only the mode enums are caller-selectable.

pub mod binarize;
pub mod color;
pub mod filter;
pub mod geometry;
pub mod outline;

use crate::config::{DenoiseMode, MorphologyOrder, ThresholdMode};
use crate::error::OcrPrepError;
use crate::store::StageDir;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One image operation together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transform", content = "mode", rename_all = "snake_case")]
pub enum Transform {
    Grayscale,
    Threshold(ThresholdMode),
    Denoise(DenoiseMode),
    Morphology(MorphologyOrder),
    Deskew,
    EdgeDetection,
    Contours,
    Invert,
    Equalize,
    Autocontrast,
    Upscale,
}

/// Pixel geometry of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl ImageInfo {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.color().channel_count(),
        }
    }
}

/// Transform-specific facts discovered while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    /// Average line angle found and the number of lines it was averaged over.
    Deskew { angle_degrees: f32, lines: usize },
    /// Outer contours drawn.
    Contours { count: usize },
}

/// A derived image plus metadata.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub image: DynamicImage,
    pub info: ImageInfo,
    pub detail: Option<StageDetail>,
}

impl TransformOutput {
    fn new(image: DynamicImage) -> Self {
        let info = ImageInfo::of(&image);
        Self {
            image,
            info,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: StageDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl Transform {
    /// Every transform with its default parameters.
    pub const ALL: [Transform; 11] = [
        Transform::Grayscale,
        Transform::Threshold(ThresholdMode::Global),
        Transform::Denoise(DenoiseMode::Median),
        Transform::Morphology(MorphologyOrder::Close),
        Transform::Deskew,
        Transform::EdgeDetection,
        Transform::Contours,
        Transform::Invert,
        Transform::Equalize,
        Transform::Autocontrast,
        Transform::Upscale,
    ];

    /// Stable stage name, used in logs, errors and artifact metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Grayscale => "grayscale",
            Transform::Threshold(_) => "threshold",
            Transform::Denoise(_) => "denoise",
            Transform::Morphology(_) => "morphology",
            Transform::Deskew => "deskew",
            Transform::EdgeDetection => "edge_detection",
            Transform::Contours => "contours",
            Transform::Invert => "invert",
            Transform::Equalize => "equalize",
            Transform::Autocontrast => "autocontrast",
            Transform::Upscale => "upscale",
        }
    }

    /// Where this transform's artifacts are stored.
    pub fn stage_dir(&self) -> StageDir {
        match self {
            Transform::Grayscale => StageDir::GRAYSCALE,
            Transform::Threshold(_) => StageDir::THRESHOLDING,
            Transform::Denoise(_) => StageDir::NO_NOISE,
            Transform::Morphology(_) => StageDir::MORPHOLOGY,
            Transform::Deskew => StageDir::DESKEW,
            Transform::EdgeDetection => StageDir::EDGE_DETECTION,
            Transform::Contours => StageDir::CONTOURS,
            Transform::Invert => StageDir::INVERTED,
            Transform::Equalize => StageDir::EQUALIZED,
            Transform::Autocontrast => StageDir::PROCESSED,
            Transform::Upscale => StageDir::PREPROCESSED,
        }
    }

    /// Run the transform on `image`.
    pub fn apply(&self, image: &DynamicImage) -> Result<TransformOutput, OcrPrepError> {
        let out = match *self {
            Transform::Grayscale => TransformOutput::new(color::grayscale(image)),
            Transform::Threshold(mode) => TransformOutput::new(binarize::threshold(image, mode)),
            Transform::Denoise(mode) => TransformOutput::new(filter::denoise(image, mode)),
            Transform::Morphology(order) => {
                TransformOutput::new(filter::morphology(image, order))
            }
            Transform::Deskew => {
                let d = geometry::deskew(image);
                TransformOutput::new(d.image).with_detail(StageDetail::Deskew {
                    angle_degrees: d.angle_degrees,
                    lines: d.lines,
                })
            }
            Transform::EdgeDetection => TransformOutput::new(outline::edge_detection(image)),
            Transform::Contours => {
                let (drawn, count) = outline::contours(image);
                TransformOutput::new(drawn).with_detail(StageDetail::Contours { count })
            }
            Transform::Invert => TransformOutput::new(color::invert(image)),
            Transform::Equalize => TransformOutput::new(color::equalize(image)?),
            Transform::Autocontrast => TransformOutput::new(color::autocontrast(image)),
            Transform::Upscale => TransformOutput::new(color::upscale(image)),
        };
        Ok(out)
    }

    /// Copy of `self` with `params` substituted where they apply.
    pub fn with_params(self, params: &StageParams) -> Self {
        match self {
            Transform::Threshold(m) => Transform::Threshold(params.threshold.unwrap_or(m)),
            Transform::Denoise(m) => Transform::Denoise(params.denoise.unwrap_or(m)),
            Transform::Morphology(o) => Transform::Morphology(params.morphology.unwrap_or(o)),
            other => other,
        }
    }
}

impl fmt::Display for Transform {
    /// Formats as the `name[:param]` descriptor accepted by [`FromStr`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Threshold(m) => write!(f, "threshold:{}", m.as_str()),
            Transform::Denoise(m) => write!(f, "denoise:{}", m.as_str()),
            Transform::Morphology(o) => write!(f, "morphology:{}", o.as_str()),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Transform {
    type Err = OcrPrepError;

    /// Parse a `name[:param]` descriptor, e.g. `threshold:adaptive`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, param) = match s.trim().split_once(':') {
            Some((n, p)) => (n.trim(), Some(p.trim())),
            None => (s.trim(), None),
        };
        let name = name.to_ascii_lowercase().replace('-', "_");

        let t = match name.as_str() {
            "threshold" | "thresholding" => {
                return Ok(Transform::Threshold(
                    param.map(str::parse).transpose()?.unwrap_or_default(),
                ))
            }
            "denoise" | "remove_noise" | "no_noise" => {
                return Ok(Transform::Denoise(
                    param.map(str::parse).transpose()?.unwrap_or_default(),
                ))
            }
            "morphology" => {
                return Ok(Transform::Morphology(
                    param.map(str::parse).transpose()?.unwrap_or_default(),
                ))
            }
            "grayscale" | "gray" => Transform::Grayscale,
            "deskew" => Transform::Deskew,
            "edge_detection" | "edges" => Transform::EdgeDetection,
            "contours" => Transform::Contours,
            "invert" | "invert_colors" | "inverted" => Transform::Invert,
            "equalize" | "equalize_hist" => Transform::Equalize,
            "autocontrast" => Transform::Autocontrast,
            "upscale" => Transform::Upscale,
            _ => {
                return Err(OcrPrepError::InvalidParameter {
                    param: "transform",
                    value: s.to_string(),
                    expected: "one of grayscale, threshold, denoise, morphology, deskew, \
                               edge_detection, contours, invert, equalize, autocontrast, upscale",
                })
            }
        };

        if let Some(p) = param {
            return Err(OcrPrepError::InvalidParameter {
                param: "transform parameter",
                value: format!("{}:{}", t.name(), p),
                expected: "no parameter for this transform",
            });
        }
        Ok(t)
    }
}

/// Caller-supplied mode overrides for a pipeline run.
///
/// `None` keeps whatever the pipeline definition fixed for that stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageParams {
    pub threshold: Option<ThresholdMode>,
    pub denoise: Option<DenoiseMode>,
    pub morphology: Option<MorphologyOrder>,
}

impl StageParams {
    pub fn is_empty(&self) -> bool {
        self.threshold.is_none() && self.denoise.is_none() && self.morphology.is_none()
    }
}

/// Apply a filter to `image` in its own pixel layout.
///
/// Single-channel images stay single-channel; images with alpha are handled
/// as RGBA; everything else as RGB. 16-bit and float images are narrowed to
/// 8 bits first.
pub(crate) fn per_layout(
    image: &DynamicImage,
    gray: impl Fn(&GrayImage) -> GrayImage,
    rgb: impl Fn(&RgbImage) -> RgbImage,
    rgba: impl Fn(&RgbaImage) -> RgbaImage,
) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(g) => DynamicImage::ImageLuma8(gray(g)),
        DynamicImage::ImageRgb8(c) => DynamicImage::ImageRgb8(rgb(c)),
        DynamicImage::ImageRgba8(c) => DynamicImage::ImageRgba8(rgba(c)),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(rgba(&other.to_rgba8())),
        other if other.color().channel_count() == 1 => {
            DynamicImage::ImageLuma8(gray(&other.to_luma8()))
        }
        other => DynamicImage::ImageRgb8(rgb(&other.to_rgb8())),
    }
}
