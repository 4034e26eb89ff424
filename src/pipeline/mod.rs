//! Pipeline orchestration: ordered transform stages over one source image.
//!
//! A pipeline is an explicit list of [`Stage`]s. Running it threads each
//! stage's stored artifact into the next stage:
//!
//! ```text
//! source ──▶ grayscale ──▶ threshold ──▶ denoise ──▶ deskew ──▶ invert
//!            gray_x.png    thresh_gray_x.png  ...              inverted_…_x.png
//! ```
//!
//! Every stage reads its input back from the [`ArtifactStore`] rather than
//! passing the decoded image along, so each intermediate artifact on disk is
//! exactly what the next stage consumed.
//!
//! ## Failure semantics
//!
//! * Missing source → `NotFound` before any stage runs.
//! * A failing stage aborts the run with `StageFailed { stage, .. }`.
//!   Artifacts written by earlier stages are left in place.

pub mod input;

use crate::error::OcrPrepError;
use crate::output::{PipelineRun, StageArtifact};
use crate::progress::ProgressCallback;
use crate::store::ArtifactStore;
use crate::transform::{StageParams, Transform, TransformOutput};
use input::ResolvedSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the canonical OCR-preparation pipeline.
pub const PREPROCESS_FOR_OCR: &str = "preprocess-for-ocr";

/// Name of the contrast-and-upscale pipeline.
pub const PREPROCESS: &str = "preprocess";

/// Every built-in pipeline name.
pub const BUILTIN_PIPELINES: [&str; 2] = [PREPROCESS_FOR_OCR, PREPROCESS];

/// One step of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub transform: Transform,
}

impl From<Transform> for Stage {
    fn from(transform: Transform) -> Self {
        Self { transform }
    }
}

/// A named, ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, stages: impl IntoIterator<Item = Transform>) -> Self {
        Self {
            name: name.into(),
            stages: stages.into_iter().map(Stage::from).collect(),
        }
    }

    /// Look up a built-in pipeline by name.
    pub fn builtin(name: &str) -> Result<Self, OcrPrepError> {
        use crate::config::{DenoiseMode, ThresholdMode};

        match name {
            PREPROCESS_FOR_OCR => Ok(Self::new(
                PREPROCESS_FOR_OCR,
                [
                    Transform::Grayscale,
                    Transform::Threshold(ThresholdMode::Adaptive),
                    Transform::Denoise(DenoiseMode::Median),
                    Transform::Deskew,
                    Transform::Invert,
                ],
            )),
            PREPROCESS => Ok(Self::new(
                PREPROCESS,
                [
                    Transform::Grayscale,
                    Transform::Autocontrast,
                    Transform::Upscale,
                    Transform::Denoise(DenoiseMode::Median),
                ],
            )),
            _ => Err(OcrPrepError::InvalidParameter {
                param: "pipeline",
                value: name.to_string(),
                expected: "'preprocess-for-ocr' or 'preprocess'",
            }),
        }
    }

    /// A one-stage pipeline named after its transform.
    pub fn single(transform: Transform) -> Self {
        Self::new(transform.name(), [transform])
    }

    /// Parse a comma-separated list of transform descriptors, e.g.
    /// `grayscale,threshold:adaptive,invert`.
    pub fn parse(name: impl Into<String>, descriptors: &str) -> Result<Self, OcrPrepError> {
        let transforms = descriptors
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::parse::<Transform>)
            .collect::<Result<Vec<_>, _>>()?;

        if transforms.is_empty() {
            return Err(OcrPrepError::InvalidParameter {
                param: "stages",
                value: descriptors.to_string(),
                expected: "at least one transform descriptor",
            });
        }
        Ok(Self::new(name, transforms))
    }

    /// A built-in name, or else a descriptor list forming a custom pipeline.
    pub fn resolve(text: &str) -> Result<Self, OcrPrepError> {
        if BUILTIN_PIPELINES.contains(&text) {
            return Self::builtin(text);
        }
        if text.contains(',') || text.contains(':') || text.parse::<Transform>().is_ok() {
            return Self::parse("custom", text);
        }
        Self::builtin(text)
    }

    /// Copy with `params` applied to every matching stage.
    pub fn with_params(&self, params: &StageParams) -> Self {
        Self {
            name: self.name.clone(),
            stages: self
                .stages
                .iter()
                .map(|s| Stage::from(s.transform.with_params(params)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for PipelineDefinition {
    /// `name: stage → stage → …`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" → ")?;
            }
            write!(f, "{}", stage.transform)?;
        }
        Ok(())
    }
}

/// Runs a [`PipelineDefinition`] against an artifact store.
#[derive(Clone)]
pub struct Pipeline {
    definition: PipelineDefinition,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(definition: PipelineDefinition) -> Self {
        Self {
            definition,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Run every stage over `source`, in order.
    pub fn run(
        &self,
        store: &dyn ArtifactStore,
        source: &ResolvedSource,
    ) -> Result<PipelineRun, OcrPrepError> {
        let started = Instant::now();
        let def = &self.definition;
        let total = def.stages.len();

        if total == 0 {
            return Err(OcrPrepError::InvalidParameter {
                param: "pipeline",
                value: def.name.clone(),
                expected: "a pipeline with at least one stage",
            });
        }

        if !store.contains(source.path()) {
            return Err(OcrPrepError::NotFound {
                path: source.path().to_path_buf(),
            });
        }

        info!("Running pipeline {} on {}", def, source.path().display());
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_start(source.name(), total);
        }

        let mut current: PathBuf = source.path().to_path_buf();
        let mut current_name = source.name().to_string();
        let mut stages = Vec::with_capacity(total);

        for (idx, stage) in def.stages.iter().enumerate() {
            let stage_num = idx + 1;
            let t = stage.transform;
            if let Some(ref cb) = self.progress {
                cb.on_stage_start(source.name(), stage_num, total, t.name());
            }

            let stage_start = Instant::now();
            let (path, out) = match run_stage(store, t, &current, &current_name) {
                Ok(v) => v,
                Err(e) => {
                    let e = e.in_stage(t.name());
                    warn!("{}: stage {}/{} failed — {}", source.name(), stage_num, total, e);
                    if let Some(ref cb) = self.progress {
                        cb.on_stage_error(source.name(), stage_num, total, &e.to_string());
                        cb.on_pipeline_complete(source.name(), total, stages.len());
                    }
                    return Err(e);
                }
            };

            debug!(
                "{}: stage {}/{} {} → {}",
                source.name(),
                stage_num,
                total,
                t,
                path.display()
            );
            if let Some(ref cb) = self.progress {
                cb.on_stage_complete(source.name(), stage_num, total, &path);
            }

            current_name = artifact_name(&path, &current_name);
            stages.push(StageArtifact {
                stage: t.name().to_string(),
                descriptor: t.to_string(),
                path: path.clone(),
                info: out.info,
                detail: out.detail,
                duration_ms: stage_start.elapsed().as_millis() as u64,
            });
            current = path;
        }

        if let Some(ref cb) = self.progress {
            cb.on_pipeline_complete(source.name(), total, stages.len());
        }

        Ok(PipelineRun {
            pipeline: def.name.clone(),
            source: source.path().to_path_buf(),
            stages,
            final_path: current,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Load `input`, transform it, persist the result under `input_name`.
fn run_stage(
    store: &dyn ArtifactStore,
    transform: Transform,
    input: &Path,
    input_name: &str,
) -> Result<(PathBuf, TransformOutput), OcrPrepError> {
    let image = store.get(input)?;
    let out = transform.apply(&image)?;
    let path = store.put(&transform.stage_dir(), input_name, &out.image)?;
    Ok((path, out))
}

fn artifact_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DenoiseMode, ThresholdMode};
    use crate::error::ErrorKind;
    use crate::store::MemoryArtifactStore;
    use image::{DynamicImage, Rgb, RgbImage};

    fn white_source(store: &MemoryArtifactStore) -> ResolvedSource {
        let src = input::resolve_source(store.root(), "receipt.png", None).unwrap();
        store.insert(
            src.path(),
            DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([255, 255, 255]))),
        );
        src
    }

    #[test]
    fn builtin_lookup() {
        let p = PipelineDefinition::builtin(PREPROCESS_FOR_OCR).unwrap();
        let names: Vec<_> = p.stages.iter().map(|s| s.transform.name()).collect();
        assert_eq!(names, ["grayscale", "threshold", "denoise", "deskew", "invert"]);
        assert_eq!(
            p.stages[1].transform,
            Transform::Threshold(ThresholdMode::Adaptive)
        );

        let err = PipelineDefinition::builtin("sharpen-all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn resolve_accepts_names_and_descriptor_lists() {
        assert_eq!(PipelineDefinition::resolve("preprocess").unwrap().len(), 4);
        let custom = PipelineDefinition::resolve("grayscale, invert").unwrap();
        assert_eq!(custom.name, "custom");
        assert_eq!(custom.len(), 2);
        assert!(PipelineDefinition::resolve("nope").is_err());
        assert!(PipelineDefinition::parse("x", " , ").is_err());
    }

    #[test]
    fn display_lists_stages() {
        let p = PipelineDefinition::builtin(PREPROCESS_FOR_OCR).unwrap();
        assert_eq!(
            p.to_string(),
            "preprocess-for-ocr: grayscale → threshold:adaptive → denoise:median → deskew → invert"
        );
    }

    #[test]
    fn params_override_matching_stages() {
        let p = PipelineDefinition::builtin(PREPROCESS_FOR_OCR)
            .unwrap()
            .with_params(&StageParams {
                denoise: Some(DenoiseMode::Gaussian),
                ..Default::default()
            });
        assert_eq!(p.stages[2].transform, Transform::Denoise(DenoiseMode::Gaussian));
        assert_eq!(
            p.stages[1].transform,
            Transform::Threshold(ThresholdMode::Adaptive)
        );
    }

    #[test]
    fn run_chains_artifact_names() {
        let store = MemoryArtifactStore::new("/images");
        let src = white_source(&store);
        let pipeline = Pipeline::new(PipelineDefinition::builtin(PREPROCESS_FOR_OCR).unwrap());

        let run = pipeline.run(&store, &src).unwrap();
        assert_eq!(
            run.final_path,
            PathBuf::from("/images/inverted/inverted_deskewed_no_noise_thresh_gray_receipt.png")
        );
        assert_eq!(run.stages.len(), 5);
        assert_eq!(
            run.stages[0].path,
            PathBuf::from("/images/grayscale/gray_receipt.png")
        );
        assert_eq!(store.len(), 6);

        // Re-running overwrites in place.
        pipeline.run(&store, &src).unwrap();
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn missing_source_is_not_found_before_any_stage() {
        let store = MemoryArtifactStore::new("/images");
        let src = input::resolve_source(store.root(), "ghost.png", None).unwrap();
        let err = Pipeline::new(PipelineDefinition::single(Transform::Grayscale))
            .run(&store, &src)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.stage().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn failing_stage_keeps_earlier_artifacts() {
        let store = MemoryArtifactStore::new("/images");
        let src = white_source(&store);
        let def = PipelineDefinition::parse("broken", "contours,equalize,invert").unwrap();

        let err = Pipeline::new(def).run(&store, &src).unwrap_err();
        assert_eq!(err.stage(), Some("equalize"));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(store.contains(Path::new("/images/contours/contours_receipt.png")));
        assert_eq!(store.len(), 2);
    }
}
