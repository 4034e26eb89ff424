//! Result types returned by the public entry points.
//!
//! Everything here is plain data and serialises to JSON, which is what the
//! CLI's `--json` flag and the HTTP layer emit.

use crate::error::SourceError;
use crate::transform::{ImageInfo, StageDetail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One stage's persisted output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// Stage name, e.g. `"threshold"`.
    pub stage: String,
    /// Full descriptor including parameters, e.g. `"threshold:adaptive"`.
    pub descriptor: String,
    /// Where the artifact was written.
    pub path: PathBuf,
    pub info: ImageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<StageDetail>,
    pub duration_ms: u64,
}

/// A completed pipeline run over one source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Pipeline name, or the transform name for single-stage runs.
    pub pipeline: String,
    pub source: PathBuf,
    /// Artifacts in stage order.
    pub stages: Vec<StageArtifact>,
    /// Path of the last stage's artifact; the image handed to OCR.
    pub final_path: PathBuf,
    pub duration_ms: u64,
}

impl PipelineRun {
    /// Artifact of the named stage, if that stage ran.
    pub fn stage(&self, name: &str) -> Option<&StageArtifact> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Recognised text after post-processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedTextRecord {
    pub raw_text: String,
    pub cleaned_text: String,
    /// Category name → first keyword of that category found in the text.
    pub categories: BTreeMap<String, String>,
}

/// A recognised word with its bounding box, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// 0 to 100. Boxes at 0 are structural and never drawn.
    pub confidence: f32,
}

/// Result of [`crate::recognize::recognize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Image that was sent to the engine.
    pub image_path: PathBuf,
    /// Preprocessing run that produced `image_path`, when one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<PipelineRun>,
    pub record: RecognizedTextRecord,
    pub engine: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Result of [`crate::recognize::draw_bounding_boxes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBoxOutput {
    pub path: PathBuf,
    pub boxes: Vec<WordBox>,
    /// Boxes actually drawn (positive confidence).
    pub drawn: usize,
}

/// Outcome for one source inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<PipelineRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Result of [`crate::recognize::preprocess_batch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub pipeline: String,
    /// One item per source, in input order.
    pub items: Vec<BatchItem>,
    pub stats: BatchStats,
}
