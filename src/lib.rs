//! # edgequake-ocrprep
//!
//! Prepare images for OCR with classical preprocessing pipelines, recognise
//! them with a vision LLM (or any engine you plug in), and clean up the text.
//!
//! ## Why this crate?
//!
//! OCR quality depends heavily on what the engine is shown. Photos of
//! receipts, posters and scans come in skewed, noisy, unevenly lit and in
//! colour. A short chain of deterministic transforms (grayscale, adaptive
//! threshold, median filter, deskew, invert) turns them into crisp binary
//! images. Every intermediate image is kept on disk under a predictable
//! name, so each stage can be inspected or reused by the next request.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Resolve   validate the name under the image root
//!  ├─ 2. Stages    transform → store → reload, one artifact per stage
//!  │                (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR       final artifact → OcrEngine (vision LLM by default)
//!  └─ 4. Text      whitelist cleanup + keyword categorisation
//! ```
//!
//! Artifacts land at `<root>/<stage dir>/<prefix>_<input name>`, so the
//! canonical pipeline on `receipt.png` ends at
//! `<root>/inverted/inverted_deskewed_no_noise_thresh_gray_receipt.png`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocrprep::{recognize, source, PipelineDefinition, PrepConfig, RecognizeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = PrepConfig::builder().image_root("./images").build()?;
//!     let src = source("receipt.png", None, &config)?;
//!     let options = RecognizeOptions::with_pipeline(
//!         PipelineDefinition::builtin("preprocess-for-ocr")?,
//!     );
//!     let out = recognize(&src, &options, &config).await?;
//!     println!("{}", out.record.cleaned_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `ocrprep` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], an axum router over every transform and pipeline |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-ocrprep = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod prompts;
pub mod recognize;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod stream;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CategoryTable, DenoiseMode, MorphologyOrder, PrepConfig, PrepConfigBuilder, ThresholdMode,
};
pub use error::{ErrorKind, OcrPrepError, SourceError};
pub use ocr::{OcrEngine, Recognition};
pub use output::{
    BatchItem, BatchOutput, BatchStats, BoundingBoxOutput, OcrOutput, PipelineRun,
    RecognizedTextRecord, StageArtifact, WordBox,
};
pub use pipeline::{Pipeline, PipelineDefinition, Stage};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use recognize::{
    apply_transform, draw_bounding_boxes, preprocess, preprocess_batch, preprocess_sync,
    recognize, recognize_sync, source, RecognizeOptions,
};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StageDir};
pub use stream::preprocess_stream;
pub use transform::{StageParams, Transform};
