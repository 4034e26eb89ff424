//! Top-level entry points: preprocess, recognise, draw word boxes, batch.
//!
//! Image work is CPU-bound and the artifact store does blocking I/O, so both
//! run on `spawn_blocking`; only the OCR engine call is awaited on the
//! runtime directly. Use [`crate::stream::preprocess_stream`] instead of
//! [`preprocess_batch`] to receive results as each source finishes.

use crate::config::PrepConfig;
use crate::error::{OcrPrepError, SourceError};
use crate::ocr::resolve_engine;
use crate::output::{
    BatchItem, BatchOutput, BatchStats, BoundingBoxOutput, OcrOutput, PipelineRun, StageArtifact,
};
use crate::pipeline::input::ResolvedSource;
use crate::pipeline::{Pipeline, PipelineDefinition};
use crate::postprocess::build_record;
use crate::store::{ArtifactStore, StageDir};
use crate::transform::{color, outline, StageParams, Transform};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What [`recognize`] does before calling the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizeOptions {
    /// Pipeline to run first. `None` recognises a grayscale copy of the
    /// source without storing anything.
    pub pipeline: Option<PipelineDefinition>,
    /// Mode overrides for the pipeline's stages.
    #[serde(default)]
    pub params: StageParams,
}

impl RecognizeOptions {
    pub fn with_pipeline(pipeline: PipelineDefinition) -> Self {
        Self {
            pipeline: Some(pipeline),
            params: StageParams::default(),
        }
    }
}

/// Resolve `image_name` (optionally in `subfolder`) under the configured
/// store's root.
pub fn source(
    image_name: &str,
    subfolder: Option<&str>,
    config: &PrepConfig,
) -> Result<ResolvedSource, OcrPrepError> {
    let store = config.artifact_store();
    crate::pipeline::input::resolve_source(store.root(), image_name, subfolder)
}

/// Run `pipeline` over `source`, persisting every stage.
///
/// # Errors
/// * `NotFound` if the source is missing (no stage runs).
/// * `InvalidParameter` for an empty pipeline.
/// * `StageFailed` if a stage fails; earlier artifacts are kept.
pub async fn preprocess(
    pipeline: &PipelineDefinition,
    source: &ResolvedSource,
    params: &StageParams,
    config: &PrepConfig,
) -> Result<PipelineRun, OcrPrepError> {
    let store = config.artifact_store();
    let runner = Pipeline::new(pipeline.with_params(params))
        .with_progress(config.progress_callback.clone());
    let source = source.clone();
    blocking(move || runner.run(store.as_ref(), &source)).await
}

/// Synchronous wrapper around [`preprocess`].
///
/// Creates a temporary tokio runtime internally.
pub fn preprocess_sync(
    pipeline: &PipelineDefinition,
    source: &ResolvedSource,
    params: &StageParams,
    config: &PrepConfig,
) -> Result<PipelineRun, OcrPrepError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrPrepError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(preprocess(pipeline, source, params, config))
}

/// Apply one transform to `source` and return its artifact.
pub async fn apply_transform(
    transform: Transform,
    source: &ResolvedSource,
    config: &PrepConfig,
) -> Result<StageArtifact, OcrPrepError> {
    let run = preprocess(
        &PipelineDefinition::single(transform),
        source,
        &StageParams::default(),
        config,
    )
    .await?;
    run.stages
        .into_iter()
        .next()
        .ok_or_else(|| OcrPrepError::Internal("single-stage run produced no artifact".into()))
}

/// Optionally preprocess `source`, recognise the resulting image, and clean
/// and categorise the text.
///
/// A blank image yields an empty record, not an error.
pub async fn recognize(
    source: &ResolvedSource,
    options: &RecognizeOptions,
    config: &PrepConfig,
) -> Result<OcrOutput, OcrPrepError> {
    let started = Instant::now();
    let store = config.artifact_store();
    if !store.contains(source.path()) {
        return Err(OcrPrepError::NotFound {
            path: source.path().to_path_buf(),
        });
    }
    let engine = resolve_engine(config).await?;

    let (image_path, run) = match options.pipeline {
        Some(ref def) => {
            let run = preprocess(def, source, &options.params, config).await?;
            (run.final_path.clone(), Some(run))
        }
        None => (source.path().to_path_buf(), None),
    };

    let mut image = load(Arc::clone(&store), image_path.clone()).await?;
    if run.is_none() {
        image = color::grayscale(&image);
    }

    let recognition = engine.recognize(&image, &config.language).await?;
    let record = build_record(&recognition.text, &config.categories);

    info!(
        "Recognised {} chars from {} ({} categories) via {}",
        record.cleaned_text.len(),
        image_path.display(),
        record.categories.len(),
        engine.name()
    );

    Ok(OcrOutput {
        image_path,
        run,
        record,
        engine: engine.name().to_string(),
        input_tokens: recognition.input_tokens,
        output_tokens: recognition.output_tokens,
        retries: recognition.retries,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Synchronous wrapper around [`recognize`].
pub fn recognize_sync(
    source: &ResolvedSource,
    options: &RecognizeOptions,
    config: &PrepConfig,
) -> Result<OcrOutput, OcrPrepError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrPrepError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(recognize(source, options, config))
}

/// Ask the engine for word boxes on a grayscale copy of `source` and draw
/// the confident ones over the original.
///
/// The drawing is stored at `bounding/bounding_boxes_<name>`.
pub async fn draw_bounding_boxes(
    source: &ResolvedSource,
    config: &PrepConfig,
) -> Result<BoundingBoxOutput, OcrPrepError> {
    let store = config.artifact_store();
    if !store.contains(source.path()) {
        return Err(OcrPrepError::NotFound {
            path: source.path().to_path_buf(),
        });
    }
    let engine = resolve_engine(config).await?;

    let original = load(Arc::clone(&store), source.path().to_path_buf()).await?;
    let gray = color::grayscale(&original);
    let boxes = engine.recognize_words(&gray, &config.language).await?;

    let name = source.name().to_string();
    let drawing_boxes = boxes.clone();
    let (path, drawn) = blocking(move || {
        let (drawing, drawn) = outline::word_boxes(&original, &drawing_boxes);
        let path = store.put(&StageDir::BOUNDING, &name, &drawing)?;
        Ok((path, drawn))
    })
    .await?;

    info!(
        "Drew {}/{} word boxes → {}",
        drawn,
        boxes.len(),
        path.display()
    );
    Ok(BoundingBoxOutput { path, boxes, drawn })
}

/// Run `pipeline` over many sources, `config.concurrency` at a time.
///
/// A failing source does not stop the batch; its item carries a
/// [`SourceError`]. Items come back in input order.
///
/// Artifact paths are keyed by file name only, so sources sharing a name in
/// different subfolders (`scans/a.png`, `other/a.png`) write the same
/// artifacts. Run concurrently, one source's stage may read the other's
/// previous stage output; the last write wins. Give such sources distinct
/// names or run them in separate batches.
pub async fn preprocess_batch(
    sources: &[ResolvedSource],
    pipeline: &PipelineDefinition,
    params: &StageParams,
    config: &PrepConfig,
) -> BatchOutput {
    let started = Instant::now();
    let definition = pipeline.with_params(params);

    let mut indexed: Vec<(usize, BatchItem)> = stream::iter(sources.iter().cloned().enumerate())
        .map(|(idx, src)| {
            let definition = definition.clone();
            async move { (idx, run_one(&definition, &src, config).await) }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    indexed.sort_by_key(|(idx, _)| *idx);
    let items: Vec<BatchItem> = indexed.into_iter().map(|(_, item)| item).collect();

    let succeeded = items.iter().filter(|i| i.is_ok()).count();
    let stats = BatchStats {
        total_sources: items.len(),
        succeeded,
        failed: items.len() - succeeded,
        total_duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Batch {}: {}/{} sources succeeded in {}ms",
        definition.name, stats.succeeded, stats.total_sources, stats.total_duration_ms
    );

    BatchOutput {
        pipeline: definition.name,
        items,
        stats,
    }
}

/// Preprocess one source, folding any failure into the item.
pub(crate) async fn run_one(
    definition: &PipelineDefinition,
    source: &ResolvedSource,
    config: &PrepConfig,
) -> BatchItem {
    match preprocess(definition, source, &StageParams::default(), config).await {
        Ok(run) => BatchItem {
            source: source.path().to_path_buf(),
            run: Some(run),
            error: None,
        },
        Err(e) => {
            warn!("{}: {}", source.path().display(), e);
            BatchItem {
                source: source.path().to_path_buf(),
                run: None,
                error: Some(SourceError::from_error(source.path().to_path_buf(), &e)),
            }
        }
    }
}

async fn load(
    store: Arc<dyn ArtifactStore>,
    path: PathBuf,
) -> Result<DynamicImage, OcrPrepError> {
    blocking(move || store.get(&path)).await
}

async fn blocking<T, F>(f: F) -> Result<T, OcrPrepError>
where
    F: FnOnce() -> Result<T, OcrPrepError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OcrPrepError::Internal(format!("image task failed: {e}")))?
}
