//! Integration tests over a real filesystem store.
//!
//! Every test seeds a fresh `tempfile` image root, so artifacts from one
//! test never leak into another. OCR goes through `ScriptedOcr`; no test
//! needs network access or API keys.

use edgequake_ocrprep::ocr::scripted::ScriptedOcr;
use edgequake_ocrprep::pipeline::input::ResolvedSource;
use edgequake_ocrprep::{
    apply_transform, preprocess, preprocess_batch, preprocess_stream, preprocess_sync, recognize,
    source, ErrorKind, OcrEngine, PipelineDefinition, PrepConfig, RecognizeOptions, StageParams,
    Transform,
};
use futures::StreamExt;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A white page with a few dark "text" bars.
fn receipt() -> DynamicImage {
    let mut img = RgbImage::from_pixel(120, 80, Rgb([245, 245, 240]));
    for row in [15u32, 35, 55] {
        for y in row..row + 6 {
            for x in 10..110 {
                img.put_pixel(x, y, Rgb([20, 20, 25]));
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}

fn seed(root: &Path, name: &str, image: &DynamicImage) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image.save(&path).unwrap();
    path
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows stages.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn config(root: &Path) -> PrepConfig {
    init_tracing();
    PrepConfig::builder().image_root(root).build().unwrap()
}

fn config_with_engine(root: &Path, engine: Arc<dyn OcrEngine>) -> PrepConfig {
    init_tracing();
    PrepConfig::builder()
        .image_root(root)
        .ocr_engine(engine)
        .build()
        .unwrap()
}

/// Every regular file under `root`, sorted.
fn files_under(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, out);
            } else {
                out.push(path);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out.sort();
    out
}

// ── Pipelines ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn preprocess_for_ocr_writes_one_artifact_per_stage() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "receipt.png", &receipt());
    let cfg = config(dir.path());

    let src = source("receipt.png", None, &cfg).unwrap();
    let def = PipelineDefinition::builtin("preprocess-for-ocr").unwrap();
    let run = preprocess(&def, &src, &StageParams::default(), &cfg)
        .await
        .unwrap();

    assert_eq!(run.stages.len(), 5);
    assert_eq!(
        run.final_path,
        dir.path()
            .join("inverted/inverted_deskewed_no_noise_thresh_gray_receipt.png")
    );
    for stage in &run.stages {
        assert!(stage.path.is_file(), "missing {}", stage.path.display());
    }
    let thresh = run.stage("threshold").unwrap();
    assert_eq!(thresh.descriptor, "threshold:adaptive");
    assert_eq!(thresh.info.channels, 1);

    // Inverted: text bars are now light, the page dark.
    let last = image::open(&run.final_path).unwrap().to_luma8();
    assert!(last.get_pixel(60, 18)[0] > 200);
    assert!(last.get_pixel(60, 75)[0] < 50);
}

#[tokio::test]
async fn rerunning_a_pipeline_overwrites_in_place() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "receipt.png", &receipt());
    let cfg = config(dir.path());
    let src = source("receipt.png", None, &cfg).unwrap();
    let def = PipelineDefinition::builtin("preprocess-for-ocr").unwrap();

    let first = preprocess(&def, &src, &StageParams::default(), &cfg)
        .await
        .unwrap();
    let after_first = files_under(dir.path());
    let second = preprocess(&def, &src, &StageParams::default(), &cfg)
        .await
        .unwrap();

    assert_eq!(first.final_path, second.final_path);
    assert_eq!(files_under(dir.path()), after_first);
    assert_eq!(after_first.len(), 6);
}

#[tokio::test]
async fn missing_source_fails_before_any_stage() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let src = source("absent.png", None, &cfg).unwrap();
    let def = PipelineDefinition::builtin("preprocess-for-ocr").unwrap();

    let err = preprocess(&def, &src, &StageParams::default(), &cfg)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn failing_stage_keeps_earlier_artifacts() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "receipt.png", &receipt());
    let cfg = config(dir.path());
    let src = source("receipt.png", None, &cfg).unwrap();

    // contours draws over an RGB copy, so equalize sees three channels.
    let def = PipelineDefinition::parse("broken", "contours,equalize,invert").unwrap();
    let err = preprocess(&def, &src, &StageParams::default(), &cfg)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.stage(), Some("equalize"));
    assert!(dir.path().join("contours/contours_receipt.png").is_file());
    assert!(!dir.path().join("equalized").join("equalized_contours_receipt.png").exists());
    assert!(!dir.path().join("inverted").exists());
}

#[tokio::test]
async fn sources_in_subfolders_are_resolved_under_the_root() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "scans/receipt.png", &receipt());
    let cfg = config(dir.path());

    let src = source("receipt.png", Some("scans"), &cfg).unwrap();
    let artifact = apply_transform(Transform::Grayscale, &src, &cfg)
        .await
        .unwrap();
    assert_eq!(artifact.path, dir.path().join("grayscale/gray_receipt.png"));

    let err = source("../etc/passwd", None, &cfg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[tokio::test]
async fn stage_params_override_every_matching_stage() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "receipt.png", &receipt());
    let cfg = config(dir.path());
    let src = source("receipt.png", None, &cfg).unwrap();

    let params = StageParams {
        denoise: Some(edgequake_ocrprep::DenoiseMode::Gaussian),
        ..StageParams::default()
    };
    let def = PipelineDefinition::builtin("preprocess").unwrap();
    let run = preprocess(&def, &src, &params, &cfg).await.unwrap();
    assert_eq!(run.stage("denoise").unwrap().descriptor, "denoise:gaussian");
    assert_eq!(run.stage("upscale").unwrap().info.width, 240);
}

#[test]
fn preprocess_sync_runs_without_an_outer_runtime() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "receipt.png", &receipt());
    let cfg = config(dir.path());
    let src = source("receipt.png", None, &cfg).unwrap();

    let run = preprocess_sync(
        &PipelineDefinition::single(Transform::Invert),
        &src,
        &StageParams::default(),
        &cfg,
    )
    .unwrap();
    assert_eq!(run.final_path, dir.path().join("inverted/inverted_receipt.png"));
}

// ── Batches ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_reports_each_source_in_input_order() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "a.png", &receipt());
    seed(dir.path(), "b.png", &receipt());
    let cfg = config(dir.path());

    let sources: Vec<ResolvedSource> = ["a.png", "missing.png", "b.png"]
        .iter()
        .map(|n| source(n, None, &cfg).unwrap())
        .collect();
    let def = PipelineDefinition::parse("gray", "grayscale").unwrap();
    let batch = preprocess_batch(&sources, &def, &StageParams::default(), &cfg).await;

    assert_eq!(batch.stats.total_sources, 3);
    assert_eq!(batch.stats.succeeded, 2);
    assert_eq!(batch.stats.failed, 1);
    assert!(batch.items[0].is_ok());
    assert_eq!(
        batch.items[1].error.as_ref().unwrap().kind,
        ErrorKind::NotFound
    );
    assert!(batch.items[2].source.ends_with("b.png"));
}

#[tokio::test]
async fn same_named_sources_share_artifact_paths() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "scans/a.png", &receipt());
    seed(dir.path(), "other/a.png", &receipt());
    // One at a time: concurrent writers to one path may read a partial file.
    init_tracing();
    let cfg = PrepConfig::builder()
        .image_root(dir.path())
        .concurrency(1)
        .build()
        .unwrap();

    let sources = vec![
        source("a.png", Some("scans"), &cfg).unwrap(),
        source("a.png", Some("other"), &cfg).unwrap(),
    ];
    let def = PipelineDefinition::parse("gray", "grayscale,invert").unwrap();
    let batch = preprocess_batch(&sources, &def, &StageParams::default(), &cfg).await;

    assert_eq!(batch.stats.succeeded, 2);
    let finals: Vec<_> = batch
        .items
        .iter()
        .map(|i| i.run.as_ref().unwrap().final_path.clone())
        .collect();
    assert_eq!(finals[0], finals[1]);
    assert_eq!(finals[0], dir.path().join("inverted/inverted_gray_a.png"));
    assert_eq!(files_under(&dir.path().join("grayscale")).len(), 1);
}

#[tokio::test]
async fn stream_yields_every_source() {
    let dir = TempDir::new().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        seed(dir.path(), name, &receipt());
    }
    let cfg = config(dir.path());
    let sources: Vec<ResolvedSource> = ["a.png", "b.png", "c.png"]
        .iter()
        .map(|n| source(n, None, &cfg).unwrap())
        .collect();

    let def = PipelineDefinition::single(Transform::EdgeDetection);
    let runs: Vec<_> = preprocess_stream(sources, &def, &StageParams::default(), &cfg)
        .collect()
        .await;
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.is_ok()));
    assert_eq!(files_under(&dir.path().join("edge_detection")).len(), 3);
}

// ── Recognition ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn recognize_cleans_and_categorises_engine_text() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), "poster.png", &receipt());
    let engine = Arc::new(ScriptedOcr::new("Genre: Drama!!\nDirector:  J. Doe\n"));
    let cfg = config_with_engine(dir.path(), engine.clone());

    let src = source("poster.png", None, &cfg).unwrap();
    let options =
        RecognizeOptions::with_pipeline(PipelineDefinition::builtin("preprocess-for-ocr").unwrap());
    let out = recognize(&src, &options, &cfg).await.unwrap();

    assert_eq!(engine.calls(), 1);
    assert_eq!(out.engine, "scripted");
    assert_eq!(out.record.cleaned_text, "Genre Drama Director J. Doe");
    assert_eq!(out.record.categories.get("genre").map(String::as_str), Some("drama"));
    assert_eq!(
        out.record.categories.get("director").map(String::as_str),
        Some("director")
    );
    assert!(out.image_path.ends_with("inverted_deskewed_no_noise_thresh_gray_poster.png"));
    assert!(out.run.is_some());
}

#[test]
fn blank_page_gives_an_empty_record() {
    let dir = TempDir::new().unwrap();
    let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));
    seed(dir.path(), "blank.png", &blank);
    let cfg = config_with_engine(dir.path(), Arc::new(ScriptedOcr::new("")));
    let src = source("blank.png", None, &cfg).unwrap();

    let out = tokio_test::block_on(recognize(&src, &RecognizeOptions::default(), &cfg)).unwrap();
    assert!(out.record.raw_text.is_empty());
    assert!(out.record.cleaned_text.is_empty());
    assert!(out.record.categories.is_empty());
    // No pipeline: nothing was written besides the source.
    assert!(out.run.is_none());
    assert_eq!(files_under(dir.path()).len(), 1);
}

#[tokio::test]
async fn recognize_missing_source_never_calls_the_engine() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedOcr::new("anything"));
    let cfg = config_with_engine(dir.path(), engine.clone());
    let src = source("ghost.png", None, &cfg).unwrap();

    let err = recognize(&src, &RecognizeOptions::default(), &cfg)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.calls(), 0);
}
