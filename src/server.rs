//! Thin HTTP surface over the library (feature `server`).
//!
//! Every route is a `GET` taking `image_name`, an optional `subfolder`, and
//! where relevant a `type` (threshold / noise mode) or `order` (morphology)
//! parameter. Each returns the path of the artifact it wrote:
//!
//! ```text
//! GET /thresholding?image_name=receipt.png&type=adaptive
//! → 200 {"message": "...", "processed_image_path": "/images/thresholding/thresh_receipt.png"}
//! ```
//!
//! Failures map onto status codes by [`ErrorKind`]: `not_found` → 404,
//! `invalid_parameter` / `invalid_input` → 400, `upstream_failure` → 500.

use crate::config::{DenoiseMode, MorphologyOrder, PrepConfig, ThresholdMode};
use crate::error::{ErrorKind, OcrPrepError};
use crate::output::{RecognizedTextRecord, WordBox};
use crate::pipeline::{PipelineDefinition, PREPROCESS, PREPROCESS_FOR_OCR};
use crate::recognize::{self, RecognizeOptions};
use crate::transform::{StageParams, Transform};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// State shared by all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PrepConfig>,
}

/// Query parameters accepted by every route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageQuery {
    pub image_name: String,
    #[serde(default)]
    pub subfolder: Option<String>,
    /// Threshold or noise-removal mode.
    #[serde(default, rename = "type")]
    pub mode: Option<String>,
    /// Morphology order (`1`/`close`, `2`/`open`).
    #[serde(default)]
    pub order: Option<String>,
    /// Pipeline for `/ocr`: a built-in name, a descriptor list, or `none`.
    #[serde(default)]
    pub pipeline: Option<String>,
}

/// Body of every successful image route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedResponse {
    pub message: String,
    pub processed_image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecognizedTextRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<WordBox>>,
}

impl ProcessedResponse {
    fn new(message: impl Into<String>, path: PathBuf) -> Self {
        Self {
            message: message.into(),
            processed_image_path: path,
            record: None,
            boxes: None,
        }
    }
}

/// Library error rendered as `{ "error", "kind" }`.
#[derive(Debug)]
pub struct ApiError(pub OcrPrepError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl From<OcrPrepError> for ApiError {
    fn from(e: OcrPrepError) -> Self {
        Self(e)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidParameter | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<ProcessedResponse>, ApiError>;

/// Build the router over `config`.
pub fn router(config: PrepConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/grayscale", get(grayscale))
        .route("/thresholding", get(thresholding))
        .route("/remove-noise", get(remove_noise))
        .route("/morphology", get(morphology))
        .route("/deskew", get(deskew))
        .route("/edge-detection", get(edge_detection))
        .route("/contours", get(contours))
        .route("/invert-colors", get(invert_colors))
        .route("/equalize-hist", get(equalize_hist))
        .route("/preprocess-for-ocr", get(preprocess_for_ocr))
        .route("/preprocess", get(preprocess))
        .route("/ocr", get(ocr))
        .route("/bounding-boxes", get(bounding_boxes))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Serve [`router`] on `addr` until the process stops.
pub async fn serve(addr: SocketAddr, config: PrepConfig) -> Result<(), OcrPrepError> {
    let app = router(config);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OcrPrepError::Internal(format!("cannot bind {addr}: {e}")))?;
    info!("ocrprep HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| OcrPrepError::Internal(format!("server error: {e}")))
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn apply(state: &AppState, q: &ImageQuery, transform: Transform, message: &str) -> ApiResult {
    let source = recognize::source(&q.image_name, q.subfolder.as_deref(), &state.config)?;
    let artifact = recognize::apply_transform(transform, &source, &state.config).await?;
    Ok(Json(ProcessedResponse::new(message, artifact.path)))
}

async fn run_pipeline(state: &AppState, q: &ImageQuery, name: &str, message: &str) -> ApiResult {
    let source = recognize::source(&q.image_name, q.subfolder.as_deref(), &state.config)?;
    let def = PipelineDefinition::builtin(name)?;
    let run = recognize::preprocess(&def, &source, &StageParams::default(), &state.config).await?;
    Ok(Json(ProcessedResponse::new(message, run.final_path)))
}

pub async fn grayscale(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::Grayscale, "Grayscale conversion successful").await
}

pub async fn thresholding(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    let mode: ThresholdMode = q.mode.as_deref().unwrap_or("global").parse()?;
    apply(&s, &q, Transform::Threshold(mode), "Thresholding successful").await
}

pub async fn remove_noise(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    let mode: DenoiseMode = q.mode.as_deref().unwrap_or("median").parse()?;
    apply(&s, &q, Transform::Denoise(mode), "Noise removal successful").await
}

pub async fn morphology(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    let order: MorphologyOrder = q.order.as_deref().unwrap_or("1").parse()?;
    apply(&s, &q, Transform::Morphology(order), "Morphology operation successful").await
}

pub async fn deskew(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::Deskew, "Deskewing successful").await
}

pub async fn edge_detection(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::EdgeDetection, "Edge detection successful").await
}

pub async fn contours(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::Contours, "Contour detection successful").await
}

pub async fn invert_colors(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::Invert, "Color inversion successful").await
}

pub async fn equalize_hist(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    apply(&s, &q, Transform::Equalize, "Histogram equalization successful").await
}

pub async fn preprocess_for_ocr(
    State(s): State<AppState>,
    Query(q): Query<ImageQuery>,
) -> ApiResult {
    run_pipeline(&s, &q, PREPROCESS_FOR_OCR, "Preprocessing for OCR successful").await
}

pub async fn preprocess(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    run_pipeline(&s, &q, PREPROCESS, "Preprocessing successful").await
}

pub async fn ocr(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    let source = recognize::source(&q.image_name, q.subfolder.as_deref(), &s.config)?;
    let options = match q.pipeline.as_deref().map(str::trim) {
        Some("none") | Some("") => RecognizeOptions::default(),
        Some(text) => RecognizeOptions::with_pipeline(PipelineDefinition::resolve(text)?),
        None => RecognizeOptions::with_pipeline(PipelineDefinition::builtin(PREPROCESS_FOR_OCR)?),
    };
    let out = recognize::recognize(&source, &options, &s.config).await?;
    let mut body = ProcessedResponse::new("OCR successful", out.image_path);
    body.record = Some(out.record);
    Ok(Json(body))
}

pub async fn bounding_boxes(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> ApiResult {
    let source = recognize::source(&q.image_name, q.subfolder.as_deref(), &s.config)?;
    let out = recognize::draw_bounding_boxes(&source, &s.config).await?;
    let mut body = ProcessedResponse::new("Bounding boxes created successfully", out.path);
    body.boxes = Some(out.boxes);
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::scripted::ScriptedOcr;
    use crate::store::{ArtifactStore, MemoryArtifactStore};
    use image::{DynamicImage, Rgb, RgbImage};

    fn state() -> AppState {
        let store = Arc::new(MemoryArtifactStore::new("/images"));
        store.insert(
            "/images/scans/receipt.png",
            DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb([250, 250, 250]))),
        );
        let config = PrepConfig::builder()
            .store(store as Arc<dyn ArtifactStore>)
            .ocr_engine(Arc::new(ScriptedOcr::new("Starring A. Lee")))
            .build()
            .unwrap();
        AppState {
            config: Arc::new(config),
        }
    }

    fn query(name: &str) -> ImageQuery {
        ImageQuery {
            image_name: name.into(),
            subfolder: Some("scans".into()),
            ..Default::default()
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidParameter), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::UpstreamFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn thresholding_route_writes_artifact() {
        let mut q = query("receipt.png");
        q.mode = Some("Adaptive".into());
        let Json(body) = thresholding(State(state()), Query(q)).await.unwrap();
        assert_eq!(
            body.processed_image_path,
            PathBuf::from("/images/thresholding/thresh_receipt.png")
        );
    }

    #[tokio::test]
    async fn bad_mode_is_bad_request() {
        let mut q = query("receipt.png");
        q.mode = Some("otsu".into());
        let err = thresholding(State(state()), Query(q)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_image_is_not_found() {
        let err = deskew(State(state()), Query(query("ghost.png")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn equalize_on_color_is_bad_request() {
        let err = equalize_hist(State(state()), Query(query("receipt.png")))
            .await
            .unwrap_err();
        assert_eq!(err.0.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn ocr_route_returns_record() {
        let Json(body) = ocr(State(state()), Query(query("receipt.png"))).await.unwrap();
        let record = body.record.unwrap();
        assert_eq!(record.categories.get("cast").map(String::as_str), Some("starring"));
        assert!(body
            .processed_image_path
            .starts_with("/images/inverted"));
    }
}
