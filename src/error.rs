//! Error types for the edgequake-ocrprep library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrPrepError`]: **Fatal** for the call that produced it: a missing
//!   source, a bad mode string, a stage that could not run. Returned as
//!   `Err(OcrPrepError)` from every top-level entry point.
//!
//! * [`SourceError`]: **Non-fatal** inside a batch: one source image failed
//!   but the other sources in the same batch are unaffected. Stored inside
//!   [`crate::output::BatchItem`] so callers can inspect partial success.
//!
//! Every fatal error maps onto one coarse [`ErrorKind`], which is what the
//! HTTP layer and the CLI report to users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failure, stable across error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source image does not exist.
    NotFound,
    /// A mode/order string or pipeline name was not recognised.
    InvalidParameter,
    /// The image has the wrong shape for the operation (e.g. channel count).
    InvalidInput,
    /// Codec, filesystem or OCR-engine failure.
    UpstreamFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UpstreamFailure => "upstream_failure",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the edgequake-ocrprep library.
#[derive(Debug, Error)]
pub enum OcrPrepError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source image was not found at the given path.
    #[error("Image not found: '{path}'")]
    NotFound { path: PathBuf },

    /// A parameter value is not one of the accepted values.
    #[error("Invalid {param} '{value}'. Use {expected}.")]
    InvalidParameter {
        param: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The image cannot be processed by this operation as-is.
    #[error("Invalid input for {operation}: {detail}")]
    InvalidInput {
        operation: &'static str,
        detail: String,
    },

    // ── Codec / filesystem errors ─────────────────────────────────────────
    /// The image file exists but could not be decoded.
    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The derived image could not be encoded to its artifact path.
    #[error("Failed to write artifact '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Could not create a stage directory or otherwise touch the filesystem.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A pipeline stage failed; the run was aborted at this stage.
    ///
    /// Artifacts written by earlier stages are left in place.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<OcrPrepError>,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("OCR provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The OCR engine returned an error after all retries.
    #[error("OCR engine '{engine}' failed after {retries} retries: {message}")]
    OcrFailed {
        engine: String,
        retries: u32,
        message: String,
    },

    /// The OCR engine does not implement the requested capability.
    #[error("OCR engine '{engine}' does not support {capability}")]
    Unsupported {
        engine: String,
        capability: &'static str,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrPrepError {
    /// Coarse kind of this error. Stage failures report the kind of the
    /// underlying cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrPrepError::NotFound { .. } => ErrorKind::NotFound,
            OcrPrepError::InvalidParameter { .. } | OcrPrepError::InvalidConfig(_) => {
                ErrorKind::InvalidParameter
            }
            OcrPrepError::InvalidInput { .. } => ErrorKind::InvalidInput,
            OcrPrepError::StageFailed { source, .. } => source.kind(),
            OcrPrepError::Decode { .. }
            | OcrPrepError::Encode { .. }
            | OcrPrepError::Io { .. }
            | OcrPrepError::ProviderNotConfigured { .. }
            | OcrPrepError::OcrFailed { .. }
            | OcrPrepError::Unsupported { .. }
            | OcrPrepError::Internal(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Name of the failing stage, if this error came out of a pipeline run.
    pub fn stage(&self) -> Option<&str> {
        match self {
            OcrPrepError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Wrap `self` as the failure of `stage`.
    pub(crate) fn in_stage(self, stage: impl Into<String>) -> Self {
        OcrPrepError::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }
}

/// A non-fatal error for a single source inside a batch.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{source_path}: {detail}")]
pub struct SourceError {
    pub source_path: PathBuf,
    pub kind: ErrorKind,
    pub stage: Option<String>,
    pub detail: String,
}

impl SourceError {
    pub(crate) fn from_error(source_path: PathBuf, err: &OcrPrepError) -> Self {
        Self {
            source_path,
            kind: err.kind(),
            stage: err.stage().map(str::to_string),
            detail: err.to_string(),
        }
    }
}
