//! An engine that returns canned results.

use super::{OcrEngine, Recognition};
use crate::error::OcrPrepError;
use crate::output::WordBox;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns fixed text and word boxes regardless of the image.
///
/// Counts calls, so tests can assert how often the engine was reached.
#[derive(Debug, Default)]
pub struct ScriptedOcr {
    text: String,
    words: Vec<WordBox>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_words(mut self, words: Vec<WordBox>) -> Self {
        self.words = words;
        self
    }

    /// Number of `recognize` and `recognize_words` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(
        &self,
        _image: &DynamicImage,
        _language: &str,
    ) -> Result<Recognition, OcrPrepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Recognition::text(self.text.clone()))
    }

    async fn recognize_words(
        &self,
        _image: &DynamicImage,
        _language: &str,
    ) -> Result<Vec<WordBox>, OcrPrepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.words.clone())
    }
}
