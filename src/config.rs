//! Configuration types for preprocessing and recognition.
//!
//! All library behaviour is controlled through [`PrepConfig`], built via its
//! [`PrepConfigBuilder`]. The image root that used to be a hard-coded
//! directory is an ordinary field here, so tests and embedders point the
//! whole artifact tree wherever they like.

use crate::error::OcrPrepError;
use crate::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use crate::store::{ArtifactStore, FsArtifactStore};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default image root, matching the directory the HTTP service mounts.
pub const DEFAULT_IMAGE_ROOT: &str = "/images";

/// Configuration for preprocessing runs and OCR requests.
///
/// Built via [`PrepConfig::builder()`] or using [`PrepConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocrprep::PrepConfig;
///
/// let config = PrepConfig::builder()
///     .image_root("/tmp/images")
///     .language("eng")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PrepConfig {
    /// Root directory holding source images and the per-stage subdirectories.
    /// Default: `/images`.
    pub image_root: PathBuf,

    /// Pre-constructed artifact store. Takes precedence over `image_root`.
    ///
    /// Inject a [`crate::store::MemoryArtifactStore`] to run pipelines
    /// without touching the disk.
    pub store: Option<Arc<dyn ArtifactStore>>,

    /// Language hint handed to the OCR engine. Default: `"eng"`.
    pub language: String,

    /// Pre-constructed OCR engine. Takes precedence over every provider field.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// LLM model identifier used by the vision OCR engine.
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider for the vision OCR engine.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for OCR completions. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the engine may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a failed OCR call. Default: 0, so the first failure
    /// is returned as `OcrFailed`.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom OCR system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Number of sources preprocessed at once in batch mode. Default: 4.
    ///
    /// Only distinct sources run concurrently; stages of one source are
    /// always sequential.
    pub concurrency: usize,

    /// Keyword table used to categorise recognised text.
    pub categories: CategoryTable,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            image_root: PathBuf::from(DEFAULT_IMAGE_ROOT),
            store: None,
            language: "eng".to_string(),
            ocr_engine: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            system_prompt: None,
            concurrency: 4,
            categories: CategoryTable::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PrepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepConfig")
            .field("image_root", &self.image_root)
            .field("store", &self.store.as_ref().map(|_| "<dyn ArtifactStore>"))
            .field("language", &self.language)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|e| e.name().to_string()))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("categories", &self.categories.len())
            .finish()
    }
}

impl PrepConfig {
    /// Create a new builder for `PrepConfig`.
    pub fn builder() -> PrepConfigBuilder {
        PrepConfigBuilder {
            config: Self::default(),
        }
    }

    /// The artifact store this config resolves to.
    pub fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        match self.store {
            Some(ref store) => Arc::clone(store),
            None => Arc::new(FsArtifactStore::new(&self.image_root)),
        }
    }
}

/// Builder for [`PrepConfig`].
pub struct PrepConfigBuilder {
    config: PrepConfig,
}

impl fmt::Debug for PrepConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PrepConfigBuilder {
    pub fn image_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.image_root = root.into();
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.config.store = Some(store);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn categories(mut self, table: CategoryTable) -> Self {
        self.config.categories = table;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PrepConfig, OcrPrepError> {
        let c = &self.config;
        if c.image_root.as_os_str().is_empty() {
            return Err(OcrPrepError::InvalidConfig(
                "Image root must not be empty".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(OcrPrepError::InvalidConfig(
                "Language hint must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(OcrPrepError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Mode enums ───────────────────────────────────────────────────────────

/// Binarisation strategy for the threshold stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Fixed cut-off at the midpoint of the 8-bit range. (default)
    #[default]
    Global,
    /// Gaussian-weighted local mean minus a constant.
    Adaptive,
}

impl ThresholdMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdMode::Global => "global",
            ThresholdMode::Adaptive => "adaptive",
        }
    }
}

impl FromStr for ThresholdMode {
    type Err = OcrPrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ThresholdMode::Global),
            "adaptive" => Ok(ThresholdMode::Adaptive),
            _ => Err(OcrPrepError::InvalidParameter {
                param: "thresholding type",
                value: s.to_string(),
                expected: "'global' or 'adaptive'",
            }),
        }
    }
}

/// Noise-removal filter for the denoise stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenoiseMode {
    /// Rank filter; removes salt-and-pepper noise. (default)
    #[default]
    Median,
    /// Weighted-average blur; smooths.
    Gaussian,
}

impl DenoiseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DenoiseMode::Median => "median",
            DenoiseMode::Gaussian => "gaussian",
        }
    }
}

impl FromStr for DenoiseMode {
    type Err = OcrPrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(DenoiseMode::Median),
            "gaussian" => Ok(DenoiseMode::Gaussian),
            _ => Err(OcrPrepError::InvalidParameter {
                param: "noise removal type",
                value: s.to_string(),
                expected: "'median' or 'gaussian'",
            }),
        }
    }
}

/// Operation order for the morphology stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphologyOrder {
    /// Dilation then erosion; fills small holes. (default)
    #[default]
    Close,
    /// Erosion then dilation; removes small specks.
    Open,
}

impl MorphologyOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            MorphologyOrder::Close => "close",
            MorphologyOrder::Open => "open",
        }
    }
}

impl FromStr for MorphologyOrder {
    type Err = OcrPrepError;

    /// Accepts `close`/`open` and the numeric aliases `1`/`2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" | "1" => Ok(MorphologyOrder::Close),
            "open" | "2" => Ok(MorphologyOrder::Open),
            _ => Err(OcrPrepError::InvalidParameter {
                param: "morphology order",
                value: s.to_string(),
                expected: "'close' (1) or 'open' (2)",
            }),
        }
    }
}

// ── Keyword table ────────────────────────────────────────────────────────

/// Ordered `(category, keywords)` pairs used by
/// [`crate::postprocess::categorize`].
///
/// Keyword order matters: the first keyword of a category found in the text
/// is the one recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable {
    entries: Vec<(String, Vec<String>)>,
}

impl CategoryTable {
    /// Build a table from ordered entries. Keywords are stored lower-case.
    pub fn new<C, K>(entries: impl IntoIterator<Item = (C, Vec<K>)>) -> Self
    where
        C: Into<String>,
        K: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(category, keywords)| {
                    (
                        category.into(),
                        keywords
                            .into_iter()
                            .map(|k| k.into().to_lowercase())
                            .collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(c, k)| (c.as_str(), k.as_slice()))
    }

    /// Whether `keyword` is listed under `category`.
    pub fn contains(&self, category: &str, keyword: &str) -> bool {
        self.entries
            .iter()
            .any(|(c, k)| c == category && k.iter().any(|kw| kw == keyword))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CategoryTable {
    /// Movie-metadata keywords, in the order they are searched.
    fn default() -> Self {
        Self::new([
            ("genre", vec!["action", "thriller", "comedy", "drama"]),
            ("director", vec!["director", "directed by"]),
            ("runtime", vec!["runtime", "minutes"]),
            ("title", vec!["title", "movie", "film"]),
            ("release_year", vec!["release", "year", "released"]),
            ("rating", vec!["rating", "rated"]),
            ("cast", vec!["cast", "starring", "featuring"]),
            ("plot", vec!["plot", "synopsis", "summary"]),
        ])
    }
}
