//! OCR collaborator boundary.
//!
//! Recognition is delegated to an [`OcrEngine`]. The crate ships a
//! vision-LLM engine ([`vision::VisionOcr`]) and a scripted one
//! ([`scripted::ScriptedOcr`]) for tests and offline runs; callers can plug
//! in anything else through [`crate::config::PrepConfig::ocr_engine`].

pub mod encode;
pub mod scripted;
pub mod vision;

use crate::config::PrepConfig;
use crate::error::OcrPrepError;
use crate::output::WordBox;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Text recognised from one image, plus engine accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    /// Raw engine output. Blank for an image without text.
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Retries spent before the successful attempt.
    pub retries: u32,
}

impl Recognition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An engine that turns an image into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Recognise all text in `image`. `language` is a hint such as `"eng"`.
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Recognition, OcrPrepError>;

    /// Recognise individual words with their bounding boxes.
    async fn recognize_words(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<WordBox>, OcrPrepError> {
        let _ = (image, language);
        Err(OcrPrepError::Unsupported {
            engine: self.name().to_string(),
            capability: "word boxes",
        })
    }
}

/// Pick the engine for `config`.
///
/// An explicit `ocr_engine` wins; otherwise a [`vision::VisionOcr`] is built
/// over the provider found by [`resolve_provider`].
pub async fn resolve_engine(config: &PrepConfig) -> Result<Arc<dyn OcrEngine>, OcrPrepError> {
    if let Some(ref engine) = config.ocr_engine {
        return Ok(Arc::clone(engine));
    }
    let provider = resolve_provider(config).await?;
    let engine = vision::VisionOcr::from_config(provider, config);
    debug!("OCR via {}", engine.name());
    Ok(Arc::new(engine))
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`, `config.model`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **OpenAI key** (`OPENAI_API_KEY`), preferred when several keys exist.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &PrepConfig,
) -> Result<Arc<dyn LLMProvider>, OcrPrepError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrPrepError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No OCR engine configured and no LLM provider could be auto-detected.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, OcrPrepError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrPrepError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
