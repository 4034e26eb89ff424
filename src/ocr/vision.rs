//! Vision-LLM OCR engine.
//!
//! The preprocessed image is PNG-encoded and sent as the only user message,
//! after a system prompt from [`crate::prompts`]. Prompt wording lives there
//! so this module only deals with retries and reply parsing.
//!
//! ## Retries
//!
//! A failed call is reported as `OcrFailed` straight away: `max_retries`
//! defaults to 0. Callers that raise it opt into exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`, saturating): with a 500 ms base and
//! 3 retries the waits are 500 ms, 1 s, 2 s.

use super::encode::encode_image;
use super::{OcrEngine, Recognition};
use crate::config::PrepConfig;
use crate::error::OcrPrepError;
use crate::output::WordBox;
use crate::postprocess::{normalize_reply, strip_code_fences};
use crate::prompts::{language_hint, DEFAULT_OCR_PROMPT, WORD_BOX_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// OCR engine backed by a vision-capable [`LLMProvider`].
#[derive(Clone)]
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    name: String,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

/// Reply text plus accounting from one successful call.
struct Reply {
    content: String,
    prompt_tokens: usize,
    completion_tokens: usize,
    retries: u32,
}

impl VisionOcr {
    /// Engine over `provider` with the sampling and retry settings of `config`.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &PrepConfig) -> Self {
        let label = config
            .model
            .as_deref()
            .or(config.provider_name.as_deref())
            .unwrap_or("auto");
        Self {
            provider,
            name: format!("vision:{label}"),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    fn build_messages(&self, prompt: &str, language: &str, image: ImageData) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(prompt)];
        let hint = language_hint(language);
        if !hint.is_empty() {
            messages.push(ChatMessage::system(hint));
        }
        // The image carries all the content; the text part stays empty.
        messages.push(ChatMessage::user_with_images("", vec![image]));
        messages
    }

    fn encode(&self, image: &DynamicImage) -> Result<ImageData, OcrPrepError> {
        encode_image(image).map_err(|e| OcrPrepError::Internal(format!("PNG encoding failed: {e}")))
    }

    async fn chat_with_retry(&self, messages: &[ChatMessage]) -> Result<Reply, OcrPrepError> {
        let options = self.build_options();
        let start = Instant::now();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.name, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        self.name,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(Reply {
                        content: response.content,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        retries: attempt,
                    });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed — {}", self.name, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(OcrPrepError::OcrFailed {
            engine: self.name.clone(),
            retries: self.max_retries,
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Recognition, OcrPrepError> {
        let prompt = self.system_prompt.as_deref().unwrap_or(DEFAULT_OCR_PROMPT);
        let messages = self.build_messages(prompt, language, self.encode(image)?);
        let reply = self.chat_with_retry(&messages).await?;

        Ok(Recognition {
            text: normalize_reply(&reply.content),
            input_tokens: reply.prompt_tokens,
            output_tokens: reply.completion_tokens,
            retries: reply.retries,
        })
    }

    async fn recognize_words(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<WordBox>, OcrPrepError> {
        let messages = self.build_messages(WORD_BOX_PROMPT, language, self.encode(image)?);
        let reply = self.chat_with_retry(&messages).await?;
        parse_word_boxes(&reply.content).map_err(|detail| OcrPrepError::OcrFailed {
            engine: self.name.clone(),
            retries: reply.retries,
            message: detail,
        })
    }
}

/// Wait before retry `attempt` (1-based). Saturates instead of overflowing.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
}

/// Word box as models actually emit it: coordinates may be floats or
/// negative, confidence may be missing.
#[derive(Deserialize)]
struct LooseWordBox {
    text: String,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    confidence: f64,
}

impl From<LooseWordBox> for WordBox {
    fn from(b: LooseWordBox) -> Self {
        let px = |v: f64| v.max(0.0).round() as u32;
        WordBox {
            text: b.text,
            left: px(b.left),
            top: px(b.top),
            width: px(b.width),
            height: px(b.height),
            confidence: b.confidence.clamp(0.0, 100.0) as f32,
        }
    }
}

/// Parse a JSON array of word boxes, tolerating outer code fences.
fn parse_word_boxes(reply: &str) -> Result<Vec<WordBox>, String> {
    let body = strip_code_fences(reply);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let loose: Vec<LooseWordBox> = serde_json::from_str(&body)
        .map_err(|e| format!("reply is not a JSON array of word boxes: {e}"))?;
    Ok(loose.into_iter().map(WordBox::from).collect())
}
