//! Model interaction: the [`Generator`] seam, the provider-backed
//! implementation, and the retry/timeout loop around it.
//!
//! Prompt text lives in [`crate::prompts`], reply interpretation in
//! [`crate::pipeline::normalize`].
//!
//! ## Retry Strategy
//!
//! Exponential backoff (`retry_backoff_ms * 2^attempt`): with 500 ms base and
//! 2 retries the wait sequence is 500 ms → 1 s. A single wait never exceeds
//! [`MAX_BACKOFF_MS`]. Any failure is retried; only the *last* one is
//! classified.

use crate::config::ExtractionConfig;
use crate::pipeline::classify::{classify_failure, CallFailure};
use crate::record::ErrorRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Upper bound for one backoff wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// A binary document part sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 (standard alphabet) payload.
    pub data_base64: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: data_base64.into(),
        }
    }
}

/// Everything one generation call needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The textual reply of a successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The upstream text-generation collaborator.
///
/// Implementations must be `Send + Sync`: batch extraction calls the same
/// generator from several tasks at once.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, CallFailure>;

    /// Short name for logs and stats.
    fn name(&self) -> &str {
        "generator"
    }
}

/// [`Generator`] backed by an `edgequake-llm` provider.
pub struct ProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Generator for ProviderGenerator {
    /// ## Message Layout
    ///
    /// 1. **System message** — extraction rules
    /// 2. **User message** — the extraction prompt (schema template, and the
    ///    document text in text mode) with the document parts attached
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, CallFailure> {
        let images: Vec<ImageData> = request
            .attachments
            .iter()
            .map(|a| {
                let data = ImageData::new(a.data_base64.clone(), a.mime_type.as_str());
                if a.mime_type.starts_with("image/") {
                    data.with_detail("high")
                } else {
                    data
                }
            })
            .collect();

        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user_with_images(request.prompt.as_str(), images),
        ];

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CallFailure::from_message(e.to_string()))?;

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A successful call plus how many retries it took.
#[derive(Debug, Clone)]
pub struct Attempted {
    pub generation: Generation,
    pub retries: u32,
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating
/// at [`MAX_BACKOFF_MS`].
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Run one generation with per-attempt timeout and exponential backoff.
///
/// On success returns the reply and the retry count. When every attempt
/// fails, the last failure is classified into an [`ErrorRecord`] together
/// with the number of retries spent.
pub async fn generate_with_retry(
    generator: &dyn Generator,
    request: &GenerationRequest,
    config: &ExtractionConfig,
) -> Result<Attempted, (ErrorRecord, u32)> {
    let mut last_failure: Option<CallFailure> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                generator.name(),
                attempt,
                config.max_retries,
                backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = generator.generate(request);
        let outcome = match timeout(Duration::from_secs(config.api_timeout_secs), call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallFailure::timeout(config.api_timeout_secs)),
        };

        match outcome {
            Ok(generation) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {} reply bytes",
                    generator.name(),
                    generation.input_tokens,
                    generation.output_tokens,
                    generation.text.len()
                );
                return Ok(Attempted {
                    generation,
                    retries: attempt,
                });
            }
            Err(failure) => {
                warn!(
                    "{}: attempt {} failed: {}",
                    generator.name(),
                    attempt + 1,
                    failure
                );
                last_failure = Some(failure);
            }
        }
    }

    let failure =
        last_failure.unwrap_or_else(|| CallFailure::from_message("model call failed without a reply"));
    Err((classify_failure(&failure), config.max_retries))
}
