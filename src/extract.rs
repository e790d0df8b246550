//! Single-document extraction entry points.
//!
//! Failures come in two layers. Anything that stops the document from being
//! submitted at all (unreadable input, not a PDF, pdfium missing for the
//! chosen mode, no provider) is a fatal `Err(ExtractError)`. Anything that
//! goes wrong once the model is involved is data: the returned
//! [`Extraction`] carries an [`Outcome::Error`] with a typed
//! [`crate::record::ErrorRecord`].

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::ExtractError;
use crate::output::{write_json_atomic, Extraction, ExtractionStats, Outcome};
use crate::pipeline::document::{prepare_document, PreparedDocument};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::{generate_with_retry, Generator, GenerationRequest, ProviderGenerator};
use crate::pipeline::normalize::ResponseNormalizer;
use crate::prompts::{extraction_prompt, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract services from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Extraction configuration
///
/// # Returns
/// `Ok(Extraction)` whenever the model was reached, including when its reply
/// was unusable (check `extraction.outcome`).
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors:
/// - File not found / permission denied / download failed
/// - Not a valid PDF, or pdfium cannot open it in text/pages mode
/// - No LLM provider could be configured
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let generator = resolve_generator(config)?;
    extract_with(generator.as_ref(), input_str.as_ref(), config).await
}

/// Extract services from PDF bytes already in memory.
///
/// `name` is only used for logs and [`Extraction::source`].
///
/// # Example
/// ```rust,no_run
/// use pdf2services::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("rates.pdf")?;
/// let extraction = extract_from_bytes(bytes, "rates.pdf", &ExtractionConfig::default()).await?;
/// println!("{}", extraction.to_json_pretty()?);
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    bytes: impl Into<Vec<u8>>,
    name: impl Into<String>,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let start = Instant::now();
    let generator = resolve_generator(config)?;
    let resolved = input::from_bytes(bytes.into(), name)?;
    extract_resolved(generator.as_ref(), resolved, start, config).await
}

/// Extract and write the consumer payload to `output_path` atomically.
///
/// The file holds the record array on success and the error object on
/// failure, exactly what [`Extraction::to_json_pretty`] renders.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let extraction = extract(input_str, config).await?;
    write_json_atomic(output_path.as_ref(), &extraction.to_json_pretty()?)?;
    Ok(extraction)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Run the model on an already prepared document and normalize its reply.
///
/// Never fails: call failures and unusable replies end up in
/// [`Extraction::outcome`]. `stats.prepare_ms` is left at zero.
pub async fn extract_document(
    generator: &dyn Generator,
    document: &PreparedDocument,
    config: &ExtractionConfig,
) -> Extraction {
    let request = build_request(document, config);
    let llm_start = Instant::now();

    let mut stats = ExtractionStats {
        mode: document.mode,
        page_count: document.page_count,
        ..Default::default()
    };

    let outcome = match generate_with_retry(generator, &request, config).await {
        Ok(attempted) => {
            stats.retries = attempted.retries;
            stats.input_tokens = attempted.generation.input_tokens;
            stats.output_tokens = attempted.generation.output_tokens;
            let normalizer = ResponseNormalizer::new(Arc::clone(&config.schema));
            Outcome::from(normalizer.normalize(&attempted.generation.text))
        }
        Err((record, retries)) => {
            stats.retries = retries;
            Outcome::Error(record)
        }
    };

    stats.llm_ms = llm_start.elapsed().as_millis() as u64;
    stats.total_ms = stats.llm_ms;

    match &outcome {
        Outcome::Services(records) => info!(
            "{}: {} service(s) in {}ms",
            document.source,
            records.len(),
            stats.llm_ms
        ),
        Outcome::Error(e) => warn!("{}: {}", document.source, e),
    }

    Extraction {
        source: document.source.clone(),
        outcome,
        stats,
    }
}

/// The prompt, system prompt and attachments for one document.
pub fn build_request(document: &PreparedDocument, config: &ExtractionConfig) -> GenerationRequest {
    GenerationRequest {
        system_prompt: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        prompt: extraction_prompt(&config.schema, document.text.as_deref()),
        attachments: document.attachments.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Resolve the generator, from most-specific to least-specific.
///
/// 1. **Pre-built generator** (`config.generator`), used as-is. This is the
///    seam tests and custom transports plug into.
/// 2. **Pre-built provider** (`config.provider`), wrapped in a
///    [`ProviderGenerator`].
/// 3. **Named provider** (`config.provider_name`) with `config.model`, or
///    [`DEFAULT_MODEL`]. The provider crate reads its own API key variable.
/// 4. **Auto-detection** via [`ProviderFactory::from_env`], which picks the
///    first provider whose API key is set.
pub fn resolve_generator(config: &ExtractionConfig) -> Result<Arc<dyn Generator>, ExtractError> {
    if let Some(ref generator) = config.generator {
        return Ok(Arc::clone(generator));
    }

    if let Some(ref provider) = config.provider {
        let name = config.model.as_deref().unwrap_or("provider");
        return Ok(Arc::new(ProviderGenerator::new(Arc::clone(provider), name)));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderGenerator::new(provider, format!("{name}/{model}"))));
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(ProviderGenerator::new(provider, "auto")))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve, prepare and extract one input with a known generator.
pub(crate) async fn extract_with(
    generator: &dyn Generator,
    input_str: &str,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let start = Instant::now();
    info!("Starting extraction: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    extract_resolved(generator, resolved, start, config).await
}

async fn extract_resolved(
    generator: &dyn Generator,
    resolved: ResolvedInput,
    start: Instant,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let document = prepare_document(resolved, config).await?;
    let prepare_ms = start.elapsed().as_millis() as u64;
    debug!(
        "{}: prepared in {}ms ({} mode, {} attachment(s))",
        document.source,
        prepare_ms,
        document.mode,
        document.attachments.len()
    );

    let mut extraction = extract_document(generator, &document, config).await;
    extraction.stats.prepare_ms = prepare_ms;
    extraction.stats.total_ms = start.elapsed().as_millis() as u64;
    Ok(extraction)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentMode;
    use crate::pipeline::classify::CallFailure;
    use crate::pipeline::llm::Generation;
    use crate::record::ErrorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes a fixed reply and remembers the last request.
    struct Canned {
        reply: Result<String, CallFailure>,
        seen: Mutex<Option<GenerationRequest>>,
    }

    impl Canned {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Generator for Canned {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, CallFailure> {
            *self.seen.lock().unwrap() = Some(request.clone());
            self.reply.clone().map(|text| Generation {
                text,
                input_tokens: 100,
                output_tokens: 20,
            })
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(0)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn text_document_reaches_prompt() {
        let generator = Canned::ok(r#"[{"service_name": "VIP Arrival"}]"#);
        let doc = PreparedDocument::from_text("lhr.pdf", "VIP Arrival 475 EUR");
        let extraction = extract_document(&generator, &doc, &config()).await;

        assert!(extraction.is_success());
        assert_eq!(extraction.outcome.records()[0].service_name(), Some("VIP Arrival"));
        assert_eq!(extraction.stats.mode, DocumentMode::Text);
        assert_eq!(extraction.stats.input_tokens, 100);

        let seen = generator.seen.lock().unwrap().clone().unwrap();
        assert!(seen.prompt.contains("VIP Arrival 475 EUR"));
        assert!(seen.attachments.is_empty());
        assert_eq!(seen.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn call_failure_becomes_error_outcome() {
        let generator = Canned {
            reply: Err(CallFailure::new(Some(429), "quota")),
            seen: Mutex::new(None),
        };
        let doc = PreparedDocument::from_text("x.pdf", "text");
        let extraction = extract_document(&generator, &doc, &config()).await;
        assert_eq!(extraction.outcome.error().unwrap().kind, ErrorKind::QuotaExceeded);
    }

    #[test]
    fn custom_system_prompt_is_used() {
        let cfg = ExtractionConfig::builder().system_prompt("be brief").build().unwrap();
        let request = build_request(&PreparedDocument::from_text("x", "y"), &cfg);
        assert_eq!(request.system_prompt, "be brief");
        assert_eq!(request.temperature, 0.1);
    }

    #[test]
    fn configured_generator_wins() {
        let generator: Arc<dyn Generator> = Arc::new(Canned::ok("[]"));
        let cfg = ExtractionConfig::builder()
            .generator(Arc::clone(&generator))
            .provider_name("does-not-exist")
            .build()
            .unwrap();
        let resolved = resolve_generator(&cfg).unwrap();
        assert!(Arc::ptr_eq(&resolved, &generator));
    }
}
