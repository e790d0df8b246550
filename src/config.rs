//! Configuration types for service extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is constructed once (the CLI
//! maps flags and environment variables onto it at startup) and threaded by
//! reference through every stage; the library itself reads no ambient state.

use crate::error::ExtractError;
use crate::pipeline::llm::Generator;
use crate::progress::ProgressCallback;
use crate::schema::ServiceSchema;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for service extraction.
///
/// # Example
/// ```rust
/// use pdf2services::{DocumentMode, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .mode(DocumentMode::Text)
///     .concurrency(8)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] for named
    /// providers and the provider default otherwise.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed generator. Takes precedence over every provider field.
    pub generator: Option<Arc<dyn Generator>>,

    /// How the document reaches the model. Default: [`DocumentMode::Native`].
    pub mode: DocumentMode,

    /// Record template the replies are normalized against.
    pub schema: Arc<ServiceSchema>,

    /// Sampling temperature, clamped to 0.0–2.0. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 8192.
    ///
    /// Several services with ten tiers each run past 3 000 output tokens.
    pub max_tokens: usize,

    /// Retries per document on a failed call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Documents processed at once by batch extraction. Default: 4.
    pub concurrency: usize,

    /// Pages rasterised in [`DocumentMode::Pages`]. Default: 20.
    pub max_pages: usize,

    /// Longest edge of a rasterised page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit libpdfium path. If None, the system library is used.
    pub pdfium_library: Option<PathBuf>,

    /// Per-document progress events for batch extraction.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            generator: None,
            mode: DocumentMode::default(),
            schema: Arc::new(ServiceSchema::canonical()),
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            system_prompt: None,
            concurrency: 4,
            max_pages: 20,
            max_rendered_pixels: 2000,
            password: None,
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .field("mode", &self.mode)
            .field("schema_version", &self.schema.version)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("max_pages", &self.max_pages)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
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

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn mode(mut self, mode: DocumentMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn schema(mut self, schema: ServiceSchema) -> Self {
        self.config.schema = Arc::new(schema);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
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

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.retry_backoff_ms > 60_000 {
            return Err(ExtractError::InvalidConfig(format!(
                "retry backoff must be ≤ 60000ms, got {}",
                c.retry_backoff_ms
            )));
        }
        c.schema.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the document is handed to the model.
///
/// | Mode | Sent to the model | Needs pdfium | Works for scans |
/// |------|-------------------|--------------|-----------------|
/// | `Native` | the PDF itself (`application/pdf`) | no | yes, if the model reads PDFs |
/// | `Text` | text extracted locally, inside the prompt | yes | no |
/// | `Pages` | each page as a PNG image | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentMode {
    /// Direct multimodal submission. (default)
    #[default]
    Native,
    /// Local text extraction, then a text-only prompt.
    Text,
    /// Local rasterisation, then vision prompting.
    Pages,
}

impl DocumentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentMode::Native => "native",
            DocumentMode::Text => "text",
            DocumentMode::Pages => "pages",
        }
    }
}

impl fmt::Display for DocumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" | "pdf" => Ok(DocumentMode::Native),
            "text" => Ok(DocumentMode::Text),
            "pages" | "images" => Ok(DocumentMode::Pages),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown document mode '{other}' (expected native, text or pages)"
            ))),
        }
    }
}
