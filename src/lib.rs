//! # pdf2services
//!
//! Extract structured airport-service records (VIP meet & assist, fast track,
//! transfers) from PDF price lists using generative language models.
//!
//! The model does the reading; this crate makes its answer trustworthy. Every
//! reply, however it is wrapped or whatever it omits, comes back as exactly
//! one of:
//!
//! * a non-empty list of [`ServiceRecord`]s in which every schema key is
//!   present and `pricing` has every passenger tier, or
//! * one [`ErrorRecord`] whose `kind` is `model_call_failed`,
//!   `quota_exceeded` or `invalid_json`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Document   native PDF part | pdfium text | pdfium page PNGs
//!  ├─ 3. Model      gemini / openai / anthropic / … with timeout + retry
//!  ├─ 4. Normalize  strip fences → parse → shape → complete against schema
//!  └─ 5. Output     records or error record + per-document stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2services::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let config = ExtractionConfig::default();
//!     let extraction = extract("rates.pdf", &config).await?;
//!     println!("{}", extraction.to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! Normalizing a reply obtained elsewhere needs no runtime at all:
//!
//! ```rust
//! let records = pdf2services::normalize("```json\n{\"service_name\": \"VIP\"}\n```").unwrap();
//! assert_eq!(records[0].service_name(), Some("VIP"));
//! assert_eq!(records[0].pricing().len(), 10);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2services` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2services = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{extract_many, DocumentResult};
pub use config::{DocumentMode, ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MODEL};
pub use error::ExtractError;
pub use extract::{
    build_request, extract, extract_document, extract_from_bytes, extract_sync, extract_to_file,
    resolve_generator,
};
pub use output::{write_json_atomic, Extraction, ExtractionStats, Outcome};
pub use pipeline::classify::{classify_failure, CallFailure};
pub use pipeline::document::PreparedDocument;
pub use pipeline::llm::{Attachment, Generation, GenerationRequest, Generator, ProviderGenerator};
pub use pipeline::normalize::{normalize, ResponseNormalizer};
pub use pipeline::postprocess::strip_code_fences;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{ErrorKind, ErrorRecord, ServiceRecord, TierPrice};
pub use schema::{FieldKind, FieldSpec, PricingSpec, ServiceSchema};
pub use stream::{extract_stream, ExtractionStream};
