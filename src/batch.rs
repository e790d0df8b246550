//! Batch extraction: many documents, bounded concurrency, input order kept.
//!
//! One generator is resolved up front and shared by every document, so a
//! missing API key fails the batch once instead of once per file. After that
//! each document stands alone: a fatal error on one input (say, a file that
//! is not a PDF) is reported in its slot and the others carry on.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::{extract_with, resolve_generator};
use crate::output::Extraction;
use crate::pipeline::llm::Generator;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Result for one input of a batch.
pub type DocumentResult = Result<Extraction, ExtractError>;

/// Extract every input, at most `config.concurrency` at a time.
///
/// The returned vector is in input order regardless of completion order.
///
/// # Errors
/// Returns `Err` only when no generator can be resolved; per-document
/// failures live in the vector.
pub async fn extract_many<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<Vec<DocumentResult>, ExtractError> {
    let generator = resolve_generator(config)?;
    let total = inputs.len();
    info!(
        "Extracting {} document(s), concurrency {}",
        total, config.concurrency
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let results: Vec<DocumentResult> = stream::iter(inputs.iter().enumerate().map(|(idx, input)| {
        let generator = Arc::clone(&generator);
        async move { run_one(generator.as_ref(), idx + 1, total, input.as_ref(), config).await }
    }))
    .buffered(config.concurrency)
    .collect()
    .await;

    let succeeded = results
        .iter()
        .filter(|r| matches!(r, Ok(extraction) if extraction.is_success()))
        .count();
    info!("Batch complete: {}/{} document(s) produced services", succeeded, total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }

    Ok(results)
}

/// Extract one document of a batch, firing its progress events.
pub(crate) async fn run_one(
    generator: &dyn Generator,
    doc_num: usize,
    total: usize,
    input: &str,
    config: &ExtractionConfig,
) -> DocumentResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(doc_num, total, input);
    }

    let result = extract_with(generator, input, config).await;

    match &result {
        Ok(extraction) => {
            if let Some(ref cb) = config.progress_callback {
                match extraction.outcome.error() {
                    None => cb.on_document_complete(doc_num, total, input, extraction.outcome.records().len()),
                    Some(e) => cb.on_document_error(doc_num, total, input, &e.to_string()),
                }
            }
        }
        Err(e) => {
            warn!("{}: {}", input, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(doc_num, total, input, &e.to_string());
            }
        }
    }

    result
}
