//! Streaming extraction API: emit documents as they complete.
//!
//! Unlike [`crate::batch::extract_many`], which returns only after every
//! document finishes, [`extract_stream`] yields each document's result as
//! soon as it is ready. Items arrive in completion order; each carries the
//! 0-based index of its input so callers can restore input order.
//!
//! Progress events match the batch API: `on_batch_complete` fires once the
//! last document has been yielded, so it is skipped when the stream is
//! dropped early.

use crate::batch::{run_one, DocumentResult};
use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::resolve_generator;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of `(input_index, result)` pairs.
pub type ExtractionStream = Pin<Box<dyn Stream<Item = (usize, DocumentResult)> + Send>>;

/// Extract every input, streaming results in completion order.
///
/// # Returns
/// - `Ok(ExtractionStream)` — one item per input
/// - `Err(ExtractError)` — no generator could be resolved
///
/// # Example
/// ```rust,no_run
/// use pdf2services::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let inputs = vec!["lhr.pdf".to_string(), "cdg.pdf".to_string()];
/// let mut stream = extract_stream(inputs, &ExtractionConfig::default())?;
/// while let Some((idx, result)) = stream.next().await {
///     match result {
///         Ok(x) => println!("#{idx} {}: {} services", x.source, x.outcome.records().len()),
///         Err(e) => eprintln!("#{idx} failed: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    inputs: Vec<String>,
    config: &ExtractionConfig,
) -> Result<ExtractionStream, ExtractError> {
    let generator = resolve_generator(config)?;
    let total = inputs.len();
    let concurrency = config.concurrency;
    let config = Arc::new(config.clone());
    info!("Streaming {} document(s), concurrency {}", total, concurrency);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let callback = config.progress_callback.clone();
    let succeeded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&succeeded);

    let documents = stream::iter(inputs.into_iter().enumerate().map(move |(idx, input)| {
        let generator = Arc::clone(&generator);
        let config = Arc::clone(&config);
        async move {
            let result = run_one(generator.as_ref(), idx + 1, total, &input, &config).await;
            (idx, result)
        }
    }))
    .buffer_unordered(concurrency)
    .inspect(move |(_, result)| {
        if matches!(result, Ok(extraction) if extraction.is_success()) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let finish = stream::once(async move {
        let succeeded = succeeded.load(Ordering::SeqCst);
        info!("Stream complete: {}/{} document(s) produced services", succeeded, total);
        if let Some(cb) = callback {
            cb.on_batch_complete(total, succeeded);
        }
        None::<(usize, DocumentResult)>
    });

    let s = documents
        .map(Some)
        .chain(finish)
        .filter_map(futures::future::ready);

    Ok(Box::pin(s))
}
