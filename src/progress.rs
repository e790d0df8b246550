//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events while [`crate::batch::extract_many`] or
//! [`crate::stream::extract_stream`] works through a set of documents.
//!
//! Callers forward events wherever they like (a terminal progress bar, a
//! channel, a job table) without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because documents are processed
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use pdf2services::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     services: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, doc_num: usize, total: usize, source: &str, services: usize) {
//!         self.services.fetch_add(services, Ordering::SeqCst);
//!         eprintln!("{doc_num}/{total} {source}: {services} services");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { services: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by batch extraction as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `doc_num` is the 1-indexed position of the document
/// in the input list, whatever order documents finish in.
///
/// # Thread safety
///
/// `on_document_start`, `on_document_complete` and `on_document_error` may be
/// called concurrently from different tasks. Implementations must protect
/// shared mutable state (e.g. `Mutex`, `AtomicUsize`).
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any document is read.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before a document is resolved and prepared.
    fn on_document_start(&self, doc_num: usize, total: usize, source: &str) {
        let _ = (doc_num, total, source);
    }

    /// Called when a document produced services.
    ///
    /// # Arguments
    /// * `services` — number of service records extracted
    fn on_document_complete(&self, doc_num: usize, total: usize, source: &str, services: usize) {
        let _ = (doc_num, total, source, services);
    }

    /// Called when a document produced an error record or a fatal error.
    fn on_document_error(&self, doc_num: usize, total: usize, source: &str, error: &str) {
        let _ = (doc_num, total, source, error);
    }

    /// Called once after every document has been attempted.
    ///
    /// * `success_count` — documents that produced services
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
