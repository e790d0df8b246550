//! Pipeline stages for PDF-to-services extraction.
//!
//! Each submodule implements exactly one step. `postprocess`, `normalize`
//! and `classify` do no I/O.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ document ──▶ llm ──▶ postprocess ──▶ normalize
//! (URL/path)  (mode)    (model)   (fences)       (records)
//!                          │
//!                          └──▶ classify (on call failure)
//! ```
//!
//! 1. [`input`]    — resolve the user-supplied path or URL to PDF bytes
//! 2. [`document`] — prepare the payload for the configured mode; pdfium work
//!    runs in `spawn_blocking`
//! 3. [`llm`]      — drive the model call with timeout and retry/backoff; the
//!    only stage with network I/O besides downloads
//! 4. [`classify`] — map a failed call to `quota_exceeded` / `model_call_failed`
//! 5. [`postprocess`] — strip Markdown fences and wrapping noise from the reply
//! 6. [`normalize`] — parse, shape and complete the reply against the schema

pub mod classify;
pub mod document;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
