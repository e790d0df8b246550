//! Error types for the pdf2services library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the document could not even be submitted
//!   (file missing, not a PDF, no provider configured, bad schema file).
//!   Returned as `Err(ExtractError)` from the `extract*` entry points.
//!
//! * [`crate::record::ErrorRecord`] — **Request-level**: the document was
//!   submitted but the model call failed, hit a quota, or replied with
//!   something that is not the expected JSON. Returned as data inside
//!   [`crate::output::Extraction`] so consumers can branch on its `kind`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2services library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read but are not a PDF.
    #[error("'{source_name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("PDF '{source_name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { source_name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{source_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { source_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{source_name}'")]
    WrongPassword { source_name: String },

    /// Text mode found nothing to send (typically a scanned document).
    #[error("No extractable text in '{source_name}'\nScanned documents need --mode native or --mode pages.")]
    NoExtractableText { source_name: String },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text and pages modes need libpdfium. Either:\n\
  • install it system-wide, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib), or\n\
  • use --mode native, which sends the PDF to the model as-is.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A schema file failed to parse or validate.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display() {
        let e = ExtractError::NotAPdf {
            source_name: "notes.txt".into(),
            magic: b"hell".to_vec(),
        };
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ExtractError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "GEMINI_API_KEY is not set".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gemini"), "got: {msg}");
        assert!(msg.contains("GEMINI_API_KEY"), "got: {msg}");
    }

    #[test]
    fn no_text_display_suggests_modes() {
        let e = ExtractError::NoExtractableText {
            source_name: "scan.pdf".into(),
        };
        assert!(e.to_string().contains("--mode native"));
    }

    #[test]
    fn output_write_keeps_source() {
        use std::error::Error as _;
        let e = ExtractError::OutputWriteFailed {
            path: "/tmp/out.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("disk full"));
    }
}
