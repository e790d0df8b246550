//! Document preparation: turn PDF bytes into what the model is sent, per
//! [`DocumentMode`].
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Text extraction and rasterisation therefore run on
//! tokio's blocking pool so worker threads keep serving other documents in a
//! batch.
//!
//! Native mode never touches pdfium: the bytes are base64-encoded and sent as
//! an `application/pdf` part. A missing libpdfium only matters for the text
//! and pages modes.

use crate::config::{DocumentMode, ExtractionConfig};
use crate::error::ExtractError;
use crate::pipeline::input::ResolvedInput;
use crate::pipeline::llm::Attachment;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// MIME type of a native PDF part.
pub const PDF_MIME: &str = "application/pdf";
/// MIME type of a rasterised page.
pub const PNG_MIME: &str = "image/png";

/// A document ready to be put in front of the model.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Display name of the source (path, URL file name, or caller-supplied).
    pub source: String,
    pub mode: DocumentMode,
    /// Binary parts: the PDF itself, or one PNG per page.
    pub attachments: Vec<Attachment>,
    /// Locally extracted text (text mode only).
    pub text: Option<String>,
    /// Pages in the PDF, when pdfium opened it.
    pub page_count: Option<usize>,
}

impl PreparedDocument {
    /// A document whose text is already known, e.g. produced by another
    /// extractor. Nothing is attached.
    pub fn from_text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: DocumentMode::Text,
            attachments: Vec::new(),
            text: Some(text.into()),
            page_count: None,
        }
    }
}

/// Prepare a resolved input according to `config.mode`.
pub async fn prepare_document(
    input: ResolvedInput,
    config: &ExtractionConfig,
) -> Result<PreparedDocument, ExtractError> {
    let mode = config.mode;
    if mode == DocumentMode::Native {
        debug!("{}: sending {} PDF bytes natively", input.name, input.bytes.len());
        return Ok(PreparedDocument {
            attachments: vec![Attachment::new(PDF_MIME, STANDARD.encode(&input.bytes))],
            source: input.name,
            mode,
            text: None,
            page_count: None,
        });
    }

    let job = PdfiumJob {
        library: config.pdfium_library.clone(),
        password: config.password.clone(),
        max_pages: config.max_pages,
        max_pixels: config.max_rendered_pixels,
    };

    tokio::task::spawn_blocking(move || job.run(input, mode))
        .await
        .map_err(|e| ExtractError::Internal(format!("pdfium task panicked: {e}")))?
}

/// Everything the blocking pdfium work needs, detached from the config.
struct PdfiumJob {
    library: Option<PathBuf>,
    password: Option<String>,
    max_pages: usize,
    max_pixels: u32,
}

impl PdfiumJob {
    fn run(self, input: ResolvedInput, mode: DocumentMode) -> Result<PreparedDocument, ExtractError> {
        let pdfium = bind_pdfium(self.library.as_deref())?;
        let document = pdfium
            .load_pdf_from_byte_slice(&input.bytes, self.password.as_deref())
            .map_err(|e| load_error(e, &input.name, self.password.is_some()))?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        info!("{}: PDF loaded, {} pages", input.name, page_count);

        let mut prepared = PreparedDocument {
            source: input.name.clone(),
            mode,
            attachments: Vec::new(),
            text: None,
            page_count: Some(page_count),
        };

        if mode == DocumentMode::Text {
            prepared.text = Some(page_text(&pages, &input.name)?);
        } else {
            prepared.attachments = self.render_pages(&pages, &input.name)?;
        }

        Ok(prepared)
    }

    fn render_pages(&self, pages: &PdfPages, name: &str) -> Result<Vec<Attachment>, ExtractError> {
        let page_count = pages.len() as usize;
        let selected = page_count.min(self.max_pages);
        if selected < page_count {
            warn!("{}: rendering first {} of {} pages", name, selected, page_count);
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut attachments = Vec::with_capacity(selected);
        for idx in 0..selected {
            let raster_err = |e: PdfiumError| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            };
            let page = pages.get(idx as u16).map_err(raster_err)?;
            let bitmap = page.render_with_config(&render_config).map_err(raster_err)?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            let data = encode_png(&image).map_err(|e| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("PNG encoding failed: {e}"),
            })?;
            attachments.push(Attachment::new(PNG_MIME, data));
        }
        Ok(attachments)
    }
}

/// Text of every page, joined with page markers.
fn page_text(pages: &PdfPages, name: &str) -> Result<String, ExtractError> {
    let page_count = pages.len() as usize;
    let mut sections = Vec::with_capacity(page_count);
    for idx in 0..page_count {
        let page = pages.get(idx as u16).map_err(|e| ExtractError::CorruptPdf {
            source_name: name.to_string(),
            detail: format!("page {}: {e:?}", idx + 1),
        })?;
        let text = page.text().map(|t| t.all()).unwrap_or_else(|e| {
            warn!("{}: no text layer on page {}: {e:?}", name, idx + 1);
            String::new()
        });
        sections.push((idx + 1, text));
    }

    let joined = join_pages(&sections);
    if joined.is_empty() {
        return Err(ExtractError::NoExtractableText {
            source_name: name.to_string(),
        });
    }
    debug!("{}: extracted {} chars of text", name, joined.len());
    Ok(joined)
}

fn bind_pdfium(library: Option<&std::path::Path>) -> Result<Pdfium, ExtractError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| {
        let location = library
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "system library".to_string());
        ExtractError::PdfiumBindingFailed(format!("{location}: {e:?}"))
    })?;
    Ok(Pdfium::new(bindings))
}

fn load_error(e: PdfiumError, source_name: &str, had_password: bool) -> ExtractError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            ExtractError::WrongPassword {
                source_name: source_name.to_string(),
            }
        } else {
            ExtractError::PasswordRequired {
                source_name: source_name.to_string(),
            }
        }
    } else {
        ExtractError::CorruptPdf {
            source_name: source_name.to_string(),
            detail,
        }
    }
}

/// Join per-page text with page markers, skipping blank pages. Empty when
/// every page is blank.
fn join_pages(pages: &[(usize, String)]) -> String {
    pages
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(num, text)| format!("--- page {num} ---\n{}", text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Encode a rasterised page as base64 PNG (lossless, small print stays legible).
fn encode_png(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(STANDARD.encode(&buf))
}
