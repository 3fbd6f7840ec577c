//! PDF text extraction via pdfium.
//!
//! Only the embedded text layer is read; pages are never rasterised. A PDF
//! made of scanned images therefore yields an empty string, which the
//! quality assessor flags, rather than an error.
//!
//! ## Binding
//!
//! pdfium is a shared library loaded at runtime. [`bind_pdfium`] tries, in
//! order: `PDFIUM_LIB_PATH` (a file or a directory), the working directory,
//! then the system search path. Failure surfaces as
//! [`ExtractError::PdfEngineUnavailable`] so image requests are unaffected.
//!
//! ## Threading
//!
//! pdfium keeps thread-local state and its calls block, so the async entry
//! point moves the work onto `spawn_blocking`.

use crate::document::SourceDocument;
use crate::error::ExtractError;
use crate::pipeline::postprocess::normalise_text;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Separator placed between the text of consecutive non-empty pages.
pub const PAGE_SEPARATOR: &str = "\n";

/// Bind to a pdfium library.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let mut attempts = Vec::new();

    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        let path = Path::new(&p);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(path)
        } else {
            path.to_path_buf()
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from PDFIUM_LIB_PATH ({})", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => attempts.push(format!("{}: {e:?}", lib.display())),
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => attempts.push(format!("{}: {e:?}", local.display())),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            attempts.push(format!("system library: {e:?}"));
            Err(ExtractError::PdfEngineUnavailable(attempts.join("; ")))
        }
    }
}

/// Extract the embedded text of every page, in physical page order.
///
/// Pages with no text are skipped; the remaining pages are joined with
/// [`PAGE_SEPARATOR`]. A PDF with no text at all yields `""`.
///
/// # Errors
/// * [`ExtractError::EmptySource`] for zero bytes.
/// * [`ExtractError::CorruptSource`] when the bytes are not a loadable PDF.
/// * [`ExtractError::PdfEngineUnavailable`] when pdfium cannot be bound.
pub fn extract_pdf_text(doc: &SourceDocument) -> Result<String, ExtractError> {
    if doc.is_empty() {
        return Err(ExtractError::EmptySource {
            name: doc.name().to_string(),
        });
    }
    // Checked before binding so a bogus upload is reported as such even on
    // hosts without pdfium.
    check_magic(doc)?;

    let pdfium = bind_pdfium()?;
    let corrupt = |detail: String| ExtractError::CorruptSource {
        name: doc.name().to_string(),
        detail,
    };

    let document = pdfium
        .load_pdf_from_byte_slice(doc.bytes(), None)
        .map_err(|e| corrupt(format!("{e:?}")))?;

    let pages = document.pages();
    info!("PDF '{}' loaded: {} pages", doc.name(), pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| corrupt(format!("page {}: {e:?}", idx + 1)))?
            .all();
        debug!("Page {} → {} raw chars", idx + 1, text.chars().count());
        texts.push(text);
    }

    Ok(join_page_texts(texts))
}

/// Normalise each page's text, drop pages left empty, and join the rest in
/// page order with [`PAGE_SEPARATOR`].
pub fn join_page_texts<I>(pages: I) -> String
where
    I: IntoIterator<Item = String>,
{
    pages
        .into_iter()
        .map(|page| normalise_text(&page))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Async wrapper running [`extract_pdf_text`] on the blocking pool.
pub async fn extract_pdf_text_async(doc: SourceDocument) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_pdf_text(&doc))
        .await
        .map_err(|e| ExtractError::Internal(format!("PDF task panicked: {}", e)))?
}

fn check_magic(doc: &SourceDocument) -> Result<(), ExtractError> {
    // The header may be preceded by a little junk; readers accept it within
    // the first 1 KiB.
    let head = &doc.bytes()[..doc.bytes().len().min(1024)];
    if head.windows(4).any(|w| w == b"%PDF") {
        Ok(())
    } else {
        Err(ExtractError::CorruptSource {
            name: doc.name().to_string(),
            detail: "missing %PDF header".to_string(),
        })
    }
}
