//! Format routing: decide whether a source takes the PDF or the image path.
//!
//! A declared MIME type (`application/pdf`, `image/*`) is checked first, as
//! uploads carry one. Without a usable MIME type the filename extension
//! decides, then the leading magic bytes, so an upload called `scan` or
//! `IMG_0042.dat` still routes correctly. Only when all three fail is the
//! source rejected, and the error names the extension that was refused.

use crate::document::SourceDocument;
use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Image extensions accepted by the router.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif"];

/// Document extensions accepted by the router.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// The two processing paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "pdf"),
            DocumentKind::Image => write!(f, "image"),
        }
    }
}

/// Map an extension (without dot, any case) to a kind.
pub fn kind_for_extension(ext: &str) -> Option<DocumentKind> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        Some(DocumentKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

/// Map a declared MIME type to a kind.
pub fn kind_for_mime(mime: &str) -> Option<DocumentKind> {
    let mime = mime.trim().to_ascii_lowercase();
    if mime == "application/pdf" {
        Some(DocumentKind::Pdf)
    } else if mime.starts_with("image/") {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

/// Identify a kind from the first bytes of the content.
pub fn sniff(bytes: &[u8]) -> Option<DocumentKind> {
    const PDF: &[u8] = b"%PDF";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG: &[u8] = b"\xff\xd8\xff";
    const GIF: &[u8] = b"GIF8";
    const BMP: &[u8] = b"BM";
    const TIFF_LE: &[u8] = b"II*\x00";
    const TIFF_BE: &[u8] = b"MM\x00*";

    if bytes.starts_with(PDF) {
        Some(DocumentKind::Pdf)
    } else if [PNG, JPEG, GIF, BMP, TIFF_LE, TIFF_BE]
        .iter()
        .any(|magic| bytes.starts_with(magic))
    {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

/// Route a source document to the PDF or image path.
///
/// # Errors
/// [`ExtractError::UnsupportedFormat`] naming the rejected extension (or
/// `"<none>"` when the name has no extension).
pub fn route(doc: &SourceDocument) -> Result<DocumentKind, ExtractError> {
    let ext = doc.extension();

    let kind = doc
        .mime_type()
        .and_then(kind_for_mime)
        .or_else(|| ext.as_deref().and_then(kind_for_extension))
        .or_else(|| sniff(doc.bytes()));

    match kind {
        Some(kind) => {
            debug!("Routed '{}' → {}", doc.name(), kind);
            Ok(kind)
        }
        None => Err(ExtractError::UnsupportedFormat {
            extension: ext.unwrap_or_else(|| "<none>".to_string()),
        }),
    }
}
