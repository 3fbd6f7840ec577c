//! Error types for the receipt-extract library.
//!
//! Three error types reflect three layers of failure:
//!
//! * [`ExtractError`] is **fatal**: no [`crate::output::ExtractionResult`] can
//!   be produced (unsupported format, undecodable bytes, missing OCR engine).
//!   Returned as `Err(ExtractError)` from every public `extract*` function.
//!
//! * [`CropError`]: a [`crate::pipeline::crop::CropBounds`] describes an
//!   empty or inverted region. Raised before any pixel is touched.
//!
//! * [`OcrError`]: raised by an [`crate::pipeline::ocr::OcrEngine`]
//!   implementation and mapped onto [`ExtractError`] at the orchestrator.
//!
//! Low-quality text is deliberately absent from all three. It is a signal
//! carried by [`crate::output::QualityVerdict`], never an error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the receipt-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The extension (or sniffed content) is neither a PDF nor a supported image.
    #[error(
        "Unsupported format '{extension}'\n\
Supported: .pdf, .jpg, .jpeg, .png, .gif, .bmp, .tiff"
    )]
    UnsupportedFormat { extension: String },

    /// The source contained zero bytes.
    #[error("Source '{name}' is empty")]
    EmptySource { name: String },

    /// The bytes could not be decoded as the format they claim to be.
    #[error("Source '{name}' is corrupt or unreadable: {detail}")]
    CorruptSource { name: String, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No OCR backend could be initialised. Only image inputs are affected.
    #[error(
        "OCR engine unavailable: {0}\n\
Build with `--features tesseract` and install libtesseract + the language data."
    )]
    OcrEngineUnavailable(String),

    /// The OCR engine initialised but failed while recognising.
    #[error("OCR failed: {0}")]
    OcrFailed(String),

    /// Could not bind to a pdfium library. Only PDF inputs are affected.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), place the\n\
library in the working directory, or install it on the system search path.\n"
    )]
    PdfEngineUnavailable(String),

    // ── Caller errors ─────────────────────────────────────────────────────
    /// Caller-supplied crop bounds were rejected.
    #[error("Invalid crop bounds: {0}")]
    InvalidCrop(#[from] CropError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OcrError> for ExtractError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::Unavailable(detail) => ExtractError::OcrEngineUnavailable(detail),
            OcrError::Engine(detail) => ExtractError::OcrFailed(detail),
            OcrError::Encode(detail) => {
                ExtractError::Internal(format!("could not encode image for OCR: {detail}"))
            }
        }
    }
}

/// Which dimension of a crop region is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Vertical => write!(f, "top/bottom"),
            Axis::Horizontal => write!(f, "left/right"),
        }
    }
}

/// Validation failure for a crop region.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CropError {
    /// `start >= end` on one axis: the region is empty or inverted.
    #[error("{axis} bounds are empty or inverted ({start} >= {end})")]
    Inverted { axis: Axis, start: f64, end: f64 },

    /// A bound is NaN or infinite.
    #[error("{axis} bounds are not finite numbers")]
    NotFinite { axis: Axis },

    /// After clamping to the image the region has no pixels left.
    #[error("region lies outside the {width}x{height} image")]
    OutsideImage { width: u32, height: u32 },
}

/// Failure reported by an OCR backend.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The backend cannot run at all (library or language data missing).
    #[error("{0}")]
    Unavailable(String),

    /// The backend started but recognition failed.
    #[error("{0}")]
    Engine(String),

    /// The image could not be handed to the backend.
    #[error("{0}")]
    Encode(String),
}
