//! # receipt-extract
//!
//! Turn receipts, whether phone photos, scans or PDFs, into plain text, with
//! a verdict on whether that text can be trusted.
//!
//! ## Why this crate?
//!
//! A receipt photo is mostly not receipt: desk, hand, shadow. Feeding the
//! whole frame to OCR wastes time and invites garbage from the background.
//! This crate finds the paper first (edge contours, or a bright-paper scan
//! when the edges are weak), crops it, cleans it up for Tesseract, and then
//! scores the result. When the score is poor, the caller can re-crop by hand
//! and try again without re-decoding anything.
//!
//! PDFs with an embedded text layer skip all of that: their text is read
//! directly through pdfium.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Route       MIME → extension → magic bytes
//!  ├─ 2a. PDF        text layer via pdfium (spawn_blocking)
//!  ├─ 2b. Image      decode → preprocess → locate/crop → OCR
//!  ├─ 3. Normalise   line endings, invisible characters, blank runs
//!  └─ 4. Assess      advisory quality verdict with reasons
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_extract::{extract_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let result = extract_file("kuitti.jpg", &ExtractionConfig::default()).await?;
//!     println!("{}", result.text);
//!     if result.is_low_quality() {
//!         eprintln!("low quality: {}", result.confidence.reasons.join("; "));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Manual re-crop after a poor automatic result:
//!
//! ```rust,no_run
//! use receipt_extract::{CropBounds, ExtractionConfig, Extractor, SourceDocument};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = Extractor::new(ExtractionConfig::default());
//! let doc = SourceDocument::from_path("kuitti.jpg")?;
//! let original = extractor.decode(&doc)?;
//! let bounds = CropBounds::new(120.0, 1650.0, 310.0, 900.0)?;
//! let result = extractor.recrop(&original, bounds)?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `receipt2text` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `tesseract` | off     | Real OCR through libtesseract (`leptess`); needs the system library |
//!
//! Without `tesseract`, image inputs fail with
//! [`ExtractError::OcrEngineUnavailable`] unless the caller supplies its own
//! [`OcrEngine`]. PDF extraction needs only the pdfium shared library.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DecodeConfig, ExtractionConfig, ExtractionConfigBuilder, LocatorConfig, LocatorPrecedence,
    OcrConfig, PreprocessConfig, QualityConfig,
};
pub use document::{ColorSpace, RasterImage, SourceDocument};
pub use error::{CropError, ExtractError, OcrError};
pub use extract::{extract_bytes, extract_file, extract_sync, Extractor, Inspection};
pub use output::{AppliedCrop, CropOrigin, ExtractionResult, QualityVerdict, TextSource};
pub use pipeline::crop::CropBounds;
pub use pipeline::locate::Located;
pub use pipeline::ocr::{EngineCapabilities, OcrEngine, OcrOutput, SharedEngine};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
