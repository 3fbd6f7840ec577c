//! Result types handed back to the caller.
//!
//! An [`ExtractionResult`] is built exactly once per pipeline run and is never
//! mutated afterwards. Its `text` is the only artefact meant for a downstream
//! language model; the [`QualityVerdict`] is meant for the presentation layer,
//! which uses it to decide whether to offer manual cropping.

use crate::pipeline::crop::CropBounds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    /// Embedded text layer of a PDF.
    Pdf,
    /// Optical character recognition over an image.
    Ocr,
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSource::Pdf => write!(f, "pdf"),
            TextSource::Ocr => write!(f, "ocr"),
        }
    }
}

/// Structured judgment on whether extracted text is trustworthy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    /// `true` when any heuristic fired.
    pub is_low_quality: bool,
    /// One human-readable line per heuristic that fired, in evaluation order.
    pub reasons: Vec<String>,
    /// Mean character confidence in `[0, 1]`.
    pub mean_char_confidence: f32,
}

/// How the region handed to OCR was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropOrigin {
    /// Edge contours found a receipt-shaped region.
    Contour,
    /// Bright paper was found by scanning inward from each border.
    WhiteBackground,
    /// The caller supplied the bounds.
    Manual,
}

impl fmt::Display for CropOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropOrigin::Contour => write!(f, "contour"),
            CropOrigin::WhiteBackground => write!(f, "white background"),
            CropOrigin::Manual => write!(f, "manual"),
        }
    }
}

/// The crop that was applied before OCR, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCrop {
    /// Bounds in decoded-image pixel space, after clamping.
    pub bounds: CropBounds,
    pub origin: CropOrigin,
    /// `true` when a perspective warp replaced the plain crop.
    pub rectified: bool,
}

/// Final output of one extraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Normalised text. May be empty; never dropped for being short.
    pub text: String,
    pub source: TextSource,
    pub confidence: QualityVerdict,
    /// `None` for PDFs and for images processed in full.
    pub crop: Option<AppliedCrop>,
}

impl ExtractionResult {
    /// Shorthand for `self.confidence.is_low_quality`.
    pub fn is_low_quality(&self) -> bool {
        self.confidence.is_low_quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_lowercase_source() {
        let r = ExtractionResult {
            text: "TOTAL 4.20".into(),
            source: TextSource::Ocr,
            confidence: QualityVerdict::default(),
            crop: None,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains(r#""source":"ocr""#), "got: {json}");
        assert!(json.contains(r#""crop":null"#));
    }

    #[test]
    fn low_quality_shorthand() {
        let r = ExtractionResult {
            text: String::new(),
            source: TextSource::Pdf,
            confidence: QualityVerdict {
                is_low_quality: true,
                reasons: vec!["empty".into()],
                mean_char_confidence: 0.0,
            },
            crop: None,
        };
        assert!(r.is_low_quality());
    }
}
