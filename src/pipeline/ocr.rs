//! OCR engine adapter.
//!
//! Callers hold an `Arc<dyn OcrEngine>` and never a concrete backend. Three
//! implementations ship with the crate:
//!
//! * [`TesseractEngine`]: libtesseract through `leptess`, behind the
//!   `tesseract` feature.
//! * [`FixedTextEngine`]: returns preset text. For tests and for callers
//!   that already have the text from elsewhere.
//! * [`UnavailableEngine`]: always fails with [`OcrError::Unavailable`]. It
//!   is what [`default_engine`] hands out when no backend could start, so
//!   the PDF path keeps working on hosts without Tesseract.

use crate::config::OcrConfig;
use crate::document::RasterImage;
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Raw recognition result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Recognised text, unnormalised.
    pub text: String,
    /// Per-token confidences in `[0, 1]`, when the engine reports them.
    pub token_confidences: Option<Vec<f32>>,
}

impl OcrOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_confidences: None,
        }
    }

    pub fn with_confidences(mut self, confidences: Vec<f32>) -> Self {
        self.token_confidences = Some(confidences);
        self
    }

    /// Mean of the reported confidences; `None` when none were reported.
    pub fn mean_confidence(&self) -> Option<f32> {
        self.token_confidences
            .as_deref()
            .and_then(crate::pipeline::quality::mean_confidence)
    }
}

/// What a backend can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Short backend name, e.g. `"tesseract"`.
    pub name: String,
    /// Language spec the backend is running with.
    pub languages: Vec<String>,
    pub reports_confidence: bool,
    /// `false` for [`UnavailableEngine`].
    pub available: bool,
}

/// A text-recognition backend.
///
/// Implementations must be safe to share between threads; independent
/// requests may call [`OcrEngine::recognize_text`] concurrently.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text in `image`.
    fn recognize_text(&self, image: &RasterImage) -> Result<OcrOutput, OcrError>;

    fn describe_capabilities(&self) -> EngineCapabilities;
}

/// Shared engine handle.
pub type SharedEngine = Arc<dyn OcrEngine>;

/// The best engine this build can offer for `config`.
///
/// Never fails: when no backend starts, the returned engine reports the
/// reason on first use.
pub fn default_engine(config: &OcrConfig) -> SharedEngine {
    match start_backend(config) {
        Ok(engine) => engine,
        Err(e) => {
            warn!("OCR backend unavailable: {e}");
            Arc::new(UnavailableEngine::new(e.to_string()))
        }
    }
}

#[cfg(feature = "tesseract")]
fn start_backend(config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    Ok(Arc::new(TesseractEngine::new(config)?))
}

#[cfg(not(feature = "tesseract"))]
fn start_backend(_config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    Err(OcrError::Unavailable(
        "this build has no OCR backend (enable the `tesseract` feature)".into(),
    ))
}

// ── Fixed text ───────────────────────────────────────────────────────────────

/// Returns preset text regardless of the image.
#[derive(Debug, Clone)]
pub struct FixedTextEngine {
    output: OcrOutput,
}

impl FixedTextEngine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            output: OcrOutput::new(text),
        }
    }

    pub fn with_confidences(mut self, confidences: Vec<f32>) -> Self {
        self.output.token_confidences = Some(confidences);
        self
    }
}

impl OcrEngine for FixedTextEngine {
    fn recognize_text(&self, _image: &RasterImage) -> Result<OcrOutput, OcrError> {
        Ok(self.output.clone())
    }

    fn describe_capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "fixed".into(),
            languages: Vec::new(),
            reports_confidence: self.output.token_confidences.is_some(),
            available: true,
        }
    }
}

// ── Unavailable ──────────────────────────────────────────────────────────────

/// Stand-in used when no backend could be initialised.
#[derive(Debug, Clone)]
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableEngine {
    fn recognize_text(&self, _image: &RasterImage) -> Result<OcrOutput, OcrError> {
        Err(OcrError::Unavailable(self.reason.clone()))
    }

    fn describe_capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "unavailable".into(),
            languages: Vec::new(),
            reports_confidence: false,
            available: false,
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

#[cfg(feature = "tesseract")]
pub use tesseract_backend::TesseractEngine;

#[cfg(feature = "tesseract")]
mod tesseract_backend {
    use super::{EngineCapabilities, OcrEngine, OcrOutput};
    use crate::config::OcrConfig;
    use crate::document::RasterImage;
    use crate::error::OcrError;
    use leptess::{LepTess, Variable};
    use once_cell::sync::Lazy;
    use regex::Regex;
    use tracing::{debug, info};

    static RE_WORD_CONF: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"class='ocrx_word'[^>]*x_wconf (\d+)").unwrap());

    /// libtesseract backend.
    ///
    /// `LepTess` handles are not `Sync`, so one is created per call. Language
    /// data is probed once, at construction.
    #[derive(Debug, Clone)]
    pub struct TesseractEngine {
        data_path: Option<String>,
        language: String,
        page_seg_mode: u8,
    }

    impl TesseractEngine {
        /// Probe `config.languages` in order and keep the first that loads.
        /// An empty spec (Tesseract's built-in default) is the last resort.
        pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
            let data_path = config
                .data_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());

            let mut failures = Vec::new();
            let candidates = config
                .languages
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(""));
            for lang in candidates {
                match LepTess::new(data_path.as_deref(), lang) {
                    Ok(_) => {
                        let shown = if lang.is_empty() { "<default>" } else { lang };
                        info!("Tesseract initialised with language '{shown}'");
                        return Ok(Self {
                            data_path,
                            language: lang.to_string(),
                            page_seg_mode: config.page_seg_mode,
                        });
                    }
                    Err(e) => {
                        debug!("Tesseract language '{lang}' failed: {e}");
                        failures.push(format!("'{lang}': {e}"));
                    }
                }
            }
            Err(OcrError::Unavailable(format!(
                "no Tesseract language data could be loaded ({})",
                failures.join(", ")
            )))
        }
    }

    impl OcrEngine for TesseractEngine {
        fn recognize_text(&self, image: &RasterImage) -> Result<OcrOutput, OcrError> {
            let png = image
                .to_png_bytes()
                .map_err(|e| OcrError::Encode(e.to_string()))?;

            let mut lt = LepTess::new(self.data_path.as_deref(), &self.language)
                .map_err(|e| OcrError::Unavailable(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &self.page_seg_mode.to_string())
                .map_err(|e| OcrError::Engine(format!("cannot set page segmentation: {e}")))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Encode(e.to_string()))?;
            lt.set_source_resolution(300);

            let text = lt
                .get_utf8_text()
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            let mut confidences: Vec<f32> = lt
                .get_hocr_text(0)
                .map(|hocr| {
                    RE_WORD_CONF
                        .captures_iter(&hocr)
                        .filter_map(|c| c[1].parse::<f32>().ok())
                        .map(|c| (c / 100.0).clamp(0.0, 1.0))
                        .collect()
                })
                .unwrap_or_default();
            if confidences.is_empty() && !text.trim().is_empty() {
                confidences.push((lt.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0));
            }
            debug!(
                "Tesseract: {} chars, {} word confidences",
                text.len(),
                confidences.len()
            );

            Ok(OcrOutput {
                text,
                token_confidences: Some(confidences),
            })
        }

        fn describe_capabilities(&self) -> EngineCapabilities {
            EngineCapabilities {
                name: "tesseract".into(),
                languages: vec![self.language.clone()],
                reports_confidence: true,
                available: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn blank() -> RasterImage {
        RasterImage::gray(GrayImage::from_pixel(4, 4, Luma([255])))
    }

    #[test]
    fn fixed_engine_returns_preset_text() {
        let e = FixedTextEngine::new("K-MARKET\nYHTEENSÄ 12,40");
        let out = e.recognize_text(&blank()).unwrap();
        assert_eq!(out.text, "K-MARKET\nYHTEENSÄ 12,40");
        assert_eq!(out.mean_confidence(), None);
        assert!(!e.describe_capabilities().reports_confidence);
    }

    #[test]
    fn mean_confidence_averages_tokens() {
        let out = OcrOutput::new("a b").with_confidences(vec![0.5, 1.0]);
        assert_eq!(out.mean_confidence(), Some(0.75));
        assert_eq!(OcrOutput::new("").with_confidences(vec![]).mean_confidence(), None);
    }

    #[test]
    fn unavailable_engine_is_distinct_from_empty_text() {
        let e = UnavailableEngine::new("libtesseract missing");
        match e.recognize_text(&blank()) {
            Err(OcrError::Unavailable(reason)) => assert_eq!(reason, "libtesseract missing"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!e.describe_capabilities().available);

        let empty = FixedTextEngine::new("").recognize_text(&blank()).unwrap();
        assert_eq!(empty.text, "");
    }

    #[test]
    fn engines_are_usable_as_trait_objects() {
        let engines: Vec<SharedEngine> = vec![
            Arc::new(FixedTextEngine::new("x")),
            Arc::new(UnavailableEngine::new("n/a")),
        ];
        let names: Vec<_> = engines
            .iter()
            .map(|e| e.describe_capabilities().name)
            .collect();
        assert_eq!(names, ["fixed", "unavailable"]);
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn default_engine_without_backend_is_unavailable() {
        let e = default_engine(&OcrConfig::default());
        assert!(matches!(
            e.recognize_text(&blank()),
            Err(OcrError::Unavailable(_))
        ));
    }
}
