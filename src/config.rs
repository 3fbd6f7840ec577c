//! Configuration types for receipt extraction.
//!
//! Every threshold the pipeline uses lives in [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`] or deserialised from TOML. The config is
//! handed to each stage explicitly; no stage reads process-wide state, so two
//! runs with two configs can proceed side by side and tests can vary one
//! threshold at a time.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for one extraction request.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use receipt_extract::{ExtractionConfig, LocatorPrecedence};
///
/// let config = ExtractionConfig::builder()
///     .auto_crop(true)
///     .precedence(LocatorPrecedence::WhiteBackgroundFirst)
///     .min_chars(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.quality.min_chars, 30);
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Decoding limits applied before any analysis.
    pub decode: DecodeConfig,

    /// Grayscale / contrast / sharpen toggles and their parameters.
    pub preprocess: PreprocessConfig,

    /// Receipt locator thresholds.
    pub locator: LocatorConfig,

    /// OCR backend settings.
    pub ocr: OcrConfig,

    /// Quality assessor cut-offs.
    pub quality: QualityConfig,

    /// Optional observer for stage events. Not serialised.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("decode", &self.decode)
            .field("preprocess", &self.preprocess)
            .field("locator", &self.locator)
            .field("ocr", &self.ocr)
            .field("quality", &self.quality)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ExtractError> {
        let config: ExtractionConfig =
            toml::from_str(raw).map_err(|e| ExtractError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let l = &self.locator;
        if !(l.min_aspect > 0.0 && l.min_aspect <= l.max_aspect) {
            return Err(ExtractError::InvalidConfig(format!(
                "aspect range must satisfy 0 < min <= max, got {}..{}",
                l.min_aspect, l.max_aspect
            )));
        }
        if !(0.0..1.0).contains(&l.min_area_fraction) {
            return Err(ExtractError::InvalidConfig(format!(
                "min_area_fraction must be in [0, 1), got {}",
                l.min_area_fraction
            )));
        }
        if l.working_dimension < 64 {
            return Err(ExtractError::InvalidConfig(format!(
                "working_dimension must be >= 64, got {}",
                l.working_dimension
            )));
        }
        if self.decode.max_dimension < 64 {
            return Err(ExtractError::InvalidConfig(format!(
                "max_dimension must be >= 64, got {}",
                self.decode.max_dimension
            )));
        }
        if !(0.0..50.0).contains(&self.preprocess.contrast_cutoff_percent) {
            return Err(ExtractError::InvalidConfig(format!(
                "contrast_cutoff_percent must be in [0, 50), got {}",
                self.preprocess.contrast_cutoff_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.quality.min_alnum_ratio)
            || !(0.0..=1.0).contains(&self.quality.min_mean_confidence)
        {
            return Err(ExtractError::InvalidConfig(
                "quality ratios must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

// ── Stage configs ────────────────────────────────────────────────────────

/// Limits applied while decoding image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Longest edge kept after decoding. Default: 2800.
    ///
    /// Tesseract reads best around 300 DPI; a 12 MP phone photo is far above
    /// that and only slows every later stage down. Larger images are scaled
    /// (Lanczos3) so the longest edge equals this value. Crop bounds supplied
    /// by a caller are expressed in this downscaled space.
    pub max_dimension: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { max_dimension: 2800 }
    }
}

/// Image preprocessing for OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Convert to single-channel luminance. Default: true.
    pub grayscale: bool,

    /// Histogram-driven contrast stretch. Default: true.
    pub contrast: bool,

    /// Unsharp-mask sharpening. Default: true.
    pub sharpen: bool,

    /// Percentage of darkest and brightest pixels ignored when picking the
    /// stretch range. Default: 1.0.
    pub contrast_cutoff_percent: f32,

    /// Minimum distance between the low and high cut points. Below this the
    /// image is treated as flat and left untouched. Default: 16.
    pub min_histogram_spread: u8,

    /// Largest share of pixels allowed to end up at pure black or pure white
    /// after stretching. Exceeding it retries without the cutoff. Default: 0.35.
    pub max_saturated_fraction: f32,

    /// Gaussian sigma of the unsharp mask. Default: 1.0.
    pub sharpen_sigma: f32,

    /// Minimum difference before the unsharp mask changes a pixel. Default: 2.
    pub sharpen_threshold: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            contrast: true,
            sharpen: true,
            contrast_cutoff_percent: 1.0,
            min_histogram_spread: 16,
            max_saturated_fraction: 0.35,
            sharpen_sigma: 1.0,
            sharpen_threshold: 2,
        }
    }
}

/// Which locator method wins when both could produce bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorPrecedence {
    /// Contour detection first; the white-background scan only on failure. (default)
    #[default]
    ContourFirst,
    /// White-background scan first; contour detection only on failure.
    WhiteBackgroundFirst,
}

/// Receipt locator thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Run the automatic locator at all. Default: true.
    pub enabled: bool,

    /// Method order. Default: [`LocatorPrecedence::ContourFirst`].
    pub precedence: LocatorPrecedence,

    /// Longest edge of the downscaled analysis copy. Default: 1000.
    pub working_dimension: u32,

    /// Gaussian sigma applied before edge detection. Default: 1.5.
    pub blur_sigma: f32,

    /// Sobel gradient magnitude that counts as an edge. Default: 120.
    pub edge_threshold: u16,

    /// Dilation radius joining broken edge fragments. Default: 2.
    pub edge_dilation: u8,

    /// Smallest accepted height/width ratio. Default: 1.5.
    pub min_aspect: f32,

    /// Largest accepted height/width ratio. Default: 6.5.
    pub max_aspect: f32,

    /// Detections covering less of the frame than this are noise. Default: 0.08.
    pub min_area_fraction: f32,

    /// Contour area divided by its bounding-box area must reach this. Default: 0.6.
    pub min_rectangularity: f32,

    /// Distance in working pixels that counts as touching a border. Default: 2.
    pub border_tolerance: u32,

    /// Lowest intensity accepted as paper in the white-background scan,
    /// regardless of what Otsu suggests. Default: 140.
    pub paper_threshold_floor: u8,

    /// Share of a row/column that must be paper for it to belong to the
    /// receipt. Default: 0.15.
    pub min_paper_fraction: f32,

    /// Pixels added on every side of located bounds. Default: 10.
    pub margin: u32,

    /// Warp a quadrilateral receipt upright instead of cropping its bounding
    /// box. Default: false.
    pub rectify: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            precedence: LocatorPrecedence::default(),
            working_dimension: 1000,
            blur_sigma: 1.5,
            edge_threshold: 120,
            edge_dilation: 2,
            min_aspect: 1.5,
            max_aspect: 6.5,
            min_area_fraction: 0.08,
            min_rectangularity: 0.6,
            border_tolerance: 2,
            paper_threshold_floor: 140,
            min_paper_fraction: 0.15,
            margin: 10,
            rectify: false,
        }
    }
}

/// OCR backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language specs, tried in order. The engine default is used
    /// when none of them load. Default: `["fin+eng", "eng"]`.
    pub languages: Vec<String>,

    /// Directory containing `tessdata`. `None` uses the system location.
    pub data_path: Option<PathBuf>,

    /// Tesseract page segmentation mode. Default: 6 (single uniform block).
    pub page_seg_mode: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["fin+eng".to_string(), "eng".to_string()],
            data_path: None,
            page_seg_mode: 6,
        }
    }
}

/// Quality assessor cut-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Fewer non-whitespace characters than this is low quality. Default: 20.
    pub min_chars: usize,

    /// Alphanumeric share of non-whitespace characters. Default: 0.6.
    pub min_alnum_ratio: f32,

    /// Mean engine confidence (0–1), checked only when reported. Default: 0.6.
    pub min_mean_confidence: f32,

    /// Receipts carry amounts; flag text with no digits. Default: true.
    pub expect_numeric: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_chars: 20,
            min_alnum_ratio: 0.6,
            min_mean_confidence: 0.6,
            expect_numeric: true,
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.decode.max_dimension = px.max(64);
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.preprocess.grayscale = v;
        self
    }

    pub fn contrast(mut self, v: bool) -> Self {
        self.config.preprocess.contrast = v;
        self
    }

    pub fn sharpen(mut self, v: bool) -> Self {
        self.config.preprocess.sharpen = v;
        self
    }

    pub fn contrast_cutoff_percent(mut self, pct: f32) -> Self {
        self.config.preprocess.contrast_cutoff_percent = pct.clamp(0.0, 49.0);
        self
    }

    pub fn auto_crop(mut self, v: bool) -> Self {
        self.config.locator.enabled = v;
        self
    }

    pub fn precedence(mut self, p: LocatorPrecedence) -> Self {
        self.config.locator.precedence = p;
        self
    }

    pub fn aspect_range(mut self, min: f32, max: f32) -> Self {
        self.config.locator.min_aspect = min;
        self.config.locator.max_aspect = max;
        self
    }

    pub fn min_area_fraction(mut self, f: f32) -> Self {
        self.config.locator.min_area_fraction = f.clamp(0.0, 0.99);
        self
    }

    pub fn edge_threshold(mut self, t: u16) -> Self {
        self.config.locator.edge_threshold = t.max(1);
        self
    }

    pub fn margin(mut self, px: u32) -> Self {
        self.config.locator.margin = px;
        self
    }

    pub fn rectify(mut self, v: bool) -> Self {
        self.config.locator.rectify = v;
        self
    }

    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr.languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn tessdata(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocr.data_path = Some(path.into());
        self
    }

    pub fn min_chars(mut self, n: usize) -> Self {
        self.config.quality.min_chars = n;
        self
    }

    pub fn min_alnum_ratio(mut self, r: f32) -> Self {
        self.config.quality.min_alnum_ratio = r.clamp(0.0, 1.0);
        self
    }

    pub fn min_mean_confidence(mut self, c: f32) -> Self {
        self.config.quality.min_mean_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn expect_numeric(mut self, v: bool) -> Self {
        self.config.quality.expect_numeric = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
