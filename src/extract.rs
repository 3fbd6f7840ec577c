//! Extraction entry points and the pipeline orchestrator.
//!
//! One request walks a fixed state machine:
//!
//! ```text
//! Start ─▶ Route ─┬─ pdf ───▶ PdfExtract ─────────────────────────────────┬─▶ Assess ─▶ Done
//!                 └─ image ─▶ Decode ─▶ Preprocess ─▶ Locate/Crop ─▶ Ocr ─┘
//! ```
//!
//! There is no automatic retry loop. When the verdict says the text is poor,
//! the caller may pick new bounds and call [`Extractor::recrop`] with the
//! decoded original; that re-enters at Preprocess and yields a fresh result.
//!
//! The orchestrator is synchronous: every stage is CPU-bound and feeds the
//! next. The async entry points move the whole run onto `spawn_blocking`.

use crate::config::ExtractionConfig;
use crate::document::{RasterImage, SourceDocument};
use crate::error::ExtractError;
use crate::output::{AppliedCrop, CropOrigin, ExtractionResult, TextSource};
use crate::pipeline::crop::{apply_crop, CropBounds};
use crate::pipeline::locate::{locate_receipt, Located};
use crate::pipeline::ocr::{default_engine, SharedEngine};
use crate::pipeline::route::{route, DocumentKind};
use crate::pipeline::{decode, pdf, postprocess, preprocess, quality, rectify};
use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`Extractor::inspect_image`]: where the locator would crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    /// Decoded (possibly downscaled) width; crop bounds use this space.
    pub width: u32,
    pub height: u32,
    pub located: Option<Located>,
}

/// Runs extraction requests with one configuration and one OCR engine.
///
/// Cheap to clone; clones share the engine. Holds no per-request state, so
/// one extractor may serve concurrent requests from several threads.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    engine: SharedEngine,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("engine", &self.engine.describe_capabilities().name)
            .finish()
    }
}

impl Extractor {
    /// Extractor using the best OCR backend this build offers.
    pub fn new(config: ExtractionConfig) -> Self {
        let engine = default_engine(&config.ocr);
        Self { config, engine }
    }

    /// Extractor using a caller-supplied engine.
    pub fn with_engine(config: ExtractionConfig, engine: SharedEngine) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    // ── Public operations ────────────────────────────────────────────────

    /// Extract text from a document, locating the receipt automatically.
    ///
    /// # Errors
    /// Only fatal conditions: unsupported format, corrupt or empty source,
    /// PDF or OCR engine unavailable. Poor text is reported in the result's
    /// verdict, never as an error.
    pub fn extract(&self, doc: &SourceDocument) -> Result<ExtractionResult, ExtractError> {
        self.run(doc, None)
    }

    /// Extract text using caller-supplied crop bounds instead of the locator.
    ///
    /// Bounds are in decoded-image pixels (see [`Inspection::width`]). They
    /// do not apply to PDFs and are ignored there.
    pub fn extract_with_crop(
        &self,
        doc: &SourceDocument,
        bounds: CropBounds,
    ) -> Result<ExtractionResult, ExtractError> {
        self.run(doc, Some(bounds))
    }

    /// Route and decode an image source, returning the raster that
    /// [`Extractor::recrop`] expects.
    ///
    /// # Errors
    /// [`ExtractError::UnsupportedFormat`] naming `pdf` for PDFs, which have
    /// no raster to crop.
    pub fn decode(&self, doc: &SourceDocument) -> Result<RasterImage, ExtractError> {
        match self.stage(Stage::Route, || route(doc))? {
            DocumentKind::Image => self.stage(Stage::Decode, || {
                decode::decode_image(doc, &self.config.decode)
            }),
            DocumentKind::Pdf => Err(ExtractError::UnsupportedFormat {
                extension: "pdf".to_string(),
            }),
        }
    }

    /// Re-run OCR on a previously decoded image with new bounds.
    ///
    /// Depends on nothing but its arguments, so a UI can call it as often as
    /// the user moves a slider.
    pub fn recrop(
        &self,
        original: &RasterImage,
        bounds: CropBounds,
    ) -> Result<ExtractionResult, ExtractError> {
        info!(
            "Re-cropping {}x{} image to {:?}",
            original.width(),
            original.height(),
            bounds
        );
        self.process_image(original, Some(bounds))
    }

    /// Decode an image and run only the locator.
    pub fn inspect_image(&self, doc: &SourceDocument) -> Result<Inspection, ExtractError> {
        let image = self.decode(doc)?;
        let located = self.stage(Stage::Locate, || {
            Ok(locate_receipt(&image, &self.config.locator))
        })?;
        Ok(Inspection {
            width: image.width(),
            height: image.height(),
            located,
        })
    }

    /// [`Extractor::extract`] on the blocking thread pool.
    pub async fn extract_async(&self, doc: SourceDocument) -> Result<ExtractionResult, ExtractError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.extract(&doc))
            .await
            .map_err(|e| ExtractError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    /// [`Extractor::extract_with_crop`] on the blocking thread pool.
    pub async fn extract_with_crop_async(
        &self,
        doc: SourceDocument,
        bounds: CropBounds,
    ) -> Result<ExtractionResult, ExtractError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.extract_with_crop(&doc, bounds))
            .await
            .map_err(|e| ExtractError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    // ── Orchestration ────────────────────────────────────────────────────

    fn run(
        &self,
        doc: &SourceDocument,
        manual: Option<CropBounds>,
    ) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();
        info!("Starting extraction: {} ({} bytes)", doc.name(), doc.bytes().len());

        let kind = self.stage(Stage::Route, || route(doc))?;
        let result = match kind {
            DocumentKind::Pdf => {
                if manual.is_some() {
                    warn!("Crop bounds ignored for PDF '{}'", doc.name());
                }
                self.process_pdf(doc)?
            }
            DocumentKind::Image => {
                let image = self.stage(Stage::Decode, || {
                    decode::decode_image(doc, &self.config.decode)
                })?;
                self.process_image(&image, manual)?
            }
        };

        info!(
            "Extraction complete: {} via {}, {} chars, low_quality={}, {}ms",
            doc.name(),
            result.source,
            result.text.chars().count(),
            result.is_low_quality(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    fn process_pdf(&self, doc: &SourceDocument) -> Result<ExtractionResult, ExtractError> {
        let text = self.stage(Stage::PdfExtract, || pdf::extract_pdf_text(doc))?;
        self.finish(text, None, TextSource::Pdf, None)
    }

    fn process_image(
        &self,
        original: &RasterImage,
        manual: Option<CropBounds>,
    ) -> Result<ExtractionResult, ExtractError> {
        // Manual bounds are checked before any pixel work.
        if let Some(b) = &manual {
            b.validate()?;
        }

        let prepared = self.stage(Stage::Preprocess, || {
            Ok(preprocess::preprocess(original, &self.config.preprocess))
        })?;

        let (region, crop) = match manual {
            Some(bounds) => self.stage(Stage::Crop, || {
                let region = apply_crop(&prepared, &bounds)?;
                let applied = AppliedCrop {
                    bounds: clamped(&bounds, &prepared)?,
                    origin: CropOrigin::Manual,
                    rectified: false,
                };
                Ok((region, Some(applied)))
            })?,
            None if self.config.locator.enabled => {
                let located = self.stage(Stage::Locate, || {
                    Ok(locate_receipt(original, &self.config.locator))
                })?;
                match located {
                    Some(located) => {
                        self.stage(Stage::Crop, || self.crop_located(&prepared, &located))?
                    }
                    None => (prepared, None),
                }
            }
            None => (prepared, None),
        };

        debug!("OCR region {}x{}", region.width(), region.height());
        let output = self.stage(Stage::Ocr, || Ok(self.engine.recognize_text(&region)?))?;
        if let Some(mean) = output.mean_confidence() {
            debug!("OCR mean token confidence {:.2}", mean);
        }
        let text = postprocess::normalise_text(&output.text);

        self.finish(text, output.token_confidences.as_deref(), TextSource::Ocr, crop)
    }

    fn crop_located(
        &self,
        prepared: &RasterImage,
        located: &Located,
    ) -> Result<(RasterImage, Option<AppliedCrop>), ExtractError> {
        if self.config.locator.rectify {
            if let Some(corners) = &located.corners {
                if let Some(warped) = rectify::rectify(prepared, corners) {
                    let applied = AppliedCrop {
                        bounds: clamped(&located.bounds, prepared)?,
                        origin: located.origin,
                        rectified: true,
                    };
                    return Ok((warped, Some(applied)));
                }
            }
        }
        let region = apply_crop(prepared, &located.bounds)?;
        let applied = AppliedCrop {
            bounds: clamped(&located.bounds, prepared)?,
            origin: located.origin,
            rectified: false,
        };
        Ok((region, Some(applied)))
    }

    fn finish(
        &self,
        text: String,
        confidences: Option<&[f32]>,
        source: TextSource,
        crop: Option<AppliedCrop>,
    ) -> Result<ExtractionResult, ExtractError> {
        let verdict = self.stage(Stage::Assess, || {
            Ok(quality::assess(&text, confidences, &self.config.quality))
        })?;

        if verdict.is_low_quality {
            warn!("Low-quality extraction: {}", verdict.reasons.join("; "));
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_extraction_complete(&verdict);
        }

        Ok(ExtractionResult {
            text,
            source,
            confidence: verdict,
            crop,
        })
    }

    /// Run one stage, reporting it to the progress callback.
    fn stage<T>(
        &self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, ExtractError>,
    ) -> Result<T, ExtractError> {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        let out = f()?;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!("Stage '{}' finished in {}ms", stage, elapsed);
        if let Some(cb) = cb {
            cb.on_stage_complete(stage, elapsed);
        }
        Ok(out)
    }
}

/// The pixel rectangle actually cut from `image`, as bounds.
fn clamped(bounds: &CropBounds, image: &RasterImage) -> Result<CropBounds, ExtractError> {
    let (x, y, w, h) = bounds.to_pixel_rect(image.width(), image.height())?;
    Ok(CropBounds::new(
        f64::from(y),
        f64::from(y + h),
        f64::from(x),
        f64::from(x + w),
    )?)
}

// ── Convenience functions ────────────────────────────────────────────────────

/// Extract text from a file on disk.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use receipt_extract::{extract_file, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let result = extract_file("kuitti.jpg", &ExtractionConfig::default()).await?;
/// if result.is_low_quality() {
///     eprintln!("consider cropping: {:?}", result.confidence.reasons);
/// }
/// println!("{}", result.text);
/// # Ok(())
/// # }
/// ```
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let doc = SourceDocument::from_path_async(path).await?;
    Extractor::new(config.clone()).extract_async(doc).await
}

/// Extract text from in-memory bytes. `name` supplies the extension used
/// for routing.
pub async fn extract_bytes(
    name: impl Into<String>,
    bytes: impl Into<Arc<[u8]>>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let doc = SourceDocument::new(name, bytes);
    Extractor::new(config.clone()).extract_async(doc).await
}

/// Blocking variant of [`extract_file`] for callers without a runtime.
pub fn extract_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let doc = SourceDocument::from_path(path)?;
    Extractor::new(config.clone()).extract(&doc)
}
