//! End-to-end integration tests for receipt-extract.
//!
//! Most tests drive the full pipeline with synthetic receipts and an in-test
//! OCR engine whose output depends on the pixels it is handed, so the whole
//! decode → preprocess → locate → OCR → assess chain is exercised without
//! system libraries.
//!
//! Tests that need real engines (pdfium, libtesseract) and real receipts in
//! `./test_cases/` are gated behind the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --features tesseract --test e2e -- --nocapture

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;
use imageproc::rect::Rect;
use receipt_extract::{
    extract_file, CropBounds, CropOrigin, EngineCapabilities, ExtractError, ExtractionConfig,
    Extractor, OcrEngine, OcrError, OcrOutput, RasterImage, SourceDocument, TextSource,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Route library logs to the test output; `RUST_LOG` overrides the default.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("receipt_extract=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

const CLEAN_TEXT: &str = "K-CITYMARKET TAMPERE\n\
    Y-tunnus 1234567-8\n\
    MAITO 1L          1,29\n\
    RUISLEIPÄ         2,49\n\
    BANAANI 0,812 KG  1,62\n\
    YHTEENSÄ          5,40\n\
    KORTTI            5,40";

/// OCR stand-in: clean text when the region holds the sharp ink edges of
/// print in focus, punctuation soup with low confidence otherwise.
///
/// Keyed on the 99th-percentile Sobel magnitude: a contrast stretch restores
/// range but not edge sharpness, so a blurred photo stays unreadable after
/// preprocessing.
#[derive(Default)]
struct PixelStatsEngine {
    seen: Mutex<Vec<(u32, u32)>>,
}

impl PixelStatsEngine {
    const MIN_EDGE: u16 = 480;

    fn last_region(&self) -> Option<(u32, u32)> {
        self.seen.lock().unwrap().last().copied()
    }
}

impl OcrEngine for PixelStatsEngine {
    fn recognize_text(&self, image: &RasterImage) -> Result<OcrOutput, OcrError> {
        self.seen
            .lock()
            .unwrap()
            .push((image.width(), image.height()));

        let mut edges: Vec<u16> = sobel_gradients(&image.to_luma8())
            .pixels()
            .map(|p| p[0])
            .collect();
        edges.sort_unstable();
        let p99 = edges[edges.len() * 99 / 100];

        if p99 >= Self::MIN_EDGE {
            Ok(OcrOutput::new(CLEAN_TEXT).with_confidences(vec![0.92, 0.88, 0.95, 0.9]))
        } else {
            Ok(OcrOutput::new(" ~;. ,:' -_ ^ ..\n\n\n :;\n").with_confidences(vec![0.21, 0.34]))
        }
    }

    fn describe_capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "pixel-stats".into(),
            languages: vec![],
            reports_confidence: true,
            available: true,
        }
    }
}

fn extractor_with(engine: Arc<PixelStatsEngine>, config: ExtractionConfig) -> Extractor {
    Extractor::with_engine(config, engine)
}

/// Paper rectangle of the synthetic photo: (x, y, w, h).
const PAPER: (u32, u32, u32, u32) = (150, 100, 300, 700);

fn paper_bounds() -> CropBounds {
    let (x, y, w, h) = PAPER;
    CropBounds::new(y as f64, (y + h) as f64, x as f64, (x + w) as f64).unwrap()
}

/// A receipt on a dark desk, with bars of "print".
fn clean_receipt_photo() -> RgbImage {
    let (x, y, w, h) = PAPER;
    let mut img = RgbImage::from_pixel(600, 900, Rgb([55, 48, 42]));
    draw_filled_rect_mut(&mut img, Rect::at(x as i32, y as i32).of_size(w, h), Rgb([236, 234, 228]));
    for line in 0..15u32 {
        let len = 140 + (line * 37) % 110;
        draw_filled_rect_mut(
            &mut img,
            Rect::at(x as i32 + 30, (y + 40 + line * 42) as i32).of_size(len, 12),
            Rgb([28, 28, 30]),
        );
    }
    img
}

/// The same receipt faded into gray levels 120..160 and out of focus.
fn blurred_faded_photo() -> GrayImage {
    let mut img = DynamicImage::ImageRgb8(clean_receipt_photo()).to_luma8();
    img.pixels_mut()
        .for_each(|p| p[0] = 120 + (u16::from(p[0]) * 40 / 255) as u8);
    gaussian_blur_f32(&img, 3.0)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), format)
        .expect("encode fixture");
    buf
}

// ── Image path ───────────────────────────────────────────────────────────────

#[test]
fn test_clean_photo_is_cropped_and_trusted() {
    let engine = Arc::new(PixelStatsEngine::default());
    let ex = extractor_with(engine.clone(), ExtractionConfig::default());
    let doc = SourceDocument::new(
        "IMG_0412.jpg",
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Jpeg),
    );

    let result = ex.extract(&doc).expect("extraction should succeed");

    assert_eq!(result.source, TextSource::Ocr);
    assert!(
        !result.is_low_quality(),
        "unexpected reasons: {:?}",
        result.confidence.reasons
    );
    assert!(result.text.contains("YHTEENSÄ"));

    let crop = result.crop.expect("receipt should be located");
    assert_eq!(crop.origin, CropOrigin::Contour);
    let iou = crop.bounds.iou(&paper_bounds());
    assert!(iou > 0.8, "IoU {iou:.3} for {:?}", crop.bounds);

    let (w, h) = engine.last_region().unwrap();
    assert!(w < 600 && h < 900, "OCR saw the whole frame: {w}x{h}");
    println!("✓ crop {:?} (IoU {iou:.3}), OCR region {w}x{h}", crop.bounds);
}

#[test]
fn test_blurred_low_contrast_photo_is_flagged_not_dropped() {
    let engine = Arc::new(PixelStatsEngine::default());
    let ex = extractor_with(engine, ExtractionConfig::default());
    let doc = SourceDocument::new(
        "faded.png",
        encode(DynamicImage::ImageLuma8(blurred_faded_photo()), ImageFormat::Png),
    );

    let result = ex.extract(&doc).expect("low quality is not an error");

    assert!(result.is_low_quality());
    assert!(!result.confidence.reasons.is_empty());
    assert!(result.confidence.mean_char_confidence < 0.5);
    // Poor text is still returned, normalised.
    assert!(!result.text.is_empty());
    assert!(!result.text.contains("\n\n\n"));
    println!("✓ reasons: {:?}", result.confidence.reasons);
}

#[test]
fn test_recrop_does_not_rescue_out_of_focus_photo() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new(
        "faded.png",
        encode(DynamicImage::ImageLuma8(blurred_faded_photo()), ImageFormat::Png),
    );
    let original = ex.decode(&doc).unwrap();

    let result = ex.recrop(&original, paper_bounds()).unwrap();

    assert_eq!(result.crop.as_ref().map(|c| c.origin), Some(CropOrigin::Manual));
    assert!(result.is_low_quality());
    assert!(result.confidence.reasons.iter().any(|r| r.contains("confidence")));
}

#[test]
fn test_manual_recrop_recovers_missed_receipt() {
    // Locator switched off: the first pass OCRs the whole frame.
    let config = ExtractionConfig::builder().auto_crop(false).build().unwrap();
    let engine = Arc::new(PixelStatsEngine::default());
    let ex = extractor_with(engine.clone(), config);
    let doc = SourceDocument::new(
        "IMG_0413.png",
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png),
    );

    let first = ex.extract(&doc).unwrap();
    assert!(first.crop.is_none());
    assert_eq!(engine.last_region(), Some((600, 900)));

    let original = ex.decode(&doc).unwrap();
    let second = ex.recrop(&original, paper_bounds()).unwrap();
    assert!(!second.is_low_quality(), "{:?}", second.confidence.reasons);
    let crop = second.crop.unwrap();
    assert_eq!(crop.origin, CropOrigin::Manual);
    assert_eq!(crop.bounds, paper_bounds());
    assert_eq!(engine.last_region(), Some((300, 700)));
}

#[test]
fn test_recrop_with_inverted_bounds_is_rejected() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let original = RasterImage::rgb(clean_receipt_photo());
    let bad = CropBounds {
        top: 800.0,
        bottom: 100.0,
        left: 150.0,
        right: 450.0,
    };
    let err = ex.recrop(&original, bad).unwrap_err();
    assert!(matches!(err, ExtractError::InvalidCrop(_)), "got {err:?}");
}

#[test]
fn test_recrop_outside_image_is_rejected() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let original = RasterImage::rgb(clean_receipt_photo());
    let off = CropBounds::new(950.0, 1200.0, 0.0, 100.0).unwrap();
    assert!(matches!(
        ex.recrop(&original, off),
        Err(ExtractError::InvalidCrop(_))
    ));
}

#[test]
fn test_extensionless_upload_is_sniffed() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new(
        "upload",
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png),
    );
    let result = ex.extract(&doc).unwrap();
    assert_eq!(result.source, TextSource::Ocr);
}

#[test]
fn test_locate_only_suggests_bounds() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new(
        "IMG_0414.png",
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png),
    );
    let ins = ex.inspect_image(&doc).unwrap();
    assert_eq!((ins.width, ins.height), (600, 900));
    let located = ins.located.expect("receipt should be found");
    assert!(located.bounds.iou(&paper_bounds()) > 0.8);
}

#[test]
fn test_result_is_json_serialisable() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new(
        "IMG_0415.png",
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png),
    );
    let result = ex.extract(&doc).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["source"], "ocr");
    assert!(json["confidence"]["reasons"].as_array().unwrap().is_empty());
    assert!(json["crop"]["bounds"]["top"].as_f64().is_some());
}

#[tokio::test]
async fn test_extractor_shared_between_tasks() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let bytes: Arc<[u8]> =
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png).into();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let ex = ex.clone();
            let doc = SourceDocument::new(format!("r{i}.png"), bytes.clone());
            tokio::spawn(async move { ex.extract_async(doc).await })
        })
        .collect();

    let mut texts = Vec::new();
    for h in handles {
        texts.push(h.await.unwrap().unwrap().text);
    }
    assert!(texts.windows(2).all(|w| w[0] == w[1]));
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[test]
fn test_corrupt_pdf_is_reported_as_corrupt() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new("lasku.pdf", b"this is not a pdf at all".to_vec());
    let err = ex.extract(&doc).unwrap_err();
    assert!(matches!(err, ExtractError::CorruptSource { .. }), "got {err:?}");
}

#[test]
fn test_corrupt_image_is_reported_as_corrupt() {
    let ex = extractor_with(Arc::new(PixelStatsEngine::default()), ExtractionConfig::default());
    let doc = SourceDocument::new("kuitti.jpg", vec![0xFF, 0xD8, 0xFF, 0x00, 0x01, 0x02]);
    assert!(matches!(
        ex.extract(&doc),
        Err(ExtractError::CorruptSource { .. })
    ));
}

#[tokio::test]
async fn test_unsupported_extension_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("receipt.docx");
    std::fs::write(&path, b"PK\x03\x04 not a receipt").unwrap();

    let err = extract_file(&path, &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExtractError::UnsupportedFormat { ref extension } if extension == "docx"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_missing_file() {
    let err = extract_file("/definitely/not/a/real/kuitti.jpg", &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_empty_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.png");
    std::fs::write(&path, b"").unwrap();
    let err = extract_file(&path, &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::EmptySource { .. }), "got {err:?}");
}

#[cfg(not(feature = "tesseract"))]
#[tokio::test]
async fn test_image_without_ocr_backend_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kuitti.png");
    std::fs::write(
        &path,
        encode(DynamicImage::ImageRgb8(clean_receipt_photo()), ImageFormat::Png),
    )
    .unwrap();
    let err = extract_file(&path, &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::OcrEngineUnavailable(_)), "got {err:?}");
}

// ── Real engines (E2E_ENABLED) ───────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_text_layer_real_pdfium() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt_text_layer.pdf"));
    init_tracing();

    let result = extract_file(&path, &ExtractionConfig::default())
        .await
        .expect("PDF extraction should succeed");

    assert_eq!(result.source, TextSource::Pdf);
    assert!(result.crop.is_none());
    assert!(!result.text.is_empty());
    assert!(!result.text.contains('\r'));
    println!("[pdf] {} chars, low_quality={}", result.text.len(), result.is_low_quality());
}

#[cfg(feature = "tesseract")]
#[tokio::test]
async fn test_receipt_photo_real_tesseract() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt_photo.jpg"));
    init_tracing();

    let result = extract_file(&path, &ExtractionConfig::default())
        .await
        .expect("OCR should succeed");

    assert_eq!(result.source, TextSource::Ocr);
    assert!(result.text.chars().any(|c| c.is_ascii_digit()));
    println!(
        "[tesseract] {} chars, confidence {:.2}, reasons {:?}",
        result.text.len(),
        result.confidence.mean_char_confidence,
        result.confidence.reasons
    );
}
