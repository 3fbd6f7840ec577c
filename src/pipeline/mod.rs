//! Pipeline stages for document-to-text extraction.
//!
//! Each submodule implements exactly one transformation step and takes its
//! thresholds as an explicit config argument. Keeping stages separate makes
//! each independently testable and lets the orchestrator in
//! [`crate::extract`] re-enter midway (a manual re-crop restarts at
//! preprocessing with the decoded original).
//!
//! ## Data Flow
//!
//! ```text
//!          ┌──▶ pdf ─────────────────────────────────────────────────┐
//! route ───┤                                                          ├──▶ postprocess ──▶ quality
//!          └──▶ decode ──▶ preprocess ──▶ locate / crop / rectify ──▶ ocr ┘
//! ```
//!
//! The locator analyses the decoded original; its bounds are then cut from
//! the preprocessed raster, which has the same dimensions.
//!
//! 1. [`route`]: pick the PDF or image path from MIME, extension or magic bytes
//! 2. [`pdf`]: read the embedded text layer via pdfium; `spawn_blocking` in async code
//! 3. [`decode`]: bytes → raster; flatten alpha, cap the longest edge
//! 4. [`preprocess`]: grayscale, histogram contrast stretch, unsharp mask
//! 5. [`locate`]: find the receipt (contour method, white-background fallback)
//! 6. [`crop`]: validate and apply crop bounds, automatic or manual
//! 7. [`rectify`]: optional perspective warp of a located quadrilateral
//! 8. [`ocr`]: the `OcrEngine` capability and its backends
//! 9. [`postprocess`]: deterministic text cleanup shared by both paths
//! 10. [`quality`]: advisory heuristics producing the `QualityVerdict`

pub mod crop;
pub mod decode;
pub mod locate;
pub mod ocr;
pub mod pdf;
pub mod postprocess;
pub mod preprocess;
pub mod quality;
pub mod rectify;
pub mod route;
