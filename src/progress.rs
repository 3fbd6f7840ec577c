//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! the pipeline as it moves through routing, decoding, locating, OCR and
//! assessment. The CLI drives its spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use receipt_extract::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, _stage: Stage, _elapsed_ms: u64) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(StageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::QualityVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A step of the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Route,
    PdfExtract,
    Decode,
    Preprocess,
    Locate,
    Crop,
    Ocr,
    Assess,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Route => "route",
            Stage::PdfExtract => "pdf text",
            Stage::Decode => "decode",
            Stage::Preprocess => "preprocess",
            Stage::Locate => "locate receipt",
            Stage::Crop => "crop",
            Stage::Ocr => "ocr",
            Stage::Assess => "assess quality",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it processes one request.
///
/// Implementations must be `Send + Sync`: independent requests may run on
/// different threads while sharing one callback. All methods default to
/// no-ops so callers only override what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once with the final verdict, before the result is returned.
    fn on_extraction_complete(&self, verdict: &QualityVerdict) {
        let _ = verdict;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("done {stage}"));
        }

        fn on_extraction_complete(&self, verdict: &QualityVerdict) {
            self.events
                .lock()
                .unwrap()
                .push(format!("verdict {}", verdict.is_low_quality));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Route);
        cb.on_stage_complete(Stage::Route, 3);
        cb.on_extraction_complete(&QualityVerdict::default());
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Ocr);
        rec.on_stage_complete(Stage::Ocr, 12);
        rec.on_extraction_complete(&QualityVerdict::default());
        let events = rec.events.lock().unwrap();
        assert_eq!(*events, vec!["start ocr", "done ocr", "verdict false"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Locate);
    }
}
