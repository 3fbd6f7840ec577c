//! Quality assessor: decide whether extracted text is trustworthy.
//!
//! Every heuristic is advisory. Each one that fires appends a reason and
//! sets `is_low_quality`; none of them removes or shortens the text. The
//! verdict exists so the caller can offer a manual re-crop, not to block.
//!
//! Heuristics, in evaluation order:
//!
//! 1. fewer than `min_chars` non-whitespace characters;
//! 2. alphanumeric share of the non-whitespace characters below
//!    `min_alnum_ratio` (garbled OCR produces punctuation soup);
//! 3. mean engine confidence below `min_mean_confidence`, only when the
//!    engine reported confidences at all;
//! 4. no digit anywhere, when `expect_numeric` is on (a receipt without a
//!    single amount was not read correctly).

use crate::config::QualityConfig;
use crate::output::QualityVerdict;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

/// Character statistics the heuristics are computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStats {
    /// Non-whitespace characters.
    pub chars: usize,
    /// Alphanumeric characters (any script).
    pub alnum: usize,
}

impl TextStats {
    pub fn of(text: &str) -> Self {
        let mut stats = Self { chars: 0, alnum: 0 };
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            stats.chars += 1;
            if c.is_alphanumeric() {
                stats.alnum += 1;
            }
        }
        stats
    }

    /// Alphanumeric share in `[0, 1]`; `0` for empty text.
    pub fn alnum_ratio(&self) -> f32 {
        if self.chars == 0 {
            0.0
        } else {
            self.alnum as f32 / self.chars as f32
        }
    }
}

/// Arithmetic mean of per-token confidences; `None` for an empty list.
pub fn mean_confidence(confidences: &[f32]) -> Option<f32> {
    if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    }
}

/// Score `text`. `confidences` are the engine's per-token scores in `[0, 1]`,
/// or `None` when the engine does not report any (PDF text, simple engines).
pub fn assess(text: &str, confidences: Option<&[f32]>, config: &QualityConfig) -> QualityVerdict {
    let stats = TextStats::of(text);
    let mut reasons = Vec::new();

    if stats.chars == 0 {
        reasons.push("no text was extracted".to_string());
    } else if stats.chars < config.min_chars {
        reasons.push(format!(
            "text is too short: {} characters (minimum {})",
            stats.chars, config.min_chars
        ));
    }

    let ratio = stats.alnum_ratio();
    if stats.chars > 0 && ratio < config.min_alnum_ratio {
        reasons.push(format!(
            "text looks garbled: {:.0}% letters or digits (minimum {:.0}%)",
            ratio * 100.0,
            config.min_alnum_ratio * 100.0
        ));
    }

    let engine_mean = confidences.and_then(mean_confidence);
    if let Some(mean) = engine_mean {
        if mean < config.min_mean_confidence {
            reasons.push(format!(
                "low recognition confidence: {:.0}% (minimum {:.0}%)",
                mean * 100.0,
                config.min_mean_confidence * 100.0
            ));
        }
    }

    if config.expect_numeric && stats.chars > 0 && !RE_NUMERIC_TOKEN.is_match(text) {
        reasons.push("no amounts or other numbers were found".to_string());
    }

    let verdict = QualityVerdict {
        is_low_quality: !reasons.is_empty(),
        reasons,
        mean_char_confidence: engine_mean.unwrap_or(ratio).clamp(0.0, 1.0),
    };
    debug!(
        "Quality: low={} confidence={:.2} reasons={:?}",
        verdict.is_low_quality, verdict.mean_char_confidence, verdict.reasons
    );
    verdict
}
