//! Post-processing: deterministic cleanup of extracted text.
//!
//! Both paths run their output through [`normalise_text`]: PDF text layers
//! carry CRLF line endings, soft hyphens and form feeds, and OCR output
//! carries trailing spaces and runs of blank lines between receipt
//! sections. None of that helps a downstream language model, and removing
//! it makes the quality heuristics count real characters only.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the per-line rules see `\n` only.
//! Invisible characters are removed before trimming so a line holding just a
//! zero-width space becomes blank and is collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR / form feed → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Replace non-breaking and other exotic spaces with a plain space
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive newlines down to one blank line
/// 6. Trim leading and trailing blank space from the whole text
pub fn normalise_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = normalise_spaces(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
}

// ── Rule 2: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Normalise exotic spaces ──────────────────────────────────────────

static RE_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{00A0}\x{2000}-\x{200A}\x{202F}\x{205F}\x{3000}\t]").unwrap());

fn normalise_spaces(input: &str) -> String {
    RE_SPACES.replace_all(input, " ").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc\u{000C}d"), "a\nb\nc\nd");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_normalise_spaces() {
        assert_eq!(normalise_spaces("12,50\u{00A0}€\tEUR"), "12,50 € EUR");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  MAITO   \nLEIPÄ  "),
            "  MAITO\nLEIPÄ"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_blank_line_of_invisibles_collapses() {
        assert_eq!(normalise_text("a\n\n\u{200B}\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert_eq!(normalise_text(""), "");
        assert_eq!(normalise_text(" \r\n\t \n"), "");
    }

    #[test]
    fn test_normalise_is_idempotent() {
        let raw = "K-MARKET\r\n\r\n\r\nMAITO   1,29\r\nYHTEENSÄ 1,29  \r\n";
        let once = normalise_text(raw);
        assert_eq!(once, "K-MARKET\n\nMAITO   1,29\nYHTEENSÄ 1,29");
        assert_eq!(normalise_text(&once), once);
    }
}
