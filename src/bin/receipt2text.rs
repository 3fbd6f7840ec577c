//! CLI binary for receipt-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt_extract::{
    CropBounds, ExtractionConfig, ExtractionProgressCallback, ExtractionResult, Extractor,
    Inspection, LocatorPrecedence, ProgressCallback, QualityVerdict, SourceDocument, Stage,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the running stage, with one verdict line per document.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn start_document(&self, name: &str) {
        self.bar.set_prefix(name.to_string());
        self.bar.set_message("starting…");
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        if elapsed_ms >= 250 {
            self.bar.println(format!(
                "  {} {:<11} {}",
                dim("·"),
                stage.to_string(),
                dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0))
            ));
        }
    }

    fn on_extraction_complete(&self, verdict: &QualityVerdict) {
        let line = if verdict.is_low_quality {
            format!(
                "  {} low quality ({:.0}%): {}",
                yellow("⚠"),
                verdict.mean_char_confidence * 100.0,
                verdict.reasons.join("; ")
            )
        } else {
            format!(
                "  {} looks good ({:.0}%)",
                green("✓"),
                verdict.mean_char_confidence * 100.0
            )
        };
        self.bar.println(line);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo of a receipt (stdout)
  receipt2text kuitti.jpg

  # Several receipts, text to one file
  receipt2text IMG_0412.jpg IMG_0413.jpg lasku.pdf -o receipts.txt

  # Automatic crop missed: crop by hand (top,bottom,left,right in pixels)
  receipt2text --crop 120,1650,310,900 kuitti.jpg

  # Only show where the receipt was found
  receipt2text --locate-only kuitti.jpg

  # Structured output for scripts; non-zero exit on poor text
  receipt2text --json --fail-on-low-quality kuitti.jpg > result.json

EXIT CODES:
  0  all inputs extracted
  1  at least one input failed (unsupported, corrupt, engine missing)
  2  --fail-on-low-quality and at least one verdict was low quality

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory) for PDF inputs
  TESSDATA_PREFIX   Tesseract language data location (overridden by --tessdata)
  RUST_LOG          Log filter, e.g. receipt_extract=debug

SETUP:
  Image OCR needs a build with `--features tesseract` and the system
  libtesseract/libleptonica. PDF text extraction needs only libpdfium.
"#;

/// Extract text from receipt photos, scans and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2text",
    version,
    about = "Extract text from receipt photos, scans and PDFs",
    long_about = "Extract text from receipts. PDFs are read through their embedded text \
layer; images are located, cropped, cleaned up and passed to OCR. Every result carries a \
quality verdict so poor extractions can be re-cropped by hand.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Receipt files (jpg, png, gif, bmp, tiff, pdf).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write text (or JSON) to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT2TEXT_OUTPUT")]
    output: Option<PathBuf>,

    /// TOML configuration file; flags below override it.
    #[arg(long, env = "RECEIPT2TEXT_CONFIG")]
    config: Option<PathBuf>,

    /// Manual crop: top,bottom,left,right in decoded-image pixels.
    #[arg(long, value_name = "T,B,L,R", allow_hyphen_values = true)]
    crop: Option<String>,

    /// Skip automatic receipt location.
    #[arg(long)]
    no_auto_crop: bool,

    /// Keep colour instead of converting to grayscale.
    #[arg(long)]
    no_grayscale: bool,

    /// Skip the contrast stretch.
    #[arg(long)]
    no_contrast: bool,

    /// Skip sharpening.
    #[arg(long)]
    no_sharpen: bool,

    /// Warp a tilted receipt upright instead of cropping its bounding box.
    #[arg(long)]
    rectify: bool,

    /// Which locator method is tried first.
    #[arg(long, value_enum)]
    precedence: Option<PrecedenceArg>,

    /// Tesseract language spec; repeat for fallbacks (e.g. --lang fin+eng --lang eng).
    #[arg(long = "lang", env = "RECEIPT2TEXT_LANG", value_delimiter = ';')]
    languages: Vec<String>,

    /// Directory containing Tesseract language data.
    #[arg(long, env = "TESSDATA_PREFIX")]
    tessdata: Option<PathBuf>,

    /// Output structured JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Run only the locator and print the suggested crop.
    #[arg(long)]
    locate_only: bool,

    /// Exit with code 2 when any result is low quality.
    #[arg(long)]
    fail_on_low_quality: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "RECEIPT2TEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPT2TEXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PrecedenceArg {
    Contour,
    White,
}

impl From<PrecedenceArg> for LocatorPrecedence {
    fn from(v: PrecedenceArg) -> Self {
        match v {
            PrecedenceArg::Contour => LocatorPrecedence::ContourFirst,
            PrecedenceArg::White => LocatorPrecedence::WhiteBackgroundFirst,
        }
    }
}

/// One line of `--json` output.
#[derive(Serialize)]
struct JsonRecord<'a, T: Serialize> {
    input: String,
    #[serde(flatten)]
    body: &'a T,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as ProgressCallback),
    )?;
    let manual_crop = cli.crop.as_deref().map(parse_crop).transpose()?;
    let extractor = Extractor::new(config);

    // ── Run ──────────────────────────────────────────────────────────────
    let mut rendered = String::new();
    let mut json_records = Vec::new();
    let mut failures = 0usize;
    let mut low_quality = 0usize;

    for path in &cli.inputs {
        let label = path.display().to_string();
        if let Some(p) = &progress {
            p.start_document(&label);
        }

        let outcome = process_one(&extractor, path, manual_crop, cli.locate_only).await;
        match outcome {
            Ok(Outcome::Extracted(result)) => {
                if result.is_low_quality() {
                    low_quality += 1;
                }
                if cli.json {
                    json_records.push(serde_json::to_value(JsonRecord {
                        input: label.clone(),
                        body: &result,
                    })?);
                } else {
                    append_text(&mut rendered, &label, cli.inputs.len(), &result.text);
                }
                if !cli.quiet && !show_progress && !cli.json {
                    report_verdict(&label, &result.confidence);
                }
            }
            Ok(Outcome::Inspected(inspection)) => {
                if cli.json {
                    json_records.push(serde_json::to_value(JsonRecord {
                        input: label.clone(),
                        body: &inspection,
                    })?);
                } else {
                    rendered.push_str(&format_inspection(&label, &inspection));
                }
            }
            Err(e) => {
                failures += 1;
                if let Some(p) = &progress {
                    p.bar.println(format!("  {} {}: {:#}", red("✗"), label, e));
                } else {
                    eprintln!("{} {}: {:#}", red("error:"), label, e);
                }
            }
        }
    }

    if let Some(p) = &progress {
        p.finish();
    }

    // ── Emit ─────────────────────────────────────────────────────────────
    let payload = if cli.json {
        let value = if json_records.len() == 1 && cli.inputs.len() == 1 {
            json_records.remove(0)
        } else {
            serde_json::Value::Array(json_records)
        };
        let mut s = serde_json::to_string_pretty(&value).context("Failed to serialise output")?;
        s.push('\n');
        s
    } else {
        rendered
    };

    if let Some(ref out) = cli.output {
        tokio::fs::write(out, payload.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
        if !cli.quiet {
            eprintln!("{} wrote {}", green("✔"), bold(&out.display().to_string()));
        }
    } else if !payload.is_empty() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(payload.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if failures > 0 {
        return Ok(ExitCode::from(1));
    }
    if cli.fail_on_low_quality && low_quality > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

enum Outcome {
    Extracted(ExtractionResult),
    Inspected(Inspection),
}

async fn process_one(
    extractor: &Extractor,
    path: &Path,
    manual_crop: Option<CropBounds>,
    locate_only: bool,
) -> Result<Outcome> {
    let doc = SourceDocument::from_path_async(path).await?;

    if locate_only {
        let ex = extractor.clone();
        let inspection = tokio::task::spawn_blocking(move || ex.inspect_image(&doc))
            .await
            .context("Locator task panicked")??;
        return Ok(Outcome::Inspected(inspection));
    }

    let result = match manual_crop {
        Some(bounds) => extractor.extract_with_crop_async(doc, bounds).await?,
        None => extractor.extract_async(doc).await?,
    };
    Ok(Outcome::Extracted(result))
}

fn append_text(out: &mut String, label: &str, total: usize, text: &str) {
    if total > 1 {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("==> {label} <==\n"));
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn report_verdict(label: &str, verdict: &QualityVerdict) {
    if verdict.is_low_quality {
        eprintln!(
            "{} {label}: low quality: {}",
            yellow("⚠"),
            verdict.reasons.join("; ")
        );
    } else {
        eprintln!(
            "{} {label}: {:.0}% confidence",
            green("✓"),
            verdict.mean_char_confidence * 100.0
        );
    }
}

fn format_inspection(label: &str, ins: &Inspection) -> String {
    let mut s = format!("File:     {label}\nSize:     {}x{}\n", ins.width, ins.height);
    match &ins.located {
        Some(l) => {
            s.push_str(&format!("Method:   {}\n", l.origin));
            s.push_str(&format!(
                "Crop:     --crop {:.0},{:.0},{:.0},{:.0}\n",
                l.bounds.top, l.bounds.bottom, l.bounds.left, l.bounds.right
            ));
            if let Some(q) = &l.corners {
                let pts: Vec<String> = q.iter().map(|(x, y)| format!("({x:.0},{y:.0})")).collect();
                s.push_str(&format!("Corners:  {}\n", pts.join(" ")));
            }
        }
        None => s.push_str("Method:   none (no receipt-shaped region found)\n"),
    }
    s
}

/// Map CLI args onto `ExtractionConfig`, starting from `--config` if given.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ExtractionConfig::default(),
    };

    if cli.no_auto_crop {
        config.locator.enabled = false;
    }
    if cli.no_grayscale {
        config.preprocess.grayscale = false;
    }
    if cli.no_contrast {
        config.preprocess.contrast = false;
    }
    if cli.no_sharpen {
        config.preprocess.sharpen = false;
    }
    if cli.rectify {
        config.locator.rectify = true;
    }
    if let Some(p) = cli.precedence {
        config.locator.precedence = p.into();
    }
    if !cli.languages.is_empty() {
        config.ocr.languages = cli.languages.clone();
    }
    if let Some(dir) = &cli.tessdata {
        config.ocr.data_path = Some(dir.clone());
    }
    config.progress_callback = progress;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Parse `--crop top,bottom,left,right`.
fn parse_crop(s: &str) -> Result<CropBounds> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid crop value: '{}'", p.trim()))
        })
        .collect::<Result<_>>()?;
    let [top, bottom, left, right] = parts[..] else {
        bail!(
            "--crop takes four values (top,bottom,left,right), got {}",
            parts.len()
        );
    };
    CropBounds::new(top, bottom, left, right).context("Invalid crop bounds")
}
