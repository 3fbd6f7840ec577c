//! Input and intermediate data: the source document and decoded rasters.

use crate::error::ExtractError;
use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Raw bytes of one uploaded file plus what the caller said it was.
///
/// Immutable once built; cloning shares the byte buffer.
#[derive(Clone)]
pub struct SourceDocument {
    name: String,
    bytes: Arc<[u8]>,
    mime_type: Option<String>,
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl SourceDocument {
    /// Wrap in-memory bytes. `name` is the original filename; its extension
    /// drives format routing.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            mime_type: None,
        }
    }

    /// Attach the MIME type declared by the uploader (e.g. `image/png`).
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into().to_ascii_lowercase());
        self
    }

    /// Read a file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::new(display_name(path), bytes))
    }

    /// Async variant of [`SourceDocument::from_path`].
    pub async fn from_path_async(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::new(display_name(path), bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Lower-cased extension of `name`, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn io_error(path: &Path, e: std::io::Error) -> ExtractError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied { path },
        _ => ExtractError::CorruptSource {
            name: path.display().to_string(),
            detail: e.to_string(),
        },
    }
}

/// Colour layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// 8-bit red/green/blue.
    Rgb,
    /// 8-bit luminance.
    Gray,
}

/// A decoded pixel matrix tagged with its colour space.
///
/// Stages never mutate a raster in place; each returns a new one so the
/// decoded original stays available for a later re-crop.
#[derive(Clone, PartialEq)]
pub struct RasterImage {
    pixels: DynamicImage,
    color_space: ColorSpace,
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color_space", &self.color_space)
            .finish()
    }
}

impl RasterImage {
    /// Normalise any decoded image to 8-bit RGB or 8-bit gray.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(g) => Self::gray(g),
            DynamicImage::ImageRgb8(c) => Self::rgb(c),
            other if other.color().has_color() => Self::rgb(other.to_rgb8()),
            other => Self::gray(other.to_luma8()),
        }
    }

    pub fn rgb(img: RgbImage) -> Self {
        Self {
            pixels: DynamicImage::ImageRgb8(img),
            color_space: ColorSpace::Rgb,
        }
    }

    pub fn gray(img: GrayImage) -> Self {
        Self {
            pixels: DynamicImage::ImageLuma8(img),
            color_space: ColorSpace::Gray,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Raw interleaved samples, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_bytes()
    }

    /// Luminance copy (or a clone when already gray).
    pub fn to_luma8(&self) -> GrayImage {
        self.pixels.to_luma8()
    }

    /// Encode as PNG, the lossless format handed to OCR backends.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.pixels
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok(buf)
    }
}
