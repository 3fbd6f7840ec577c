//! Image decoding: bytes → [`RasterImage`].
//!
//! Decoding also normalises what later stages can assume about pixels:
//! transparency is composited onto white paper (a transparent PNG would
//! otherwise read as a black page), and photos larger than
//! [`DecodeConfig::max_dimension`] are scaled down once, here, so every
//! later stage and every caller-supplied crop share one coordinate space.

use crate::config::DecodeConfig;
use crate::document::{RasterImage, SourceDocument};
use crate::error::ExtractError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use tracing::debug;

/// Decode a source document's bytes as an image.
///
/// # Errors
/// * [`ExtractError::EmptySource`] for zero bytes.
/// * [`ExtractError::CorruptSource`] when no decoder accepts the bytes.
pub fn decode_image(doc: &SourceDocument, config: &DecodeConfig) -> Result<RasterImage, ExtractError> {
    if doc.is_empty() {
        return Err(ExtractError::EmptySource {
            name: doc.name().to_string(),
        });
    }

    let img = image::load_from_memory(doc.bytes()).map_err(|e| ExtractError::CorruptSource {
        name: doc.name().to_string(),
        detail: e.to_string(),
    })?;
    debug!(
        "Decoded '{}' → {}x{} {:?}",
        doc.name(),
        img.width(),
        img.height(),
        img.color()
    );

    let img = flatten_alpha(img);
    let img = limit_dimension(img, config.max_dimension);
    Ok(RasterImage::from_dynamic(img))
}

/// Composite any alpha channel onto a white background.
fn flatten_alpha(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }

    let blend = |c: u8, a: u8| -> u8 {
        let (c, a) = (u32::from(c), u32::from(a));
        ((c * a + 255 * (255 - a) + 127) / 255) as u8
    };

    if img.color().has_color() {
        let rgba = img.to_rgba8();
        let out = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let p = rgba.get_pixel(x, y);
            Rgb([blend(p[0], p[3]), blend(p[1], p[3]), blend(p[2], p[3])])
        });
        DynamicImage::ImageRgb8(out)
    } else {
        let la = img.to_luma_alpha8();
        let out = GrayImage::from_fn(la.width(), la.height(), |x, y| {
            let p = la.get_pixel(x, y);
            Luma([blend(p[0], p[1])])
        });
        DynamicImage::ImageLuma8(out)
    }
}

/// Scale down (aspect preserved) so the longest edge is at most `max`.
fn limit_dimension(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() > max || img.height() > max {
        let out = img.resize(max, max, FilterType::Lanczos3);
        debug!(
            "Downscaled {}x{} → {}x{}",
            img.width(),
            img.height(),
            out.width(),
            out.height()
        );
        out
    } else {
        img
    }
}
