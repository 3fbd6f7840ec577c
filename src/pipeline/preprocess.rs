//! Image preprocessing for OCR: grayscale, contrast stretch, sharpen.
//!
//! Each step is toggled by [`PreprocessConfig`] and returns a new raster.
//! All arithmetic is integer lookup tables or the fixed-kernel unsharp mask
//! from `image`, so the same input always gives byte-identical output.
//!
//! ## Contrast
//!
//! A fixed gain (say ×1.3) pushes bright paper into flat 255 and loses the
//! faint print on thermal receipts. Instead the stretch range comes from the
//! luminance histogram: the darkest and brightest `contrast_cutoff_percent`
//! of pixels are ignored and the rest are mapped linearly onto `0..=255`.
//! Two guards keep it honest:
//!
//! * a histogram narrower than `min_histogram_spread` is a flat image and is
//!   left untouched (stretching it would amplify noise only);
//! * if more than `max_saturated_fraction` of pixels would land on pure black
//!   or white, the stretch is recomputed without the cutoff so no tonal
//!   range is merged.

use crate::config::PreprocessConfig;
use crate::document::RasterImage;
use image::{DynamicImage, GrayImage};
use tracing::debug;

/// Run the enabled steps in order.
///
/// With `grayscale` on (the default) the result is always gray; with it off
/// the colour raster is stretched and sharpened per channel.
pub fn preprocess(image: &RasterImage, config: &PreprocessConfig) -> RasterImage {
    let mut out = if config.grayscale {
        RasterImage::gray(image.to_luma8())
    } else {
        image.clone()
    };

    if config.contrast {
        if let Some(lut) = contrast_lut(&out.to_luma8(), config) {
            out = apply_lut(&out, &lut);
        }
    }

    if config.sharpen {
        out = sharpen(&out, config.sharpen_sigma, config.sharpen_threshold);
    }

    out
}

/// 256-bin luminance histogram.
pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    hist
}

/// Darkest and brightest levels left after ignoring `cutoff_percent` of
/// pixels at each end.
pub fn cut_points(hist: &[u64; 256], cutoff_percent: f32) -> Option<(u8, u8)> {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return None;
    }
    let cut = (total as f64 * f64::from(cutoff_percent) / 100.0).floor() as u64;

    let mut acc = 0;
    let mut lo = 0u8;
    for (v, &n) in hist.iter().enumerate() {
        acc += n;
        if acc > cut {
            lo = v as u8;
            break;
        }
    }

    acc = 0;
    let mut hi = 255u8;
    for (v, &n) in hist.iter().enumerate().rev() {
        acc += n;
        if acc > cut {
            hi = v as u8;
            break;
        }
    }

    Some((lo, hi))
}

/// Build the stretch lookup table, or `None` when the image should be left
/// alone.
fn contrast_lut(gray: &GrayImage, config: &PreprocessConfig) -> Option<[u8; 256]> {
    let hist = histogram(gray);
    let total: u64 = hist.iter().sum();
    let (mut lo, mut hi) = cut_points(&hist, config.contrast_cutoff_percent)?;

    if hi <= lo || hi - lo < config.min_histogram_spread {
        debug!("Contrast skipped: flat histogram ({lo}..{hi})");
        return None;
    }

    let saturated = |lo: u8, hi: u8| -> f32 {
        let dark: u64 = hist[..=lo as usize].iter().sum();
        let light: u64 = hist[hi as usize..].iter().sum();
        (dark + light) as f32 / total as f32
    };

    if saturated(lo, hi) > config.max_saturated_fraction && config.contrast_cutoff_percent > 0.0 {
        let (min, max) = cut_points(&hist, 0.0)?;
        debug!("Contrast cutoff would clip too much; stretching {min}..{max} instead of {lo}..{hi}");
        lo = min;
        hi = max;
        if hi <= lo || hi - lo < config.min_histogram_spread {
            return None;
        }
    }

    debug!("Contrast stretch {lo}..{hi} → 0..255");
    Some(stretch_lut(lo, hi))
}

fn stretch_lut(lo: u8, hi: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let range = u32::from(hi - lo);
    for (v, slot) in lut.iter_mut().enumerate() {
        let v = v as u32;
        *slot = if v <= u32::from(lo) {
            0
        } else if v >= u32::from(hi) {
            255
        } else {
            (((v - u32::from(lo)) * 255 + range / 2) / range) as u8
        };
    }
    lut
}

fn apply_lut(image: &RasterImage, lut: &[u8; 256]) -> RasterImage {
    match image.as_dynamic() {
        DynamicImage::ImageLuma8(g) => {
            let mut g = g.clone();
            g.pixels_mut().for_each(|p| p[0] = lut[p[0] as usize]);
            RasterImage::gray(g)
        }
        other => {
            let mut c = other.to_rgb8();
            c.pixels_mut()
                .for_each(|p| p.0.iter_mut().for_each(|s| *s = lut[*s as usize]));
            RasterImage::rgb(c)
        }
    }
}

fn sharpen(image: &RasterImage, sigma: f32, threshold: i32) -> RasterImage {
    match image.as_dynamic() {
        DynamicImage::ImageLuma8(g) => RasterImage::gray(image::imageops::unsharpen(g, sigma, threshold)),
        other => RasterImage::rgb(image::imageops::unsharpen(&other.to_rgb8(), sigma, threshold)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ColorSpace;
    use image::{Luma, Rgb, RgbImage};

    fn low_contrast_text(w: u32, h: u32) -> RasterImage {
        // Gray "ink" stripes (100) on dull "paper" (150..160).
        RasterImage::rgb(RgbImage::from_fn(w, h, |x, y| {
            let v = if y % 8 < 2 && x % 5 != 0 { 100 } else { 150 + (x % 10) as u8 };
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn output_is_gray_with_same_dimensions() {
        let img = low_contrast_text(64, 48);
        let out = preprocess(&img, &PreprocessConfig::default());
        assert_eq!(out.color_space(), ColorSpace::Gray);
        assert_eq!((out.width(), out.height()), (64, 48));
    }

    #[test]
    fn preprocess_is_deterministic() {
        let img = low_contrast_text(80, 60);
        let cfg = PreprocessConfig::default();
        let a = preprocess(&img, &cfg);
        let b = preprocess(&img, &cfg);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn contrast_widens_histogram() {
        let img = low_contrast_text(80, 60);
        let cfg = PreprocessConfig {
            sharpen: false,
            ..PreprocessConfig::default()
        };
        let out = preprocess(&img, &cfg).to_luma8();
        let (lo, hi) = cut_points(&histogram(&out), 0.0).unwrap();
        assert!(lo < 20 && hi > 235, "got {lo}..{hi}");
    }

    #[test]
    fn flat_image_is_untouched_by_contrast() {
        let img = RasterImage::gray(GrayImage::from_pixel(10, 10, Luma([128])));
        let cfg = PreprocessConfig {
            sharpen: false,
            ..PreprocessConfig::default()
        };
        let out = preprocess(&img, &cfg);
        assert!(out.as_bytes().iter().all(|&v| v == 128));
    }

    #[test]
    fn cutoff_backs_off_when_it_would_clip_large_regions() {
        // 60 % of the pixels sit at 240; a 5 % cutoff on a distribution with
        // a long dark tail would map them all to 255 along with 250.
        let img = GrayImage::from_fn(100, 10, |x, _| {
            Luma([if x < 60 { 240 } else if x < 61 { 250 } else { 40 + x as u8 }])
        });
        let cfg = PreprocessConfig {
            contrast_cutoff_percent: 5.0,
            ..PreprocessConfig::default()
        };
        let lut = contrast_lut(&img, &cfg).unwrap();
        // 240 and 250 remain distinct after stretching.
        assert_ne!(lut[240], lut[250]);
    }

    #[test]
    fn toggles_disable_steps() {
        let img = low_contrast_text(20, 20);
        let cfg = PreprocessConfig {
            grayscale: false,
            contrast: false,
            sharpen: false,
            ..PreprocessConfig::default()
        };
        let out = preprocess(&img, &cfg);
        assert_eq!(out, img);
    }

    #[test]
    fn cut_points_ignore_tails() {
        let mut hist = [0u64; 256];
        hist[0] = 1;
        hist[100] = 98;
        hist[255] = 1;
        assert_eq!(cut_points(&hist, 0.0), Some((0, 255)));
        assert_eq!(cut_points(&hist, 1.0), Some((100, 100)));
    }
}
