//! Receipt locator: find the receipt inside a photograph.
//!
//! Two independent methods run on a downscaled grayscale copy:
//!
//! 1. **Contour.** Blur, threshold the Sobel gradient magnitude into an edge
//!    map, dilate it so broken borders join, and trace outer contours. The
//!    largest contour whose bounding box is receipt-shaped (tall, large
//!    enough, roughly rectangular, not the whole frame) wins.
//! 2. **White background.** Threshold bright paper (Otsu, floored so a dark
//!    photo does not call the desk "paper") and scan rows and columns inward
//!    from each border until one is mostly paper.
//!
//! [`LocatorPrecedence`] decides which method is asked first; the other is
//! only consulted when the first finds nothing. When both fail the caller
//! gets `None` and OCRs the full frame. The input raster is never modified.

use crate::config::{LocatorConfig, LocatorPrecedence};
use crate::document::RasterImage;
use crate::output::CropOrigin;
use crate::pipeline::crop::CropBounds;
use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;
use imageproc::morphology::dilate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quadrilateral corners in full-resolution pixels: top-left, top-right,
/// bottom-right, bottom-left.
pub type Quad = [(f32, f32); 4];

/// A located receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Located {
    /// Bounding box in decoded-image pixels, margin included.
    pub bounds: CropBounds,
    pub origin: CropOrigin,
    /// Outline corners, when the contour method found them.
    pub corners: Option<Quad>,
}

/// Find the receipt, honouring the configured precedence.
pub fn locate_receipt(image: &RasterImage, config: &LocatorConfig) -> Option<Located> {
    let work = WorkingCopy::new(image, config.working_dimension);

    let (first, second): (Method, Method) = match config.precedence {
        LocatorPrecedence::ContourFirst => (by_contour, by_white_background),
        LocatorPrecedence::WhiteBackgroundFirst => (by_white_background, by_contour),
    };

    let found = first(&work, config).or_else(|| second(&work, config));
    match &found {
        Some(l) => debug!("Receipt located by {}: {:?}", l.origin, l.bounds),
        None => debug!("No receipt-shaped region found; using the full frame"),
    }
    found
}

/// Contour method only.
pub fn locate_by_contour(image: &RasterImage, config: &LocatorConfig) -> Option<Located> {
    by_contour(&WorkingCopy::new(image, config.working_dimension), config)
}

/// White-background method only.
pub fn locate_by_white_background(image: &RasterImage, config: &LocatorConfig) -> Option<Located> {
    by_white_background(&WorkingCopy::new(image, config.working_dimension), config)
}

type Method = fn(&WorkingCopy, &LocatorConfig) -> Option<Located>;

// ── Working copy ─────────────────────────────────────────────────────────────

/// Downscaled luminance plus the factor back to full resolution.
struct WorkingCopy {
    gray: GrayImage,
    /// working pixels per full-resolution pixel (≤ 1)
    scale: f64,
    full_width: u32,
    full_height: u32,
}

impl WorkingCopy {
    fn new(image: &RasterImage, working_dimension: u32) -> Self {
        let (w, h) = (image.width(), image.height());
        let longest = w.max(h).max(1);
        let gray = image.to_luma8();
        let (gray, scale) = if longest > working_dimension {
            let scale = f64::from(working_dimension) / f64::from(longest);
            let nw = ((f64::from(w) * scale).round() as u32).max(1);
            let nh = ((f64::from(h) * scale).round() as u32).max(1);
            (
                image::imageops::resize(&gray, nw, nh, FilterType::Triangle),
                scale,
            )
        } else {
            (gray, 1.0)
        };
        Self {
            gray,
            scale,
            full_width: w,
            full_height: h,
        }
    }

    fn width(&self) -> u32 {
        self.gray.width()
    }

    fn height(&self) -> u32 {
        self.gray.height()
    }

    fn blurred(&self, sigma: f32) -> GrayImage {
        if sigma > 0.0 {
            gaussian_blur_f32(&self.gray, sigma)
        } else {
            self.gray.clone()
        }
    }

    /// Convert an inclusive working-space box to full-resolution bounds,
    /// padded by `margin` and clamped to the image.
    fn to_full_bounds(&self, b: &PixelBox, margin: u32) -> Option<CropBounds> {
        let m = f64::from(margin);
        let (fw, fh) = (f64::from(self.full_width), f64::from(self.full_height));
        CropBounds::new(
            (f64::from(b.min_y) / self.scale - m).max(0.0),
            (f64::from(b.max_y + 1) / self.scale + m).min(fh),
            (f64::from(b.min_x) / self.scale - m).max(0.0),
            (f64::from(b.max_x + 1) / self.scale + m).min(fw),
        )
        .ok()
    }

    fn to_full_point(&self, x: f64, y: f64) -> (f32, f32) {
        ((x / self.scale) as f32, (y / self.scale) as f32)
    }
}

/// Inclusive pixel box in working space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBox {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl PixelBox {
    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn area(&self) -> f64 {
        f64::from(self.width()) * f64::from(self.height())
    }

    /// Height over width.
    fn aspect(&self) -> f32 {
        self.height() as f32 / self.width() as f32
    }

    fn touches_all_borders(&self, width: u32, height: u32, tol: u32) -> bool {
        self.min_x <= tol
            && self.min_y <= tol
            && self.max_x + tol >= width.saturating_sub(1)
            && self.max_y + tol >= height.saturating_sub(1)
    }
}

/// Shape checks shared by both methods.
fn plausible(b: &PixelBox, work: &WorkingCopy, config: &LocatorConfig) -> bool {
    let frame = f64::from(work.width()) * f64::from(work.height());
    let aspect = b.aspect();
    let area_fraction = b.area() / frame;

    if !(config.min_aspect..=config.max_aspect).contains(&aspect) {
        return false;
    }
    if area_fraction < f64::from(config.min_area_fraction) {
        return false;
    }
    !b.touches_all_borders(work.width(), work.height(), config.border_tolerance)
}

// ── Method 1: contours ───────────────────────────────────────────────────────

fn by_contour(work: &WorkingCopy, config: &LocatorConfig) -> Option<Located> {
    let edges = edge_map(work, config);
    let contours = find_contours::<u32>(&edges);
    debug!("Contour method: {} contours", contours.len());

    let mut best: Option<(f64, PixelBox, &Contour<u32>)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
    {
        let bbox = bounding_box(contour);
        if !plausible(&bbox, work, config) {
            continue;
        }
        let rectangularity = polygon_area(contour) / bbox.area();
        if rectangularity < f64::from(config.min_rectangularity) {
            continue;
        }
        if best.as_ref().is_none_or(|(area, _, _)| bbox.area() > *area) {
            best = Some((bbox.area(), bbox, contour));
        }
    }

    let (_, bbox, contour) = best?;
    let bounds = work.to_full_bounds(&bbox, config.margin)?;
    Some(Located {
        bounds,
        origin: CropOrigin::Contour,
        corners: Some(corners(work, contour)),
    })
}

/// Binary edge map: blurred Sobel magnitude above threshold, dilated.
fn edge_map(work: &WorkingCopy, config: &LocatorConfig) -> GrayImage {
    let blurred = work.blurred(config.blur_sigma);
    let gradients = sobel_gradients(&blurred);
    let mut edges = GrayImage::new(blurred.width(), blurred.height());
    for (x, y, g) in gradients.enumerate_pixels() {
        if g[0] >= config.edge_threshold {
            edges.put_pixel(x, y, Luma([255]));
        }
    }
    if config.edge_dilation > 0 {
        dilate(&edges, Norm::LInf, config.edge_dilation)
    } else {
        edges
    }
}

fn bounding_box(contour: &Contour<u32>) -> PixelBox {
    let mut b = PixelBox {
        min_x: u32::MAX,
        min_y: u32::MAX,
        max_x: 0,
        max_y: 0,
    };
    for p in &contour.points {
        b.min_x = b.min_x.min(p.x);
        b.min_y = b.min_y.min(p.y);
        b.max_x = b.max_x.max(p.x);
        b.max_y = b.max_y.max(p.y);
    }
    b
}

/// Shoelace area of the traced outline, in working pixels.
fn polygon_area(contour: &Contour<u32>) -> f64 {
    let pts = &contour.points;
    let n = pts.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (&pts[i], &pts[(i + 1) % n]);
            f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y)
        })
        .sum();
    // The trace runs through pixel centres; add half a pixel all round so a
    // perfect rectangle scores 1.0 against its inclusive bounding box.
    let perimeter_pad = n as f64 / 2.0 + 1.0;
    twice.abs() / 2.0 + perimeter_pad
}

/// Extreme points of the outline: TL minimises x+y, BR maximises it, TR
/// maximises x−y and BL minimises it.
fn corners(work: &WorkingCopy, contour: &Contour<u32>) -> Quad {
    let key_sum = |p: &&imageproc::point::Point<u32>| i64::from(p.x) + i64::from(p.y);
    let key_diff = |p: &&imageproc::point::Point<u32>| i64::from(p.x) - i64::from(p.y);
    let pts = &contour.points;
    let pick = |p: Option<&imageproc::point::Point<u32>>| {
        p.map(|p| work.to_full_point(f64::from(p.x), f64::from(p.y)))
            .unwrap_or((0.0, 0.0))
    };
    [
        pick(pts.iter().min_by_key(key_sum)),
        pick(pts.iter().max_by_key(key_diff)),
        pick(pts.iter().max_by_key(key_sum)),
        pick(pts.iter().min_by_key(key_diff)),
    ]
}

// ── Method 2: white background ───────────────────────────────────────────────

fn by_white_background(work: &WorkingCopy, config: &LocatorConfig) -> Option<Located> {
    let blurred = work.blurred(config.blur_sigma);
    let threshold = otsu_level(&blurred).max(config.paper_threshold_floor);
    let (w, h) = (blurred.width(), blurred.height());
    let is_paper = |x: u32, y: u32| blurred.get_pixel(x, y)[0] >= threshold;
    debug!("White-background method: paper threshold {threshold}");

    let row_is_paper = |y: u32| {
        let n = (0..w).filter(|&x| is_paper(x, y)).count();
        n as f32 / w as f32 >= config.min_paper_fraction
    };
    let min_y = (0..h).find(|&y| row_is_paper(y))?;
    let max_y = (0..h).rev().find(|&y| row_is_paper(y))?;

    let rows = max_y - min_y + 1;
    let col_is_paper = |x: u32| {
        let n = (min_y..=max_y).filter(|&y| is_paper(x, y)).count();
        n as f32 / rows as f32 >= config.min_paper_fraction
    };
    let min_x = (0..w).find(|&x| col_is_paper(x))?;
    let max_x = (0..w).rev().find(|&x| col_is_paper(x))?;

    let bbox = PixelBox {
        min_x,
        min_y,
        max_x,
        max_y,
    };
    if !plausible(&bbox, work, config) {
        debug!("White-background candidate rejected: {bbox:?}");
        return None;
    }

    Some(Located {
        bounds: work.to_full_bounds(&bbox, config.margin)?,
        origin: CropOrigin::WhiteBackground,
        corners: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Bright "receipt" with printed lines on a darker desk.
    fn photo(w: u32, h: u32, rect: (u32, u32, u32, u32)) -> RasterImage {
        let (rx, ry, rw, rh) = rect;
        RasterImage::rgb(RgbImage::from_fn(w, h, |x, y| {
            let inside = x >= rx && x < rx + rw && y >= ry && y < ry + rh;
            if !inside {
                Rgb([70, 60, 50])
            } else if (y - ry) % 20 < 3 && (x - rx) > 15 && (x - rx) < rw - 15 {
                Rgb([30, 30, 30])
            } else {
                Rgb([235, 235, 230])
            }
        }))
    }

    fn truth(rect: (u32, u32, u32, u32)) -> CropBounds {
        let (x, y, w, h) = rect;
        CropBounds::new(y as f64, (y + h) as f64, x as f64, (x + w) as f64).unwrap()
    }

    fn no_margin() -> LocatorConfig {
        LocatorConfig {
            margin: 0,
            ..LocatorConfig::default()
        }
    }

    #[test]
    fn contour_finds_bright_rectangle() {
        let rect = (150, 100, 300, 700);
        let img = photo(600, 900, rect);
        let found = locate_by_contour(&img, &no_margin()).expect("located");
        assert_eq!(found.origin, CropOrigin::Contour);
        let iou = found.bounds.iou(&truth(rect));
        assert!(iou > 0.8, "iou = {iou}, bounds = {:?}", found.bounds);
        assert!(found.corners.is_some());
    }

    #[test]
    fn white_background_finds_bright_rectangle() {
        let rect = (150, 100, 300, 700);
        let img = photo(600, 900, rect);
        let found = locate_by_white_background(&img, &no_margin()).expect("located");
        assert_eq!(found.origin, CropOrigin::WhiteBackground);
        let iou = found.bounds.iou(&truth(rect));
        assert!(iou > 0.8, "iou = {iou}");
    }

    #[test]
    fn large_photo_is_analysed_downscaled_and_mapped_back() {
        let rect = (400, 300, 700, 1800);
        let img = photo(1500, 2400, rect);
        let found = locate_receipt(&img, &no_margin()).expect("located");
        let iou = found.bounds.iou(&truth(rect));
        assert!(iou > 0.8, "iou = {iou}");
    }

    #[test]
    fn uniform_image_yields_none() {
        for v in [0u8, 128, 255] {
            let img = RasterImage::gray(GrayImage::from_pixel(400, 600, Luma([v])));
            assert_eq!(locate_receipt(&img, &LocatorConfig::default()), None, "value {v}");
        }
    }

    #[test]
    fn square_region_is_not_receipt_shaped() {
        let img = photo(600, 600, (150, 150, 300, 300));
        assert_eq!(locate_receipt(&img, &LocatorConfig::default()), None);
    }

    #[test]
    fn tiny_region_is_noise() {
        let img = photo(1000, 1000, (500, 500, 40, 120));
        assert_eq!(locate_receipt(&img, &LocatorConfig::default()), None);
    }

    #[test]
    fn margin_is_added_and_clamped() {
        let rect = (5, 100, 300, 700);
        let img = photo(600, 900, rect);
        let cfg = LocatorConfig {
            margin: 20,
            precedence: LocatorPrecedence::WhiteBackgroundFirst,
            ..LocatorConfig::default()
        };
        let found = locate_receipt(&img, &cfg).expect("located");
        assert_eq!(found.bounds.left, 0.0);
        // paper starts at y = 100 (a little later under the first print row)
        assert!(
            found.bounds.top > 70.0 && found.bounds.top < 95.0,
            "top = {}",
            found.bounds.top
        );
    }

    #[test]
    fn precedence_selects_method() {
        let img = photo(600, 900, (150, 100, 300, 700));
        let contour_first = locate_receipt(&img, &no_margin()).unwrap();
        assert_eq!(contour_first.origin, CropOrigin::Contour);

        let cfg = LocatorConfig {
            precedence: LocatorPrecedence::WhiteBackgroundFirst,
            ..no_margin()
        };
        assert_eq!(
            locate_receipt(&img, &cfg).unwrap().origin,
            CropOrigin::WhiteBackground
        );
    }

    #[test]
    fn input_is_not_modified() {
        let img = photo(300, 450, (75, 50, 150, 350));
        let before = img.clone();
        let _ = locate_receipt(&img, &LocatorConfig::default());
        assert_eq!(img, before);
    }
}
