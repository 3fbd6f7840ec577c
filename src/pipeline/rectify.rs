//! Perspective rectification of a located receipt.
//!
//! A receipt photographed at an angle is a quadrilateral, not a rectangle;
//! cropping its bounding box keeps the slant and a wedge of desk. When the
//! contour method reports four corners and `locator.rectify` is on, the quad
//! is warped onto an upright rectangle sized by its longest opposite edges.
//! Any degenerate quad falls back to the plain crop.

use crate::document::RasterImage;
use crate::pipeline::locate::Quad;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::{debug, warn};

/// Smallest output edge, in pixels, worth warping to.
const MIN_EDGE: f32 = 8.0;

/// Warp the quadrilateral `corners` (TL, TR, BR, BL) of `image` upright.
///
/// Returns `None` when the quad is too small or no projection exists; the
/// caller then uses the axis-aligned crop instead.
pub fn rectify(image: &RasterImage, corners: &Quad) -> Option<RasterImage> {
    let [tl, tr, br, bl] = *corners;
    let out_w = distance(tl, tr).max(distance(bl, br));
    let out_h = distance(tl, bl).max(distance(tr, br));
    if out_w < MIN_EDGE || out_h < MIN_EDGE || shoelace_area(corners) < MIN_EDGE * MIN_EDGE {
        debug!("Quad too small to rectify ({out_w:.0}x{out_h:.0})");
        return None;
    }

    let dest: Quad = [(0.0, 0.0), (out_w, 0.0), (out_w, out_h), (0.0, out_h)];
    let Some(projection) = Projection::from_control_points(*corners, dest) else {
        warn!("Failed to compute projective transform; keeping plain crop");
        return None;
    };

    let (w, h) = (out_w.round() as u32, out_h.round() as u32);
    let out = match image.as_dynamic() {
        DynamicImage::ImageLuma8(g) => {
            let mut out = GrayImage::new(w, h);
            warp_into(g, &projection, Interpolation::Bilinear, Luma([255]), &mut out);
            RasterImage::gray(out)
        }
        other => {
            let mut out = RgbImage::new(w, h);
            warp_into(
                &other.to_rgb8(),
                &projection,
                Interpolation::Bilinear,
                Rgb([255, 255, 255]),
                &mut out,
            );
            RasterImage::rgb(out)
        }
    };
    debug!("Rectified quad → {}x{}", w, h);
    Some(out)
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn shoelace_area(q: &Quad) -> f32 {
    let mut twice = 0.0;
    for i in 0..4 {
        let (a, b) = (q[i], q[(i + 1) % 4]);
        twice += a.0 * b.1 - b.0 * a.1;
    }
    twice.abs() / 2.0
}
