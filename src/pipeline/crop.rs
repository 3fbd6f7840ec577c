//! Crop regions and the manual crop applicator.
//!
//! Bounds are validated in two places. [`CropBounds::new`] rejects regions
//! that are inverted, empty or not finite, no matter the image. [`apply_crop`]
//! then clamps the region to the image it is applied to, because a UI slider
//! routinely produces values a hair past the edge, and only fails when
//! nothing is left after clamping.

use crate::document::RasterImage;
use crate::error::{Axis, CropError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A rectangle in decoded-image pixel space.
///
/// `top`/`left` are inclusive, `bottom`/`right` exclusive. Values are `f64`
/// so UI sliders can pass fractional pixels straight through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBounds {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl CropBounds {
    /// Build bounds, requiring `top < bottom` and `left < right`.
    pub fn new(top: f64, bottom: f64, left: f64, right: f64) -> Result<Self, CropError> {
        let b = Self {
            top,
            bottom,
            left,
            right,
        };
        b.validate()?;
        Ok(b)
    }

    /// Bounds given as fractions of the image size (`0.0..=1.0`).
    pub fn from_fractions(
        top: f64,
        bottom: f64,
        left: f64,
        right: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, CropError> {
        let (w, h) = (f64::from(width), f64::from(height));
        Self::new(top * h, bottom * h, left * w, right * w)
    }

    /// Re-check the invariant. Deserialised values bypass [`CropBounds::new`].
    pub fn validate(&self) -> Result<(), CropError> {
        check_axis(Axis::Vertical, self.top, self.bottom)?;
        check_axis(Axis::Horizontal, self.left, self.right)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another rectangle.
    pub fn iou(&self, other: &CropBounds) -> f64 {
        let inter = CropBounds {
            top: self.top.max(other.top),
            bottom: self.bottom.min(other.bottom),
            left: self.left.max(other.left),
            right: self.right.min(other.right),
        }
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer pixel rectangle `(x, y, w, h)` after clamping to the image.
    ///
    /// Fractional edges expand outward so no selected pixel is lost.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Result<(u32, u32, u32, u32), CropError> {
        self.validate()?;
        let clamp = |v: f64, max: u32| v.clamp(0.0, f64::from(max));
        let x0 = clamp(self.left, width).floor() as u32;
        let x1 = clamp(self.right, width).ceil() as u32;
        let y0 = clamp(self.top, height).floor() as u32;
        let y1 = clamp(self.bottom, height).ceil() as u32;
        if x1 <= x0 || y1 <= y0 {
            return Err(CropError::OutsideImage { width, height });
        }
        Ok((x0, y0, x1 - x0, y1 - y0))
    }
}

fn check_axis(axis: Axis, start: f64, end: f64) -> Result<(), CropError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(CropError::NotFinite { axis });
    }
    if start >= end {
        return Err(CropError::Inverted { axis, start, end });
    }
    Ok(())
}

/// Crop `image` to `bounds`, clamping to its extents.
///
/// Returns a new raster; the input is left untouched.
pub fn apply_crop(image: &RasterImage, bounds: &CropBounds) -> Result<RasterImage, CropError> {
    let (x, y, w, h) = bounds.to_pixel_rect(image.width(), image.height())?;
    debug!(
        "Cropping {}x{} → {}x{} at ({}, {})",
        image.width(),
        image.height(),
        w,
        h,
        x,
        y
    );
    Ok(RasterImage::from_dynamic(image.as_dynamic().crop_imm(x, y, w, h)))
}
