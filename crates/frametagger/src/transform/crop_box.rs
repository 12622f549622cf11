use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Slack for floating point sums such as `0.3 + 0.7`.
const EDGE_EPSILON: f64 = 1e-9;

/// Normalized crop rectangle, all fields as fractions of the source size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    /// Suggested box when the user has to position the crop.
    pub const DEFAULT: CropBox = CropBox {
        x: 0.1,
        y: 0.1,
        width: 0.8,
        height: 0.8,
    };

    pub const FULL: CropBox = CropBox {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Checks `x, y >= 0`, `width, height > 0`, `x + width <= 1`, `y + height <= 1`.
    pub fn validate(&self) -> Result<(), TransformError> {
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(TransformError::InvalidCropBox(format!(
                    "{} is not a finite number",
                    name
                )));
            }
        }

        if self.x < 0.0 || self.y < 0.0 {
            return Err(TransformError::InvalidCropBox(format!(
                "origin ({}, {}) is negative",
                self.x, self.y
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(TransformError::InvalidCropBox(format!(
                "size {}x{} must be positive",
                self.width, self.height
            )));
        }
        if self.x + self.width > 1.0 + EDGE_EPSILON {
            return Err(TransformError::InvalidCropBox(format!(
                "x + width = {} exceeds 1",
                self.x + self.width
            )));
        }
        if self.y + self.height > 1.0 + EDGE_EPSILON {
            return Err(TransformError::InvalidCropBox(format!(
                "y + height = {} exceeds 1",
                self.y + self.height
            )));
        }

        Ok(())
    }

    /// Maps the box onto a `width` x `height` source. Edges are rounded to the
    /// nearest pixel and the result always covers at least one pixel.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let (x, w) = span_to_pixels(self.x, self.width, width);
        let (y, h) = span_to_pixels(self.y, self.height, height);
        PixelRect {
            x,
            y,
            width: w,
            height: h,
        }
    }

    /// Normalized form of a pixel rectangle.
    pub fn from_pixels(rect: PixelRect, width: u32, height: u32) -> Self {
        Self {
            x: rect.x as f64 / width as f64,
            y: rect.y as f64 / height as f64,
            width: rect.width as f64 / width as f64,
            height: rect.height as f64 / height as f64,
        }
    }
}

fn span_to_pixels(start: f64, len: f64, total: u32) -> (u32, u32) {
    let total_f = total as f64;
    let begin = (start * total_f).round().clamp(0.0, total_f - 1.0) as u32;
    let end = ((start + len) * total_f).round().clamp(0.0, total_f) as u32;
    let size = end.saturating_sub(begin).max(1);
    (begin, size)
}

/// Largest rectangle of `target_aspect` centered in the source, trimming the
/// longer dimension equally on both sides.
pub fn centered_rect(width: u32, height: u32, target_aspect: f64) -> PixelRect {
    let source_aspect = width as f64 / height as f64;

    if source_aspect > target_aspect {
        let new_width = ((height as f64) * target_aspect).round().clamp(1.0, width as f64) as u32;
        PixelRect {
            x: (width - new_width) / 2,
            y: 0,
            width: new_width,
            height,
        }
    } else {
        let new_height = ((width as f64) / target_aspect).round().clamp(1.0, height as f64) as u32;
        PixelRect {
            x: 0,
            y: (height - new_height) / 2,
            width,
            height: new_height,
        }
    }
}
