//! Deterministic crop and scale of source images onto the display canvas.

mod crop_box;

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::error::TransformError;

pub use crop_box::{centered_rect, CropBox, PixelRect};

const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Source dimensions reported back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectInfo {
    pub width: u32,
    pub height: u32,
    pub aspect: f64,
}

impl AspectInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect: width as f64 / height as f64,
        }
    }
}

/// Crops and scales images onto one fixed output canvas with one pinned
/// resampling filter, so identical input always yields identical output.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    canvas: CanvasConfig,
    filter: FilterType,
    frame_quality: u8,
    thumbnail_max_dimension: u32,
}

impl TransformEngine {
    pub fn new(
        canvas: CanvasConfig,
        filter: FilterType,
        frame_quality: u8,
        thumbnail_max_dimension: u32,
    ) -> Self {
        Self {
            canvas,
            filter,
            frame_quality,
            thumbnail_max_dimension: thumbnail_max_dimension.max(1),
        }
    }

    pub fn target_aspect(&self) -> f64 {
        self.canvas.aspect()
    }

    /// Decodes uploaded bytes, sniffing the format from content.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TransformError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| TransformError::Decode(e.to_string()))?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage);
        }
        Ok(image)
    }

    /// Symmetrically trims the longer dimension to `target_aspect`, then
    /// scales to the canvas. Returns the frame and the applied box.
    pub fn center_crop_to_aspect(
        &self,
        image: &DynamicImage,
        target_aspect: f64,
    ) -> Result<(RgbImage, CropBox), TransformError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage);
        }

        let rect = centered_rect(width, height, target_aspect);
        let frame = self.scale_region(image, rect, self.canvas.width, self.canvas.height);
        Ok((frame, CropBox::from_pixels(rect, width, height)))
    }

    /// Crops the normalized `crop_box` out of the source and resamples it to
    /// exactly `target_w` x `target_h`.
    pub fn crop_and_scale(
        &self,
        image: &DynamicImage,
        crop_box: &CropBox,
        target_w: u32,
        target_h: u32,
    ) -> Result<RgbImage, TransformError> {
        crop_box.validate()?;
        if target_w == 0 || target_h == 0 {
            return Err(TransformError::EmptyImage);
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage);
        }

        let rect = crop_box.to_pixels(width, height);
        Ok(self.scale_region(image, rect, target_w, target_h))
    }

    /// `crop_and_scale` onto the configured canvas.
    pub fn frame(&self, image: &DynamicImage, crop_box: &CropBox) -> Result<RgbImage, TransformError> {
        self.crop_and_scale(image, crop_box, self.canvas.width, self.canvas.height)
    }

    fn scale_region(&self, image: &DynamicImage, rect: PixelRect, target_w: u32, target_h: u32) -> RgbImage {
        tracing::debug!(
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            target_w,
            target_h,
            "Scaling crop region"
        );
        image
            .crop_imm(rect.x, rect.y, rect.width, rect.height)
            .resize_exact(target_w, target_h, self.filter)
            .to_rgb8()
    }

    pub fn encode_frame(&self, frame: &RgbImage) -> Result<Vec<u8>, TransformError> {
        encode_jpeg(frame, self.frame_quality)
    }

    /// JPEG preview bounded by the configured maximum dimension, keeping
    /// the source aspect.
    pub fn thumbnail(&self, image: &DynamicImage) -> Result<Vec<u8>, TransformError> {
        let max = self.thumbnail_max_dimension;
        let preview = image.thumbnail(max, max).to_rgb8();
        encode_jpeg(&preview, THUMBNAIL_JPEG_QUALITY)
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode_image(image)
            .map_err(|e| TransformError::Encode(e.to_string()))?;
    }
    Ok(buf)
}

/// Inline `data:` URL for a JPEG thumbnail.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    )
}
