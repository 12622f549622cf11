use image::imageops::FilterType;

use crate::config::{CanvasConfig, Config};
use crate::transform::{CropBox, TransformEngine};

/// The slice of configuration the file pipeline reads.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub canvas: CanvasConfig,
    pub aspect_tolerance: f64,
    pub default_crop_box: CropBox,
    pub resample_filter: FilterType,
    pub frame_jpeg_quality: u8,
    pub thumbnail_max_dimension: u32,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            canvas: config.canvas,
            aspect_tolerance: config.aspect_tolerance,
            default_crop_box: config.default_crop_box,
            resample_filter: config.resample_filter.into(),
            frame_jpeg_quality: config.frame_jpeg_quality,
            thumbnail_max_dimension: config.thumbnail_max_dimension,
        }
    }

    pub fn transform_engine(&self) -> TransformEngine {
        TransformEngine::new(
            self.canvas,
            self.resample_filter,
            self.frame_jpeg_quality,
            self.thumbnail_max_dimension,
        )
    }
}
