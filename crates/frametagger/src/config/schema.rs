use std::path::PathBuf;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::transform::CropBox;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub library_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default = "default_aspect_tolerance")]
    pub aspect_tolerance: f64,
    #[serde(default = "default_crop_box")]
    pub default_crop_box: CropBox,
    #[serde(default = "default_thumbnail_max_dimension")]
    pub thumbnail_max_dimension: u32,
    #[serde(default = "default_frame_jpeg_quality")]
    pub frame_jpeg_quality: u8,
    #[serde(default)]
    pub resample_filter: ResampleFilter,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Config {
    /// Config with every optional field at its default.
    pub fn with_library_directory<P: Into<PathBuf>>(library_directory: P) -> Self {
        Self {
            version: "1.0".to_string(),
            library_directory: library_directory.into().display().to_string(),
            database_path: None,
            canvas: CanvasConfig::default(),
            aspect_tolerance: default_aspect_tolerance(),
            default_crop_box: default_crop_box(),
            thumbnail_max_dimension: default_thumbnail_max_dimension(),
            frame_jpeg_quality: default_frame_jpeg_quality(),
            resample_filter: ResampleFilter::default(),
            jobs: JobsConfig::default(),
        }
    }

    pub fn library_path(&self) -> PathBuf {
        PathBuf::from(&self.library_directory)
    }

    /// Resolved database location, defaulting to `<library>/library.db`.
    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => self.library_path().join("library.db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl CanvasConfig {
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Seconds a job stays queryable after reaching a terminal status.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Seconds a non-terminal job may go without progress before eviction.
    #[serde(default = "default_orphan_timeout_secs")]
    pub orphan_timeout_secs: u64,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            orphan_timeout_secs: default_orphan_timeout_secs(),
            max_jobs: default_max_jobs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

fn default_aspect_tolerance() -> f64 {
    0.05
}

fn default_crop_box() -> CropBox {
    CropBox::DEFAULT
}

fn default_thumbnail_max_dimension() -> u32 {
    256
}

fn default_frame_jpeg_quality() -> u8 {
    90
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_orphan_timeout_secs() -> u64 {
    86_400
}

fn default_max_jobs() -> u64 {
    10_000
}
