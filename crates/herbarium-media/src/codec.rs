//! Image Codec Adapter.
//!
//! Turns a raw upload into a primary variant (fit inside a bounding box,
//! never enlarged) and a square crop-to-fill thumbnail, both re-encoded as
//! lossy WebP at fixed qualities. Pure CPU work; callers run it on the
//! blocking pool.

use herbarium_shared::constants::{
    PRIMARY_MAX_HEIGHT, PRIMARY_MAX_WIDTH, PRIMARY_WEBP_QUALITY, THUMBNAIL_HEIGHT,
    THUMBNAIL_WEBP_QUALITY, THUMBNAIL_WIDTH,
};
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::MediaError;

/// Geometry and encoder quality of the two variants produced for every upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageConfig {
    pub primary_max_width: u32,
    pub primary_max_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub primary_quality: f32,
    pub thumbnail_quality: f32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            primary_max_width: PRIMARY_MAX_WIDTH,
            primary_max_height: PRIMARY_MAX_HEIGHT,
            thumbnail_width: THUMBNAIL_WIDTH,
            thumbnail_height: THUMBNAIL_HEIGHT,
            primary_quality: PRIMARY_WEBP_QUALITY,
            thumbnail_quality: THUMBNAIL_WEBP_QUALITY,
        }
    }
}

/// Output of [`ImageCodec::process`].
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub primary: Vec<u8>,
    pub primary_width: u32,
    pub primary_height: u32,
    pub thumbnail: Vec<u8>,
    pub original_size: u64,
    pub original_width: u32,
    pub original_height: u32,
}

impl ProcessedImage {
    pub fn compression_ratio(&self) -> String {
        compression_ratio(self.original_size, self.primary.len() as u64)
    }
}

/// `(1 - output/input) * 100` with one decimal and a `%` suffix.
pub fn compression_ratio(input_size: u64, output_size: u64) -> String {
    if input_size == 0 {
        return "0.0%".to_string();
    }
    let ratio = (1.0 - output_size as f64 / input_size as f64) * 100.0;
    format!("{ratio:.1}%")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec {
    config: ImageConfig,
}

impl ImageCodec {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, data: &[u8]) -> Result<ProcessedImage, MediaError> {
        let img =
            image::load_from_memory(data).map_err(|e| MediaError::CorruptImage(e.to_string()))?;

        let original_width = img.width();
        let original_height = img.height();

        let cfg = &self.config;
        let primary = if original_width > cfg.primary_max_width
            || original_height > cfg.primary_max_height
        {
            img.resize(cfg.primary_max_width, cfg.primary_max_height, FilterType::Lanczos3)
        } else {
            img.clone()
        };
        let thumbnail =
            img.resize_to_fill(cfg.thumbnail_width, cfg.thumbnail_height, FilterType::Lanczos3);

        Ok(ProcessedImage {
            primary_width: primary.width(),
            primary_height: primary.height(),
            primary: encode_webp(&primary, cfg.primary_quality)?,
            thumbnail: encode_webp(&thumbnail, cfg.thumbnail_quality)?,
            original_size: data.len() as u64,
            original_width,
            original_height,
        })
    }
}

fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, MediaError> {
    let rgba = img.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode_simple(false, quality)
        .map_err(|e| MediaError::Encode(format!("{e:?}")))?;
    Ok(encoded.to_vec())
}
