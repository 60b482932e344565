use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::file::ImageFile;
use crate::error::DecodeError;

/// Bounding box and lossy quality for generated thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality in 0.0..=1.0
    pub quality: f32,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 1024,
            quality: 0.72,
        }
    }
}

/// Target size for a `width × height` image; never upscales, never collapses below 1px
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width.max(1), height.max(1));
    }
    let ratio = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let w = ((width as f64 * ratio).round() as u32).max(1);
    let h = ((height as f64 * ratio).round() as u32).max(1);
    (w, h)
}

/// Generate an embeddable JPEG thumbnail for an image file
///
/// Returns `Ok(None)` for non-image media types (callers treat that as "no photo").
/// Decode failures propagate.
pub fn thumbnail(file: &ImageFile, options: ThumbnailOptions) -> Result<Option<String>, DecodeError> {
    if !file.is_image() {
        return Ok(None);
    }

    // Decode once, format sniffed from content
    let img = image::load_from_memory(&file.bytes)?;
    let (w, h) = fit_within(img.width(), img.height(), options.max_width, options.max_height);

    let resized = if (w, h) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();
    let quality = (options.quality.clamp(0.01, 1.0) * 100.0).round() as u8;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    debug!(
        "📸 Generated thumbnail {}x{} ({}KB) for {:?}",
        rgb.width(),
        rgb.height(),
        jpeg.len() / 1024,
        file.name
    );
    Ok(Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg))))
}

/// Same as [`thumbnail`], run on the blocking pool since decoding is CPU-bound
pub async fn thumbnail_async(
    file: ImageFile,
    options: ThumbnailOptions,
) -> Result<Option<String>, DecodeError> {
    tokio::task::spawn_blocking(move || thumbnail(&file, options))
        .await
        .map_err(|e| DecodeError::Join(e.to_string()))?
}
