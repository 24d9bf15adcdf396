//! Image loading with format detection and dimension limits.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

use super::validate::FileCheck;
use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Loads input images, enforcing the configured limits.
pub struct ImageLoader {
    check: FileCheck,
    limits: LimitsConfig,
}

/// A successfully loaded image.
#[derive(Debug)]
pub struct LoadedImage {
    pub image: DynamicImage,
    /// Format detected from the file contents
    pub format: ImageFormat,
    pub file_size: u64,
}

impl ImageLoader {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            check: FileCheck::new(limits.clone()),
            limits,
        }
    }

    /// Check, read and decode one file.
    pub fn load(&self, path: &Path) -> Result<LoadedImage, PipelineError> {
        self.check.check(path)?;
        let bytes = std::fs::read(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {}", e),
        })?;
        let loaded = Self::decode_bytes(bytes, path)?;

        let (width, height) = (loaded.image.width(), loaded.image.height());
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        tracing::debug!(
            path = %path.display(),
            width,
            height,
            color = ?loaded.image.color(),
            "Loaded image"
        );
        Ok(loaded)
    }

    /// Decode from memory, trusting the contents over the extension.
    fn decode_bytes(bytes: Vec<u8>, path: &Path) -> Result<LoadedImage, PipelineError> {
        let file_size = bytes.len() as u64;
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let format = match reader.format() {
            Some(f) => f,
            None => ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })?,
        };
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(LoadedImage {
            image: to_8bit(image),
            format,
            file_size,
        })
    }
}

/// Narrow 16-bit and float samples to 8 bits, keeping the channel layout.
fn to_8bit(image: DynamicImage) -> DynamicImage {
    use DynamicImage::*;

    match image {
        ImageLuma8(_) | ImageLumaA8(_) | ImageRgb8(_) | ImageRgba8(_) => image,
        ImageLuma16(_) => ImageLuma8(image.to_luma8()),
        ImageLumaA16(_) => ImageLumaA8(image.to_luma_alpha8()),
        ImageRgb16(_) | ImageRgb32F(_) => ImageRgb8(image.to_rgb8()),
        _ if image.color().has_alpha() => ImageRgba8(image.to_rgba8()),
        _ => ImageRgb8(image.to_rgb8()),
    }
}
