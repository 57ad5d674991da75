//! Image optimization.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageEncoder, ImageFormat};
use rayon::prelude::*;
use serde::Deserialize;

use crate::step::{Asset, Step, StepError};

/// PNG compression effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

impl From<PngCompression> for CompressionType {
    fn from(value: PngCompression) -> Self {
        match value {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

/// Re-encodes PNG and JPEG images; other formats pass through untouched.
///
/// The smaller of the original and re-encoded bytes is kept, so running the
/// step never grows a file. PNGs are lossless unless a PNG quality is set.
#[derive(Debug, Clone)]
pub struct OptimizeImages {
    jpeg_quality: u8,
    png_compression: PngCompression,
    png_quality: Option<u8>,
}

impl OptimizeImages {
    pub fn new(jpeg_quality: u8, png_compression: PngCompression) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
            png_compression,
            png_quality: None,
        }
    }

    /// Lossy PNG output: color channels are reduced to fewer bits before
    /// encoding, fewer the lower the quality. Alpha is left alone.
    pub fn with_png_quality(mut self, quality: Option<u8>) -> Self {
        self.png_quality = quality.map(|q| q.clamp(1, 100));
        self
    }

    fn optimize(&self, mut asset: Asset) -> Result<Asset, StepError> {
        let format = match ImageFormat::from_path(&asset.relative) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
            _ => {
                tracing::debug!("Passing through {}", asset.relative.display());
                return Ok(asset);
            }
        };

        let decoded = image::load_from_memory_with_format(&asset.contents, format)
            .map_err(|e| StepError::new(&asset.source, format!("cannot decode image: {}", e)))?;

        let decoded = match (format, self.png_quality) {
            (ImageFormat::Png, Some(quality)) => posterize(decoded, quality),
            _ => decoded,
        };

        let mut encoded = Vec::new();
        let result = match format {
            ImageFormat::Png => PngEncoder::new_with_quality(
                &mut encoded,
                self.png_compression.into(),
                FilterType::Adaptive,
            )
            .write_image(
                decoded.as_bytes(),
                decoded.width(),
                decoded.height(),
                decoded.color(),
            ),
            _ => JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
                .encode_image(&decoded.to_rgb8()),
        };

        match result {
            Ok(()) if encoded.len() < asset.contents.len() => {
                tracing::debug!(
                    "Optimized {}: {} -> {} bytes",
                    asset.relative.display(),
                    asset.contents.len(),
                    encoded.len()
                );
                asset.contents = encoded;
            }
            Ok(()) => {}
            Err(e) => {
                tracing::debug!("Keeping original {}: {}", asset.relative.display(), e);
            }
        }

        Ok(asset)
    }
}

/// Keep the top `2 + quality * 6 / 100` bits of every color channel.
fn posterize(image: DynamicImage, quality: u8) -> DynamicImage {
    let bits = 2 + u32::from(quality) * 6 / 100;
    let mask = !u8::MAX.checked_shr(bits).unwrap_or(0);

    if image.color().has_alpha() {
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            pixel.0[..3].iter_mut().for_each(|c| *c &= mask);
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = image.to_rgb8();
        for pixel in rgb.pixels_mut() {
            pixel.0.iter_mut().for_each(|c| *c &= mask);
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

impl Default for OptimizeImages {
    fn default() -> Self {
        Self::new(90, PngCompression::Best)
    }
}

impl Step for OptimizeImages {
    fn name(&self) -> &str {
        "optimize-images"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        assets
            .into_par_iter()
            .map(|asset| self.optimize(asset))
            .collect()
    }
}
