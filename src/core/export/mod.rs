//! # Export Module
//!
//! Encoding stitched panoramas to disk: format selection by extension,
//! JPEG quality / PNG compression options, optional crop, and optional
//! EXIF copy-through from a source image.
//!
//! Failures here never cross the stage boundary as errors; the pipeline
//! converts them into an [`ExportResult`](crate::core::pipeline::ExportResult)
//! with no export path.

use crate::core::metadata;
use crate::core::stitcher::RelativeRect;
use crate::error::ExportError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// PNG encoder effort/size trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Output encoding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    pub png_compression: PngCompression,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            png_compression: PngCompression::Default,
        }
    }
}

/// Encode a panorama and write it to `path`.
///
/// `crop` is applied first when present. `metadata_source` names an image
/// whose EXIF APP1 segment is copied into the exported file; it only
/// applies to JPEG targets and is skipped silently when the source has no
/// EXIF data.
pub fn write_pano(
    pano: &RgbImage,
    path: &Path,
    compression: &CompressionOptions,
    crop: Option<&RelativeRect>,
    metadata_source: Option<&Path>,
) -> Result<(), ExportError> {
    let cropped;
    let raster = match crop {
        Some(rect) => {
            let (x, y, width, height) = rect.to_pixels(pano.width(), pano.height());
            if width == 0 || height == 0 {
                return Err(ExportError::InvalidCrop);
            }
            cropped = image::imageops::crop_imm(pano, x, y, width, height).to_image();
            &cropped
        }
        None => pano,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let bytes = match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut encoded = encode_jpeg(raster, path, compression.jpeg_quality)?;
            if let Some(source) = metadata_source {
                match metadata::read_exif_segment(source) {
                    Some(segment) => encoded = metadata::insert_exif_segment(encoded, &segment),
                    None => debug!(source = %source.display(), "no EXIF segment to copy"),
                }
            }
            encoded
        }
        "png" => encode_png(raster, path, compression.png_compression)?,
        "tif" | "tiff" => encode_tiff(raster, path)?,
        _ => {
            return Err(ExportError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    std::fs::write(path, bytes).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn encode_jpeg(raster: &RgbImage, path: &Path, quality: u8) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ExportError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(buffer.into_inner())
}

fn encode_png(
    raster: &RgbImage,
    path: &Path,
    compression: PngCompression,
) -> Result<Vec<u8>, ExportError> {
    let level = match compression {
        PngCompression::Fast => png::CompressionType::Fast,
        PngCompression::Default => png::CompressionType::Default,
        PngCompression::Best => png::CompressionType::Best,
    };
    let mut buffer = Cursor::new(Vec::new());
    let encoder = PngEncoder::new_with_quality(&mut buffer, level, png::FilterType::Adaptive);
    encoder
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ExportError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(buffer.into_inner())
}

fn encode_tiff(raster: &RgbImage, path: &Path) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::tiff::TiffEncoder::new(Cursor::new(&mut bytes));
    encoder
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ExportError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(bytes)
}
