//! Image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG files (1.5-2x faster than image crate),
//! falls back to the image crate for everything else. High-bit-depth
//! sources (16-bit TIFF/PNG, typical for raw converter output) are
//! flagged so previews can be range-normalized for display.

use crate::error::LoadError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::fs;
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Input formats the decoder special-cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Jpeg,
    Png,
    Tiff,
    Other,
}

impl InputFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("jpg" | "jpeg") => Self::Jpeg,
            Some("png") => Self::Png,
            Some("tif" | "tiff") => Self::Tiff,
            _ => Self::Other,
        }
    }
}

/// A decoded raster plus what we learned about its source.
pub struct DecodedRaster {
    pub image: DynamicImage,
    /// High bit depth source ("raw-like"); previews need range
    /// normalization before display.
    pub is_raw: bool,
}

/// Decode an image from a file path using the fastest available decoder.
///
/// - JPEG: zune-jpeg, falling back to the image crate on failure
/// - everything else: image crate
pub fn decode(path: &Path) -> Result<DecodedRaster, LoadError> {
    let raster = match InputFormat::from_path(path) {
        InputFormat::Jpeg => decode_jpeg(path).or_else(|_| decode_fallback(path))?,
        _ => decode_fallback(path)?,
    };
    if raster.image.width() == 0 || raster.image.height() == 0 {
        return Err(LoadError::EmptyImage {
            path: path.to_path_buf(),
        });
    }
    Ok(raster)
}

/// Fast JPEG decoding using zune-jpeg
fn decode_jpeg(path: &Path) -> Result<DecodedRaster, LoadError> {
    let file_bytes = fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(&file_bytes, options);

    let pixels = decoder.decode().map_err(|e| LoadError::Decode {
        path: path.to_path_buf(),
        reason: format!("zune-jpeg decode failed: {:?}", e),
    })?;

    let info = decoder.info().ok_or_else(|| LoadError::Decode {
        path: path.to_path_buf(),
        reason: "Failed to get image info".to_string(),
    })?;

    let width = info.width as u32;
    let height = info.height as u32;
    let out_colorspace = decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB);

    let image = match out_colorspace {
        ColorSpace::RGB => {
            let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: "Failed to create RGB buffer".to_string(),
                })?;
            DynamicImage::ImageRgb8(buffer)
        }
        ColorSpace::RGBA => {
            let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: "Failed to create RGBA buffer".to_string(),
                })?;
            DynamicImage::ImageRgba8(buffer)
        }
        ColorSpace::Luma => {
            let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: "Failed to create Luma buffer".to_string(),
                })?;
            DynamicImage::ImageLuma8(buffer)
        }
        _ => return decode_fallback(path),
    };

    Ok(DecodedRaster {
        image,
        is_raw: false,
    })
}

/// Fallback to the image crate for non-JPEG formats
fn decode_fallback(path: &Path) -> Result<DecodedRaster, LoadError> {
    let image = image::open(path).map_err(|e| LoadError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let is_raw = is_high_bit_depth(&image);
    Ok(DecodedRaster { image, is_raw })
}

fn is_high_bit_depth(image: &DynamicImage) -> bool {
    matches!(
        image,
        DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgb32F(_)
            | DynamicImage::ImageRgba32F(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_jpeg() {
        assert_eq!(
            InputFormat::from_path(Path::new("photo.jpg")),
            InputFormat::Jpeg
        );
        assert_eq!(
            InputFormat::from_path(Path::new("photo.JPEG")),
            InputFormat::Jpeg
        );
    }

    #[test]
    fn format_detection_tiff() {
        assert_eq!(
            InputFormat::from_path(Path::new("scan.tif")),
            InputFormat::Tiff
        );
        assert_eq!(
            InputFormat::from_path(Path::new("scan.TIFF")),
            InputFormat::Tiff
        );
    }

    #[test]
    fn format_detection_other() {
        assert_eq!(
            InputFormat::from_path(Path::new("photo.bmp")),
            InputFormat::Other
        );
        assert_eq!(InputFormat::from_path(Path::new("photo")), InputFormat::Other);
    }

    #[test]
    fn sixteen_bit_counts_as_raw_like() {
        let image = DynamicImage::ImageRgb16(image::ImageBuffer::new(2, 2));
        assert!(is_high_bit_depth(&image));

        let image = DynamicImage::ImageRgb8(image::ImageBuffer::new(2, 2));
        assert!(!is_high_bit_depth(&image));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let result = decode(Path::new("/nonexistent/image.png"));
        assert!(result.is_err());
    }
}
