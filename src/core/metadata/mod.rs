//! # Metadata Module
//!
//! EXIF handling at the two points the pipeline touches it:
//! - at load time, the orientation tag decides how the decoded rasters are
//!   rotated before anything else sees them
//! - at export time, the source image's APP1 segment can be copied through
//!   into the exported JPEG so the panorama keeps capture metadata
//!
//! Metadata content is otherwise opaque to the pipeline.

use exif::{In, Reader, Tag};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// EXIF default orientation ("top-left", no transform needed).
pub const DEFAULT_ORIENTATION: u32 = 1;

/// Read the EXIF orientation tag (1-8) for a photo.
///
/// Missing files, missing EXIF, and missing tags all fall back to the
/// default orientation; orientation is never a reason to drop an image.
pub fn read_orientation(path: &Path) -> u32 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return DEFAULT_ORIENTATION,
    };

    let mut bufreader = BufReader::new(&file);
    let exif_reader = match Reader::new().read_from_container(&mut bufreader) {
        Ok(r) => r,
        Err(_) => return DEFAULT_ORIENTATION,
    };

    exif_reader
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|v| (1..=8).contains(v))
        .unwrap_or(DEFAULT_ORIENTATION)
}

/// Apply an EXIF orientation (1-8) to a decoded raster.
pub fn apply_orientation(image: image::DynamicImage, orientation: u32) -> image::DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Extract the raw EXIF APP1 segment (marker and length included) from a
/// JPEG file, if it has one.
pub fn read_exif_segment(path: &Path) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    find_app1(&bytes).map(|range| bytes[range].to_vec())
}

/// Splice an EXIF APP1 segment into freshly encoded JPEG bytes, right
/// after the SOI marker. Returns the input unchanged when it is not a
/// JPEG stream.
pub fn insert_exif_segment(mut jpeg: Vec<u8>, segment: &[u8]) -> Vec<u8> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        debug!("metadata copy skipped: target is not a JPEG stream");
        return jpeg;
    }
    let tail = jpeg.split_off(2);
    jpeg.extend_from_slice(segment);
    jpeg.extend_from_slice(&tail);
    jpeg
}

/// Locate the EXIF APP1 segment in a JPEG byte stream.
fn find_app1(bytes: &[u8]) -> Option<std::ops::Range<usize>> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Start of scan: entropy-coded data follows, no more APP segments.
        if marker == 0xDA {
            return None;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 || pos + 2 + length > bytes.len() {
            return None;
        }
        if marker == 0xE1 && bytes[pos + 4..].starts_with(b"Exif\0\0") {
            return Some(pos..pos + 2 + length);
        }
        pos += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn tall_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(2, 4))
    }

    #[test]
    fn orientation_six_rotates_ninety() {
        let rotated = apply_orientation(tall_image(), 6);
        assert_eq!((rotated.width(), rotated.height()), (4, 2));
    }

    #[test]
    fn default_orientation_is_identity() {
        let image = apply_orientation(tall_image(), 1);
        assert_eq!((image.width(), image.height()), (2, 4));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        assert_eq!(
            read_orientation(Path::new("/nonexistent/photo.jpg")),
            DEFAULT_ORIENTATION
        );
    }

    fn fake_jpeg_with_exif() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0, 4 payload bytes
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, 0x4A, 0x46, 0x49, 0x46]);
        // APP1 Exif, payload "Exif\0\0" + 2 bytes
        bytes.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x0A]);
        bytes.extend_from_slice(b"Exif\0\0");
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        // SOS
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        bytes
    }

    #[test]
    fn finds_app1_after_app0() {
        let bytes = fake_jpeg_with_exif();
        let range = find_app1(&bytes).unwrap();
        assert!(bytes[range].starts_with(&[0xFF, 0xE1]));
    }

    #[test]
    fn insert_places_segment_after_soi() {
        let segment = [0xFF, 0xE1, 0x00, 0x08, b'E', b'x', b'i', b'f', 0, 0];
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02];
        let spliced = insert_exif_segment(jpeg, &segment);
        assert_eq!(&spliced[..2], &[0xFF, 0xD8]);
        assert_eq!(&spliced[2..4], &[0xFF, 0xE1]);
        assert_eq!(&spliced[spliced.len() - 4..], &[0xFF, 0xDA, 0x00, 0x02]);
    }

    #[test]
    fn non_jpeg_stream_left_untouched() {
        let not_jpeg = vec![0x89, b'P', b'N', b'G'];
        let spliced = insert_exif_segment(not_jpeg.clone(), &[0xFF, 0xE1]);
        assert_eq!(spliced, not_jpeg);
    }
}
