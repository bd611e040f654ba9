//! # Features Module
//!
//! Keypoint detection and description for pairwise image matching.
//!
//! FAST-9 corners scored by absolute contrast over the sampling circle,
//! 3x3 non-maximum suppression, then 256-bit binary descriptors sampled
//! from a smoothed patch with a fixed pseudo-random test pattern. The
//! pattern is generated from a constant seed, so descriptors are
//! deterministic across runs and machines.
//!
//! Rotation invariance is deliberately absent: consecutive panorama
//! frames are taken with near-identical camera roll, and orientation
//! from EXIF is already applied at load time.

use image::{GrayImage, RgbImage};

/// Detected corner, pixel coordinates in the raster it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; 32];

/// Keypoints and their descriptors for one image, index-aligned.
#[derive(Debug, Default)]
pub struct ImageFeatures {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl ImageFeatures {
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }
}

/// Intensity delta for the FAST corner test.
const FAST_THRESHOLD: i16 = 20;
/// Contiguous arc length required by FAST-9.
const FAST_ARC: usize = 9;
/// Strongest corners kept per image.
const MAX_KEYPOINTS: usize = 500;
/// Keypoints closer than this to a border cannot be described.
const PATCH_MARGIN: u32 = 17;
/// Descriptor test displacements stay within +/- this radius.
const PATCH_RADIUS: i32 = 15;

/// Bresenham circle of radius 3 used by the FAST test.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Detect keypoints and compute descriptors on a raster.
pub fn detect(image: &RgbImage) -> ImageFeatures {
    let gray = image::imageops::grayscale(image);
    let (width, height) = gray.dimensions();
    if width <= 2 * PATCH_MARGIN || height <= 2 * PATCH_MARGIN {
        return ImageFeatures::default();
    }

    let scores = fast_scores(&gray);
    let corners = non_max_suppressed(&scores, width, height);
    let smoothed = box_blur(&gray);
    let pattern = test_pattern();

    let mut features = ImageFeatures {
        keypoints: Vec::with_capacity(corners.len()),
        descriptors: Vec::with_capacity(corners.len()),
    };
    for (x, y, _) in corners {
        features.keypoints.push(Keypoint {
            x: x as f32,
            y: y as f32,
        });
        features
            .descriptors
            .push(describe(&smoothed, x, y, &pattern));
    }
    features
}

/// FAST-9 corner score per pixel; zero where the corner test fails.
fn fast_scores(gray: &GrayImage) -> Vec<u32> {
    let (width, height) = gray.dimensions();
    let data = gray.as_raw();
    let mut scores = vec![0u32; (width * height) as usize];

    for y in PATCH_MARGIN..height - PATCH_MARGIN {
        for x in PATCH_MARGIN..width - PATCH_MARGIN {
            let center = data[(y * width + x) as usize] as i16;
            let mut brighter = [false; 16];
            let mut darker = [false; 16];
            for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
                let sample =
                    data[((y as i32 + dy) as u32 * width + (x as i32 + dx) as u32) as usize] as i16;
                brighter[i] = sample >= center + FAST_THRESHOLD;
                darker[i] = sample <= center - FAST_THRESHOLD;
            }
            if has_arc(&brighter) || has_arc(&darker) {
                let mut score = 0u32;
                for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
                    if brighter[i] || darker[i] {
                        let sample = data
                            [((y as i32 + dy) as u32 * width + (x as i32 + dx) as u32) as usize]
                            as i16;
                        score += (sample - center).unsigned_abs() as u32;
                    }
                }
                scores[(y * width + x) as usize] = score;
            }
        }
    }
    scores
}

/// Whether the circular bool mask contains `FAST_ARC` contiguous trues.
fn has_arc(mask: &[bool; 16]) -> bool {
    let mut run = 0usize;
    // Walk the circle twice to handle wrap-around runs.
    for i in 0..32 {
        if mask[i % 16] {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// 3x3 non-maximum suppression, strongest `MAX_KEYPOINTS` kept.
fn non_max_suppressed(scores: &[u32], width: u32, height: u32) -> Vec<(u32, u32, u32)> {
    let mut corners = Vec::new();
    for y in PATCH_MARGIN..height - PATCH_MARGIN {
        for x in PATCH_MARGIN..width - PATCH_MARGIN {
            let score = scores[(y * width + x) as usize];
            if score == 0 {
                continue;
            }
            let mut is_max = true;
            'neighbors: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let neighbor =
                        scores[((y as i32 + dy) as u32 * width + (x as i32 + dx) as u32) as usize];
                    // Ties break toward the lexicographically first pixel.
                    if neighbor > score || (neighbor == score && (dy < 0 || (dy == 0 && dx < 0))) {
                        is_max = false;
                        break 'neighbors;
                    }
                }
            }
            if is_max {
                corners.push((x, y, score));
            }
        }
    }

    if corners.len() > MAX_KEYPOINTS {
        corners.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));
        corners.truncate(MAX_KEYPOINTS);
    }
    corners
}

/// One-pass 3x3 box blur; keypoints stay away from the border so the
/// unblurred edge ring never gets sampled.
fn box_blur(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let src = gray.as_raw();
    let mut out = src.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sum = 0u32;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    sum += src[((y as i32 + dy) as u32 * width + (x as i32 + dx) as u32) as usize]
                        as u32;
                }
            }
            out[(y * width + x) as usize] = (sum / 9) as u8;
        }
    }
    GrayImage::from_raw(width, height, out).unwrap_or_else(|| gray.clone())
}

/// Fixed pseudo-random displacement pairs for the 256 binary tests.
fn test_pattern() -> Vec<(i32, i32, i32, i32)> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    let span = (2 * PATCH_RADIUS + 1) as u64;
    (0..256)
        .map(|_| {
            let ax = (next() % span) as i32 - PATCH_RADIUS;
            let ay = (next() % span) as i32 - PATCH_RADIUS;
            let bx = (next() % span) as i32 - PATCH_RADIUS;
            let by = (next() % span) as i32 - PATCH_RADIUS;
            (ax, ay, bx, by)
        })
        .collect()
}

fn describe(smoothed: &GrayImage, x: u32, y: u32, pattern: &[(i32, i32, i32, i32)]) -> Descriptor {
    let width = smoothed.width();
    let data = smoothed.as_raw();
    let mut descriptor = [0u8; 32];
    for (bit, (ax, ay, bx, by)) in pattern.iter().enumerate() {
        let a = data[((y as i32 + ay) as u32 * width + (x as i32 + ax) as u32) as usize];
        let b = data[((y as i32 + by) as u32 * width + (x as i32 + bx) as u32) as usize];
        if a < b {
            descriptor[bit / 8] |= 1 << (bit % 8);
        }
    }
    descriptor
}

/// Hamming distance between two descriptors.
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Deterministic noise so corners exist everywhere.
    fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut state = seed | 1;
        image::ImageBuffer::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let v = (state % 255) as u8 + 1;
            Rgb([v, v.wrapping_mul(31), v.wrapping_mul(7)])
        })
    }

    #[test]
    fn flat_image_has_no_corners() {
        let flat = RgbImage::from_pixel(128, 128, Rgb([90, 90, 90]));
        assert!(detect(&flat).is_empty());
    }

    #[test]
    fn textured_image_has_corners_with_descriptors() {
        let features = detect(&noise_image(160, 120, 7));
        assert!(!features.is_empty());
        assert_eq!(features.keypoints.len(), features.descriptors.len());
        assert!(features.len() <= MAX_KEYPOINTS);
    }

    #[test]
    fn detection_is_deterministic() {
        let image = noise_image(120, 120, 11);
        let first = detect(&image);
        let second = detect(&image);
        assert_eq!(first.keypoints, second.keypoints);
        assert_eq!(first.descriptors, second.descriptors);
    }

    #[test]
    fn keypoints_respect_border_margin() {
        let features = detect(&noise_image(100, 100, 3));
        for kp in &features.keypoints {
            assert!(kp.x >= PATCH_MARGIN as f32 && kp.x < (100 - PATCH_MARGIN) as f32);
            assert!(kp.y >= PATCH_MARGIN as f32 && kp.y < (100 - PATCH_MARGIN) as f32);
        }
    }

    #[test]
    fn tiny_image_yields_nothing() {
        assert!(detect(&noise_image(20, 20, 5)).is_empty());
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let zero = [0u8; 32];
        let mut one = [0u8; 32];
        one[0] = 0b1010_1010;
        assert_eq!(hamming(&zero, &zero), 0);
        assert_eq!(hamming(&zero, &one), 4);
    }
}
