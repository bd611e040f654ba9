//! Automatic cropping of warped panoramas.
//!
//! Warping leaves irregular blank borders around the stitched content.
//! [`auto_crop`] finds the largest axis-aligned rectangle made entirely
//! of covered pixels, expressed in relative coordinates so it applies to
//! any resolution tier of the same panorama.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in relative coordinates, each side in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RelativeRect {
    /// The whole image.
    pub fn full() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 1.0,
            bottom: 1.0,
        }
    }

    /// Convert to a pixel rectangle `(x, y, width, height)` on an image
    /// of the given dimensions. Degenerate rects yield zero area.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.left.clamp(0.0, 1.0) * width as f32).round() as u32;
        let y0 = (self.top.clamp(0.0, 1.0) * height as f32).round() as u32;
        let x1 = (self.right.clamp(0.0, 1.0) * width as f32).round() as u32;
        let y1 = (self.bottom.clamp(0.0, 1.0) * height as f32).round() as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self::full()
    }
}

/// Largest fully-covered rectangle in a blank-mask.
///
/// `mask` marks blank pixels non-zero (the convention produced by the
/// blending accumulator). Returns `None` when nothing is covered.
pub fn auto_crop(mask: &GrayImage) -> Option<RelativeRect> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let data = mask.as_raw();

    // Classic histogram-stack sweep: row by row, track for every column
    // the run of covered pixels ending at this row, then find the best
    // rectangle in that histogram.
    let mut heights = vec![0u32; width as usize];
    let mut best_area = 0u64;
    let mut best = (0u32, 0u32, 0u32, 0u32); // x, y, w, h

    for y in 0..height {
        for x in 0..width as usize {
            if data[y as usize * width as usize + x] == 0 {
                heights[x] += 1;
            } else {
                heights[x] = 0;
            }
        }

        let mut stack: Vec<(usize, u32)> = Vec::new();
        for x in 0..=width as usize {
            let current = if x < width as usize { heights[x] } else { 0 };
            let mut start = x;
            while let Some(&(left, h)) = stack.last() {
                if h <= current {
                    break;
                }
                stack.pop();
                let rect_width = (x - left) as u64;
                let area = rect_width * h as u64;
                if area > best_area {
                    best_area = area;
                    best = (left as u32, y + 1 - h, rect_width as u32, h);
                }
                start = left;
            }
            if stack.last().map_or(true, |&(_, h)| h < current) {
                stack.push((start, current));
            }
        }
    }

    if best_area == 0 {
        return None;
    }

    let (x, y, w, h) = best;
    Some(RelativeRect {
        left: x as f32 / width as f32,
        top: y as f32 / height as f32,
        right: (x + w) as f32 / width as f32,
        bottom: (y + h) as f32 / height as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_from_rows(rows: &[&[u8]]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            Luma([rows[y as usize][x as usize]])
        })
    }

    #[test]
    fn fully_covered_mask_crops_to_everything() {
        let mask = GrayImage::new(8, 4);
        let rect = auto_crop(&mask).unwrap();
        assert_eq!(rect, RelativeRect::full());
    }

    #[test]
    fn fully_blank_mask_has_no_crop() {
        let mask = GrayImage::from_pixel(8, 4, Luma([255]));
        assert!(auto_crop(&mask).is_none());
    }

    #[test]
    fn blank_corner_is_trimmed() {
        // 4x4 with the top-left 2x2 blank: the best rectangle is either
        // the right 2x4 or the bottom 4x2, both area 8.
        let mask = mask_from_rows(&[
            &[255, 255, 0, 0],
            &[255, 255, 0, 0],
            &[0, 0, 0, 0],
            &[0, 0, 0, 0],
        ]);
        let rect = auto_crop(&mask).unwrap();
        let (_, _, w, h) = rect.to_pixels(4, 4);
        assert_eq!(w * h, 8);
    }

    #[test]
    fn irregular_border_keeps_interior() {
        let mask = mask_from_rows(&[
            &[255, 255, 255, 255, 255],
            &[255, 0, 0, 0, 255],
            &[255, 0, 0, 0, 255],
            &[255, 255, 255, 255, 255],
        ]);
        let rect = auto_crop(&mask).unwrap();
        assert_eq!(rect.to_pixels(5, 4), (1, 1, 3, 2));
    }

    #[test]
    fn relative_rect_pixel_roundtrip() {
        let rect = RelativeRect {
            left: 0.25,
            top: 0.0,
            right: 0.75,
            bottom: 0.5,
        };
        assert_eq!(rect.to_pixels(100, 80), (25, 0, 50, 40));
    }
}
