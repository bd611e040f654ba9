//! # Inpaint Module
//!
//! Filling of blank regions left by warping.
//!
//! Breadth-first frontier fill: blank pixels bordering filled content get
//! the average of their already-filled neighbors, level by level, until
//! the blank region is exhausted. Levels are resolved against the state
//! at the start of the level, so fill order inside a level cannot bias
//! the result.

use image::{GrayImage, RgbImage};
use tracing::warn;

/// Result of one inpainting run.
pub struct InpaintOutcome {
    pub image: RgbImage,
    /// Number of pixels that were blank and got filled.
    pub pixels_filled: u64,
}

/// Fill every mask-flagged pixel reachable from filled content.
///
/// `mask` is non-zero where the panorama is blank. A mask whose
/// dimensions do not match the raster is ignored (nothing is filled).
pub fn inpaint(pano: &RgbImage, mask: &GrayImage) -> InpaintOutcome {
    let (width, height) = pano.dimensions();
    if mask.dimensions() != (width, height) {
        warn!("inpainting mask dimensions do not match the panorama; skipping");
        return InpaintOutcome {
            image: pano.clone(),
            pixels_filled: 0,
        };
    }

    let mut image = pano.clone();
    let mut filled: Vec<bool> = mask.as_raw().iter().map(|&m| m == 0).collect();
    let mut pixels_filled = 0u64;

    let neighbors = |x: u32, y: u32| {
        let mut out = Vec::with_capacity(8);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                    out.push((nx as u32, ny as u32));
                }
            }
        }
        out
    };

    // Initial frontier: blank pixels touching filled content.
    let mut frontier: Vec<(u32, u32)> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if !filled[(y * width + x) as usize]
                && neighbors(x, y)
                    .iter()
                    .any(|&(nx, ny)| filled[(ny * width + nx) as usize])
            {
                frontier.push((x, y));
            }
        }
    }

    while !frontier.is_empty() {
        // Resolve this level from the pre-level state.
        let mut resolved = Vec::with_capacity(frontier.len());
        for &(x, y) in &frontier {
            let mut sum = [0u32; 3];
            let mut count = 0u32;
            for (nx, ny) in neighbors(x, y) {
                if filled[(ny * width + nx) as usize] {
                    let pixel = image.get_pixel(nx, ny);
                    for channel in 0..3 {
                        sum[channel] += pixel.0[channel] as u32;
                    }
                    count += 1;
                }
            }
            if count > 0 {
                let value = [
                    (sum[0] / count) as u8,
                    (sum[1] / count) as u8,
                    (sum[2] / count) as u8,
                ];
                resolved.push((x, y, value));
            }
        }

        for &(x, y, value) in &resolved {
            image.get_pixel_mut(x, y).0 = value;
            filled[(y * width + x) as usize] = true;
        }
        pixels_filled += resolved.len() as u64;

        // Next level: blank neighbors of what was just filled.
        let mut queued = vec![false; (width * height) as usize];
        let mut next = Vec::new();
        for &(x, y, _) in &resolved {
            for (nx, ny) in neighbors(x, y) {
                let index = (ny * width + nx) as usize;
                if !filled[index] && !queued[index] {
                    queued[index] = true;
                    next.push((nx, ny));
                }
            }
        }
        frontier = next;
    }

    InpaintOutcome {
        image,
        pixels_filled,
    }
}
