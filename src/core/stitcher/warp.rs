//! Inverse-mapped warping with feathered accumulation.
//!
//! Every source image is splatted onto a shared canvas accumulator: for
//! each canvas pixel the inverse homography gives the source location,
//! which is sampled bilinearly and blended in with a weight that ramps
//! down toward the source borders. Pixels no image reaches stay blank
//! and are flagged in the coverage mask.

use image::{GrayImage, RgbImage};
use nalgebra::Matrix3;
use rayon::prelude::*;

pub(crate) struct Accumulator {
    width: u32,
    height: u32,
    color: Vec<f32>,
    weight: Vec<f32>,
}

impl Accumulator {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: vec![0.0; (width * height * 3) as usize],
            weight: vec![0.0; (width * height) as usize],
        }
    }

    /// Blend one source image in, given the homography mapping source
    /// pixels onto canvas pixels. Returns false when the transform is
    /// not invertible.
    pub(crate) fn splat(
        &mut self,
        source: &RgbImage,
        to_canvas: &Matrix3<f64>,
        feather_size: u32,
    ) -> bool {
        let Some(to_source) = to_canvas.try_inverse() else {
            return false;
        };
        let (src_width, src_height) = source.dimensions();
        let src = source.as_raw();
        let width = self.width as usize;
        let feather = feather_size.max(1) as f32;

        self.color
            .par_chunks_mut(width * 3)
            .zip(self.weight.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (color_row, weight_row))| {
                for x in 0..width {
                    let cx = x as f64 + 0.5;
                    let cy = y as f64 + 0.5;
                    let w = to_source[(2, 0)] * cx + to_source[(2, 1)] * cy + to_source[(2, 2)];
                    if w.abs() < 1e-12 {
                        continue;
                    }
                    let sx = (to_source[(0, 0)] * cx
                        + to_source[(0, 1)] * cy
                        + to_source[(0, 2)])
                        / w
                        - 0.5;
                    let sy = (to_source[(1, 0)] * cx
                        + to_source[(1, 1)] * cy
                        + to_source[(1, 2)])
                        / w
                        - 0.5;
                    if sx < 0.0
                        || sy < 0.0
                        || sx > (src_width - 1) as f64
                        || sy > (src_height - 1) as f64
                    {
                        continue;
                    }

                    let (r, g, b) = bilinear(src, src_width, src_height, sx, sy);
                    let border = (sx.min(sy))
                        .min((src_width - 1) as f64 - sx)
                        .min((src_height - 1) as f64 - sy)
                        as f32;
                    let weight = ((border + 1.0) / feather).min(1.0);

                    color_row[x * 3] += r * weight;
                    color_row[x * 3 + 1] += g * weight;
                    color_row[x * 3 + 2] += b * weight;
                    weight_row[x] += weight;
                }
            });
        true
    }

    /// Resolve the accumulator into the blended raster and the blank
    /// mask (non-zero where no image contributed).
    pub(crate) fn finalize(self) -> (RgbImage, GrayImage) {
        let width = self.width;
        let height = self.height;
        let mut pano = RgbImage::new(width, height);
        let mut mask = GrayImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                let weight = self.weight[index];
                if weight > 0.0 {
                    let pixel = pano.get_pixel_mut(x, y);
                    for channel in 0..3 {
                        let value = self.color[index * 3 + channel] / weight;
                        pixel.0[channel] = value.round().clamp(0.0, 255.0) as u8;
                    }
                } else {
                    mask.get_pixel_mut(x, y).0[0] = 255;
                }
            }
        }
        (pano, mask)
    }
}

fn bilinear(src: &[u8], width: u32, height: u32, x: f64, y: f64) -> (f32, f32, f32) {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let at = |px: u32, py: u32, channel: usize| src[((py * width + px) * 3) as usize + channel] as f32;

    let mut out = [0.0f32; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let top = at(x0, y0, channel) * (1.0 - fx) + at(x1, y0, channel) * fx;
        let bottom = at(x0, y1, channel) * (1.0 - fx) + at(x1, y1, channel) * fx;
        *value = top * (1.0 - fy) + bottom * fy;
    }
    (out[0], out[1], out[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn identity_splat_covers_the_source_extent() {
        let mut acc = Accumulator::new(10, 10);
        assert!(acc.splat(&solid(10, 10, 200), &Matrix3::identity(), 1));
        let (pano, mask) = acc.finalize();
        assert_eq!(pano.get_pixel(5, 5).0, [200, 200, 200]);
        assert_eq!(mask.get_pixel(5, 5).0, [0]);
    }

    #[test]
    fn uncovered_pixels_are_masked_blank() {
        let mut acc = Accumulator::new(20, 10);
        // Source only covers the left half.
        assert!(acc.splat(&solid(10, 10, 100), &Matrix3::identity(), 1));
        let (pano, mask) = acc.finalize();
        assert_eq!(mask.get_pixel(2, 5).0, [0]);
        assert_eq!(mask.get_pixel(15, 5).0, [255]);
        assert_eq!(pano.get_pixel(15, 5).0, [0, 0, 0]);
    }

    #[test]
    fn translated_splat_lands_where_the_transform_says() {
        let mut acc = Accumulator::new(30, 10);
        let shift = Matrix3::new(1.0, 0.0, 18.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(acc.splat(&solid(10, 10, 50), &shift, 1));
        let (_, mask) = acc.finalize();
        assert_eq!(mask.get_pixel(2, 5).0, [255]);
        assert_eq!(mask.get_pixel(22, 5).0, [0]);
    }

    #[test]
    fn overlapping_splats_blend_between_the_inputs() {
        let mut acc = Accumulator::new(16, 8);
        let shift = Matrix3::new(1.0, 0.0, 8.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(acc.splat(&solid(12, 8, 40), &Matrix3::identity(), 4));
        assert!(acc.splat(&solid(12, 8, 240), &shift, 4));
        let (pano, _) = acc.finalize();
        let value = pano.get_pixel(10, 4).0[0];
        assert!(value > 40 && value < 240);
    }

    #[test]
    fn singular_transform_is_rejected() {
        let mut acc = Accumulator::new(4, 4);
        assert!(!acc.splat(&solid(4, 4, 10), &Matrix3::zeros(), 1));
    }
}
