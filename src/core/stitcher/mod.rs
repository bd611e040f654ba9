//! # Stitcher Module
//!
//! The stitching engine: turn an ordered chain of overlapping images
//! into one blended raster.
//!
//! Features are re-detected on the requested resolution tier, consecutive
//! homographies are estimated along the chain and composed onto the
//! middle image as the reference frame, canvas bounds come from the
//! projected image corners, and every image is warped in with feathered
//! blending. Failures are reported through [`StitchError`]; the pipeline
//! maps them onto the caller-visible status code.

pub mod crop;
mod warp;

pub use crop::{auto_crop, RelativeRect};

use crate::core::features;
use crate::core::matching;
use image::{GrayImage, RgbImage};
use nalgebra::Matrix3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Stitching knobs that select algorithm behavior (not output format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchAlgorithmOptions {
    /// Width of the blending ramp at source image borders, in pixels.
    pub feather_size: u32,
    /// Upper bound for either canvas dimension; geometry that projects
    /// beyond this fails rather than allocating absurd rasters.
    pub max_pano_dimension: u32,
}

impl Default for StitchAlgorithmOptions {
    fn default() -> Self {
        Self {
            feather_size: 32,
            max_pano_dimension: 16384,
        }
    }
}

/// Why a stitch produced no raster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    #[error("not enough images to stitch a panorama")]
    NotEnoughImages,

    #[error("homography estimation failed between images {from} and {to}")]
    HomographyEstimation { from: usize, to: usize },

    #[error("panorama geometry adjustment failed: {0}")]
    CameraAdjustment(String),
}

/// A stitched raster plus its blank-coverage mask (non-zero = no image
/// reached that pixel).
#[derive(Debug)]
pub struct StitchedPano {
    pub pano: RgbImage,
    pub mask: GrayImage,
}

/// Stitch an ordered chain of overlapping images.
pub fn stitch(
    images: &[&RgbImage],
    options: &StitchAlgorithmOptions,
) -> Result<StitchedPano, StitchError> {
    if images.len() < 2 {
        return Err(StitchError::NotEnoughImages);
    }

    let detected: Vec<_> = images.par_iter().map(|image| features::detect(image)).collect();

    // Homography i -> i+1 along the chain.
    let mut chain = Vec::with_capacity(images.len() - 1);
    for i in 0..images.len() - 1 {
        let h = matching::pairwise_homography(&detected[i], &detected[i + 1]).ok_or(
            StitchError::HomographyEstimation {
                from: i,
                to: i + 1,
            },
        )?;
        chain.push(h);
    }

    // Compose everything onto the middle image as the reference frame.
    let reference = images.len() / 2;
    let mut to_reference = vec![Matrix3::identity(); images.len()];
    for i in (0..reference).rev() {
        to_reference[i] = to_reference[i + 1] * chain[i];
    }
    for i in reference + 1..images.len() {
        let inverse = chain[i - 1]
            .try_inverse()
            .ok_or(StitchError::HomographyEstimation { from: i - 1, to: i })?;
        to_reference[i] = to_reference[i - 1] * inverse;
    }

    let (offset, width, height) = canvas_bounds(images, &to_reference, options)?;

    let mut accumulator = warp::Accumulator::new(width, height);
    for (image, transform) in images.iter().zip(&to_reference) {
        let to_canvas = offset * transform;
        if !accumulator.splat(image, &to_canvas, options.feather_size) {
            return Err(StitchError::CameraAdjustment(
                "image transform is not invertible".to_string(),
            ));
        }
    }

    let (pano, mask) = accumulator.finalize();
    debug!(
        width,
        height,
        images = images.len(),
        "stitched panorama canvas"
    );
    Ok(StitchedPano { pano, mask })
}

/// Project all image corners through their transforms and derive the
/// canvas translation and size.
fn canvas_bounds(
    images: &[&RgbImage],
    transforms: &[Matrix3<f64>],
    options: &StitchAlgorithmOptions,
) -> Result<(Matrix3<f64>, u32, u32), StitchError> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (image, transform) in images.iter().zip(transforms) {
        let w = image.width() as f64;
        let h = image.height() as f64;
        for corner in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
            let projected = matching::homography::project(transform, corner).ok_or_else(|| {
                StitchError::CameraAdjustment("image corner projects to infinity".to_string())
            })?;
            min_x = min_x.min(projected.0);
            min_y = min_y.min(projected.1);
            max_x = max_x.max(projected.0);
            max_y = max_y.max(projected.1);
        }
    }

    let width = (max_x - min_x).ceil();
    let height = (max_y - min_y).ceil();
    let limit = options.max_pano_dimension as f64;
    if !(1.0..=limit).contains(&width) || !(1.0..=limit).contains(&height) {
        return Err(StitchError::CameraAdjustment(format!(
            "canvas {width}x{height} exceeds the configured bounds"
        )));
    }

    let offset = Matrix3::new(1.0, 0.0, -min_x, 0.0, 1.0, -min_y, 0.0, 0.0, 1.0);
    Ok((offset, width as u32, height as u32))
}
