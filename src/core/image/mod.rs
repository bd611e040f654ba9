//! # Image Module
//!
//! Loading of input photographs into the [`Image`] aggregate: decode the
//! full-resolution raster, derive a preview, apply the EXIF orientation,
//! and (optionally, attached later by the pipeline) detect keypoints.
//!
//! An [`Image`] is immutable once built. Rasters and features sit behind
//! `Arc` so cloning an image into a worker task is cheap.

mod decode;
mod preview;

pub use decode::{DecodedRaster, InputFormat};
pub use preview::{shrink_to, to_display_rgb};

use crate::core::features::ImageFeatures;
use crate::core::metadata;
use crate::error::LoadError;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One loaded input photograph.
///
/// Created during the Loading stage, destroyed with the
/// [`StitcherData`](crate::core::pipeline::StitcherData) that owns it.
#[derive(Debug, Clone)]
pub struct Image {
    path: PathBuf,
    full_res: Arc<RgbImage>,
    preview: Arc<RgbImage>,
    features: Arc<ImageFeatures>,
    orientation: u32,
    is_raw: bool,
}

impl Image {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn full_res(&self) -> &RgbImage {
        &self.full_res
    }

    pub fn preview(&self) -> &RgbImage {
        &self.preview
    }

    pub fn keypoints(&self) -> &[crate::core::features::Keypoint] {
        &self.features.keypoints
    }

    pub fn descriptors(&self) -> &[crate::core::features::Descriptor] {
        &self.features.descriptors
    }

    pub(crate) fn features(&self) -> &Arc<ImageFeatures> {
        &self.features
    }

    /// EXIF orientation of the source file (already applied to the
    /// rasters held here).
    pub fn orientation(&self) -> u32 {
        self.orientation
    }

    /// Whether the source was high bit depth ("raw-like").
    pub fn is_raw(&self) -> bool {
        self.is_raw
    }
}

/// An image that has been decoded but not yet (maybe) given features.
/// Internal to the Loading stage.
#[derive(Debug, Clone)]
pub(crate) struct LoadedImage {
    pub(crate) path: PathBuf,
    pub(crate) full_res: Arc<RgbImage>,
    pub(crate) preview: Arc<RgbImage>,
    pub(crate) orientation: u32,
    pub(crate) is_raw: bool,
}

impl LoadedImage {
    pub(crate) fn into_image(self, features: Arc<ImageFeatures>) -> Image {
        Image {
            path: self.path,
            full_res: self.full_res,
            preview: self.preview,
            features,
            orientation: self.orientation,
            is_raw: self.is_raw,
        }
    }
}

/// Decode one input file: full raster, preview, orientation applied.
pub(crate) fn load(path: &Path, preview_longer_side: u32) -> Result<LoadedImage, LoadError> {
    let decoded = decode::decode(path)?;
    let orientation = metadata::read_orientation(path);
    let oriented = metadata::apply_orientation(decoded.image, orientation);

    let full_res = preview::to_display_rgb(&oriented, decoded.is_raw);
    let preview = preview::shrink_to(&full_res, preview_longer_side, path)?;

    Ok(LoadedImage {
        path: path.to_path_buf(),
        full_res: Arc::new(full_res),
        preview: Arc::new(preview),
        orientation,
        is_raw: decoded.is_raw,
    })
}
