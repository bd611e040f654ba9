//! # Pipeline Module
//!
//! The option structs, result shapes, and the [`StitcherPipeline`] façade
//! that orchestrates loading, matching, stitching, inpainting, and export
//! over the shared worker pool.
//!
//! Every result type encodes its own success/failure shape; nothing in
//! here returns `Err` across a stage boundary.

mod runner;

pub use runner::StitcherPipeline;

pub use crate::core::export::{CompressionOptions, PngCompression};
pub use crate::core::stitcher::{RelativeRect, StitchAlgorithmOptions};

use crate::core::image::Image;
use crate::core::matching::{Match, Pano};
use crate::core::stitcher::StitchError;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for the Loading stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingOptions {
    /// Target size of the longer preview side, in pixels.
    pub preview_longer_side: u32,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            preview_longer_side: 1024,
        }
    }
}

/// How candidate panoramas are derived from the loaded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchingType {
    /// Pairwise matching within the neighborhood window, then chaining.
    #[default]
    Auto,
    /// One panorama spanning every loaded image, no matching at all.
    SinglePano,
    /// No keypoints, no matches, no panoramas.
    None,
}

/// Options for keypoint matching during Loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingOptions {
    pub mode: MatchingType,
    /// Sliding window over *input order*: pair `(i, j)` is a candidate
    /// when `j - i` does not exceed this.
    pub neighborhood_search_size: usize,
}

impl Default for MatchingOptions {
    fn default() -> Self {
        Self {
            mode: MatchingType::Auto,
            neighborhood_search_size: 2,
        }
    }
}

/// Metadata behavior at export time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataOptions {
    /// Copy EXIF from the panorama's first member image into the export.
    pub copy_from_first_image: bool,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            copy_from_first_image: true,
        }
    }
}

/// Options for one stitching run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StitchingOptions {
    pub pano_id: usize,
    /// Stitch the full-resolution rasters instead of the previews.
    pub full_res: bool,
    /// Export the stitched panorama as part of the same run.
    pub export_path: Option<PathBuf>,
    pub metadata: MetadataOptions,
    pub compression: CompressionOptions,
    pub stitch_algorithm: StitchAlgorithmOptions,
}

/// Options for a standalone export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub pano_id: usize,
    pub export_path: PathBuf,
    /// Image whose EXIF is copied through, if any.
    pub metadata_path: Option<PathBuf>,
    pub compression: CompressionOptions,
    pub crop: Option<RelativeRect>,
}

/// Options for the Inpainting stage.
///
/// Reserved: the fill method is currently fixed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InpaintingOptions {}

/// Aggregate produced by Loading (+ Matching): everything later stages
/// read. Immutable once returned; re-running Loading builds a new one.
#[derive(Debug, Default)]
pub struct StitcherData {
    pub images: Vec<Image>,
    pub matches: Vec<Match>,
    pub panos: Vec<Pano>,
}

/// Caller-visible outcome classification of a stitching run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StitchStatus {
    Ok,
    NotEnoughImages,
    HomographyEstimationFailed,
    CameraAdjustmentFailed,
    Cancelled,
    UnknownFailure,
}

impl StitchStatus {
    pub fn is_success(self) -> bool {
        self == Self::Ok
    }
}

impl From<&StitchError> for StitchStatus {
    fn from(error: &StitchError) -> Self {
        match error {
            StitchError::NotEnoughImages => Self::NotEnoughImages,
            StitchError::HomographyEstimation { .. } => Self::HomographyEstimationFailed,
            StitchError::CameraAdjustment(_) => Self::CameraAdjustmentFailed,
        }
    }
}

impl std::fmt::Display for StitchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::NotEnoughImages => "not enough images",
            Self::HomographyEstimationFailed => "homography estimation failed",
            Self::CameraAdjustmentFailed => "camera adjustment failed",
            Self::Cancelled => "cancelled",
            Self::UnknownFailure => "unknown failure",
        };
        write!(f, "{label}")
    }
}

/// Outcome of one stitching run.
#[derive(Debug)]
pub struct StitchingResult {
    pub pano_id: usize,
    pub full_res: bool,
    pub status: StitchStatus,
    /// Absent on failure.
    pub pano: Option<RgbImage>,
    /// Largest fully-covered rectangle; full-resolution runs only.
    pub auto_crop: Option<RelativeRect>,
    /// Echo of the in-stage export destination, present on success.
    pub export_path: Option<PathBuf>,
    /// Blank-region mask, present on full-resolution runs that left
    /// blank pixels; the handoff artifact for inpainting.
    pub mask: Option<GrayImage>,
}

impl StitchingResult {
    pub(crate) fn failed(pano_id: usize, full_res: bool, status: StitchStatus) -> Self {
        Self {
            pano_id,
            full_res,
            status,
            pano: None,
            auto_crop: None,
            export_path: None,
            mask: None,
        }
    }
}

/// Outcome of a standalone export run. An absent path signals failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub pano_id: usize,
    pub export_path: Option<PathBuf>,
}

/// Outcome of an inpainting run.
#[derive(Debug)]
pub struct InpaintingResult {
    pub pano: RgbImage,
    pub pixels_inpainted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policy() {
        assert_eq!(LoadingOptions::default().preview_longer_side, 1024);
        let matching = MatchingOptions::default();
        assert_eq!(matching.mode, MatchingType::Auto);
        assert_eq!(matching.neighborhood_search_size, 2);
        assert!(MetadataOptions::default().copy_from_first_image);
    }

    #[test]
    fn stitch_status_maps_engine_errors() {
        assert_eq!(
            StitchStatus::from(&StitchError::NotEnoughImages),
            StitchStatus::NotEnoughImages
        );
        assert_eq!(
            StitchStatus::from(&StitchError::HomographyEstimation { from: 0, to: 1 }),
            StitchStatus::HomographyEstimationFailed
        );
        assert!(!StitchStatus::Cancelled.is_success());
        assert!(StitchStatus::Ok.is_success());
    }

    #[test]
    fn options_serialize_for_ui_consumption() {
        let options = StitchingOptions {
            pano_id: 3,
            full_res: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let parsed: StitchingOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pano_id, 3);
        assert!(parsed.full_res);
    }
}
