//! # Core Module
//!
//! The GUI-agnostic panorama stitching engine.
//!
//! ## Modules
//! - `pool` - Fixed-size worker pool with deferred result handles
//! - `cancel` - Cooperative cancellation token
//! - `progress` - Lock-free progress accounting per pipeline stage
//! - `image` - Image loading: decode, preview generation, orientation
//! - `metadata` - EXIF reading and export copy-through
//! - `features` - Keypoint detection and binary descriptors
//! - `matching` - Pairwise matching and panorama grouping
//! - `stitcher` - Homography-chain stitching, blending, auto-crop
//! - `inpaint` - Filling of blank regions left by warping
//! - `export` - Encoding stitched panoramas to disk
//! - `pipeline` - Orchestrates the stages behind deferred handles

pub mod cancel;
pub mod export;
pub mod features;
pub mod image;
pub mod inpaint;
pub mod matching;
pub mod metadata;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod stitcher;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use self::image::Image;
pub use matching::{Match, Pano};
pub use pipeline::{StitcherData, StitcherPipeline};
pub use progress::{ProgressReport, ProgressStage};
