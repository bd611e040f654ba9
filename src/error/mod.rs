//! # Error Module
//!
//! Error types for the panorama stitching pipeline.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Stage boundaries don't throw** - each stage's public result type
//!   encodes success/failure in its own shape; these errors travel only
//!   inside a stage and at the CLI boundary
//!
//! See the `core::pipeline` result types for how failures surface to
//! callers: a failed decode drops the file, a failed stitch carries a
//! status code, a failed export carries no path.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum Error {
    #[error("Loading error: {0}")]
    Load(#[from] LoadError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while decoding a single input file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },
}

/// Errors that occur while encoding or writing an exported panorama
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Unsupported export format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid crop rectangle")]
    InvalidCrop,
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_includes_path() {
        let error = LoadError::Decode {
            path: PathBuf::from("/photos/broken.jpg"),
            reason: "invalid JPEG".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/photos/broken.jpg"));
        assert!(message.contains("invalid JPEG"));
    }

    #[test]
    fn export_error_includes_path() {
        let error = ExportError::UnsupportedFormat {
            path: PathBuf::from("/out/pano.xyz"),
        };
        assert!(error.to_string().contains("/out/pano.xyz"));
    }
}
