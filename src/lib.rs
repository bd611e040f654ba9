//! # Pano Stitch
//!
//! A panorama stitching pipeline that turns a set of input photographs into
//! one or more stitched panoramas.
//!
//! ## Core Philosophy
//! - **Never block the caller** - every pipeline entry point returns a
//!   deferred handle; the caller decides when to wait
//! - **Partial results over hard failures** - a broken input file drops out
//!   of the batch, a failed stitch reports a status, the run continues
//! - **Always cancellable** - long batches can be abandoned mid-flight
//!   without corrupting state or deadlocking progress accounting
//!
//! ## Architecture
//! The library is split into a core engine (GUI-agnostic) and presentation
//! layers:
//! - `core` - The stitching pipeline engine
//! - `error` - Error types for the fallible seams
//! - `cli` - Command-line interface (lives in the `pano-stitch` binary)

pub mod core;
pub mod error;

// Re-export commonly used types at the crate root
pub use error::{Error, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point (CLI or GUI).
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
