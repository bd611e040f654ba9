//! # pano-stitch CLI
//!
//! Command-line interface for the panorama stitching pipeline.
//!
//! ## Usage
//! ```bash
//! pano-stitch stitch ~/Photos/hike --out ./panos
//! pano-stitch stitch ~/Photos/hike --full-res --inpaint --output json
//! ```

mod cli;

use pano_stitch::Result;

fn main() -> Result<()> {
    pano_stitch::init_tracing();
    cli::run()
}
