//! # CLI Module
//!
//! Command-line interface for the panorama stitcher.
//!
//! ## Usage
//! ```bash
//! # Detect and stitch panoramas from a directory of photos
//! pano-stitch stitch ~/Photos/hike --out ./panos
//!
//! # Full resolution, with blank borders filled in
//! pano-stitch stitch ~/Photos/hike --out ./panos --full-res --inpaint
//!
//! # One panorama from every input, in the given order
//! pano-stitch stitch img1.jpg img2.jpg img3.jpg --matching single-pano
//! ```
//!
//! The CLI is the "presentation layer" collaborator of the pipeline: it
//! polls progress from a ticker thread while awaiting each deferred
//! stage handle on the main thread.

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use pano_stitch::core::pipeline::{
    ExportOptions, InpaintingOptions, LoadingOptions, MatchingOptions, MatchingType,
    StitcherData, StitcherPipeline, StitchingOptions, StitchingResult,
};
use pano_stitch::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

/// Pano Stitch - panoramas out of photo batches
#[derive(Parser, Debug)]
#[command(name = "pano-stitch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load photos, detect panoramas, stitch and export them
    Stitch {
        /// Image files and/or directories to load, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for stitched panoramas
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Panorama detection mode
        #[arg(short, long, default_value = "auto")]
        matching: Matching,

        /// Neighborhood window for match candidates (input-order offsets)
        #[arg(long, default_value = "2")]
        neighborhood: usize,

        /// Longer side of the preview rasters
        #[arg(long, default_value = "1024")]
        preview_size: u32,

        /// Stitch at full resolution instead of preview resolution
        #[arg(long)]
        full_res: bool,

        /// Fill blank warp borders (full resolution only)
        #[arg(long)]
        inpaint: bool,

        /// Export format
        #[arg(short, long, default_value = "jpg")]
        format: Format,

        /// JPEG quality (1-100)
        #[arg(long, default_value = "90")]
        quality: u8,

        /// Worker threads (default: all cores, minimum 2)
        #[arg(long)]
        threads: Option<usize>,

        /// Output style
        #[arg(long, default_value = "pretty")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Matching {
    /// Pairwise matching within the neighborhood window
    Auto,
    /// All inputs form one panorama, in the given order
    SinglePano,
    /// Load only; no matches, no panoramas
    None,
}

impl From<Matching> for MatchingType {
    fn from(matching: Matching) -> Self {
        match matching {
            Matching::Auto => MatchingType::Auto,
            Matching::SinglePano => MatchingType::SinglePano,
            Matching::None => MatchingType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Jpg,
    Png,
    Tif,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Tif => "tif",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stitch {
            inputs,
            out,
            matching,
            neighborhood,
            preview_size,
            full_res,
            inpaint,
            format,
            quality,
            threads,
            output,
        } => run_stitch(StitchArgs {
            inputs,
            out,
            matching,
            neighborhood,
            preview_size,
            full_res,
            inpaint,
            format,
            quality,
            threads,
            output,
        }),
    }
}

struct StitchArgs {
    inputs: Vec<PathBuf>,
    out: PathBuf,
    matching: Matching,
    neighborhood: usize,
    preview_size: u32,
    full_res: bool,
    inpaint: bool,
    format: Format,
    quality: u8,
    threads: Option<usize>,
    output: OutputFormat,
}

fn run_stitch(args: StitchArgs) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(args.output, OutputFormat::Pretty);

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("Pano Stitch").bold().cyan(),
            style("v0.1.0").dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let inputs = discover_inputs(&args.inputs);
    if inputs.is_empty() {
        return Err(Error::Config("no image files found in the inputs".into()));
    }

    std::fs::create_dir_all(&args.out).map_err(|e| {
        Error::Config(format!("cannot create output directory {}: {e}", args.out.display()))
    })?;

    let pipeline = Arc::new(match args.threads {
        Some(threads) => StitcherPipeline::with_threads(threads),
        None => StitcherPipeline::new(),
    });

    let ticker = pretty.then(|| spawn_progress_ticker(Arc::clone(&pipeline)));

    // Loading + matching.
    let loading_options = LoadingOptions {
        preview_longer_side: args.preview_size,
    };
    let matching_options = MatchingOptions {
        mode: args.matching.into(),
        neighborhood_search_size: args.neighborhood,
    };
    let data = pipeline
        .run_loading(inputs, &loading_options, &matching_options)
        .wait()
        .unwrap_or_default();

    // Stitch and export every detected panorama.
    let mut results: Vec<StitchingResult> = Vec::new();
    let mut filled: Vec<PathBuf> = Vec::new();
    for pano_id in 0..data.panos.len() {
        let export_path = args
            .out
            .join(format!("pano_{pano_id:02}.{}", args.format.extension()));
        let options = StitchingOptions {
            pano_id,
            full_res: args.full_res,
            export_path: Some(export_path),
            compression: pano_stitch::core::pipeline::CompressionOptions {
                jpeg_quality: args.quality,
                ..Default::default()
            },
            ..Default::default()
        };
        let Some(result) = pipeline.run_stitching(&data, &options).wait() else {
            continue;
        };

        if args.inpaint {
            if let Some(path) = inpaint_and_export(&pipeline, &result, &args) {
                filled.push(path);
            }
        }
        results.push(result);
    }

    if let Some((stop, handle, bar)) = ticker {
        stop.store(true, Ordering::SeqCst);
        handle.join().ok();
        bar.finish_and_clear();
    }

    match args.output {
        OutputFormat::Pretty => print_pretty(&term, &data, &results, &filled),
        OutputFormat::Json => print_json(&data, &results, &filled),
    }

    Ok(())
}

/// Inpaint a stitched result and export the filled raster next to it.
fn inpaint_and_export(
    pipeline: &Arc<StitcherPipeline>,
    result: &StitchingResult,
    args: &StitchArgs,
) -> Option<PathBuf> {
    let pano = result.pano.clone()?;
    let mask = result.mask.clone()?;
    let inpainted = pipeline
        .run_inpainting(pano, mask, &InpaintingOptions::default())
        .wait()?;

    let export_path = args.out.join(format!(
        "pano_{:02}_filled.{}",
        result.pano_id,
        args.format.extension()
    ));
    let export = pipeline
        .run_export(
            inpainted.pano,
            &ExportOptions {
                pano_id: result.pano_id,
                export_path,
                metadata_path: None,
                compression: pano_stitch::core::pipeline::CompressionOptions {
                    jpeg_quality: args.quality,
                    ..Default::default()
                },
                crop: None,
            },
        )
        .wait()?;
    export.export_path
}

/// Expand the argument list: files pass through, directories are walked
/// in name order. Only recognizably image-typed files are kept.
fn discover_inputs(args: &[PathBuf]) -> Vec<PathBuf> {
    const EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];
    let is_image = |path: &std::path::Path| {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    };

    let mut inputs = Vec::new();
    for arg in args {
        if arg.is_dir() {
            for entry in WalkDir::new(arg)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_image(entry.path()) {
                    inputs.push(entry.path().to_path_buf());
                }
            }
        } else if is_image(arg) {
            inputs.push(arg.clone());
        }
    }
    inputs
}

type Ticker = (Arc<AtomicBool>, thread::JoinHandle<()>, ProgressBar);

/// Poll the pipeline's progress monitor and render it as a progress bar
/// until asked to stop.
fn spawn_progress_ticker(pipeline: Arc<StitcherPipeline>) -> Ticker {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let bar_clone = bar.clone();
    let handle = thread::spawn(move || {
        while !stop_flag.load(Ordering::SeqCst) {
            let report = pipeline.progress();
            bar_clone.set_length(report.num_tasks as u64);
            bar_clone.set_position(report.tasks_done as u64);
            bar_clone.set_message(report.stage.to_string());
            thread::sleep(Duration::from_millis(100));
        }
    });
    (stop, handle, bar)
}

fn print_pretty(
    term: &Term,
    data: &StitcherData,
    results: &[StitchingResult],
    filled: &[PathBuf],
) {
    term.write_line("").ok();
    term.write_line(&format!("{} Stitching Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} images loaded, {} matches, {} panorama(s)",
        style(data.images.len()).cyan(),
        style(data.matches.len()).cyan(),
        style(data.panos.len()).cyan()
    ))
    .ok();
    term.write_line("").ok();

    for result in results {
        let ids = &data.panos[result.pano_id].ids;
        let line = match (&result.export_path, result.status.is_success()) {
            (Some(path), _) => format!(
                "  {} pano {} {:?} -> {}",
                style("✓").green(),
                result.pano_id,
                ids,
                path.display()
            ),
            (None, true) => format!(
                "  {} pano {} {:?} stitched but not exported",
                style("!").yellow(),
                result.pano_id,
                ids
            ),
            (None, false) => format!(
                "  {} pano {} {:?} failed: {}",
                style("✗").red(),
                result.pano_id,
                ids,
                result.status
            ),
        };
        term.write_line(&line).ok();
    }

    for path in filled {
        term.write_line(&format!(
            "  {} inpainted -> {}",
            style("✓").green(),
            path.display()
        ))
        .ok();
    }
    term.write_line("").ok();
}

fn print_json(data: &StitcherData, results: &[StitchingResult], filled: &[PathBuf]) {
    let output = serde_json::json!({
        "images": data.images.len(),
        "matches": data.matches.len(),
        "panos": data.panos.iter().map(|p| p.ids.clone()).collect::<Vec<_>>(),
        "results": results.iter().map(|r| {
            serde_json::json!({
                "pano_id": r.pano_id,
                "status": r.status.to_string(),
                "export_path": r.export_path,
            })
        }).collect::<Vec<_>>(),
        "inpainted": filled,
    });

    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}
