//! Pipeline execution: the [`StitcherPipeline`] façade.
//!
//! Each public entry point submits its whole stage body as one pool task
//! and immediately returns the deferred handle. The stage body fans out
//! per-unit tasks onto the same pool and barrier-waits for all of them
//! before computing derived aggregates, so a stage is synchronous with
//! respect to its own sub-tasks while staying asynchronous to the
//! caller. The pool keeps a minimum of two workers, which makes this
//! one level of nesting safe.

use super::{
    ExportOptions, ExportResult, InpaintingOptions, InpaintingResult, LoadingOptions,
    MatchingOptions, MatchingType, StitcherData, StitchingOptions, StitchingResult, StitchStatus,
};
use crate::core::cancel::CancellationToken;
use crate::core::export;
use crate::core::features::{self, ImageFeatures};
use crate::core::image::{self, Image, LoadedImage};
use crate::core::inpaint;
use crate::core::matching::{self, Match, Pano};
use crate::core::pool::{TaskHandle, WorkerPool};
use crate::core::progress::{ProgressMonitor, ProgressReport, ProgressStage};
use crate::core::stitcher;
use ::image::{GrayImage, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The pipeline façade: owns the worker pool, the progress monitor, and
/// the cancellation flag shared by all in-flight work.
///
/// One pipeline instance runs one stage at a time; results are handed to
/// the caller by value and never referenced again, so re-runs are pure
/// functions of caller-supplied inputs.
pub struct StitcherPipeline {
    pool: Arc<WorkerPool>,
    monitor: Arc<ProgressMonitor>,
    cancel: CancellationToken,
}

impl Default for StitcherPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StitcherPipeline {
    /// Pipeline with a worker pool sized to the machine.
    pub fn new() -> Self {
        Self::with_pool(WorkerPool::with_default_parallelism())
    }

    /// Pipeline with an explicit worker count (clamped to at least two).
    pub fn with_threads(num_threads: usize) -> Self {
        Self::with_pool(WorkerPool::new(num_threads))
    }

    fn with_pool(pool: WorkerPool) -> Self {
        Self {
            pool: Arc::new(pool),
            monitor: Arc::new(ProgressMonitor::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Snapshot of the current stage's progress; safe from any thread.
    pub fn progress(&self) -> ProgressReport {
        self.monitor.report()
    }

    /// Request cooperative cancellation of the in-flight stage.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Decode the inputs and derive matches/panoramas per the matching
    /// options. Non-blocking; the returned handle yields the aggregate.
    pub fn run_loading(
        &self,
        inputs: Vec<PathBuf>,
        loading_options: &LoadingOptions,
        matching_options: &MatchingOptions,
    ) -> TaskHandle<StitcherData> {
        self.cancel.reset();
        let pool = Arc::clone(&self.pool);
        let stage_pool = Arc::clone(&self.pool);
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let loading = loading_options.clone();
        let matching = matching_options.clone();

        pool.submit(move || {
            run_loading_stage(&stage_pool, &monitor, &cancel, inputs, &loading, &matching)
        })
    }

    /// Stitch one panorama candidate out of previously loaded data.
    /// Non-blocking; failures surface as a status on the result.
    pub fn run_stitching(
        &self,
        data: &StitcherData,
        options: &StitchingOptions,
    ) -> TaskHandle<StitchingResult> {
        self.cancel.reset();
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let options = options.clone();

        // Member images are cloned up front (cheap, rasters are shared)
        // so the task owns everything it needs.
        let members: Vec<Image> = data
            .panos
            .get(options.pano_id)
            .map(|pano| {
                pano.ids
                    .iter()
                    .filter_map(|&id| data.images.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        self.pool
            .submit(move || run_stitching_stage(&monitor, &cancel, members, &options))
    }

    /// Write a stitched panorama to disk. Non-blocking; failure is an
    /// absent path on the result.
    pub fn run_export(&self, pano: RgbImage, options: &ExportOptions) -> TaskHandle<ExportResult> {
        self.cancel.reset();
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let options = options.clone();

        self.pool.submit(move || {
            monitor.reset(ProgressStage::Export, 1);
            let export_path = if cancel.is_cancelled() {
                None
            } else {
                match export::write_pano(
                    &pano,
                    &options.export_path,
                    &options.compression,
                    options.crop.as_ref(),
                    options.metadata_path.as_deref(),
                ) {
                    Ok(()) => Some(options.export_path.clone()),
                    Err(e) => {
                        warn!(error = %e, "export failed");
                        None
                    }
                }
            };
            monitor.notify_task_done();
            ExportResult {
                pano_id: options.pano_id,
                export_path,
            }
        })
    }

    /// Fill the blank regions of a stitched panorama. Non-blocking.
    pub fn run_inpainting(
        &self,
        pano: RgbImage,
        mask: GrayImage,
        _options: &InpaintingOptions,
    ) -> TaskHandle<InpaintingResult> {
        self.cancel.reset();
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();

        self.pool.submit(move || {
            monitor.reset(ProgressStage::Inpainting, 1);
            let result = if cancel.is_cancelled() {
                InpaintingResult {
                    pano,
                    pixels_inpainted: 0,
                }
            } else {
                let outcome = inpaint::inpaint(&pano, &mask);
                InpaintingResult {
                    pano: outcome.image,
                    pixels_inpainted: outcome.pixels_filled,
                }
            };
            monitor.notify_task_done();
            result
        })
    }
}

fn run_loading_stage(
    pool: &Arc<WorkerPool>,
    monitor: &Arc<ProgressMonitor>,
    cancel: &CancellationToken,
    inputs: Vec<PathBuf>,
    loading: &LoadingOptions,
    matching: &MatchingOptions,
) -> StitcherData {
    // Decode fan-out: one task per input path.
    monitor.reset(ProgressStage::LoadingImages, inputs.len());
    let decode_handles: Vec<TaskHandle<Option<LoadedImage>>> = inputs
        .into_iter()
        .map(|path| {
            let monitor = Arc::clone(monitor);
            let cancel = cancel.clone();
            let preview_longer_side = loading.preview_longer_side;
            pool.submit(move || {
                let loaded = if cancel.is_cancelled() {
                    None
                } else {
                    match image::load(&path, preview_longer_side) {
                        Ok(loaded) => Some(loaded),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "dropping undecodable input");
                            None
                        }
                    }
                };
                monitor.notify_task_done();
                loaded
            })
        })
        .collect();

    // Barrier: failed decodes drop out, survivors keep input order and
    // are renumbered densely by position.
    let loaded: Vec<LoadedImage> = decode_handles
        .into_iter()
        .filter_map(|handle| handle.wait().flatten())
        .collect();
    info!(images = loaded.len(), "loading stage decoded inputs");

    // Keypoint fan-out, only when pairwise matching will happen.
    let features: Vec<Arc<ImageFeatures>> = if matching.mode == MatchingType::Auto {
        monitor.reset(ProgressStage::DetectingKeypoints, loaded.len());
        let handles: Vec<TaskHandle<Arc<ImageFeatures>>> = loaded
            .iter()
            .map(|loaded_image| {
                let monitor = Arc::clone(monitor);
                let cancel = cancel.clone();
                let preview = Arc::clone(&loaded_image.preview);
                pool.submit(move || {
                    let detected = if cancel.is_cancelled() {
                        ImageFeatures::default()
                    } else {
                        features::detect(&preview)
                    };
                    monitor.notify_task_done();
                    Arc::new(detected)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.wait().unwrap_or_default())
            .collect()
    } else {
        loaded
            .iter()
            .map(|_| Arc::new(ImageFeatures::default()))
            .collect()
    };

    let images: Vec<Image> = loaded
        .into_iter()
        .zip(features)
        .map(|(loaded_image, features)| loaded_image.into_image(features))
        .collect();

    let (matches, panos) = match matching.mode {
        MatchingType::None => (Vec::new(), Vec::new()),
        MatchingType::SinglePano => {
            let panos = if images.is_empty() {
                Vec::new()
            } else {
                vec![Pano {
                    ids: (0..images.len()).collect(),
                }]
            };
            (Vec::new(), panos)
        }
        MatchingType::Auto => run_matching_stage(pool, monitor, cancel, &images, matching),
    };

    info!(
        images = images.len(),
        matches = matches.len(),
        panos = panos.len(),
        "loading stage complete"
    );
    StitcherData {
        images,
        matches,
        panos,
    }
}

fn run_matching_stage(
    pool: &Arc<WorkerPool>,
    monitor: &Arc<ProgressMonitor>,
    cancel: &CancellationToken,
    images: &[Image],
    matching: &MatchingOptions,
) -> (Vec<Match>, Vec<Pano>) {
    // Candidate pairs: a sliding window over input order. This is what
    // makes grouping order-sensitive; see `matching::find_panos`.
    let mut pairs = Vec::new();
    for i in 0..images.len() {
        for j in i + 1..images.len().min(i + matching.neighborhood_search_size + 1) {
            pairs.push((i, j));
        }
    }

    monitor.reset(ProgressStage::MatchingImages, pairs.len());
    let handles: Vec<TaskHandle<Match>> = pairs
        .into_iter()
        .map(|(id1, id2)| {
            let monitor = Arc::clone(monitor);
            let cancel = cancel.clone();
            let first = Arc::clone(images[id1].features());
            let second = Arc::clone(images[id2].features());
            pool.submit(move || {
                let correspondences = if cancel.is_cancelled() {
                    Vec::new()
                } else {
                    matching::match_features(&first, &second)
                };
                monitor.notify_task_done();
                Match {
                    id1,
                    id2,
                    correspondences,
                }
            })
        })
        .collect();

    // Barrier: grouping runs only after every pair task finished, and
    // consumes the matches in production order.
    let matches: Vec<Match> = handles
        .into_iter()
        .filter_map(TaskHandle::wait)
        .collect();
    let panos = matching::find_panos(&matches);
    debug!(matches = matches.len(), panos = panos.len(), "matching stage complete");
    (matches, panos)
}

fn run_stitching_stage(
    monitor: &Arc<ProgressMonitor>,
    cancel: &CancellationToken,
    members: Vec<Image>,
    options: &StitchingOptions,
) -> StitchingResult {
    monitor.reset(ProgressStage::StitchingPano, 1);

    if cancel.is_cancelled() {
        monitor.notify_task_done();
        return StitchingResult::failed(options.pano_id, options.full_res, StitchStatus::Cancelled);
    }

    let rasters: Vec<&RgbImage> = members
        .iter()
        .map(|member| {
            if options.full_res {
                member.full_res()
            } else {
                member.preview()
            }
        })
        .collect();

    let stitched = stitcher::stitch(&rasters, &options.stitch_algorithm);
    monitor.notify_task_done();

    let stitched = match stitched {
        Ok(stitched) => stitched,
        Err(error) => {
            warn!(pano_id = options.pano_id, error = %error, "stitching failed");
            return StitchingResult::failed(
                options.pano_id,
                options.full_res,
                StitchStatus::from(&error),
            );
        }
    };

    // Full-resolution runs derive the crop rectangle and keep the blank
    // mask for the inpainting handoff.
    let (auto_crop, mask) = if options.full_res {
        monitor.set_stage(ProgressStage::AutoCrop);
        monitor.set_num_tasks(2);
        let auto_crop = stitcher::auto_crop(&stitched.mask);
        monitor.notify_task_done();

        let has_blanks = stitched.mask.pixels().any(|p| p.0[0] != 0);
        (auto_crop, has_blanks.then_some(stitched.mask))
    } else {
        (None, None)
    };

    let export_path = match &options.export_path {
        Some(path) => {
            monitor.set_stage(ProgressStage::Export);
            let report = monitor.report();
            monitor.set_num_tasks(report.num_tasks + 1);
            let metadata_source = options
                .metadata
                .copy_from_first_image
                .then(|| members.first().map(|m| m.path().to_path_buf()))
                .flatten();
            let written = export::write_pano(
                &stitched.pano,
                path,
                &options.compression,
                None,
                metadata_source.as_deref(),
            );
            monitor.notify_task_done();
            match written {
                Ok(()) => Some(path.clone()),
                Err(e) => {
                    warn!(error = %e, "in-stage export failed");
                    None
                }
            }
        }
        None => None,
    };

    StitchingResult {
        pano_id: options.pano_id,
        full_res: options.full_res,
        status: StitchStatus::Ok,
        pano: Some(stitched.pano),
        auto_crop,
        export_path,
        mask,
    }
}
