//! Lock-free progress accounting.
//!
//! Each pipeline instance owns one [`ProgressMonitor`]. The stage that is
//! currently running resets the monitor with its task count, workers call
//! [`ProgressMonitor::notify_task_done`] exactly once per completed unit
//! (success, failure, or cancelled-early alike), and any thread may take a
//! [`ProgressReport`] snapshot at any time without blocking the producers.
//!
//! The monitor is eventually consistent across stage transitions: a reader
//! may observe a freshly reset total while a straggler notification from
//! the previous stage is still in flight. That is acceptable for driving a
//! progress bar and keeps `notify_task_done` a single atomic increment.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Label of the stage currently driving the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProgressStage {
    Idle = 0,
    LoadingImages = 1,
    DetectingKeypoints = 2,
    MatchingImages = 3,
    StitchingPano = 4,
    AutoCrop = 5,
    Inpainting = 6,
    Export = 7,
}

impl ProgressStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::LoadingImages,
            2 => Self::DetectingKeypoints,
            3 => Self::MatchingImages,
            4 => Self::StitchingPano,
            5 => Self::AutoCrop,
            6 => Self::Inpainting,
            7 => Self::Export,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::LoadingImages => "Loading images",
            Self::DetectingKeypoints => "Detecting keypoints",
            Self::MatchingImages => "Matching images",
            Self::StitchingPano => "Stitching",
            Self::AutoCrop => "Auto crop",
            Self::Inpainting => "Inpainting",
            Self::Export => "Exporting",
        };
        write!(f, "{label}")
    }
}

/// Immutable snapshot of the monitor state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressReport {
    pub stage: ProgressStage,
    pub tasks_done: usize,
    pub num_tasks: usize,
}

impl ProgressReport {
    /// Completion in `[0.0, 1.0]`, `0.0` when no tasks are registered.
    pub fn fraction(&self) -> f32 {
        if self.num_tasks == 0 {
            0.0
        } else {
            self.tasks_done as f32 / self.num_tasks as f32
        }
    }
}

/// Atomic per-stage task counters.
///
/// Contract: callers reset exactly once per stage before submitting that
/// stage's tasks; every submitted unit notifies exactly once.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    stage: AtomicU8,
    done: AtomicUsize,
    num_tasks: AtomicUsize,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish a new stage and total task count, zeroing the done counter.
    pub fn reset(&self, stage: ProgressStage, num_tasks: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.num_tasks.store(num_tasks, Ordering::SeqCst);
        self.stage.store(stage as u8, Ordering::SeqCst);
    }

    /// Adjust the total without resetting the done counter.
    ///
    /// Used when a stage's fan-out count is only known after a sub-step,
    /// e.g. the stitch/crop/export sequence growing its own total.
    pub fn set_num_tasks(&self, num_tasks: usize) {
        self.num_tasks.store(num_tasks, Ordering::SeqCst);
    }

    /// Change the stage label without touching the counters.
    pub fn set_stage(&self, stage: ProgressStage) {
        self.stage.store(stage as u8, Ordering::SeqCst);
    }

    /// Record one completed unit of work.
    ///
    /// Called exactly once per unit regardless of the unit's outcome;
    /// cancelled and failed units still count as done.
    pub fn notify_task_done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot safe to call from any thread at any time.
    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            stage: ProgressStage::from_u8(self.stage.load(Ordering::SeqCst)),
            tasks_done: self.done.load(Ordering::SeqCst),
            num_tasks: self.num_tasks.load(Ordering::SeqCst),
        }
    }
}
