//! Parallel reference-energy labeling.
//!
//! Labeling is the expensive external stage: each selected structure is
//! handed to a [`Labeler`] inside its own scratch directory. Failures are
//! not fatal; a failed structure is recorded with a sentinel energy so the
//! attempt itself stays in the audit trail.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::LoopConfig;
use crate::constants::corpus::SENTINEL_ENERGY;
use crate::corpus;
use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::types::Iteration;

/// Reference labeler (typically a DFT relaxation) run once per structure.
///
/// Implementations receive a private scratch directory and must confine all
/// temporary files to it; workers for different structures run concurrently.
pub trait Labeler: Send + Sync {
    /// Label `frame`, returning it with reference energy (and forces, when
    /// available) attached.
    fn label(&self, frame: &Frame, scratch: &ScratchDir) -> Result<Frame, PipelineError>;
}

/// Scoped scratch directory for one labeling job.
///
/// Created up front, removed on drop on a best-effort basis so a crashed
/// worker leaves its scratch behind for inspection.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create the directory (and any missing parents).
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory the job may write into.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Result of one labeling stage.
#[derive(Clone, Debug, Default)]
pub struct LabelingOutcome {
    /// Frames with a genuine reference energy, in selection order.
    pub succeeded: Vec<Frame>,
    /// Sentinel-energy records of failed attempts, in selection order.
    pub failed: Vec<Frame>,
}

impl LabelingOutcome {
    /// Number of successfully labeled structures.
    pub fn ok_count(&self) -> usize {
        self.succeeded.len()
    }
}

/// Label every frame in `selected` on a fixed-size worker pool.
///
/// Output order matches input order regardless of worker scheduling. A
/// labeler error downgrades that one structure to a sentinel record instead
/// of aborting the stage.
pub fn label_all(
    selected: &[Frame],
    labeler: &dyn Labeler,
    scratch_root: &Path,
    workers: usize,
) -> Result<LabelingOutcome, PipelineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|err| PipelineError::Configuration(err.to_string()))?;

    let results: Vec<Result<Frame, Frame>> = pool.install(|| {
        selected
            .par_iter()
            .enumerate()
            .map(|(idx, frame)| label_one(idx, frame, labeler, scratch_root))
            .collect()
    });

    let mut outcome = LabelingOutcome::default();
    for result in results {
        match result {
            Ok(frame) => outcome.succeeded.push(frame),
            Err(frame) => outcome.failed.push(frame),
        }
    }
    Ok(outcome)
}

fn label_one(
    idx: usize,
    frame: &Frame,
    labeler: &dyn Labeler,
    scratch_root: &Path,
) -> Result<Frame, Frame> {
    let job_dir = scratch_root.join(format!("job_{idx:04}"));
    let scratch = match ScratchDir::create(&job_dir) {
        Ok(scratch) => scratch,
        Err(err) => {
            warn!(conf_id = ?frame.conf_id, error = %err, "scratch setup failed");
            return Err(sentinel_record(frame));
        }
    };
    match labeler.label(frame, &scratch) {
        Ok(labeled) => Ok(labeled),
        Err(err) => {
            warn!(conf_id = ?frame.conf_id, error = %err, "labeling failed");
            Err(sentinel_record(frame))
        }
    }
}

/// Failed-attempt record: the original structure with the sentinel energy
/// and no forces, so it can never be mistaken for a reference label.
fn sentinel_record(frame: &Frame) -> Frame {
    let mut record = frame.clone();
    record.energy = Some(SENTINEL_ENERGY);
    record.forces = None;
    record
}

/// Run the labeling stage for one iteration: read the selected candidates,
/// label them in parallel, and persist both outcome files.
pub fn run_labeling(
    config: &LoopConfig,
    iteration: Iteration,
    labeler: &dyn Labeler,
) -> Result<LabelingOutcome, PipelineError> {
    let layout = &config.layout;
    let selected_path = layout.selected_path(iteration);
    if !selected_path.is_file() {
        return Err(PipelineError::MissingInput(selected_path));
    }
    let selected = corpus::read_frames(&selected_path)?;

    let scratch_root = layout.scratch_dir(iteration);
    let outcome = label_all(&selected, labeler, &scratch_root, config.labeling.workers)?;

    corpus::write_frames(layout.labeled_ok_path(iteration), &outcome.succeeded)?;
    corpus::write_frames(layout.labeled_failed_path(iteration), &outcome.failed)?;
    info!(
        iteration,
        attempted = selected.len(),
        succeeded = outcome.ok_count(),
        failed = outcome.failed.len(),
        "labeling stage complete"
    );
    Ok(outcome)
}
