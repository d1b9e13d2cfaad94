//! Uncertainty-ranked candidate selection.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::LoopConfig;
use crate::corpus;
use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::types::Iteration;

/// Candidate structures produced by one search run, already committee
/// evaluated. Discarded after selection.
#[derive(Clone, Debug, Default)]
pub struct CandidatePool {
    /// Candidate frames in search-emission order.
    pub frames: Vec<Frame>,
}

impl CandidatePool {
    /// Wrap a list of candidate frames.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Number of candidates in the pool.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the pool holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Rank `pool` by descending energy uncertainty and keep the top `n_dft`.
///
/// Frames without an uncertainty value (or with a NaN one) cannot justify a
/// labeling slot and sort behind every scored frame. The sort is stable, so
/// ties and unscored frames keep their pool order. `n_dft` larger than the
/// pool selects everything.
pub fn select_most_uncertain(pool: &CandidatePool, n_dft: usize) -> Vec<Frame> {
    let mut ranked: Vec<&Frame> = pool.frames.iter().collect();
    ranked.sort_by(|a, b| score(b).total_cmp(&score(a)));
    let kept = n_dft.min(ranked.len());
    if kept < n_dft {
        warn!(
            requested = n_dft,
            available = ranked.len(),
            "candidate pool smaller than the labeling budget"
        );
    }
    ranked[..kept].iter().map(|frame| (*frame).clone()).collect()
}

fn score(frame: &Frame) -> f64 {
    frame
        .energy_uncertainty
        .filter(|value| !value.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}

/// Run selection for one iteration and persist the chosen candidates.
pub fn run_selection(
    config: &LoopConfig,
    iteration: Iteration,
    pool: &CandidatePool,
) -> Result<PathBuf, PipelineError> {
    let selected = select_most_uncertain(pool, config.selection.n_dft);
    let path = config.layout.selected_path(iteration);
    corpus::write_frames(&path, &selected)?;
    let top = selected.first().and_then(|frame| frame.energy_uncertainty);
    info!(
        iteration,
        pool = pool.len(),
        selected = selected.len(),
        top_uncertainty = top,
        "selected candidates for labeling"
    );
    Ok(path)
}
