//! Cross-iteration corpus merge and deduplication.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use tracing::info;

use crate::config::LoopConfig;
use crate::corpus;
use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::types::Iteration;

/// Merge frame groups in precedence order, keeping the first frame seen for
/// each `conf_id`. Frames without an id carry no identity and are always
/// kept. Relative order within and across groups is preserved.
pub fn merge_frames(groups: &[&[Frame]]) -> Result<Vec<Frame>, PipelineError> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut merged = Vec::new();
    for group in groups {
        for frame in *group {
            match &frame.conf_id {
                Some(id) => {
                    if seen.insert(id.clone()) {
                        merged.push(frame.clone());
                    }
                }
                None => merged.push(frame.clone()),
            }
        }
    }
    if merged.is_empty() {
        return Err(PipelineError::NoFramesToMerge);
    }
    Ok(merged)
}

/// Build the next iteration's corpus from this iteration's outcomes.
///
/// Newly labeled structures take precedence over the previous corpus, which
/// takes precedence over sentinel failure records; `include_failed` controls
/// whether the latter are carried at all. `previous` is the corpus this
/// iteration consumed, passed explicitly because after an abandoned
/// iteration it is not the one at this iteration's canonical path. The
/// merged corpus becomes the dataset of `iteration + 1`.
pub fn run_merge(
    config: &LoopConfig,
    iteration: Iteration,
    previous: &Path,
    include_failed: bool,
) -> Result<PathBuf, PipelineError> {
    let layout = &config.layout;
    let succeeded = corpus::load_optional(layout.labeled_ok_path(iteration))?;
    let previous = corpus::load_optional(previous)?;
    let failed = if include_failed {
        corpus::load_optional(layout.labeled_failed_path(iteration))?
    } else {
        Vec::new()
    };

    let merged = merge_frames(&[&succeeded, &previous, &failed])?;
    let next = layout.dataset_path(iteration + 1);
    corpus::write_frames(&next, &merged)?;
    info!(
        iteration,
        new = succeeded.len(),
        carried = previous.len(),
        failed = failed.len(),
        merged = merged.len(),
        next = %next.display(),
        "merged corpus for the next iteration"
    );
    Ok(next)
}
