use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::types::{BootIndex, ChargeState, Iteration};

/// Per-charge-bucket split statistics.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketStats {
    /// Frames in the bucket before splitting.
    pub total: usize,
    /// Frames held out for validation.
    pub validation: usize,
    /// Frames left in the training pool.
    pub train_pool: usize,
}

/// Descriptor for one persisted bootstrap training set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapEntry {
    /// One-based bootstrap index.
    pub idx: BootIndex,
    /// Number of frames in the set.
    pub size: usize,
    /// Path of the persisted set.
    pub path: PathBuf,
}

/// Paths of the files the bootstrap stage produced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestOutputs {
    /// Held-out validation corpus.
    pub valid_xyz: PathBuf,
    /// Post-split training pool corpus.
    pub train_pool_xyz: PathBuf,
    /// Bootstrap set descriptors, in index order.
    pub boots: Vec<BootstrapEntry>,
}

/// Write-once record of one bootstrap invocation.
///
/// This is the sole hand-off contract between the sampler and the external
/// trainer: any process can re-read it without re-deriving randomness.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Iteration the split belongs to.
    pub iteration: Iteration,
    /// Input corpus path.
    pub input: PathBuf,
    /// Iteration output directory.
    pub outdir: PathBuf,
    /// Total frames read from the input corpus.
    pub total_frames: usize,
    /// Frames held out for validation across all buckets.
    pub valid_frames: usize,
    /// Frames remaining in the training pool across all buckets.
    pub train_pool_frames: usize,
    /// Split statistics per charge bucket, in ascending charge order.
    pub per_charge: BTreeMap<ChargeState, BucketStats>,
    /// Number of bootstrap sets drawn.
    pub bootstrap_count: usize,
    /// Frames per bootstrap set.
    pub bootstrap_size: usize,
    /// Derived seed the split decisions were made with.
    pub seed: u64,
    /// Wall-clock time the manifest was written.
    pub created_at: DateTime<Utc>,
    /// Produced file paths.
    pub outputs: ManifestOutputs,
}

impl Manifest {
    /// Persist the manifest as pretty-printed JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec_pretty(self)
            .map_err(|err| PipelineError::Manifest(err.to_string()))?;
        fs::write(path.as_ref(), payload)?;
        Ok(())
    }

    /// Re-read a previously written manifest.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|_| PipelineError::MissingInput(path.to_path_buf()))?;
        serde_json::from_str(&raw).map_err(|err| PipelineError::Manifest(err.to_string()))
    }
}
