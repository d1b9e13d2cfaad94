use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{defaults, layout};
use crate::errors::PipelineError;
use crate::types::{BootIndex, Iteration};

/// Top-level pipeline configuration.
///
/// `iterations` must be present in a config file; every other field falls
/// back to its documented default. Loaded once at startup and treated as an
/// immutable value from then on — stages and workers receive it by reference
/// or capture the pieces they need by value.
#[derive(Clone, Debug, Deserialize)]
pub struct LoopConfig {
    /// Number of active-learning iterations to run.
    pub iterations: usize,
    /// Base RNG seed; per-iteration seeds are derived from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// On-disk layout roots.
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Stratified split and bootstrap resampling parameters.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// Candidate selection parameters.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Labeling pool and retry-policy parameters.
    #[serde(default)]
    pub labeling: LabelingConfig,
    /// Cross-iteration merge parameters.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Trained-model artifact naming convention.
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_seed() -> u64 {
    defaults::SEED
}

impl LoopConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|_| PipelineError::MissingInput(path.to_path_buf()))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| PipelineError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.iterations == 0 {
            return Err(PipelineError::Configuration(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.bootstrap.validation_fraction <= 0.0 {
            return Err(PipelineError::Configuration(
                "validation_fraction must be positive".to_string(),
            ));
        }
        if self.bootstrap.bootstrap_count == 0 {
            return Err(PipelineError::Configuration(
                "bootstrap_count must be at least 1".to_string(),
            ));
        }
        if self.labeling.workers == 0 {
            return Err(PipelineError::Configuration(
                "labeling workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Roots and path helpers for the per-iteration directory layout.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Root of the dataset tree (`<data_root>/iter000/…`).
    pub data_root: PathBuf,
    /// Root of the training-run tree (`<runs_root>/iter000/boot_001/…`).
    pub runs_root: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            runs_root: PathBuf::from("runs"),
        }
    }
}

impl LayoutConfig {
    /// Dataset directory for one iteration.
    pub fn iter_dir(&self, iteration: Iteration) -> PathBuf {
        self.data_root.join(format!("iter{iteration:03}"))
    }

    /// Corpus file consumed at the start of `iteration`.
    pub fn dataset_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration)
            .join(format!("dataset_iter{iteration:03}.xyz"))
    }

    /// Held-out validation split for one iteration.
    pub fn valid_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::VALID_FILE)
    }

    /// Training pool (post-split remainder) for one iteration.
    pub fn train_pool_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::TRAIN_POOL_FILE)
    }

    /// Resampled training set for one bootstrap member.
    pub fn boot_path(&self, iteration: Iteration, boot: BootIndex) -> PathBuf {
        self.iter_dir(iteration)
            .join(format!("train_boot_{boot:03}.xyz"))
    }

    /// Manifest written by the bootstrap stage.
    pub fn manifest_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::MANIFEST_FILE)
    }

    /// Candidates selected for labeling.
    pub fn selected_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::SELECTED_FILE)
    }

    /// Successfully labeled structures.
    pub fn labeled_ok_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::LABELED_OK_FILE)
    }

    /// Failed labeling attempts (sentinel energies).
    pub fn labeled_failed_path(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join(layout::LABELED_FAILED_FILE)
    }

    /// Training-run directory for one iteration.
    pub fn runs_dir(&self, iteration: Iteration) -> PathBuf {
        self.runs_root.join(format!("iter{iteration:03}"))
    }

    /// Scratch root used by labeling workers during one iteration.
    pub fn scratch_dir(&self, iteration: Iteration) -> PathBuf {
        self.iter_dir(iteration).join("scratch")
    }
}

/// Stratified split and bootstrap resampling parameters.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Per-bucket validation share when in `(0, 1)`; an absolute per-bucket
    /// count when `>= 1`.
    pub validation_fraction: f64,
    /// Floor on validation frames per charge bucket (clamped to bucket size).
    pub min_per_bucket: usize,
    /// Number of bootstrap training sets to draw.
    pub bootstrap_count: usize,
    /// Frames per bootstrap set; `0` means "use the full pool size".
    pub bootstrap_size: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            validation_fraction: defaults::VALIDATION_FRACTION,
            min_per_bucket: defaults::MIN_PER_BUCKET,
            bootstrap_count: defaults::BOOTSTRAP_COUNT,
            bootstrap_size: 0,
        }
    }
}

/// Candidate selection parameters.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Number of most-uncertain candidates forwarded to labeling.
    pub n_dft: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            n_dft: defaults::N_DFT,
        }
    }
}

/// Labeling pool sizing and the retry/fallback policy bounds.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// An iteration is sufficient when strictly more than this many
    /// structures label successfully.
    pub min_labeled: usize,
    /// Search+label retries before the fresh-population fallback.
    pub max_retries: u32,
    /// Worker-pool size for per-structure labeling.
    pub workers: usize,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            min_labeled: defaults::MIN_LABELED,
            max_retries: defaults::MAX_RETRIES,
            workers: defaults::LABEL_WORKERS,
        }
    }
}

/// Cross-iteration merge parameters.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Carry sentinel-energy failure records into the next corpus. Off by
    /// default: placeholder energies are audit artifacts, not training data.
    pub include_failed: bool,
}

/// Trained-model artifact naming convention.
///
/// Artifacts are discovered as
/// `<runs_root>/iter<NNN>/boot_<NNN>/…/<tag>_iter<NNN>_boot<NNN>_<run_id>.<extension>`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Leading tag of artifact file names.
    pub tag: String,
    /// Trailing run identifier of artifact file names.
    pub run_id: String,
    /// Artifact file extension (without the dot).
    pub extension: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tag: "MACE".to_string(),
            run_id: "run-0".to_string(),
            extension: "model".to_string(),
        }
    }
}
