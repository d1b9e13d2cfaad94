#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Stratified validation split and bootstrap resampling.
pub mod bootstrap;
/// Runtime configuration and on-disk layout helpers.
pub mod config;
/// Centralized constants used across stages.
pub mod constants;
/// Top-level iteration state machine.
pub mod controller;
/// Extended-XYZ corpus reading and writing.
pub mod corpus;
/// Committee construction and uncertainty aggregation.
pub mod ensemble;
/// Structure frames and their typed property record.
pub mod frame;
/// Parallel reference-energy labeling.
pub mod labeling;
/// Bootstrap manifest records.
pub mod manifest;
/// Cross-iteration corpus merge and deduplication.
pub mod merge;
/// Stratification-health and training-error summaries.
pub mod metrics;
/// Uncertainty-ranked candidate selection.
pub mod selection;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{
    BootstrapConfig, LabelingConfig, LayoutConfig, LoopConfig, MergeConfig, ModelConfig,
    SelectionConfig,
};
pub use controller::{
    Controller, IterationOutcome, IterationReport, SearchEngine, TrainReport, Trainer,
};
pub use ensemble::{Committee, CommitteeEvaluation, Potential, PotentialLoader, Prediction};
pub use errors::PipelineError;
pub use frame::Frame;
pub use labeling::{Labeler, LabelingOutcome, ScratchDir};
pub use manifest::{BootstrapEntry, BucketStats, Manifest, ManifestOutputs};
pub use merge::merge_frames;
pub use selection::{CandidatePool, select_most_uncertain};
pub use types::{BootIndex, ChargeState, ConfId, Iteration, Species};
