use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ConfId;

/// Error type for corpus parsing, configuration, and pipeline-state failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A corpus file could not be parsed, tagged with the offending line.
    #[error("failed to parse corpus frame: {details} (at line ~{line})")]
    Corpus {
        /// One-based line number the parser stopped at.
        line: usize,
        /// What was wrong with the input.
        details: String,
    },
    /// A frame reached the stratifier without a net charge.
    #[error("frame {0:?} has no parsable net charge; stratification requires one")]
    MissingCharge(Option<ConfId>),
    /// The configuration file is unreadable or carries degenerate values.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A required input file does not exist.
    #[error("required input file is missing: {0}")]
    MissingInput(PathBuf),
    /// The validation split consumed the whole corpus.
    #[error("training pool is empty after the validation split")]
    EmptyTrainingPool,
    /// Artifact discovery found nothing to build a committee from.
    #[error("no trained model artifacts matched '{pattern}'")]
    NoModelsFound {
        /// The glob-like pattern that matched zero files.
        pattern: String,
    },
    /// Every merge input group was empty.
    #[error("merge produced no frames; refusing to write an empty corpus")]
    NoFramesToMerge,
    /// A bootstrap manifest could not be serialized or deserialized.
    #[error("manifest failure: {0}")]
    Manifest(String),
    /// A committee member returned a malformed prediction.
    #[error("committee evaluation failed: {0}")]
    Committee(String),
    /// One labeling job failed; recovered per structure, never fatal.
    #[error("labeling failed for structure {0:?}: {1}")]
    Labeling(Option<ConfId>, String),
    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Shorthand for a line-tagged corpus parse error.
    pub fn corpus(line: usize, details: impl Into<String>) -> Self {
        Self::Corpus {
            line,
            details: details.into(),
        }
    }
}
