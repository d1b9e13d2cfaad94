//! Committee construction and uncertainty aggregation.
//!
//! A committee wraps the N independently trained models of one iteration
//! behind a single energy/force oracle. Model inference itself lives behind
//! the [`Potential`] trait; the reduction performed here is pure.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{LayoutConfig, ModelConfig};
use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::types::Iteration;

/// One model's prediction for a single structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Total energy.
    pub energy: f64,
    /// Per-atom forces in frame atom order.
    pub forces: Vec<[f64; 3]>,
}

/// Energy/force oracle backed by one trained model.
pub trait Potential: Send + Sync {
    /// Predict energy and forces for `frame`.
    fn evaluate(&self, frame: &Frame) -> Result<Prediction, PipelineError>;
}

/// Maps a discovered model artifact to a live [`Potential`].
///
/// The actual model runtime is an external collaborator; this crate only
/// owns discovery and aggregation.
pub trait PotentialLoader {
    /// Load the model stored at `artifact`.
    fn load(&self, artifact: &Path) -> Result<Box<dyn Potential>, PipelineError>;
}

/// Committee mean/spread for one evaluated structure.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitteeEvaluation {
    /// Arithmetic mean of member energies.
    pub mean_energy: f64,
    /// Elementwise mean of member force arrays.
    pub mean_forces: Vec<[f64; 3]>,
    /// Member energy spread divided by atom count.
    pub energy_uncertainty: f64,
    /// Mean elementwise force spread over all atoms and components.
    pub force_uncertainty: f64,
}

/// Discover the trained model artifacts of one iteration.
///
/// Artifacts follow
/// `<runs_root>/iter<NNN>/…/<tag>_iter<NNN>_boot<NNN>_<run_id>.<ext>`.
/// Zero matches is a hard error: a committee cannot be built from nothing.
pub fn discover_artifacts(
    layout: &LayoutConfig,
    model: &ModelConfig,
    iteration: Iteration,
) -> Result<Vec<PathBuf>, PipelineError> {
    let runs_dir = layout.runs_dir(iteration);
    let prefix = format!("{}_iter{iteration:03}_boot", model.tag);
    let suffix = format!("_{}.{}", model.run_id, model.extension);

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(&runs_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if let Some(middle) = name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            && !middle.is_empty()
            && middle.bytes().all(|b| b.is_ascii_digit())
        {
            artifacts.push(entry.path().to_path_buf());
        }
    }
    artifacts.sort();

    if artifacts.is_empty() {
        return Err(PipelineError::NoModelsFound {
            pattern: format!("{}/**/{prefix}*{suffix}", runs_dir.display()),
        });
    }
    Ok(artifacts)
}

/// Ordered set of trained models evaluated as one calculator.
pub struct Committee {
    members: Vec<Box<dyn Potential>>,
}

impl std::fmt::Debug for Committee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Committee")
            .field("members", &self.members.len())
            .finish()
    }
}

impl Committee {
    /// Build a committee from explicit members. Empty committees are
    /// rejected with the same error as failed discovery.
    pub fn from_members(members: Vec<Box<dyn Potential>>) -> Result<Self, PipelineError> {
        if members.is_empty() {
            return Err(PipelineError::NoModelsFound {
                pattern: "(explicit member list)".to_string(),
            });
        }
        Ok(Self { members })
    }

    /// Discover the iteration's artifacts and load every member.
    pub fn load(
        layout: &LayoutConfig,
        model: &ModelConfig,
        iteration: Iteration,
        loader: &dyn PotentialLoader,
    ) -> Result<Self, PipelineError> {
        let artifacts = discover_artifacts(layout, model, iteration)?;
        let members = artifacts
            .iter()
            .map(|path| loader.load(path))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_members(members)
    }

    /// Number of committee members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: empty committees cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Evaluate every member on `frame` and reduce to mean plus spread.
    ///
    /// The committee energy and both uncertainty values are written back
    /// onto the frame so downstream ranking can read them without
    /// re-evaluating.
    pub fn evaluate(&self, frame: &mut Frame) -> Result<CommitteeEvaluation, PipelineError> {
        let n_atoms = frame.atom_count();
        let mut energies = Vec::with_capacity(self.members.len());
        let mut forces = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let prediction = member.evaluate(frame)?;
            if prediction.forces.len() != n_atoms {
                return Err(PipelineError::Committee(format!(
                    "member returned {} force rows for {} atoms",
                    prediction.forces.len(),
                    n_atoms
                )));
            }
            energies.push(prediction.energy);
            forces.push(prediction.forces);
        }

        let mean_energy = mean(&energies);
        let energy_spread = population_std(&energies, mean_energy);
        let energy_uncertainty = if n_atoms == 0 {
            0.0
        } else {
            energy_spread / n_atoms as f64
        };

        let mut mean_forces = vec![[0.0f64; 3]; n_atoms];
        let mut force_spread_sum = 0.0;
        for atom in 0..n_atoms {
            for axis in 0..3 {
                let components: Vec<f64> =
                    forces.iter().map(|member| member[atom][axis]).collect();
                let component_mean = mean(&components);
                mean_forces[atom][axis] = component_mean;
                force_spread_sum += population_std(&components, component_mean);
            }
        }
        let force_uncertainty = if n_atoms == 0 {
            0.0
        } else {
            force_spread_sum / (n_atoms as f64 * 3.0)
        };

        frame.energy = Some(mean_energy);
        frame.energy_uncertainty = Some(energy_uncertainty);
        frame.force_uncertainty = Some(force_uncertainty);

        Ok(CommitteeEvaluation {
            mean_energy,
            mean_forces,
            energy_uncertainty,
            force_uncertainty,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
