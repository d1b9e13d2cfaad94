use indexmap::IndexMap;

use crate::errors::PipelineError;
use crate::types::{ChargeState, ConfId, Species};

/// One atomic configuration plus its typed property record.
///
/// Frames are mutable while a candidate is being built or relaxed and are
/// treated as immutable once a reference energy has been attached. Free-form
/// comment-line keys that the pipeline does not interpret are preserved in
/// `extra` so corpora round-trip through read/write unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    /// Species symbols, one per atom, in file order.
    pub species: Vec<Species>,
    /// Cartesian positions, one per atom, in file order.
    pub positions: Vec<[f64; 3]>,
    /// Per-atom forces when the frame carries them.
    pub forces: Option<Vec<[f64; 3]>>,
    /// Reference (or committee) total energy.
    pub energy: Option<f64>,
    /// Integer net charge; the stratification bucket key.
    pub charge: Option<ChargeState>,
    /// Stable identifier used for deduplication and lineage.
    pub conf_id: Option<ConfId>,
    /// Per-atom committee energy spread attached after evaluation.
    pub energy_uncertainty: Option<f64>,
    /// Mean committee force spread attached after evaluation.
    pub force_uncertainty: Option<f64>,
    /// Uninterpreted comment-line entries, preserved in order.
    pub extra: IndexMap<String, String>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of atoms in the frame.
    pub fn atom_count(&self) -> usize {
        self.species.len()
    }

    /// Append one atom.
    pub fn push_atom(&mut self, species: impl Into<Species>, position: [f64; 3]) {
        self.species.push(species.into());
        self.positions.push(position);
    }

    /// Net charge, or the fatal stratification error when absent.
    ///
    /// Absence is tolerated everywhere except bucketing: a corpus frame
    /// without a charge cannot be assigned to a stratum.
    pub fn charge_state(&self) -> Result<ChargeState, PipelineError> {
        self.charge
            .ok_or_else(|| PipelineError::MissingCharge(self.conf_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_state_requires_a_charge() {
        let mut frame = Frame::new();
        frame.push_atom("Cu", [0.0, 0.0, 0.0]);
        frame.conf_id = Some("c7".to_string());

        let err = frame.charge_state().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingCharge(Some(ref id)) if id == "c7"
        ));

        frame.charge = Some(-1);
        assert_eq!(frame.charge_state().unwrap(), -1);
    }

    #[test]
    fn push_atom_keeps_species_and_positions_aligned() {
        let mut frame = Frame::new();
        frame.push_atom("Ag", [1.0, 2.0, 3.0]);
        frame.push_atom("Ag", [4.0, 5.0, 6.0]);
        assert_eq!(frame.atom_count(), 2);
        assert_eq!(frame.positions[1], [4.0, 5.0, 6.0]);
    }
}
