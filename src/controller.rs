//! Top-level iteration controller.
//!
//! One iteration walks `Bootstrap → Train → Search → Label →
//! CheckSufficiency → Merge` as an explicit state machine. The sufficiency
//! check owns the only branching: a bounded retry sub-loop back to `Search`,
//! one fresh-population fallback once retries are spent, and an explicit
//! `Abandoned` terminal state when the fallback also comes up short.
//! Abandonment skips the merge and the next iteration re-consumes the
//! previous corpus.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::bootstrap;
use crate::config::LoopConfig;
use crate::ensemble::{Committee, PotentialLoader};
use crate::errors::PipelineError;
use crate::labeling::{self, Labeler};
use crate::manifest::Manifest;
use crate::merge;
use crate::selection::{self, CandidatePool};
use crate::types::Iteration;

/// MAE summary returned by the external trainer for one committee.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrainReport {
    /// Mean training MAE across committee members, when reported.
    pub train_mae: Option<f64>,
    /// Mean validation MAE across committee members, when reported.
    pub validation_mae: Option<f64>,
}

/// External training stage: consumes a bootstrap manifest, trains one model
/// per bootstrap set, and leaves the artifacts under the iteration's runs
/// directory following the configured naming convention.
pub trait Trainer {
    /// Train every bootstrap member described by `manifest`.
    fn train(&self, manifest: &Manifest) -> Result<TrainReport, PipelineError>;
}

/// External structure search driven by the committee oracle.
pub trait SearchEngine {
    /// Regenerate the candidate population from scratch. Invoked only on
    /// the fresh-population fallback path.
    fn initialize_population(&self, iteration: Iteration) -> Result<(), PipelineError>;

    /// Produce relaxed candidates, scored through `committee`.
    fn search(
        &self,
        iteration: Iteration,
        committee: &Committee,
    ) -> Result<CandidatePool, PipelineError>;
}

/// Terminal state of one iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Sufficiency reached; the merged corpus for the next iteration.
    Merged(PathBuf),
    /// Retries and the fresh-population fallback were exhausted; no new
    /// corpus was written.
    Abandoned,
}

/// Audit record of one finished iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationReport {
    /// Iteration index the record belongs to.
    pub iteration: Iteration,
    /// Terminal state the iteration reached.
    pub outcome: IterationOutcome,
    /// Search+label retries consumed (not counting the first attempt).
    pub retries_used: u32,
    /// Whether the fresh-population fallback ran.
    pub fresh_population_used: bool,
    /// MAE summary from the training stage.
    pub train_report: TrainReport,
    /// Successfully labeled structures in the attempt that ended the
    /// iteration.
    pub labeled_ok: usize,
}

/// Bounded retry bookkeeping for the search+label sub-loop. Reset at the
/// start of every iteration.
#[derive(Clone, Copy, Debug)]
struct RetryState {
    retries: u32,
    max_retries: u32,
    fresh_attempted: bool,
}

impl RetryState {
    fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
            fresh_attempted: false,
        }
    }
}

/// Named states of the per-iteration machine.
enum Phase {
    Bootstrap,
    Train(Manifest),
    Search { fresh: bool },
    Label,
    CheckSufficiency { labeled_ok: usize },
    Merge { labeled_ok: usize },
    Done(IterationOutcome, usize),
}

/// Drives the active-learning loop over all configured iterations.
pub struct Controller<'a> {
    config: &'a LoopConfig,
    trainer: &'a dyn Trainer,
    search: &'a dyn SearchEngine,
    labeler: &'a dyn Labeler,
    loader: &'a dyn PotentialLoader,
}

impl<'a> Controller<'a> {
    /// Wire the controller to its four external collaborators.
    pub fn new(
        config: &'a LoopConfig,
        trainer: &'a dyn Trainer,
        search: &'a dyn SearchEngine,
        labeler: &'a dyn Labeler,
        loader: &'a dyn PotentialLoader,
    ) -> Self {
        Self {
            config,
            trainer,
            search,
            labeler,
            loader,
        }
    }

    /// Run every configured iteration and return their audit records.
    ///
    /// The corpus consumed by iteration `i` is the merge product of the
    /// last non-abandoned iteration before it (iteration 0 consumes the
    /// seed corpus at its canonical path).
    pub fn run(&self) -> Result<Vec<IterationReport>, PipelineError> {
        let mut corpus_path = self.config.layout.dataset_path(0);
        let mut reports = Vec::with_capacity(self.config.iterations);
        for iteration in 0..self.config.iterations {
            let report = self.run_iteration(iteration, &corpus_path)?;
            if let IterationOutcome::Merged(next) = &report.outcome {
                corpus_path = next.clone();
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Walk one iteration through the state machine.
    pub fn run_iteration(
        &self,
        iteration: Iteration,
        input: &Path,
    ) -> Result<IterationReport, PipelineError> {
        let mut retry = RetryState::new(self.config.labeling.max_retries);
        let mut train_report = TrainReport::default();
        let mut phase = Phase::Bootstrap;

        loop {
            phase = match phase {
                Phase::Bootstrap => {
                    let manifest = bootstrap::run_bootstrap(self.config, iteration, input)?;
                    Phase::Train(manifest)
                }
                Phase::Train(manifest) => {
                    train_report = self.trainer.train(&manifest)?;
                    info!(
                        iteration,
                        train_mae = train_report.train_mae,
                        validation_mae = train_report.validation_mae,
                        "committee trained"
                    );
                    Phase::Search { fresh: false }
                }
                Phase::Search { fresh } => {
                    if fresh {
                        self.search.initialize_population(iteration)?;
                    }
                    let committee = Committee::load(
                        &self.config.layout,
                        &self.config.model,
                        iteration,
                        self.loader,
                    )?;
                    let pool = self.search.search(iteration, &committee)?;
                    selection::run_selection(self.config, iteration, &pool)?;
                    Phase::Label
                }
                Phase::Label => {
                    let outcome = labeling::run_labeling(self.config, iteration, self.labeler)?;
                    Phase::CheckSufficiency {
                        labeled_ok: outcome.ok_count(),
                    }
                }
                Phase::CheckSufficiency { labeled_ok } => {
                    if labeled_ok > self.config.labeling.min_labeled {
                        Phase::Merge { labeled_ok }
                    } else if retry.retries < retry.max_retries {
                        retry.retries += 1;
                        warn!(
                            iteration,
                            labeled_ok,
                            retry = retry.retries,
                            max_retries = retry.max_retries,
                            "insufficient labeled structures, retrying search"
                        );
                        Phase::Search { fresh: false }
                    } else if !retry.fresh_attempted {
                        retry.fresh_attempted = true;
                        warn!(
                            iteration,
                            labeled_ok, "retries exhausted, regenerating candidate population"
                        );
                        Phase::Search { fresh: true }
                    } else {
                        warn!(
                            iteration,
                            labeled_ok,
                            retries = retry.retries,
                            "iteration abandoned, previous corpus carries forward"
                        );
                        Phase::Done(IterationOutcome::Abandoned, labeled_ok)
                    }
                }
                Phase::Merge { labeled_ok } => {
                    let next = merge::run_merge(
                        self.config,
                        iteration,
                        input,
                        self.config.merge.include_failed,
                    )?;
                    Phase::Done(IterationOutcome::Merged(next), labeled_ok)
                }
                Phase::Done(outcome, labeled_ok) => {
                    let report = IterationReport {
                        iteration,
                        outcome,
                        retries_used: retry.retries,
                        fresh_population_used: retry.fresh_attempted,
                        train_report,
                        labeled_ok,
                    };
                    info!(
                        iteration,
                        retries = report.retries_used,
                        fresh_population = report.fresh_population_used,
                        labeled_ok = report.labeled_ok,
                        merged = matches!(report.outcome, IterationOutcome::Merged(_)),
                        "iteration finished"
                    );
                    return Ok(report);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    use crate::constants::corpus::SENTINEL_ENERGY;
    use crate::corpus;
    use crate::ensemble::{Potential, Prediction};
    use crate::frame::Frame;
    use crate::labeling::ScratchDir;

    struct StubPotential;
    impl Potential for StubPotential {
        fn evaluate(&self, frame: &Frame) -> Result<Prediction, PipelineError> {
            Ok(Prediction {
                energy: -1.0,
                forces: vec![[0.0; 3]; frame.atom_count()],
            })
        }
    }

    struct StubLoader;
    impl PotentialLoader for StubLoader {
        fn load(&self, _artifact: &Path) -> Result<Box<dyn Potential>, PipelineError> {
            Ok(Box::new(StubPotential))
        }
    }

    /// Writes one artifact per bootstrap set where discovery expects them.
    struct ArtifactTrainer {
        config: LoopConfig,
    }
    impl Trainer for ArtifactTrainer {
        fn train(&self, manifest: &Manifest) -> Result<TrainReport, PipelineError> {
            for boot in &manifest.outputs.boots {
                let dir = self
                    .config
                    .layout
                    .runs_dir(manifest.iteration)
                    .join(format!("boot_{:03}", boot.idx));
                fs::create_dir_all(&dir)?;
                let name = format!(
                    "{}_iter{:03}_boot{:03}_{}.{}",
                    self.config.model.tag,
                    manifest.iteration,
                    boot.idx,
                    self.config.model.run_id,
                    self.config.model.extension
                );
                fs::write(dir.join(name), b"")?;
            }
            Ok(TrainReport {
                train_mae: Some(0.01),
                validation_mae: Some(0.02),
            })
        }
    }

    /// Emits a fixed candidate pool and counts invocations.
    struct CountingSearch {
        searches: AtomicUsize,
        initializations: AtomicUsize,
    }
    impl CountingSearch {
        fn new() -> Self {
            Self {
                searches: AtomicUsize::new(0),
                initializations: AtomicUsize::new(0),
            }
        }
    }
    impl SearchEngine for CountingSearch {
        fn initialize_population(&self, _iteration: Iteration) -> Result<(), PipelineError> {
            self.initializations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn search(
            &self,
            _iteration: Iteration,
            committee: &Committee,
        ) -> Result<CandidatePool, PipelineError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            let frames = (0..4)
                .map(|i| {
                    let mut frame = Frame::new();
                    frame.conf_id = Some(format!("cand{i}"));
                    frame.charge = Some(0);
                    frame.push_atom("Cu", [i as f64, 0.0, 0.0]);
                    committee.evaluate(&mut frame)?;
                    Ok(frame)
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;
            Ok(CandidatePool::new(frames))
        }
    }

    struct AlwaysOkLabeler;
    impl Labeler for AlwaysOkLabeler {
        fn label(&self, frame: &Frame, _scratch: &ScratchDir) -> Result<Frame, PipelineError> {
            let mut labeled = frame.clone();
            labeled.energy = Some(-3.5);
            Ok(labeled)
        }
    }

    struct AlwaysFailLabeler;
    impl Labeler for AlwaysFailLabeler {
        fn label(&self, frame: &Frame, _scratch: &ScratchDir) -> Result<Frame, PipelineError> {
            Err(PipelineError::Labeling(
                frame.conf_id.clone(),
                "no convergence".to_string(),
            ))
        }
    }

    fn seed_corpus(path: &Path, count: usize) {
        let frames: Vec<Frame> = (0..count)
            .map(|i| {
                let mut frame = Frame::new();
                frame.conf_id = Some(format!("seed{i}"));
                frame.charge = Some((i % 2) as i32);
                frame.energy = Some(-2.0);
                frame.push_atom("Cu", [i as f64, 0.0, 0.0]);
                frame
            })
            .collect();
        corpus::write_frames(path, &frames).unwrap();
    }

    fn test_config(root: &Path) -> LoopConfig {
        let path = root.join("config.json");
        fs::write(
            &path,
            format!(
                r#"{{
                    "iterations": 1,
                    "layout": {{
                        "data_root": "{data}",
                        "runs_root": "{runs}"
                    }},
                    "bootstrap": {{ "bootstrap_count": 2, "validation_fraction": 0.2 }},
                    "selection": {{ "n_dft": 3 }},
                    "labeling": {{ "min_labeled": 2, "max_retries": 2, "workers": 2 }}
                }}"#,
                data = root.join("data").display(),
                runs = root.join("runs").display(),
            ),
        )
        .unwrap();
        LoopConfig::from_json_file(&path).unwrap()
    }

    #[test]
    fn sufficient_labeling_merges_on_the_first_attempt() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let seed_path = config.layout.dataset_path(0);
        fs::create_dir_all(seed_path.parent().unwrap()).unwrap();
        seed_corpus(&seed_path, 20);

        let trainer = ArtifactTrainer {
            config: config.clone(),
        };
        let search = CountingSearch::new();
        let controller = Controller::new(&config, &trainer, &search, &AlwaysOkLabeler, &StubLoader);
        let reports = controller.run().unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.retries_used, 0);
        assert!(!report.fresh_population_used);
        assert_eq!(report.labeled_ok, 3);
        assert_eq!(report.train_report.validation_mae, Some(0.02));
        let IterationOutcome::Merged(next) = &report.outcome else {
            panic!("expected a merged corpus");
        };
        assert_eq!(next, &config.layout.dataset_path(1));

        // Fresh labels shadow seed frames; nothing was deduplicated here
        // because candidate ids are disjoint from seed ids.
        let merged = corpus::read_frames(next).unwrap();
        assert_eq!(merged.len(), 3 + 20);
        assert_eq!(merged[0].conf_id.as_deref(), Some("cand0"));
        assert_eq!(merged[0].energy, Some(-3.5));

        assert_eq!(search.searches.load(Ordering::SeqCst), 1);
        assert_eq!(search.initializations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhausted_retries_fall_back_to_a_fresh_population_then_abandon() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let seed_path = config.layout.dataset_path(0);
        fs::create_dir_all(seed_path.parent().unwrap()).unwrap();
        seed_corpus(&seed_path, 20);

        let trainer = ArtifactTrainer {
            config: config.clone(),
        };
        let search = CountingSearch::new();
        let controller =
            Controller::new(&config, &trainer, &search, &AlwaysFailLabeler, &StubLoader);
        let reports = controller.run().unwrap();

        let report = &reports[0];
        assert_eq!(report.outcome, IterationOutcome::Abandoned);
        assert_eq!(report.retries_used, 2);
        assert!(report.fresh_population_used);
        assert_eq!(report.labeled_ok, 0);

        // First attempt + two retries + one fresh-population attempt.
        assert_eq!(search.searches.load(Ordering::SeqCst), 4);
        assert_eq!(search.initializations.load(Ordering::SeqCst), 1);

        // No merge product; only sentinel records were written.
        assert!(!config.layout.dataset_path(1).exists());
        let failed = corpus::read_frames(config.layout.labeled_failed_path(0)).unwrap();
        assert!(
            failed
                .iter()
                .all(|frame| frame.energy == Some(SENTINEL_ENERGY))
        );
    }

    /// Fails exactly one of the selected candidates.
    struct OneBadApple;
    impl Labeler for OneBadApple {
        fn label(&self, frame: &Frame, _scratch: &ScratchDir) -> Result<Frame, PipelineError> {
            if frame.conf_id.as_deref() == Some("cand1") {
                return Err(PipelineError::Labeling(
                    frame.conf_id.clone(),
                    "no convergence".to_string(),
                ));
            }
            let mut labeled = frame.clone();
            labeled.energy = Some(-3.5);
            Ok(labeled)
        }
    }

    #[test]
    fn sentinel_records_stay_out_of_the_next_corpus_by_default() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.labeling.min_labeled = 1;
        let seed_path = config.layout.dataset_path(0);
        fs::create_dir_all(seed_path.parent().unwrap()).unwrap();
        seed_corpus(&seed_path, 20);

        let trainer = ArtifactTrainer {
            config: config.clone(),
        };
        let search = CountingSearch::new();
        let controller = Controller::new(&config, &trainer, &search, &OneBadApple, &StubLoader);
        let reports = controller.run().unwrap();
        assert!(matches!(reports[0].outcome, IterationOutcome::Merged(_)));

        // The failed attempt is on disk for audit but not in the corpus.
        let failed = corpus::read_frames(config.layout.labeled_failed_path(0)).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].conf_id.as_deref(), Some("cand1"));

        let merged = corpus::read_frames(config.layout.dataset_path(1)).unwrap();
        assert_eq!(merged.len(), 2 + 20);
        assert!(merged.iter().all(|f| f.energy != Some(SENTINEL_ENERGY)));
        assert!(merged.iter().all(|f| f.conf_id.as_deref() != Some("cand1")));
    }

    #[test]
    fn sentinel_records_are_merged_when_configured() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.labeling.min_labeled = 1;
        config.merge.include_failed = true;
        let seed_path = config.layout.dataset_path(0);
        fs::create_dir_all(seed_path.parent().unwrap()).unwrap();
        seed_corpus(&seed_path, 20);

        let trainer = ArtifactTrainer {
            config: config.clone(),
        };
        let search = CountingSearch::new();
        let controller = Controller::new(&config, &trainer, &search, &OneBadApple, &StubLoader);
        controller.run().unwrap();

        let merged = corpus::read_frames(config.layout.dataset_path(1)).unwrap();
        assert_eq!(merged.len(), 3 + 20);
        let sentinel: Vec<_> = merged
            .iter()
            .filter(|f| f.energy == Some(SENTINEL_ENERGY))
            .collect();
        assert_eq!(sentinel.len(), 1);
        assert_eq!(sentinel[0].conf_id.as_deref(), Some("cand1"));
    }
}
