//! Stratified validation split and bootstrap resampling.
//!
//! The sampler is a pure function of `(corpus, configuration, seed)`:
//! identical inputs produce byte-identical split and bootstrap files. The
//! split seed is `base + iteration` and the bootstrap draws use `split + 1`
//! so the two decisions stay independently reproducible.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::{BootstrapConfig, LoopConfig};
use crate::corpus;
use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::manifest::{BootstrapEntry, BucketStats, Manifest, ManifestOutputs};
use crate::metrics::bucket_skew;
use crate::types::{ChargeState, Iteration};

/// Disjoint validation/training-pool partition of one corpus.
#[derive(Clone, Debug)]
pub struct Split {
    /// Held-out validation frames.
    pub validation: Vec<Frame>,
    /// Remaining training-pool frames.
    pub train_pool: Vec<Frame>,
    /// Per-bucket accounting, in ascending charge order.
    pub per_charge: BTreeMap<ChargeState, BucketStats>,
}

/// Partition `frames` into validation and training pool, stratified by net
/// charge. Every frame must carry a parsable charge; a frame without one is
/// a malformed-corpus error, not a silent skip.
pub fn stratified_split(
    frames: &[Frame],
    config: &BootstrapConfig,
    seed: u64,
) -> Result<Split, PipelineError> {
    let mut buckets: BTreeMap<ChargeState, Vec<usize>> = BTreeMap::new();
    for (idx, frame) in frames.iter().enumerate() {
        buckets.entry(frame.charge_state()?).or_default().push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut validation = Vec::new();
    let mut train_pool = Vec::new();
    let mut per_charge = BTreeMap::new();
    for (charge, mut indices) in buckets {
        indices.shuffle(&mut rng);
        let k = validation_count(indices.len(), config);
        for &idx in &indices[..k] {
            validation.push(frames[idx].clone());
        }
        for &idx in &indices[k..] {
            train_pool.push(frames[idx].clone());
        }
        per_charge.insert(
            charge,
            BucketStats {
                total: indices.len(),
                validation: k,
                train_pool: indices.len() - k,
            },
        );
    }

    Ok(Split {
        validation,
        train_pool,
        per_charge,
    })
}

/// Validation frames taken from a bucket of `bucket_size` members.
///
/// Fractional configs take `max(min_per_bucket, round(size * fraction))` so
/// small buckets never vanish from validation; a fraction `>= 1` is an
/// absolute per-bucket count. Always clamped to the bucket size.
fn validation_count(bucket_size: usize, config: &BootstrapConfig) -> usize {
    let fraction = config.validation_fraction;
    let k = if fraction < 1.0 {
        let proportional = (bucket_size as f64 * fraction).round() as usize;
        proportional.max(config.min_per_bucket)
    } else {
        fraction as usize
    };
    k.min(bucket_size)
}

/// Draw `count` bootstrap sets of `size` frames each (with replacement)
/// from the training pool. `size == 0` means "full pool size".
pub fn draw_bootstraps(
    train_pool: &[Frame],
    count: usize,
    size: usize,
    seed: u64,
) -> Result<Vec<Vec<Frame>>, PipelineError> {
    if train_pool.is_empty() {
        return Err(PipelineError::EmptyTrainingPool);
    }
    let size = if size == 0 { train_pool.len() } else { size };
    let mut rng = StdRng::seed_from_u64(seed);
    let sets = (0..count)
        .map(|_| {
            (0..size)
                .map(|_| train_pool[rng.random_range(0..train_pool.len())].clone())
                .collect()
        })
        .collect();
    Ok(sets)
}

/// Run the full bootstrap stage for one iteration: split the input corpus,
/// persist the split and every bootstrap set, and write the manifest that
/// hands the iteration off to the external trainer.
///
/// `input` is passed explicitly rather than derived from the iteration
/// index: after an abandoned iteration the controller re-feeds the previous
/// corpus instead of a merge product.
pub fn run_bootstrap(
    config: &LoopConfig,
    iteration: Iteration,
    input: &Path,
) -> Result<Manifest, PipelineError> {
    let layout = &config.layout;
    let input = input.to_path_buf();
    if !input.is_file() {
        return Err(PipelineError::MissingInput(input));
    }
    let frames = corpus::read_frames(&input)?;
    let seed = config.seed.wrapping_add(iteration as u64);

    let split = stratified_split(&frames, &config.bootstrap, seed)?;
    if split.train_pool.is_empty() {
        return Err(PipelineError::EmptyTrainingPool);
    }

    let outdir = layout.iter_dir(iteration);
    fs::create_dir_all(&outdir)?;
    corpus::write_frames(layout.valid_path(iteration), &split.validation)?;
    corpus::write_frames(layout.train_pool_path(iteration), &split.train_pool)?;

    let sets = draw_bootstraps(
        &split.train_pool,
        config.bootstrap.bootstrap_count,
        config.bootstrap.bootstrap_size,
        seed.wrapping_add(1),
    )?;
    let mut boots = Vec::with_capacity(sets.len());
    for (i, set) in sets.iter().enumerate() {
        let idx = i + 1;
        let path = layout.boot_path(iteration, idx);
        corpus::write_frames(&path, set)?;
        boots.push(BootstrapEntry {
            idx,
            size: set.len(),
            path,
        });
    }

    let totals: BTreeMap<ChargeState, usize> = split
        .per_charge
        .iter()
        .map(|(charge, stats)| (*charge, stats.total))
        .collect();
    if let Some(skew) = bucket_skew(&totals) {
        debug!(
            buckets = skew.buckets,
            max_share = skew.max_share,
            ratio = skew.ratio,
            "charge bucket balance"
        );
    }

    let manifest = Manifest {
        iteration,
        input,
        outdir,
        total_frames: frames.len(),
        valid_frames: split.validation.len(),
        train_pool_frames: split.train_pool.len(),
        per_charge: split.per_charge,
        bootstrap_count: config.bootstrap.bootstrap_count,
        bootstrap_size: boots.first().map(|entry| entry.size).unwrap_or(0),
        seed,
        created_at: Utc::now(),
        outputs: ManifestOutputs {
            valid_xyz: layout.valid_path(iteration),
            train_pool_xyz: layout.train_pool_path(iteration),
            boots,
        },
    };
    manifest.write(layout.manifest_path(iteration))?;
    info!(
        iteration,
        total = manifest.total_frames,
        validation = manifest.valid_frames,
        pool = manifest.train_pool_frames,
        boots = manifest.bootstrap_count,
        "bootstrap stage complete"
    );
    Ok(manifest)
}
