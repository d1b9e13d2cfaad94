//! Stratification-health and training-error summaries.

use std::collections::BTreeMap;

use crate::types::ChargeState;

/// Aggregate balance metrics for per-charge-bucket frame counts.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketSkew {
    /// Frames across all buckets.
    pub total: usize,
    /// Number of distinct charge buckets.
    pub buckets: usize,
    /// Smallest bucket size.
    pub min: usize,
    /// Largest bucket size.
    pub max: usize,
    /// Mean bucket size.
    pub mean: f64,
    /// Largest bucket's share of the corpus.
    pub max_share: f64,
    /// Smallest bucket's share of the corpus.
    pub min_share: f64,
    /// `max / min` bucket-size ratio; infinite when a bucket is empty.
    pub ratio: f64,
    /// Per-bucket breakdown, largest bucket first.
    pub per_bucket: Vec<BucketShare>,
}

/// Per-bucket share of a corpus for stratification-health inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketShare {
    /// Bucket key (integer net charge).
    pub charge: ChargeState,
    /// Frames in the bucket.
    pub count: usize,
    /// Bucket's share of the corpus.
    pub share: f64,
}

/// Compute skew metrics from per-bucket frame counts.
pub fn bucket_skew(counts: &BTreeMap<ChargeState, usize>) -> Option<BucketSkew> {
    if counts.is_empty() {
        return None;
    }
    let total: usize = counts.values().sum();
    let buckets = counts.len();
    let min = *counts.values().min().expect("counts non-empty");
    let max = *counts.values().max().expect("counts non-empty");
    let mean = total as f64 / buckets as f64;
    let share = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_bucket: Vec<BucketShare> = counts
        .iter()
        .map(|(charge, count)| BucketShare {
            charge: *charge,
            count: *count,
            share: share(*count),
        })
        .collect();
    per_bucket.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.charge.cmp(&b.charge)));
    Some(BucketSkew {
        total,
        buckets,
        min,
        max,
        mean,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_bucket,
    })
}

/// Mean absolute error across ensemble members, ignoring members that did
/// not report one. Returns `None` when no member reported.
///
/// Helper for [`Trainer`](crate::controller::Trainer) implementations that
/// collect one MAE per bootstrap member and need the aggregate values a
/// [`TrainReport`](crate::controller::TrainReport) carries.
pub fn mean_mae(values: &[Option<f64>]) -> Option<f64> {
    let reported: Vec<f64> = values.iter().copied().flatten().collect();
    if reported.is_empty() {
        return None;
    }
    Some(reported.iter().sum::<f64>() / reported.len() as f64)
}
