/// Constants used by corpus frame parsing and comment-line metadata keys.
pub mod corpus {
    /// Comment-line key carrying the integer net charge (`charge=-1`).
    pub const KEY_CHARGE: &str = "charge";
    /// Comment-line key carrying the reference energy of a labeled frame.
    pub const KEY_ENERGY: &str = "energy";
    /// Comment-line key carrying the stable structure identifier.
    pub const KEY_CONF_ID: &str = "confid";
    /// Comment-line key carrying the per-atom committee energy spread.
    pub const KEY_SIGMA_E: &str = "sigma_e_pa";
    /// Comment-line key carrying the mean committee force spread.
    pub const KEY_SIGMA_F: &str = "sigma_f_mean";
    /// Placeholder energy written for frames whose labeling failed.
    pub const SENTINEL_ENERGY: f64 = 1.0e6;
}

/// Constants describing the on-disk iteration layout.
pub mod layout {
    /// Validation-split file name inside an iteration directory.
    pub const VALID_FILE: &str = "valid.xyz";
    /// Training-pool file name inside an iteration directory.
    pub const TRAIN_POOL_FILE: &str = "train_pool.xyz";
    /// Manifest file name inside an iteration directory.
    pub const MANIFEST_FILE: &str = "manifest.json";
    /// File of candidates handed to the labeling collaborator.
    pub const SELECTED_FILE: &str = "selected_for_dft.xyz";
    /// File of successfully labeled structures.
    pub const LABELED_OK_FILE: &str = "dft_relaxed.xyz";
    /// File of failed labeling attempts (sentinel energies).
    pub const LABELED_FAILED_FILE: &str = "dft_failed.xyz";
    /// Suffix used while writing corpora before the atomic rename.
    pub const TMP_SUFFIX: &str = ".tmp";
}

/// Default values for pipeline configuration fields.
pub mod defaults {
    /// Base RNG seed when none is configured.
    pub const SEED: u64 = 42;
    /// Fraction of each charge bucket held out for validation.
    pub const VALIDATION_FRACTION: f64 = 0.1;
    /// Minimum validation frames contributed per charge bucket.
    pub const MIN_PER_BUCKET: usize = 1;
    /// Number of bootstrap training sets per iteration.
    pub const BOOTSTRAP_COUNT: usize = 5;
    /// Candidates forwarded to labeling per iteration.
    pub const N_DFT: usize = 10;
    /// Labeled-structure count must strictly exceed this to merge.
    pub const MIN_LABELED: usize = 5;
    /// Bounded search+label retries before the fresh-population fallback.
    pub const MAX_RETRIES: u32 = 3;
    /// Labeling worker-pool size.
    pub const LABEL_WORKERS: usize = 10;
}
