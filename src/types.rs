/// Stable structure identifier used for deduplication and lineage.
/// Example: `confid=42` in a frame comment line.
pub type ConfId = String;
/// Chemical species symbol as written in frame atom lines.
/// Examples: `Cu`, `Ag`, `H`
pub type Species = String;
/// Integer net charge used as the stratification bucket key.
/// Examples: `0`, `-1`, `+2`
pub type ChargeState = i32;
/// Zero-based active-learning iteration index.
pub type Iteration = usize;
/// One-based bootstrap member index within an iteration.
pub type BootIndex = usize;
