//! Seeded train/validation splitting.

use crate::data::batch::shuffle;
use crate::data::sample::Sample;

/// Shuffle `samples` with `seed` and split off `holdout_fraction` of them.
///
/// Returns `(train, holdout)`. The train side receives
/// `floor(len * (1 - holdout_fraction))` samples.
pub fn random_split(
    mut samples: Vec<Sample>,
    holdout_fraction: f64,
    seed: u64,
) -> (Vec<Sample>, Vec<Sample>) {
    let fraction = holdout_fraction.clamp(0.0, 1.0);
    let num_train = (samples.len() as f64 * (1.0 - fraction)) as usize;
    shuffle(&mut samples, seed);
    let holdout = samples.split_off(num_train);
    (samples, holdout)
}
