//! Reproducible train/held-out partitioning

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Index partition of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded generator and hold out `ceil(test_fraction * n)`
/// indices. The same `(n, test_fraction, seed)` always yields the same split.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Split {
    let n_test = ((test_fraction * n as f64).ceil() as usize).min(n);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Split {
        train,
        test: indices,
    }
}
