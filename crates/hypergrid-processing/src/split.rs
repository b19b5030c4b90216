//! Seeded train/test splitting.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::Dataset;
use crate::error::{DataError, Result};

/// Row indices of a train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split a dataset once into training and testing subsets.
///
/// The test subset has `ceil(n_rows * test_size)` rows. With `stratify`
/// the class proportions of both subsets follow the full dataset as
/// closely as integer counts allow.
///
/// # Errors
///
/// Returns [`DataError::InvalidConfig`] if `test_size` is not in `(0, 1)`
/// and [`DataError::EmptyDataset`] if either subset would be empty.
pub fn train_test_split(
    dataset: &Dataset,
    test_size: f64,
    seed: u64,
    stratify: bool,
) -> Result<(Dataset, Dataset)> {
    let indices = split_indices(dataset.target(), test_size, seed, stratify)?;
    Ok((dataset.subset(&indices.train), dataset.subset(&indices.test)))
}

/// Compute split indices for a binary target vector.
pub fn split_indices(
    target: &[f64],
    test_size: f64,
    seed: u64,
    stratify: bool,
) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DataError::InvalidConfig(format!(
            "test_size must be between 0.0 and 1.0 (exclusive), got {}",
            test_size
        )));
    }
    let n = target.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(DataError::EmptyDataset(format!(
            "cannot split {} rows with test_size {}",
            n, test_size
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut test = if stratify {
        stratified_test_rows(target, n_test, &mut rng)
    } else {
        let mut all: Vec<usize> = (0..n).collect();
        all.shuffle(&mut rng);
        all.truncate(n_test);
        all
    };

    let mut in_test = vec![false; n];
    for &i in &test {
        in_test[i] = true;
    }
    let mut train: Vec<usize> = (0..n).filter(|&i| !in_test[i]).collect();
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

/// Pick `n_test` rows, allocating them to classes by largest remainder.
fn stratified_test_rows(target: &[f64], n_test: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let n = target.len() as f64;
    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &y) in target.iter().enumerate() {
        classes[usize::from(y >= 0.5)].push(i);
    }

    let exact: Vec<f64> = classes
        .iter()
        .map(|rows| rows.len() as f64 * n_test as f64 / n)
        .collect();
    let mut quota: Vec<usize> = exact.iter().map(|q| q.floor() as usize).collect();
    let mut remaining = n_test - quota.iter().sum::<usize>();
    let mut order: Vec<usize> = (0..2).collect();
    order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
    for class in order.into_iter().cycle() {
        if remaining == 0 {
            break;
        }
        if quota[class] < classes[class].len() {
            quota[class] += 1;
            remaining -= 1;
        }
    }

    let mut test = Vec::with_capacity(n_test);
    for (rows, &take) in classes.iter_mut().zip(&quota) {
        rows.shuffle(rng);
        test.extend_from_slice(&rows[..take]);
    }
    test
}
