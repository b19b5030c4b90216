//! K-fold splitting and cross-validated scoring.
//!
//! [`KFold`] cuts rows into `k` contiguous (optionally shuffled) chunks;
//! [`StratifiedKFold`] deals each class round-robin across the folds so
//! every fold keeps the class balance. In both, folds are disjoint, cover
//! every row exactly once, and differ in size by at most one row.

use hypergrid_processing::Dataset;
use hypergrid_processing::utils::mean_std;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::{LearningError, Result};
use crate::metrics::Scoring;
use crate::pipeline::ModelPipeline;

/// Row indices of one train/test fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn check_n_splits(n_splits: usize, n_rows: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(LearningError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {}",
            n_splits
        )));
    }
    if n_splits > n_rows {
        return Err(LearningError::InvalidConfig(format!(
            "cannot split {} rows into {} folds",
            n_rows, n_splits
        )));
    }
    Ok(())
}

/// Build folds from a per-row fold assignment.
fn folds_from_assignment(assignment: &[usize], n_splits: usize) -> Vec<Fold> {
    (0..n_splits)
        .map(|k| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..assignment.len()).partition(|&row| assignment[row] == k);
            Fold { train, test }
        })
        .collect()
}

/// Plain k-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: 0,
        }
    }

    #[must_use]
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Split `n_rows` rows into folds.
    ///
    /// # Errors
    ///
    /// [`LearningError::InvalidConfig`] if `n_splits < 2` or `n_splits > n_rows`.
    pub fn split(&self, n_rows: usize) -> Result<Vec<Fold>> {
        check_n_splits(self.n_splits, n_rows)?;

        let mut order: Vec<usize> = (0..n_rows).collect();
        if self.shuffle {
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));
        }

        let base = n_rows / self.n_splits;
        let remainder = n_rows % self.n_splits;
        let mut assignment = vec![0; n_rows];
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < remainder);
            for &row in &order[start..start + size] {
                assignment[row] = k;
            }
            start += size;
        }
        Ok(folds_from_assignment(&assignment, self.n_splits))
    }
}

/// K-fold splitter that preserves the class balance of a binary target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: 0,
        }
    }

    #[must_use]
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Split rows by their `0.0` / `1.0` labels.
    ///
    /// Classes are laid end to end (each shuffled when enabled) and rows
    /// are dealt to folds round-robin over that order.
    pub fn split(&self, y: &[f64]) -> Result<Vec<Fold>> {
        check_n_splits(self.n_splits, y.len())?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order = Vec::with_capacity(y.len());
        for class in [0.0, 1.0] {
            let mut members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
            if members.len() < self.n_splits {
                warn!(
                    "class {} has only {} rows, fewer than {} folds",
                    class,
                    members.len(),
                    self.n_splits
                );
            }
            if self.shuffle {
                members.shuffle(&mut rng);
            }
            order.extend(members);
        }
        if order.len() != y.len() {
            return Err(LearningError::InvalidData(
                "stratified folds need a target of 0.0 / 1.0 labels".to_string(),
            ));
        }

        let mut assignment = vec![0; y.len()];
        for (position, &row) in order.iter().enumerate() {
            assignment[row] = position % self.n_splits;
        }
        Ok(folds_from_assignment(&assignment, self.n_splits))
    }
}

/// Folds for `dataset` as configured: stratified or plain, shuffled or not.
pub fn make_folds(dataset: &Dataset, config: &SearchConfig) -> Result<Vec<Fold>> {
    if config.stratified {
        let mut splitter = StratifiedKFold::new(config.cv_folds);
        if config.shuffle {
            splitter = splitter.shuffled(config.random_seed);
        }
        splitter.split(dataset.target())
    } else {
        let mut splitter = KFold::new(config.cv_folds);
        if config.shuffle {
            splitter = splitter.shuffled(config.random_seed);
        }
        splitter.split(dataset.n_rows())
    }
}

/// Scores from a single fit on one fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldScore {
    pub test_score: f64,
    pub train_score: Option<f64>,
    /// Seconds
    pub fit_time: f64,
}

/// Fit a fresh copy of `pipeline` on the fold's training rows and score it
/// on the held-out rows.
pub fn fit_and_score(
    pipeline: &ModelPipeline,
    dataset: &Dataset,
    fold: &Fold,
    scoring: Scoring,
    return_train_score: bool,
) -> Result<FoldScore> {
    let train = dataset.subset(&fold.train);
    let test = dataset.subset(&fold.test);

    let mut model = pipeline.clone();
    let started = Instant::now();
    model.fit(&train)?;
    let fit_time = started.elapsed().as_secs_f64();

    let test_score = model.score(&test, scoring)?;
    let train_score = if return_train_score {
        Some(model.score(&train, scoring)?)
    } else {
        None
    };
    Ok(FoldScore {
        test_score,
        train_score,
        fit_time,
    })
}

/// Per-fold scores and their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    pub test_scores: Vec<f64>,
    pub train_scores: Option<Vec<f64>>,
    pub fit_times: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation (ddof = 0).
    pub std: f64,
}

impl CvScores {
    pub fn from_folds(folds: &[FoldScore]) -> Self {
        let test_scores: Vec<f64> = folds.iter().map(|f| f.test_score).collect();
        let train_scores: Option<Vec<f64>> = folds.iter().map(|f| f.train_score).collect();
        let (mean, std) = mean_std(&test_scores);
        Self {
            test_scores,
            train_scores,
            fit_times: folds.iter().map(|f| f.fit_time).collect(),
            mean,
            std,
        }
    }

    pub fn n_folds(&self) -> usize {
        self.test_scores.len()
    }

    /// Mean and std of the train scores, if recorded.
    pub fn train_mean_std(&self) -> Option<(f64, f64)> {
        self.train_scores.as_deref().map(mean_std)
    }
}

pub(crate) fn build_pool(config: &SearchConfig) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads())
        .build()
        .map_err(|e| LearningError::InvalidConfig(format!("failed to start worker pool: {}", e)))
}

/// Cross-validate one pipeline configuration.
///
/// Folds run on a pool of `config.n_jobs` workers; the returned scores are
/// in fold order. Any failing fold fails the whole call.
pub fn cross_validate(
    pipeline: &ModelPipeline,
    dataset: &Dataset,
    config: &SearchConfig,
) -> Result<CvScores> {
    config.validate()?;
    let folds = make_folds(dataset, config)?;
    debug!(
        "Cross-validating {} over {} folds with {} workers",
        pipeline.classifier().name(),
        folds.len(),
        config.worker_threads()
    );

    let pool = build_pool(config)?;
    let results: Vec<FoldScore> = pool.install(|| {
        folds
            .par_iter()
            .map(|fold| {
                fit_and_score(
                    pipeline,
                    dataset,
                    fold,
                    config.scoring,
                    config.return_train_score,
                )
            })
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(CvScores::from_folds(&results))
}
