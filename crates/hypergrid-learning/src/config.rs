//! Configuration types for cross-validation and hyper-parameter search.
//!
//! This module provides [`SearchConfig`] and its builder. The same config
//! drives [`cross_validate`](crate::cross_validate),
//! [`GridSearch`](crate::GridSearch), [`RandomizedSearch`](crate::RandomizedSearch)
//! and the inner loop of [`nested_cross_validate`](crate::nested_cross_validate).
//!
//! # Example
//!
//! ```
//! use hypergrid_learning::{SearchConfig, Scoring};
//!
//! let config = SearchConfig::builder()
//!     .cv_folds(5)
//!     .scoring(Scoring::RocAuc)
//!     .n_jobs(-1)
//!     .random_seed(42)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.cv_folds, 5);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::LearningError;
use crate::metrics::Scoring;

/// Configuration for cross-validated evaluation of candidates.
///
/// Use [`SearchConfig::builder()`] to construct a configuration with the builder pattern.
///
/// # Validation
///
/// The builder validates the following constraints on [`build()`](SearchConfigBuilder::build):
/// - `cv_folds` must be at least 2
/// - `n_jobs` must be `-1` or at least 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of cross-validation folds (default: 5).
    ///
    /// Must be at least 2 and at most the number of training rows.
    pub cv_folds: usize,

    /// Whether rows are shuffled before being assigned to folds (default: true).
    pub shuffle: bool,

    /// Whether folds preserve the class proportions (default: true).
    pub stratified: bool,

    /// Metric that ranks candidates (default: accuracy).
    pub scoring: Scoring,

    /// Number of parallel jobs (default: -1 for all cores).
    ///
    /// - `-1`: Use all available CPU cores
    /// - `1`: Sequential (useful for debugging)
    /// - `n > 1`: Use exactly `n` worker threads
    pub n_jobs: i32,

    /// Random seed for fold assignment and sampling (default: 42).
    pub random_seed: u64,

    /// Refit the best candidate on all training rows (default: true).
    pub refit: bool,

    /// Also score every fold's training rows (default: false).
    ///
    /// Doubles scoring cost; useful to spot over-fitting candidates.
    pub return_train_score: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            shuffle: true,
            stratified: true,
            scoring: Scoring::Accuracy,
            n_jobs: -1,
            random_seed: 42,
            refit: true,
            return_train_score: false,
        }
    }
}

impl SearchConfig {
    /// Create a new builder for `SearchConfig`.
    #[must_use]
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), LearningError> {
        if self.cv_folds < 2 {
            return Err(LearningError::InvalidConfig(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        if self.n_jobs == 0 || self.n_jobs < -1 {
            return Err(LearningError::InvalidConfig(format!(
                "n_jobs must be -1 (all cores) or at least 1, got {}",
                self.n_jobs
            )));
        }
        Ok(())
    }

    /// Number of worker threads `n_jobs` resolves to on this machine.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        if self.n_jobs == -1 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.n_jobs.max(1) as usize
        }
    }
}

/// Builder for [`SearchConfig`].
///
/// Created via [`SearchConfig::builder()`]. All setters return `self` to allow
/// method chaining.
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Set the number of cross-validation folds (default: 5).
    ///
    /// [`build()`](Self::build) returns an error if `folds < 2`.
    #[must_use]
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    /// Enable or disable shuffling before fold assignment (default: true).
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Enable or disable stratified folds (default: true).
    #[must_use]
    pub fn stratified(mut self, stratified: bool) -> Self {
        self.config.stratified = stratified;
        self
    }

    /// Set the ranking metric (default: accuracy).
    #[must_use]
    pub fn scoring(mut self, scoring: Scoring) -> Self {
        self.config.scoring = scoring;
        self
    }

    /// Set the number of parallel jobs (default: -1 for all cores).
    #[must_use]
    pub fn n_jobs(mut self, jobs: i32) -> Self {
        self.config.n_jobs = jobs;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Enable or disable refitting the best candidate (default: true).
    #[must_use]
    pub fn refit(mut self, refit: bool) -> Self {
        self.config.refit = refit;
        self
    }

    /// Enable or disable training-fold scores (default: false).
    #[must_use]
    pub fn return_train_score(mut self, enable: bool) -> Self {
        self.config.return_train_score = enable;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] if:
    /// - `cv_folds` is less than 2
    /// - `n_jobs` is 0 or less than -1
    pub fn build(self) -> Result<SearchConfig, LearningError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.n_jobs, -1);
        assert_eq!(config.scoring, Scoring::Accuracy);
        assert!(config.refit);
        assert!(!config.return_train_score);
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn test_invalid_cv_folds() {
        for folds in [0, 1] {
            let result = SearchConfig::builder().cv_folds(folds).build();
            assert!(result.unwrap_err().to_string().contains("cv_folds"));
        }
    }

    #[test]
    fn test_invalid_n_jobs() {
        assert!(SearchConfig::builder().n_jobs(0).build().is_err());
        assert!(SearchConfig::builder().n_jobs(-2).build().is_err());
        let config = SearchConfig::builder().n_jobs(3).build().unwrap();
        assert_eq!(config.worker_threads(), 3);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SearchConfig::builder()
            .cv_folds(3)
            .shuffle(false)
            .stratified(false)
            .scoring(Scoring::F1)
            .random_seed(7)
            .refit(false)
            .return_train_score(true)
            .build()
            .unwrap();
        assert_eq!(config.cv_folds, 3);
        assert!(!config.shuffle);
        assert!(!config.stratified);
        assert_eq!(config.scoring, Scoring::F1);
        assert_eq!(config.random_seed, 7);
        assert!(!config.refit);
        assert!(config.return_train_score);
    }
}
