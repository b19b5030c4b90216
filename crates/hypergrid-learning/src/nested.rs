//! Nested cross-validation.
//!
//! The outer loop splits the data into folds; on every outer training
//! split a complete inner search picks and refits the best configuration,
//! which is then scored on the outer held-out fold. The outer scores
//! estimate how well the *tuning procedure* generalizes, not any single
//! configuration.

use hypergrid_processing::Dataset;
use hypergrid_processing::utils::mean_std;
use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::config::SearchConfig;
use crate::cross_validation::make_folds;
use crate::error::{LearningError, Result};
use crate::params::ParamSet;
use crate::search::Search;

/// Per-outer-fold results of [`nested_cross_validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedCvResult {
    /// Score of each outer fold's refit best pipeline on its held-out rows.
    pub outer_scores: Vec<f64>,
    /// Best inner mean score per outer fold.
    pub inner_best_scores: Vec<f64>,
    /// Winning configuration per outer fold.
    pub best_params: Vec<ParamSet>,
    pub mean: f64,
    /// Population standard deviation (ddof = 0).
    pub std: f64,
}

impl NestedCvResult {
    pub fn n_folds(&self) -> usize {
        self.outer_scores.len()
    }
}

impl fmt::Display for NestedCvResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>4}  {:>9}  {:>9}  best params", "fold", "outer", "inner")?;
        for (i, ((outer, inner), params)) in self
            .outer_scores
            .iter()
            .zip(&self.inner_best_scores)
            .zip(&self.best_params)
            .enumerate()
        {
            writeln!(f, "{:>4}  {:>9.4}  {:>9.4}  {}", i, outer, inner, params)?;
        }
        write!(f, "nested CV score: {:.4} +/- {:.4}", self.mean, self.std)
    }
}

/// Run an inner search on every outer training split.
///
/// `search_factory` receives the outer fold index and returns the search to
/// run on that fold's training rows; it must have `refit` enabled. Outer
/// folds come from `outer` (`cv_folds`, `shuffle`, `stratified`,
/// `random_seed`) and are scored with `outer.scoring`.
///
/// # Errors
///
/// [`LearningError::InvalidConfig`] if an inner search does not refit, plus
/// any error of the inner searches.
pub fn nested_cross_validate<F>(
    search_factory: F,
    dataset: &Dataset,
    outer: &SearchConfig,
) -> Result<NestedCvResult>
where
    F: Fn(usize) -> Search,
{
    outer.validate()?;
    let folds = make_folds(dataset, outer)?;
    info!(
        "Nested cross-validation: {} outer folds on {} rows",
        folds.len(),
        dataset.n_rows()
    );

    let mut outer_scores = Vec::with_capacity(folds.len());
    let mut inner_best_scores = Vec::with_capacity(folds.len());
    let mut best_params = Vec::with_capacity(folds.len());

    for (i, fold) in folds.iter().enumerate() {
        let train = dataset.subset(&fold.train);
        let test = dataset.subset(&fold.test);

        let fitted = search_factory(i).fit(&train)?;
        let best = fitted.best_estimator.ok_or_else(|| {
            LearningError::InvalidConfig(
                "nested cross-validation needs inner searches with refit enabled".to_string(),
            )
        })?;
        let score = best.score(&test, outer.scoring)?;
        info!(
            "Outer fold {}: {} = {:.4} with {}",
            i, outer.scoring, score, fitted.results.best_params
        );

        outer_scores.push(score);
        inner_best_scores.push(fitted.results.best_score);
        best_params.push(fitted.results.best_params);
    }

    let (mean, std) = mean_std(&outer_scores);
    Ok(NestedCvResult {
        outer_scores,
        inner_best_scores,
        best_params,
        mean,
        std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::LogisticRegression;
    use crate::params::ParamGrid;
    use crate::pipeline::ModelPipeline;
    use crate::search::GridSearch;
    use hypergrid_processing::{ClassLabels, Feature};

    fn dataset() -> Dataset {
        let n = 60;
        let x: Vec<Option<f64>> = (0..n).map(|i| Some(((i * 23) % 60) as f64)).collect();
        let target: Vec<f64> = (0..n)
            .map(|i| {
                let signal = (i * 23) % 60 >= 30;
                if signal != (i % 7 == 0) { 1.0 } else { 0.0 }
            })
            .collect();
        Dataset::new(
            vec![Feature::numeric("x", x)],
            target,
            ClassLabels {
                negative: "a".to_string(),
                positive: "b".to_string(),
            },
        )
        .unwrap()
    }

    fn search(refit: bool) -> Search {
        let pipeline = ModelPipeline::builder()
            .classifier(LogisticRegression::default())
            .build()
            .unwrap();
        let grid = ParamGrid::new().add("classifier__C", [0.01, 1.0]);
        let config = SearchConfig::builder()
            .cv_folds(2)
            .n_jobs(1)
            .refit(refit)
            .build()
            .unwrap();
        GridSearch::new(pipeline, grid, config).into()
    }

    #[test]
    fn test_one_score_per_outer_fold() {
        let outer = SearchConfig::builder().cv_folds(3).build().unwrap();
        let result = nested_cross_validate(|_| search(true), &dataset(), &outer).unwrap();

        assert_eq!(result.n_folds(), 3);
        assert_eq!(result.best_params.len(), 3);
        assert!(result.outer_scores.iter().all(|s| (0.0..=1.0).contains(s)));
        let expected = result.outer_scores.iter().sum::<f64>() / 3.0;
        assert!((result.mean - expected).abs() < 1e-12);
        assert!(result.to_string().contains("nested CV score"));
    }

    #[test]
    fn test_requires_refit() {
        let outer = SearchConfig::builder().cv_folds(3).build().unwrap();
        let err = nested_cross_validate(|_| search(false), &dataset(), &outer).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
