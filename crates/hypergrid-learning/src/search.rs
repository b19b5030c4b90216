//! Grid and randomized hyper-parameter search.
//!
//! Both strategies produce a list of candidate [`ParamSet`]s and hand them
//! to the same evaluator: every `(candidate, fold)` pair is an independent
//! fit on a rayon pool of `n_jobs` workers, each on its own clone of the
//! pipeline. Results are gathered in candidate order regardless of which
//! worker finishes first.
//!
//! # Failed candidates
//!
//! A fit error (for example a solver that does not support the requested
//! penalty) does not stop the search. The candidate's fold scores become
//! `NaN`, a warning is logged and recorded in
//! [`SearchResults::warnings`], and the candidate ranks last. Only when
//! every candidate fails does the search return
//! [`LearningError::TrainingFailed`].
//!
//! Parameter names or values the pipeline rejects outright are
//! configuration errors and abort the search before any fit.
//!
//! # Example
//!
//! ```rust,ignore
//! use hypergrid_learning::{GridSearch, ParamGrid, SearchConfig};
//!
//! let grid = ParamGrid::new()
//!     .add("classifier__learning_rate", [0.05, 0.1, 0.2])
//!     .add("classifier__max_depth", [3i64, 5, 7]);
//!
//! let fitted = GridSearch::new(pipeline, grid, SearchConfig::default())
//!     .on_progress(|u| println!("{:>3.0}% {}", u.progress * 100.0, u.message))
//!     .fit(&train)?;
//!
//! println!("{}", fitted.results);
//! let best = fitted.best_estimator.expect("refit enabled");
//! ```

use hypergrid_processing::Dataset;
use hypergrid_processing::utils::mean_std;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::config::SearchConfig;
use crate::cross_validation::{CvScores, FoldScore, build_pool, fit_and_score, make_folds};
use crate::error::{LearningError, Result};
use crate::params::{ParamDistributions, ParamGrid, ParamSet};
use crate::pipeline::ModelPipeline;
use crate::progress::{ProgressCallback, ProgressUpdate, SearchStage};
use crate::types::{CandidateResult, SearchResults, SearchStrategy};

/// Share of overall progress spent cross-validating; the rest is refit.
const CV_PROGRESS_SHARE: f64 = 0.9;

/// Outcome of a search.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FittedSearch {
    pub results: SearchResults,
    /// The best configuration refit on every row, when `refit` is enabled.
    pub best_estimator: Option<ModelPipeline>,
}

/// Progress and cancellation hooks shared by both strategies.
#[derive(Clone, Default)]
struct SearchHooks {
    progress_callback: Option<ProgressCallback>,
    cancellation_token: Option<CancellationToken>,
}

impl std::fmt::Debug for SearchHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHooks")
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field(
                "cancellation_token",
                &self.cancellation_token.as_ref().map(|_| "<token>"),
            )
            .finish()
    }
}

impl SearchHooks {
    fn report(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.progress_callback {
            callback(update);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation_token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Exhaustive search over a [`ParamGrid`].
#[derive(Debug, Clone)]
pub struct GridSearch {
    pipeline: ModelPipeline,
    grid: ParamGrid,
    config: SearchConfig,
    hooks: SearchHooks,
}

impl GridSearch {
    pub fn new(pipeline: ModelPipeline, grid: ParamGrid, config: SearchConfig) -> Self {
        Self {
            pipeline,
            grid,
            config,
            hooks: SearchHooks::default(),
        }
    }

    /// Receive [`ProgressUpdate`]s; called from worker threads.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.hooks.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Stop the search once `token` is cancelled.
    #[must_use]
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.hooks.cancellation_token = Some(token);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Number of candidates the grid expands to.
    pub fn n_candidates(&self) -> usize {
        self.grid.len()
    }

    /// Evaluate every grid combination on `dataset`.
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedSearch> {
        let candidates = self.grid.candidates()?;
        run_search(
            SearchStrategy::Grid,
            &self.pipeline,
            candidates,
            dataset,
            &self.config,
            &self.hooks,
        )
    }
}

/// Search over `n_iter` configurations sampled from [`ParamDistributions`].
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pipeline: ModelPipeline,
    distributions: ParamDistributions,
    n_iter: usize,
    config: SearchConfig,
    hooks: SearchHooks,
}

impl RandomizedSearch {
    pub fn new(
        pipeline: ModelPipeline,
        distributions: ParamDistributions,
        n_iter: usize,
        config: SearchConfig,
    ) -> Self {
        Self {
            pipeline,
            distributions,
            n_iter,
            config,
            hooks: SearchHooks::default(),
        }
    }

    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.hooks.progress_callback = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.hooks.cancellation_token = Some(token);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Sample `n_iter` configurations (seeded by `random_seed`) and
    /// evaluate each.
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedSearch> {
        let candidates = self
            .distributions
            .sample(self.n_iter, self.config.random_seed)?;
        run_search(
            SearchStrategy::Randomized,
            &self.pipeline,
            candidates,
            dataset,
            &self.config,
            &self.hooks,
        )
    }
}

/// Either search strategy, for callers that pick one at runtime.
#[derive(Debug, Clone)]
pub enum Search {
    Grid(GridSearch),
    Randomized(RandomizedSearch),
}

impl Search {
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedSearch> {
        match self {
            Search::Grid(search) => search.fit(dataset),
            Search::Randomized(search) => search.fit(dataset),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        match self {
            Search::Grid(search) => search.config(),
            Search::Randomized(search) => search.config(),
        }
    }
}

impl From<GridSearch> for Search {
    fn from(search: GridSearch) -> Self {
        Search::Grid(search)
    }
}

impl From<RandomizedSearch> for Search {
    fn from(search: RandomizedSearch) -> Self {
        Search::Randomized(search)
    }
}

fn run_search(
    strategy: SearchStrategy,
    pipeline: &ModelPipeline,
    candidates: Vec<ParamSet>,
    dataset: &Dataset,
    config: &SearchConfig,
    hooks: &SearchHooks,
) -> Result<FittedSearch> {
    let outcome = evaluate(strategy, pipeline, candidates, dataset, config, hooks);
    match &outcome {
        Ok(_) => hooks.report(ProgressUpdate::stage(
            SearchStage::Complete,
            1.0,
            "Search complete",
        )),
        Err(LearningError::Cancelled) => hooks.report(ProgressUpdate::stage(
            SearchStage::Cancelled,
            0.0,
            "Search cancelled",
        )),
        Err(e) => hooks.report(ProgressUpdate::stage(
            SearchStage::Failed,
            0.0,
            format!("Search failed: {}", e),
        )),
    }
    outcome
}

fn evaluate(
    strategy: SearchStrategy,
    pipeline: &ModelPipeline,
    candidates: Vec<ParamSet>,
    dataset: &Dataset,
    config: &SearchConfig,
    hooks: &SearchHooks,
) -> Result<FittedSearch> {
    let started = Instant::now();
    config.validate()?;
    if candidates.is_empty() {
        return Err(LearningError::InvalidConfig(
            "search has no candidates to evaluate".to_string(),
        ));
    }
    hooks.report(ProgressUpdate::stage(
        SearchStage::Initializing,
        0.0,
        format!("Preparing {} candidates", candidates.len()),
    ));

    let prepared: Vec<ModelPipeline> = candidates
        .iter()
        .map(|params| {
            let mut candidate = pipeline.clone();
            candidate.set_params(params)?;
            Ok(candidate)
        })
        .collect::<Result<_>>()?;
    let folds = make_folds(dataset, config)?;

    let units: Vec<(usize, usize)> = (0..prepared.len())
        .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
        .collect();
    let total = units.len() as u32;
    info!(
        "Fitting {} folds for each of {} candidates, totalling {} fits ({} workers)",
        folds.len(),
        prepared.len(),
        total,
        config.worker_threads()
    );
    hooks.report(ProgressUpdate::stage(
        SearchStage::CrossValidating,
        0.0,
        format!("Cross-validating {} fits", total),
    ));

    let completed = AtomicU32::new(0);
    let pool = build_pool(config)?;
    let fold_results: Vec<Result<FoldScore>> = pool.install(|| {
        units
            .par_iter()
            .map(|&(c, f)| {
                hooks.check_cancelled()?;
                let result = fit_and_score(
                    &prepared[c],
                    dataset,
                    &folds[f],
                    config.scoring,
                    config.return_train_score,
                );
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                hooks.report(ProgressUpdate {
                    stage: SearchStage::CrossValidating,
                    progress: CV_PROGRESS_SHARE * f64::from(done) / f64::from(total),
                    message: format!("Fit {}/{} (candidate {}, fold {})", done, total, c, f),
                    current_candidate: Some(c),
                    fits_completed: Some((done, total)),
                });
                Ok(result)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut warnings = Vec::new();
    let mut records = Vec::with_capacity(candidates.len());
    for ((index, params), per_fold) in candidates
        .into_iter()
        .enumerate()
        .zip(fold_results.chunks(folds.len()))
    {
        let mut record = CandidateResult::new(index, params);
        let mut scores = Vec::with_capacity(per_fold.len());
        let mut failure = None;
        for result in per_fold {
            match result {
                Ok(score) => scores.push(*score),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            None => {
                let cv = CvScores::from_folds(&scores);
                record.mean_fit_time = mean_std(&cv.fit_times).0;
                record.mean_test_score = cv.mean;
                record.std_test_score = cv.std;
                if let Some((mean, std)) = cv.train_mean_std() {
                    record.mean_train_score = Some(mean);
                    record.std_train_score = Some(std);
                }
                record.train_scores = cv.train_scores;
                record.test_scores = cv.test_scores;
                debug!(
                    "Candidate {} ({}): {:.4} +/- {:.4}",
                    index, record.params, record.mean_test_score, record.std_test_score
                );
                if record.mean_test_score.is_nan() {
                    let message = format!(
                        "Candidate {} ({}) has a NaN {} score; a held-out fold may hold a single class",
                        index, record.params, config.scoring
                    );
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
            Some(e) => {
                let message = format!(
                    "Candidate {} ({}) failed; scores set to NaN: {}",
                    index, record.params, e
                );
                warn!("{}", message);
                warnings.push(message);
                record.test_scores = vec![f64::NAN; folds.len()];
                record.error = Some(e.to_string());
            }
        }
        records.push(record);
    }

    let mut results = SearchResults::from_candidates(
        strategy,
        config.scoring,
        folds.len(),
        records,
        warnings,
        0.0,
    )?;
    info!(
        "Best candidate #{} ({}) with {} = {:.4}",
        results.best_index, results.best_params, config.scoring, results.best_score
    );

    let best_estimator = if config.refit {
        hooks.check_cancelled()?;
        hooks.report(ProgressUpdate::stage(
            SearchStage::Refitting,
            CV_PROGRESS_SHARE,
            "Refitting best candidate on all rows",
        ));
        let mut best = prepared[results.best_index].clone();
        best.fit(dataset)?;
        Some(best)
    } else {
        None
    };

    results.wall_time_secs = started.elapsed().as_secs_f64();
    Ok(FittedSearch {
        results,
        best_estimator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::{GradientBoostingClassifier, LogisticRegression};
    use crate::metrics::Scoring;
    use crate::params::{Distribution, ParamValue};
    use hypergrid_processing::{ClassLabels, Feature};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn dataset() -> Dataset {
        let n = 80;
        let x1: Vec<Option<f64>> = (0..n).map(|i| Some(((i * 37) % 80) as f64)).collect();
        let x2: Vec<Option<f64>> = (0..n).map(|i| Some(((i * 13) % 7) as f64)).collect();
        let shade: Vec<Option<&str>> = (0..n)
            .map(|i| Some(if (i * 37) % 80 >= 40 { "dark" } else { "light" }))
            .collect();
        let target: Vec<f64> = (0..n)
            .map(|i| {
                let signal = (i * 37) % 80 >= 40;
                let noise = i % 9 == 0;
                if signal != noise { 1.0 } else { 0.0 }
            })
            .collect();
        Dataset::new(
            vec![
                Feature::numeric("x1", x1),
                Feature::numeric("x2", x2),
                Feature::categorical("shade", shade),
            ],
            target,
            ClassLabels {
                negative: "neg".to_string(),
                positive: "pos".to_string(),
            },
        )
        .unwrap()
    }

    fn config(folds: usize) -> SearchConfig {
        SearchConfig::builder()
            .cv_folds(folds)
            .n_jobs(2)
            .build()
            .unwrap()
    }

    fn logreg() -> ModelPipeline {
        ModelPipeline::builder()
            .classifier(LogisticRegression::default())
            .build()
            .unwrap()
    }

    fn small_gbm() -> ModelPipeline {
        let mut pipeline = ModelPipeline::builder()
            .classifier(GradientBoostingClassifier::default())
            .build()
            .unwrap();
        pipeline
            .set_params(
                &ParamSet::new()
                    .with("classifier__n_estimators", 10i64)
                    .with("classifier__min_samples_leaf", 5i64),
            )
            .unwrap();
        pipeline
    }

    #[test]
    fn test_nan_fold_scores_are_reported() {
        // Ten negatives then two positives: stratified fold 0 tests on negatives only
        let target: Vec<f64> = (0..12).map(|i| if i >= 10 { 1.0 } else { 0.0 }).collect();
        let x: Vec<Option<f64>> = (0..12).map(|i| Some(i as f64)).collect();
        let data = Dataset::new(
            vec![Feature::numeric("x", x)],
            target,
            ClassLabels {
                negative: "neg".to_string(),
                positive: "pos".to_string(),
            },
        )
        .unwrap();
        let cfg = SearchConfig::builder()
            .cv_folds(3)
            .scoring(Scoring::RocAuc)
            .n_jobs(1)
            .build()
            .unwrap();
        let grid = ParamGrid::new().add("classifier__C", [0.1, 1.0]);

        let err = GridSearch::new(logreg(), grid, cfg).fit(&data).unwrap_err();
        assert_eq!(err.error_code(), "TRAINING_FAILED");
        let message = err.to_string();
        assert!(message.contains("NaN"), "{}", message);
        assert!(!message.contains("no candidates were evaluated"));
    }

    #[test]
    fn test_grid_evaluates_cartesian_product() {
        let grid = ParamGrid::new()
            .add("classifier__C", [0.1, 1.0, 10.0])
            .add("preprocessor__scale_numeric", [true, false]);
        let fitted = GridSearch::new(logreg(), grid, config(3))
            .fit(&dataset())
            .unwrap();

        let results = &fitted.results;
        assert_eq!(results.len(), 6);
        assert_eq!(results.n_folds, 3);
        assert!(results.candidates.iter().all(|c| c.test_scores.len() == 3));
        let order: Vec<usize> = results.candidates.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            results.candidates[1].params.get("preprocessor__scale_numeric"),
            Some(&ParamValue::Bool(false))
        );
        assert!(fitted.best_estimator.unwrap().is_fitted());
        assert!(results.warnings.is_empty());
    }

    #[test]
    fn test_ties_pick_first_candidate() {
        // random_state only matters when subsampling, so both candidates score the same
        let grid = ParamGrid::new().add("classifier__random_state", [7i64, 3]);
        let fitted = GridSearch::new(small_gbm(), grid, config(3))
            .fit(&dataset())
            .unwrap();

        let results = &fitted.results;
        assert_eq!(
            results.candidates[0].mean_test_score,
            results.candidates[1].mean_test_score
        );
        assert_eq!(results.best_index, 0);
        assert_eq!(results.candidates[0].rank, 1);
        assert_eq!(results.candidates[1].rank, 1);
        assert_eq!(results.best_params.get("classifier__random_state"), Some(&ParamValue::Int(7)));
    }

    #[test]
    fn test_failing_candidates_rank_last() {
        let grid = ParamGrid::new().add("classifier__penalty", ["l1", "l2", "elasticnet"]);
        let fitted = GridSearch::new(logreg(), grid, config(3))
            .fit(&dataset())
            .unwrap();

        let results = &fitted.results;
        assert_eq!(results.best_index, 1);
        assert_eq!(results.warnings.len(), 2);
        assert!(results.candidates[0].mean_test_score.is_nan());
        assert!(results.candidates[0].test_scores.iter().all(|s| s.is_nan()));
        assert_eq!(results.candidates[0].rank, 2);
        assert_eq!(results.candidates[2].rank, 2);
        assert!(
            results.candidates[0]
                .error
                .as_deref()
                .unwrap()
                .contains("newton")
        );
    }

    #[test]
    fn test_all_candidates_failing() {
        let grid = ParamGrid::new().add("classifier__penalty", ["l1"]);
        let err = GridSearch::new(logreg(), grid, config(3))
            .fit(&dataset())
            .unwrap_err();
        assert!(matches!(err, LearningError::TrainingFailed(_)));
    }

    #[test]
    fn test_unknown_parameter_aborts() {
        let grid = ParamGrid::new().add("classifier__depth", [3i64]);
        let err = GridSearch::new(logreg(), grid, config(3))
            .fit(&dataset())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_randomized_evaluates_n_iter() {
        let distributions = ParamDistributions::new()
            .add(
                "classifier__C",
                Distribution::LogUniform {
                    low: 0.01,
                    high: 100.0,
                },
            )
            .add(
                "preprocessor__categorical_encoding",
                Distribution::Choice(vec!["onehot".into(), "ordinal".into()]),
            );
        let fitted = RandomizedSearch::new(logreg(), distributions, 7, config(4))
            .fit(&dataset())
            .unwrap();
        assert_eq!(fitted.results.len(), 7);
        assert_eq!(fitted.results.strategy, SearchStrategy::Randomized);
        assert!(
            fitted
                .results
                .candidates
                .iter()
                .all(|c| c.test_scores.len() == 4)
        );
    }

    #[test]
    fn test_worker_count_does_not_change_results() {
        let grid = ParamGrid::new().add("classifier__C", [0.1, 1.0]);
        let sequential = SearchConfig::builder().cv_folds(4).n_jobs(1).build().unwrap();
        let parallel = SearchConfig::builder().cv_folds(4).n_jobs(4).build().unwrap();

        let a = GridSearch::new(logreg(), grid.clone(), sequential)
            .fit(&dataset())
            .unwrap();
        let b = GridSearch::new(logreg(), grid, parallel)
            .fit(&dataset())
            .unwrap();
        let scores = |f: &FittedSearch| -> Vec<Vec<f64>> {
            f.results
                .candidates
                .iter()
                .map(|c| c.test_scores.clone())
                .collect()
        };
        assert_eq!(scores(&a), scores(&b));
    }

    #[test]
    fn test_cancelled_search() {
        let token = CancellationToken::new();
        token.cancel();
        let grid = ParamGrid::new().add("classifier__C", [1.0]);
        let err = GridSearch::new(logreg(), grid, config(3))
            .cancellation_token(token)
            .fit(&dataset())
            .unwrap_err();
        assert!(matches!(err, LearningError::Cancelled));
    }

    #[test]
    fn test_progress_reports_fits_and_completion() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let grid = ParamGrid::new().add("classifier__C", [0.1, 1.0]);
        GridSearch::new(logreg(), grid, config(3))
            .on_progress(move |u| sink.lock().unwrap().push(u))
            .fit(&dataset())
            .unwrap();

        let updates = updates.lock().unwrap();
        let fits = updates
            .iter()
            .filter(|u| u.fits_completed.is_some())
            .count();
        assert_eq!(fits, 6);
        let last = updates.last().unwrap();
        assert_eq!(last.stage, SearchStage::Complete);
        assert_eq!(last.progress, 1.0);
    }

    #[test]
    fn test_refit_disabled() {
        let grid = ParamGrid::new().add("classifier__C", [1.0]);
        let cfg = SearchConfig::builder()
            .cv_folds(3)
            .refit(false)
            .return_train_score(true)
            .build()
            .unwrap();
        let fitted = GridSearch::new(logreg(), grid, cfg).fit(&dataset()).unwrap();
        assert!(fitted.best_estimator.is_none());
        let best = fitted.results.best();
        assert_eq!(best.train_scores.as_ref().map(Vec::len), Some(3));
        assert!(best.mean_train_score.is_some());
    }
}
