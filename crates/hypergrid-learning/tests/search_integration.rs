//! Integration tests for cross-validation and searches.
//!
//! These tests run the public API end to end on the credit fixture shared
//! with the processing crate.

use hypergrid_learning::{
    Distribution, GridSearch, LearningError, ModelKind, ModelPipeline, ParamDistributions,
    ParamGrid, ParamSet, RandomizedSearch, Scoring, SearchConfig, cross_validate,
    nested_cross_validate,
};
use hypergrid_processing::{DataError, Dataset, DatasetConfig, load_csv, train_test_split};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn credit() -> Dataset {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../hypergrid-processing/tests/fixtures/credit.csv");
    let config = DatasetConfig::builder()
        .target_column("class")
        .positive_label("good")
        .build()
        .unwrap();
    load_csv(path, &config).unwrap()
}

fn split() -> (Dataset, Dataset) {
    train_test_split(&credit(), 0.2, 42, true).unwrap()
}

fn pipeline(kind: ModelKind) -> ModelPipeline {
    let mut pipeline = ModelPipeline::builder()
        .classifier_boxed(kind.build())
        .build()
        .unwrap();
    if kind == ModelKind::GradientBoosting {
        pipeline
            .set_params(
                &ParamSet::new()
                    .with("classifier__n_estimators", 15i64)
                    .with("preprocessor__categorical_encoding", "ordinal"),
            )
            .unwrap();
    }
    pipeline
}

fn config(folds: usize) -> SearchConfig {
    SearchConfig::builder().cv_folds(folds).build().unwrap()
}

// ============================================================================
// Cross-validation
// ============================================================================

#[test]
fn test_cross_validate_one_score_per_fold() {
    let (train, _) = split();
    let scores = cross_validate(&pipeline(ModelKind::LogisticRegression), &train, &config(4))
        .unwrap();

    assert_eq!(scores.test_scores.len(), 4);
    assert_eq!(scores.fit_times.len(), 4);
    let mean = scores.test_scores.iter().sum::<f64>() / 4.0;
    let var = scores
        .test_scores
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f64>()
        / 4.0;
    assert!((scores.mean - mean).abs() < 1e-12);
    assert!((scores.std - var.sqrt()).abs() < 1e-12);
}

#[test]
fn test_cross_validate_is_reproducible() {
    let (train, _) = split();
    let model = pipeline(ModelKind::GradientBoosting);
    let a = cross_validate(&model, &train, &config(3)).unwrap();
    let b = cross_validate(&model, &train, &config(3)).unwrap();
    assert_eq!(a.test_scores, b.test_scores);
}

// ============================================================================
// Grid search
// ============================================================================

#[test]
fn test_grid_search_on_credit() {
    let (train, test) = split();
    let grid = ParamGrid::new()
        .add("classifier__learning_rate", [0.05, 0.1, 0.3])
        .add("classifier__max_leaf_nodes", [3i64, 15]);

    let fitted = GridSearch::new(pipeline(ModelKind::GradientBoosting), grid, config(3))
        .fit(&train)
        .unwrap();
    let results = &fitted.results;

    assert_eq!(results.len(), 6);
    assert!(results.candidates.iter().all(|c| c.test_scores.len() == 3));
    assert_eq!(results.top(1)[0].index, results.best_index);
    assert_eq!(results.best().rank, 1);

    let pivot = results
        .pivot("classifier__learning_rate", "classifier__max_leaf_nodes")
        .unwrap();
    assert_eq!(pivot.row_values.len(), 3);
    assert_eq!(pivot.col_values.len(), 2);
    assert!(pivot.scores.iter().flatten().all(|s| s.is_some()));

    let best = fitted.best_estimator.unwrap();
    let score = best.score(&test, Scoring::Accuracy).unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[test]
fn test_grid_with_subgrids_counts_every_combination() {
    let (train, _) = split();
    let grid = ParamGrid::new()
        .add("classifier__penalty", ["l2"])
        .add("classifier__C", [0.1, 1.0])
        .or()
        .add("classifier__solver", ["proximal"])
        .add("classifier__penalty", ["l1"])
        .add("classifier__C", [0.1, 1.0, 10.0]);
    assert_eq!(grid.len(), 5);

    let fitted = GridSearch::new(pipeline(ModelKind::LogisticRegression), grid, config(3))
        .fit(&train)
        .unwrap();
    assert_eq!(fitted.results.len(), 5);
    assert!(fitted.results.warnings.is_empty());
}

#[test]
fn test_failing_candidates_rank_last() {
    let (train, _) = split();
    let grid = ParamGrid::new()
        .add("classifier__penalty", ["l1", "l2"])
        .add("classifier__C", [0.1, 1.0]);

    let fitted = GridSearch::new(pipeline(ModelKind::LogisticRegression), grid, config(3))
        .fit(&train)
        .unwrap();
    let results = &fitted.results;

    assert_eq!(results.n_failed(), 2);
    assert_eq!(results.warnings.len(), 2);
    for candidate in &results.candidates[..2] {
        assert!(candidate.mean_test_score.is_nan());
        assert_eq!(candidate.rank, 3);
    }
    assert!(results.best_index >= 2);
}

#[test]
fn test_results_export() {
    let (train, _) = split();
    let grid = ParamGrid::new().add("classifier__C", [0.1, 1.0, 10.0]);
    let cfg = SearchConfig::builder()
        .cv_folds(3)
        .return_train_score(true)
        .refit(false)
        .build()
        .unwrap();
    let fitted = GridSearch::new(pipeline(ModelKind::LogisticRegression), grid, cfg)
        .fit(&train)
        .unwrap();

    let df = fitted.results.to_dataframe().unwrap();
    assert_eq!(df.height(), 3);
    assert!(df.column("mean_train_score").is_ok());

    let path = std::env::temp_dir().join(format!("hypergrid-results-{}.csv", std::process::id()));
    fitted.results.write_csv(&path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(written.lines().count(), 4);
    assert!(written.starts_with("rank,mean_test_score"));
}

// ============================================================================
// Randomized search
// ============================================================================

#[test]
fn test_randomized_search_draws_n_iter() {
    let (train, _) = split();
    let distributions = ParamDistributions::new()
        .add(
            "classifier__learning_rate",
            Distribution::LogUniform {
                low: 0.01,
                high: 1.0,
            },
        )
        .add(
            "classifier__max_leaf_nodes",
            Distribution::IntUniform { low: 2, high: 32 },
        );

    let search = RandomizedSearch::new(
        pipeline(ModelKind::GradientBoosting),
        distributions,
        5,
        config(3),
    );
    let a = search.fit(&train).unwrap();
    let b = search.fit(&train).unwrap();

    assert_eq!(a.results.len(), 5);
    let params = |r: &hypergrid_learning::FittedSearch| -> Vec<ParamSet> {
        r.results.candidates.iter().map(|c| c.params.clone()).collect()
    };
    assert_eq!(params(&a), params(&b));
    assert_eq!(a.results.best_index, b.results.best_index);
}

// ============================================================================
// Nested cross-validation
// ============================================================================

#[test]
fn test_nested_cross_validation() {
    let dataset = credit();
    let grid = ParamGrid::new().add("classifier__C", [0.1, 1.0]);
    let inner = GridSearch::new(pipeline(ModelKind::LogisticRegression), grid, config(3));

    let result = nested_cross_validate(|_| inner.clone().into(), &dataset, &config(3)).unwrap();
    assert_eq!(result.n_folds(), 3);
    assert_eq!(result.best_params.len(), 3);
    assert!(result.mean > 0.0 && result.mean <= 1.0);
}

// ============================================================================
// Schema checks
// ============================================================================

#[test]
fn test_scoring_with_different_columns_fails() {
    let (train, test) = split();
    let mut model = pipeline(ModelKind::LogisticRegression);
    model.fit(&train).unwrap();

    let narrowed = test.drop_columns(&["purpose"]).unwrap();
    let err = model.score(&narrowed, Scoring::Accuracy).unwrap_err();
    assert!(matches!(
        err,
        LearningError::Data(DataError::SchemaMismatch(_))
    ));
}
