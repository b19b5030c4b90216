//! hypergrid-learning: hyper-parameter search over classification pipelines.
//!
//! This crate tunes "preprocessing + classifier" pipelines built on the
//! [`hypergrid_processing`] dataset layer. It provides native classifiers,
//! k-fold cross-validation, grid search, randomized search and nested
//! cross-validation, with results as ranked tables.
//!
//! # Features
//!
//! - **Pipelines**: [`ModelPipeline`] fits a [`ColumnTransformer`](hypergrid_processing::ColumnTransformer)
//!   and a [`Classifier`] together, addressed by `preprocessor__*` / `classifier__*` parameters
//! - **Classifiers**: histogram gradient boosting and regularized logistic regression
//! - **Search**: [`GridSearch`] over a [`ParamGrid`], [`RandomizedSearch`] over [`ParamDistributions`]
//! - **Parallelism**: every `(candidate, fold)` fit runs on a rayon pool of `n_jobs` workers
//! - **Progress Reporting**: callbacks and a [`CancellationToken`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hypergrid_learning::{GridSearch, ModelKind, ModelPipeline, ParamGrid, Scoring, SearchConfig};
//! use hypergrid_processing::{DatasetConfig, load_csv, train_test_split};
//!
//! let dataset = load_csv("credit.csv", &DatasetConfig::default())?;
//! let (train, test) = train_test_split(&dataset, 0.2, 42, true)?;
//!
//! let pipeline = ModelPipeline::builder()
//!     .classifier_boxed(ModelKind::GradientBoosting.build())
//!     .build()?;
//! let grid = ParamGrid::new()
//!     .add("classifier__learning_rate", [0.05, 0.1])
//!     .add("classifier__max_leaf_nodes", [15i64, 31]);
//!
//! let fitted = GridSearch::new(pipeline, grid, SearchConfig::default()).fit(&train)?;
//! println!("{}", fitted.results);
//!
//! if let Some(best) = fitted.best_estimator {
//!     println!("held-out accuracy: {:.4}", best.score(&test, Scoring::Accuracy)?);
//! }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`](LearningError):
//!
//! - [`LearningError::InvalidParameter`] - Unknown or mistyped hyper-parameter
//! - [`LearningError::IncompatibleParameters`] - Valid values that cannot be combined
//! - [`LearningError::TrainingFailed`] - Every search candidate failed
//! - [`LearningError::Cancelled`] - The cancellation token fired
//! - [`LearningError::Data`] - Anything raised by the dataset layer
//!
//! A single failing candidate is not an error: its scores are `NaN` and a
//! warning lands in [`SearchResults::warnings`].

mod cancellation;
pub mod classifiers;
mod config;
mod cross_validation;
mod error;
mod estimator;
mod metrics;
mod nested;
mod params;
mod pipeline;
mod progress;
mod search;
mod types;

// Re-export public API
//
// Configuration types
pub use config::{SearchConfig, SearchConfigBuilder};
// Cancellation token
pub use cancellation::CancellationToken;
// Error types
pub use error::{LearningError, Result};
// Estimators
pub use classifiers::{
    GradientBoostingClassifier, GradientBoostingParams, LogisticParams, LogisticRegression,
    ModelKind, Penalty, Solver,
};
pub use estimator::{Classifier, check_n_features, check_training_data};
// Pipeline types
pub use pipeline::{ModelPipeline, ModelPipelineBuilder};
// Scoring
pub use metrics::{Scoring, accuracy, balanced_accuracy, f1, log_loss, roc_auc};
// Search spaces
pub use params::{
    Distribution, ParamDistributions, ParamGrid, ParamSet, ParamValue, parse_assignment,
};
// Cross-validation
pub use cross_validation::{
    CvScores, Fold, FoldScore, KFold, StratifiedKFold, cross_validate, fit_and_score, make_folds,
};
// Searches
pub use nested::{NestedCvResult, nested_cross_validate};
pub use search::{FittedSearch, GridSearch, RandomizedSearch, Search};
// Progress reporting types
pub use progress::{ParseSearchStageError, ProgressCallback, ProgressUpdate, SearchStage};
// Result types
pub use types::{CandidateResult, PivotTable, SearchResults, SearchStrategy};
