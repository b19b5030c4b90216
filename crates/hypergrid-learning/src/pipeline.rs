//! Preprocessing + classifier composition.
//!
//! A [`ModelPipeline`] chains a [`ColumnTransformer`] with a boxed
//! [`Classifier`]. Both stages are fit together on training rows and
//! applied together on scoring rows, so cross-validation never leaks
//! statistics from held-out folds into preprocessing.
//!
//! # Parameter routing
//!
//! Parameters are addressed with a stage prefix, the way search grids
//! name them:
//!
//! - `preprocessor__scale_numeric`, `preprocessor__categorical_encoding`, ...
//! - `classifier__learning_rate`, `classifier__C`, ...
//!
//! # Example
//!
//! ```rust,ignore
//! use hypergrid_learning::{ModelKind, ModelPipeline, ParamSet, Scoring};
//!
//! let mut pipeline = ModelPipeline::builder()
//!     .classifier_boxed(ModelKind::GradientBoosting.build())
//!     .build()?;
//!
//! pipeline.set_params(&ParamSet::new().with("classifier__learning_rate", 0.05))?;
//! pipeline.fit(&train)?;
//! println!("accuracy: {:.3}", pipeline.score(&test, Scoring::Accuracy)?);
//! ```

use hypergrid_processing::{ColumnTransformer, Dataset, TransformerParams};
use ndarray::Array1;
use tracing::debug;

use crate::error::{LearningError, Result};
use crate::estimator::Classifier;
use crate::metrics::Scoring;
use crate::params::{ParamSet, ParamValue};

const PREPROCESSOR_PREFIX: &str = "preprocessor";
const CLASSIFIER_PREFIX: &str = "classifier";

/// A preprocessing stage followed by a classifier.
#[derive(Debug, Clone)]
pub struct ModelPipeline {
    preprocessor: ColumnTransformer,
    classifier: Box<dyn Classifier>,
}

static_assertions::assert_impl_all!(ModelPipeline: Send, Sync);

impl ModelPipeline {
    #[must_use]
    pub fn builder() -> ModelPipelineBuilder {
        ModelPipelineBuilder::default()
    }

    pub fn preprocessor(&self) -> &ColumnTransformer {
        &self.preprocessor
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Apply stage-prefixed parameters. Resets any fitted state.
    ///
    /// # Errors
    ///
    /// [`LearningError::InvalidParameter`] naming the full parameter if the
    /// prefix is not `preprocessor__` / `classifier__`, the stage does not
    /// know the name, or the value has the wrong type.
    pub fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let Some((stage, param)) = name.split_once("__") else {
            return Err(LearningError::invalid_parameter(
                name,
                "expected a 'preprocessor__' or 'classifier__' prefix",
            ));
        };
        match stage {
            PREPROCESSOR_PREFIX => self
                .preprocessor
                .set_param(param, &value.to_string())
                .map_err(|e| LearningError::invalid_parameter(name, e.to_string())),
            CLASSIFIER_PREFIX => self
                .classifier
                .set_param(param, value)
                .map_err(|e| match e {
                    LearningError::InvalidParameter { reason, .. } => {
                        LearningError::invalid_parameter(name, reason)
                    }
                    other => other,
                }),
            other => Err(LearningError::invalid_parameter(
                name,
                format!(
                    "unknown pipeline stage '{}' (valid: {}, {})",
                    other, PREPROCESSOR_PREFIX, CLASSIFIER_PREFIX
                ),
            )),
        }
    }

    /// All current parameters, stage-prefixed.
    pub fn params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        for (name, value) in self.preprocessor.param_values() {
            params.insert(
                format!("{}__{}", PREPROCESSOR_PREFIX, name),
                ParamValue::parse_literal(&value),
            );
        }
        for (name, value) in self.classifier.params().iter() {
            params.insert(format!("{}__{}", CLASSIFIER_PREFIX, name), value.clone());
        }
        params
    }

    pub fn is_fitted(&self) -> bool {
        self.preprocessor.is_fitted() && self.classifier.is_fitted()
    }

    /// Fit the preprocessor and then the classifier on `dataset`.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        let x = self.preprocessor.fit_transform(dataset)?;
        debug!(
            "Fitting {} on {} rows x {} encoded features",
            self.classifier.name(),
            x.nrows(),
            x.ncols()
        );
        let y = dataset.target_array();
        self.classifier.fit(x.view(), y.view())
    }

    /// Positive-class probabilities for every row of `dataset`.
    ///
    /// # Errors
    ///
    /// [`LearningError::NotFitted`] before [`fit`](Self::fit); a
    /// `SchemaMismatch` data error if `dataset` has different columns than
    /// the training data.
    pub fn predict_proba(&self, dataset: &Dataset) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(LearningError::NotFitted("ModelPipeline"));
        }
        let x = self.preprocessor.transform(dataset)?;
        self.classifier.predict_proba(x.view())
    }

    /// Predicted classes as 0.0 / 1.0.
    pub fn predict(&self, dataset: &Dataset) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(dataset)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Score predictions on `dataset` against its target; greater is better.
    pub fn score(&self, dataset: &Dataset, scoring: Scoring) -> Result<f64> {
        let proba = self.predict_proba(dataset)?;
        let y = dataset.target_array();
        scoring.score(y.view(), proba.view())
    }
}

/// Builder for [`ModelPipeline`].
///
/// The classifier is required; the preprocessor defaults to
/// [`TransformerParams::default()`].
#[derive(Debug, Default)]
pub struct ModelPipelineBuilder {
    preprocessor: Option<ColumnTransformer>,
    classifier: Option<Box<dyn Classifier>>,
}

impl ModelPipelineBuilder {
    #[must_use]
    pub fn preprocessor(mut self, preprocessor: ColumnTransformer) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    #[must_use]
    pub fn preprocessor_params(mut self, params: TransformerParams) -> Self {
        self.preprocessor = Some(ColumnTransformer::new(params));
        self
    }

    #[must_use]
    pub fn classifier<C: Classifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    #[must_use]
    pub fn classifier_boxed(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// # Errors
    ///
    /// [`LearningError::InvalidConfig`] if no classifier was set.
    pub fn build(self) -> Result<ModelPipeline> {
        let classifier = self.classifier.ok_or_else(|| {
            LearningError::InvalidConfig("a pipeline needs a classifier".to_string())
        })?;
        Ok(ModelPipeline {
            preprocessor: self.preprocessor.unwrap_or_default(),
            classifier,
        })
    }
}
