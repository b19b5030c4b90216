//! Gradient boosting for binary classification.
//!
//! Each iteration fits a [`RegressionTree`] to the gradients and hessians
//! of the log-loss at the current raw scores, with Newton leaf values
//! `-G / (H + l2_regularization)` scaled by the learning rate.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::tree::{BinMapper, RegressionTree, TreeParams};
use crate::error::{LearningError, Result};
use crate::estimator::{
    Classifier, check_n_features, check_training_data, param_f64, param_optional_usize,
    param_positive_f64, param_usize, unknown_param,
};
use crate::params::{ParamSet, ParamValue};

const PARAM_NAMES: [&str; 9] = [
    "n_estimators",
    "learning_rate",
    "max_depth",
    "max_leaf_nodes",
    "min_samples_leaf",
    "l2_regularization",
    "subsample",
    "max_bins",
    "random_state",
];

/// Hyper-parameters of [`GradientBoostingClassifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostingParams {
    /// Number of boosting iterations (default: 100).
    pub n_estimators: usize,
    /// Shrinkage applied to every tree (default: 0.1).
    pub learning_rate: f64,
    /// Maximum tree depth; `None` for unlimited (default: None).
    pub max_depth: Option<usize>,
    /// Maximum leaves per tree; `None` for unlimited (default: 31).
    pub max_leaf_nodes: Option<usize>,
    /// Minimum rows per leaf (default: 20).
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values (default: 0.0).
    pub l2_regularization: f64,
    /// Fraction of rows drawn without replacement per tree (default: 1.0).
    pub subsample: f64,
    /// Maximum histogram bins per feature, 2..=255 (default: 255).
    pub max_bins: usize,
    /// Seed for row subsampling (default: 0).
    pub random_state: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: None,
            max_leaf_nodes: Some(31),
            min_samples_leaf: 20,
            l2_regularization: 0.0,
            subsample: 1.0,
            max_bins: 255,
            random_state: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedBoosting {
    baseline: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

/// Histogram gradient boosting classifier with log-loss.
#[derive(Debug, Clone, Default)]
pub struct GradientBoostingClassifier {
    params: GradientBoostingParams,
    fitted: Option<FittedBoosting>,
}

static_assertions::assert_impl_all!(GradientBoostingClassifier: Send, Sync);

impl GradientBoostingClassifier {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn hyper_params(&self) -> &GradientBoostingParams {
        &self.params
    }

    /// Number of trees in the fitted ensemble.
    pub fn n_trees(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.trees.len())
    }

    /// Raw log-odds for each row.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(LearningError::NotFitted("GradientBoostingClassifier"))?;
        check_n_features(x, fitted.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                fitted.baseline + fitted.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for GradientBoostingClassifier {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let p = &self.params;
        let n = x.nrows();

        let mapper = BinMapper::fit(x, p.max_bins);
        let binned = mapper.transform(x);

        let positive_rate = y.mean().unwrap_or(0.5).clamp(1e-12, 1.0 - 1e-12);
        let baseline = (positive_rate / (1.0 - positive_rate)).ln();
        let mut raw = vec![baseline; n];
        let mut gradients = vec![0.0; n];
        let mut hessians = vec![0.0; n];

        let tree_params = TreeParams {
            max_leaf_nodes: p.max_leaf_nodes,
            max_depth: p.max_depth,
            min_samples_leaf: p.min_samples_leaf,
            l2_regularization: p.l2_regularization,
            shrinkage: p.learning_rate,
        };
        let n_sub = ((n as f64 * p.subsample).round() as usize).clamp(1, n);
        let mut rng = ChaCha8Rng::seed_from_u64(p.random_state);

        let mut trees = Vec::with_capacity(p.n_estimators);
        for _ in 0..p.n_estimators {
            for i in 0..n {
                let prob = sigmoid(raw[i]);
                gradients[i] = prob - y[i];
                hessians[i] = (prob * (1.0 - prob)).max(1e-16);
            }
            let rows: Vec<usize> = if n_sub < n {
                let mut rows = sample(&mut rng, n, n_sub).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(&binned, &mapper, &gradients, &hessians, rows, &tree_params);
            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += tree.predict_row(row);
            }
            trees.push(tree);
        }

        debug!(
            "Fitted {} trees on {} rows x {} features",
            trees.len(),
            n,
            x.ncols()
        );
        self.fitted = Some(FittedBoosting {
            baseline,
            trees,
            n_features: x.ncols(),
        });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let p = &mut self.params;
        match name {
            "n_estimators" => p.n_estimators = param_usize(name, value, 1)?,
            "learning_rate" => p.learning_rate = param_positive_f64(name, value)?,
            "max_depth" => p.max_depth = param_optional_usize(name, value, 1)?,
            "max_leaf_nodes" => p.max_leaf_nodes = param_optional_usize(name, value, 2)?,
            "min_samples_leaf" => p.min_samples_leaf = param_usize(name, value, 1)?,
            "l2_regularization" => {
                let v = param_f64(name, value)?;
                if v < 0.0 {
                    return Err(LearningError::invalid_parameter(name, "must be >= 0"));
                }
                p.l2_regularization = v;
            }
            "subsample" => {
                let v = param_positive_f64(name, value)?;
                if v > 1.0 {
                    return Err(LearningError::invalid_parameter(name, "must be in (0, 1]"));
                }
                p.subsample = v;
            }
            "max_bins" => {
                let v = param_usize(name, value, 2)?;
                if v > 255 {
                    return Err(LearningError::invalid_parameter(name, "must be <= 255"));
                }
                p.max_bins = v;
            }
            "random_state" => p.random_state = param_usize(name, value, 0)? as u64,
            other => return Err(unknown_param("gradient_boosting", other, &PARAM_NAMES)),
        }
        self.fitted = None;
        Ok(())
    }

    fn params(&self) -> ParamSet {
        let p = &self.params;
        ParamSet::new()
            .with("n_estimators", p.n_estimators as i64)
            .with("learning_rate", p.learning_rate)
            .with("max_depth", p.max_depth.map(|d| d as i64))
            .with("max_leaf_nodes", p.max_leaf_nodes.map(|d| d as i64))
            .with("min_samples_leaf", p.min_samples_leaf as i64)
            .with("l2_regularization", p.l2_regularization)
            .with("subsample", p.subsample)
            .with("max_bins", p.max_bins as i64)
            .with("random_state", p.random_state as i64)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn boxed_clone(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
