//! Built-in classifiers.

mod gradient_boosting;
mod logistic;
mod tree;

pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingParams};
pub use logistic::{LogisticParams, LogisticRegression, Penalty, Solver};
pub use tree::{BinMapper, RegressionTree, TreeParams};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LearningError;
use crate::estimator::Classifier;

/// The classifier families the CLI and factory know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[serde(alias = "gbm")]
    GradientBoosting,
    #[serde(alias = "logreg")]
    LogisticRegression,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::LogisticRegression => "logistic_regression",
        }
    }

    /// A classifier of this kind with default hyper-parameters.
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            ModelKind::GradientBoosting => Box::new(GradientBoostingClassifier::default()),
            ModelKind::LogisticRegression => Box::new(LogisticRegression::default()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbm" | "gradient_boosting" => Ok(ModelKind::GradientBoosting),
            "logreg" | "logistic_regression" => Ok(ModelKind::LogisticRegression),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown model '{}' (valid: gbm, logreg)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parse_and_build() {
        assert_eq!("gbm".parse::<ModelKind>().unwrap(), ModelKind::GradientBoosting);
        assert_eq!(
            "Logistic_Regression".parse::<ModelKind>().unwrap(),
            ModelKind::LogisticRegression
        );
        assert!("svm".parse::<ModelKind>().is_err());

        let model = ModelKind::LogisticRegression.build();
        assert_eq!(model.name(), "logistic_regression");
        assert!(!model.is_fitted());
        assert_eq!(ModelKind::GradientBoosting.build().name(), "gradient_boosting");
    }
}
