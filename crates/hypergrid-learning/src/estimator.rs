//! The classifier abstraction shared by every model.
//!
//! A [`Classifier`] works on a dense numeric matrix produced by the
//! preprocessing stage and a binary target encoded as `0.0` / `1.0`.
//! Hyper-parameters are set by bare name (`learning_rate`, `C`); the
//! `classifier__` prefix is stripped by [`ModelPipeline`](crate::ModelPipeline).

use ndarray::{Array1, ArrayView1, ArrayView2};
use std::fmt;

use crate::error::{LearningError, Result};
use crate::params::{ParamSet, ParamValue};

/// A binary probabilistic classifier with named hyper-parameters.
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Short model name, e.g. `"gradient_boosting"`.
    fn name(&self) -> &'static str;

    /// Fit on `x` (`n_rows x n_features`) and `y` (0.0 / 1.0).
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    /// Probability of the positive class for each row.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Class predictions (0.0 / 1.0) with a 0.5 threshold.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Set one hyper-parameter by bare name. Resets any fitted state.
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Current hyper-parameters.
    fn params(&self) -> ParamSet;

    fn is_fitted(&self) -> bool;

    /// Clone behind a box; unfitted clones are what searches train.
    fn boxed_clone(&self) -> Box<dyn Classifier>;
}

impl Clone for Box<dyn Classifier> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Validate a training matrix and binary target.
///
/// # Errors
///
/// [`LearningError::InvalidData`] on a row-count mismatch, zero rows,
/// non-finite features, labels other than 0/1, or a single class.
pub fn check_training_data(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(LearningError::InvalidData(format!(
            "x has {} rows but y has {}",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(LearningError::InvalidData(
            "cannot fit on zero rows".to_string(),
        ));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(LearningError::InvalidData(
            "x contains NaN or infinite values".to_string(),
        ));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(LearningError::InvalidData(
            "y must contain only 0.0 and 1.0".to_string(),
        ));
    }
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(LearningError::InvalidData(
            "y contains a single class; need both classes to fit".to_string(),
        ));
    }
    Ok(())
}

/// Check a prediction matrix against the fitted feature count.
pub fn check_n_features(x: ArrayView2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(LearningError::InvalidData(format!(
            "x has {} features but the model was fitted with {}",
            x.ncols(),
            expected
        )));
    }
    Ok(())
}

// =============================================================================
// Parameter coercion helpers
// =============================================================================

pub(crate) fn param_f64(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| type_error(name, "a finite number", value))
}

pub(crate) fn param_positive_f64(name: &str, value: &ParamValue) -> Result<f64> {
    let v = param_f64(name, value)?;
    if v <= 0.0 {
        return Err(LearningError::invalid_parameter(
            name,
            format!("must be > 0, got {}", v),
        ));
    }
    Ok(v)
}

pub(crate) fn param_usize(name: &str, value: &ParamValue, min: usize) -> Result<usize> {
    let v = value
        .as_i64()
        .ok_or_else(|| type_error(name, "an integer", value))?;
    if v < min as i64 {
        return Err(LearningError::invalid_parameter(
            name,
            format!("must be >= {}, got {}", min, v),
        ));
    }
    Ok(v as usize)
}

/// An integer, or `none` for "unlimited".
pub(crate) fn param_optional_usize(
    name: &str,
    value: &ParamValue,
    min: usize,
) -> Result<Option<usize>> {
    if value.is_none() {
        return Ok(None);
    }
    param_usize(name, value, min).map(Some)
}

pub(crate) fn param_bool(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| type_error(name, "true or false", value))
}

pub(crate) fn param_str<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| type_error(name, "a string", value))
}

pub(crate) fn unknown_param(model: &str, name: &str, known: &[&str]) -> LearningError {
    LearningError::invalid_parameter(
        name,
        format!(
            "unknown parameter for {} (valid: {})",
            model,
            known.join(", ")
        ),
    )
}

fn type_error(name: &str, expected: &str, value: &ParamValue) -> LearningError {
    LearningError::invalid_parameter(
        name,
        format!("expected {}, got {} '{}'", expected, value.type_name(), value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_training_data() {
        let x = array![[1.0], [2.0], [3.0]];
        assert!(check_training_data(x.view(), array![0.0, 1.0, 0.0].view()).is_ok());

        let err = check_training_data(x.view(), array![1.0, 1.0, 1.0].view()).unwrap_err();
        assert!(err.to_string().contains("single class"));

        let err = check_training_data(x.view(), array![0.0, 2.0, 1.0].view()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");

        let nan = array![[f64::NAN], [2.0], [3.0]];
        assert!(check_training_data(nan.view(), array![0.0, 1.0, 0.0].view()).is_err());
        assert!(check_training_data(x.view(), array![0.0, 1.0].view()).is_err());
    }

    #[test]
    fn test_param_coercion() {
        assert_eq!(param_f64("lr", &ParamValue::Int(1)).unwrap(), 1.0);
        assert!(param_positive_f64("lr", &ParamValue::Float(0.0)).is_err());
        assert_eq!(param_usize("depth", &ParamValue::Float(3.0), 1).unwrap(), 3);
        assert!(param_usize("depth", &ParamValue::Float(2.5), 1).is_err());
        assert!(param_usize("depth", &ParamValue::Int(0), 1).is_err());
        assert_eq!(
            param_optional_usize("depth", &ParamValue::None, 1).unwrap(),
            None
        );
        let err = param_bool("fit_intercept", &ParamValue::Str("yes".into())).unwrap_err();
        assert!(err.to_string().contains("expected true or false"));
    }
}
