//! Error types for the hypergrid-learning crate.
//!
//! This module defines [`LearningError`], the error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! # Error Handling
//!
//! Errors are designed to be:
//! - **Descriptive**: each variant says which parameter, stage or fold failed
//! - **Mappable**: every variant has a stable [`error_code`](LearningError::error_code)
//! - **Serializable**: errors serialize as `{ "code": ..., "message": ... }`
//!
//! # Example
//!
//! ```
//! use hypergrid_learning::{LearningError, SearchConfig};
//!
//! fn configure() -> Result<SearchConfig, LearningError> {
//!     // Errors are propagated with ?
//!     let config = SearchConfig::builder().cv_folds(5).build()?;
//!     Ok(config)
//! }
//! # configure().unwrap();
//! ```

use hypergrid_processing::DataError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for hypergrid-learning operations.
///
/// This enum covers all error conditions that can occur during:
/// - Search and cross-validation configuration
/// - Setting hyper-parameters on a pipeline
/// - Model fitting and scoring
/// - Writing result tables
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration provided to a search or cross-validation run.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A hyper-parameter name is unknown or its value has the wrong type or range.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Fully qualified parameter name, e.g. `classifier__learning_rate`.
        name: String,
        /// Why the parameter was rejected.
        reason: String,
    },

    /// Two parameter values cannot be used together, e.g. an L1 penalty
    /// with a solver that only supports L2.
    ///
    /// Raised at fit time, so a search records the candidate as failed
    /// instead of aborting.
    #[error("Incompatible parameters: {0}")]
    IncompatibleParameters(String),

    /// Invalid data provided for fitting or scoring.
    ///
    /// Common causes:
    /// - Feature matrix and target lengths differ
    /// - A training fold contains a single class
    /// - Non-finite values reached a classifier
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A model was used for prediction before it was fitted.
    #[error("{0} is not fitted; call fit() first")]
    NotFitted(&'static str),

    /// Every candidate of a search failed to fit.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// The search was cancelled through its [`CancellationToken`](crate::CancellationToken).
    #[error("Search cancelled")]
    Cancelled,

    /// Error from the dataset layer (loading, splitting, preprocessing).
    #[error(transparent)]
    Data(#[from] DataError),

    /// Polars error while building or writing a result table.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LearningError {
    /// Shorthand for [`LearningError::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::IncompatibleParameters(_) => "INCOMPATIBLE_PARAMETERS",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::NotFitted(_) => "NOT_FITTED",
            Self::TrainingFailed(_) => "TRAINING_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Data(e) => e.error_code(),
            Self::Polars(_) => "POLARS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}

impl Serialize for LearningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("LearningError", 2)?;
        state.serialize_field("code", self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LearningError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            LearningError::invalid_parameter("classifier__C", "must be positive").error_code(),
            "INVALID_PARAMETER"
        );
        let data: LearningError = DataError::ColumnNotFound("class".into()).into();
        assert_eq!(data.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_error_display() {
        let err = LearningError::invalid_parameter("classifier__max_depth", "expected an integer");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'classifier__max_depth': expected an integer"
        );
    }

    #[test]
    fn test_error_serializes_code_and_message() {
        let err = LearningError::IncompatibleParameters("l1 needs the proximal solver".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INCOMPATIBLE_PARAMETERS");
        assert!(json["message"].as_str().unwrap().contains("proximal"));
    }
}
