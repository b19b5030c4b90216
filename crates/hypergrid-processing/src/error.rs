//! Error types for dataset loading and preprocessing.
//!
//! This module provides the error hierarchy for the processing crate using
//! `thiserror`. Every variant maps to a stable error code so callers (the
//! CLI, JSON reports) can branch on the kind of failure without parsing
//! messages.
//!
//! Errors are serializable as `{ "code": ..., "message": ... }`.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the processing crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DataError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The target column cannot be used as a binary label.
    #[error("Invalid target column '{column}': {reason}")]
    InvalidTarget { column: String, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The columns seen at transform time differ from the ones seen at fit time.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The dataset (or a requested subset of it) has no rows.
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    /// A transformer was used before `fit` was called.
    #[error("{0} is not fitted; call fit() first")]
    NotFitted(&'static str),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DataError>,
    },
}

impl DataError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DataError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidTarget { .. } => "INVALID_TARGET",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            Self::EmptyDataset(_) => "EMPTY_DATASET",
            Self::NotFitted(_) => "NOT_FITTED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }
}

impl Serialize for DataError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DataError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DataError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            DataError::ColumnNotFound("class".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            DataError::NotFitted("OneHotEncoder").error_code(),
            "NOT_FITTED"
        );
    }

    #[test]
    fn test_not_fitted_message() {
        let err = DataError::NotFitted("StandardScaler");
        assert!(err.to_string().contains("StandardScaler"));
        assert!(err.to_string().contains("fit()"));
    }

    #[test]
    fn test_error_serialization() {
        let error = DataError::InvalidTarget {
            column: "class".to_string(),
            reason: "expected 2 labels, found 3".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("INVALID_TARGET"));
        assert!(json.contains("found 3"));
    }

    #[test]
    fn test_with_context_preserves_code() {
        let error = DataError::SchemaMismatch("missing 'age'".to_string())
            .with_context("While scoring fold 2");
        assert!(error.to_string().contains("While scoring fold 2"));
        assert_eq!(error.error_code(), "SCHEMA_MISMATCH");
    }
}
