//! Configuration types for dataset loading and preprocessing.
//!
//! [`DatasetConfig`] controls how a CSV file becomes a [`Dataset`](crate::Dataset)
//! and how it is split; the strategy enums configure the
//! [`ColumnTransformer`](crate::ColumnTransformer).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DataError;

/// Default markers treated as missing values in categorical columns.
pub const DEFAULT_MISSING_MARKERS: [&str; 6] = ["?", "", "na", "n/a", "null", "nan"];

/// Strategy for imputing missing numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumericImputation {
    /// Use the mean of non-missing values
    Mean,
    /// Use the median of non-missing values
    #[default]
    Median,
    /// Use zero as the fill value
    Zero,
}

/// Strategy for imputing missing categorical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalImputation {
    /// Use the most frequent value (mode)
    #[default]
    Mode,
    /// Use a constant value ("missing") as its own category
    Constant,
}

/// How categorical columns are turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// One indicator column per category (linear models)
    #[default]
    OneHot,
    /// A single column holding the category index (tree models)
    Ordinal,
}

macro_rules! impl_strategy_str {
    ($ty:ident, $($variant:ident => $name:literal),+ $(,)?) => {
        impl $ty {
            /// Returns the lowercase name used in parameter grids and on the CLI.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = DataError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(DataError::InvalidConfig(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($ty),
                        other,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_strategy_str!(NumericImputation, Mean => "mean", Median => "median", Zero => "zero");
impl_strategy_str!(CategoricalImputation, Mode => "mode", Constant => "constant");
impl_strategy_str!(CategoricalEncoding, OneHot => "onehot", Ordinal => "ordinal");

/// Configuration for loading and splitting a dataset.
///
/// # Example
///
/// ```
/// use hypergrid_processing::DatasetConfig;
///
/// let config = DatasetConfig::builder()
///     .target_column("class")
///     .positive_label("good")
///     .test_size(0.25)
///     .random_seed(42)
///     .build()
///     .expect("valid config");
/// assert_eq!(config.target_column, "class");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Name of the binary target column.
    /// Default: "class"
    pub target_column: String,

    /// Label treated as the positive class (encoded as 1.0).
    /// If None, the lexicographically larger of the two labels is used.
    /// Default: None
    pub positive_label: Option<String>,

    /// Cell values treated as missing (compared trimmed, case-insensitive).
    /// Default: `?`, empty, `na`, `n/a`, `null`, `nan`
    pub missing_markers: Vec<String>,

    /// Columns removed before building features (e.g. row identifiers).
    /// Default: empty
    pub drop_columns: Vec<String>,

    /// Fraction of rows held out for testing (0.0 - 1.0, exclusive).
    /// Default: 0.25
    pub test_size: f64,

    /// Whether the train/test split preserves class proportions.
    /// Default: true
    pub stratify: bool,

    /// Seed for every shuffle performed on the dataset.
    /// Default: 42
    pub random_seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_column: "class".to_string(),
            positive_label: None,
            missing_markers: DEFAULT_MISSING_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            drop_columns: Vec::new(),
            test_size: 0.25,
            stratify: true,
            random_seed: 42,
        }
    }
}

impl DatasetConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.target_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyTargetColumn);
        }

        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigValidationError::InvalidTestSize(self.test_size));
        }

        if self.drop_columns.iter().any(|c| c == &self.target_column) {
            return Err(ConfigValidationError::TargetDropped(
                self.target_column.clone(),
            ));
        }

        Ok(())
    }

    /// Returns `true` if `value` is one of the configured missing markers.
    pub fn is_missing_marker(&self, value: &str) -> bool {
        let trimmed = value.trim();
        self.missing_markers
            .iter()
            .any(|marker| marker.trim().eq_ignore_ascii_case(trimmed))
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("target_column must not be empty")]
    EmptyTargetColumn,

    #[error("Invalid test_size: {0} (must be between 0.0 and 1.0, exclusive)")]
    InvalidTestSize(f64),

    #[error("target column '{0}' cannot also be listed in drop_columns")]
    TargetDropped(String),
}

impl From<ConfigValidationError> for DataError {
    fn from(err: ConfigValidationError) -> Self {
        DataError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`DatasetConfig`].
#[derive(Debug, Clone, Default)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    /// Set the target column name.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.config.target_column = column.into();
        self
    }

    /// Set the label encoded as the positive class.
    pub fn positive_label(mut self, label: impl Into<String>) -> Self {
        self.config.positive_label = Some(label.into());
        self
    }

    /// Replace the list of missing-value markers.
    pub fn missing_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.missing_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Add a column to drop before building features.
    pub fn drop_column(mut self, column: impl Into<String>) -> Self {
        self.config.drop_columns.push(column.into());
        self
    }

    /// Set the held-out test fraction.
    pub fn test_size(mut self, size: f64) -> Self {
        self.config.test_size = size;
        self
    }

    /// Enable or disable stratified splitting.
    pub fn stratify(mut self, stratify: bool) -> Self {
        self.config.stratify = stratify;
        self
    }

    /// Set the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<DatasetConfig, DataError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatasetConfig::default();
        assert_eq!(config.target_column, "class");
        assert_eq!(config.test_size, 0.25);
        assert_eq!(config.random_seed, 42);
        assert!(config.stratify);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_test_size() {
        for size in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let result = DatasetConfig::builder().test_size(size).build();
            assert!(result.is_err(), "test_size {size} should be rejected");
        }
        let err = DatasetConfig::builder().test_size(1.0).build().unwrap_err();
        assert!(err.to_string().contains("test_size"));
    }

    #[test]
    fn test_target_cannot_be_dropped() {
        let result = DatasetConfig::builder()
            .target_column("label")
            .drop_column("label")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_markers_are_trimmed_and_case_insensitive() {
        let config = DatasetConfig::default();
        assert!(config.is_missing_marker(" ? "));
        assert!(config.is_missing_marker("NaN"));
        assert!(config.is_missing_marker(""));
        assert!(!config.is_missing_marker("none-of-these"));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "Ordinal".parse::<CategoricalEncoding>().unwrap(),
            CategoricalEncoding::Ordinal
        );
        assert_eq!(
            "mean".parse::<NumericImputation>().unwrap(),
            NumericImputation::Mean
        );
        let err = "bogus".parse::<CategoricalImputation>().unwrap_err();
        assert!(err.to_string().contains("mode, constant"));
    }

    #[test]
    fn test_strategy_roundtrip() {
        for enc in [CategoricalEncoding::OneHot, CategoricalEncoding::Ordinal] {
            assert_eq!(enc.as_str().parse::<CategoricalEncoding>().unwrap(), enc);
        }
    }
}
