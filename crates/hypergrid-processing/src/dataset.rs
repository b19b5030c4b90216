//! In-memory tabular dataset with typed feature columns and a binary target.
//!
//! A [`Dataset`] is built once from a polars [`DataFrame`] and afterwards
//! only sliced by row indices (splits, cross-validation folds). Every
//! feature column is either numeric or categorical; missing cells are
//! `None` in both cases.

use ndarray::Array1;
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::DatasetConfig;
use crate::error::{DataError, Result, ResultExt};
use crate::utils::{DtypeCategory, get_dtype_category};

/// Kind of a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Real-valued column
    Numeric,
    /// Column of string categories
    Categorical,
}

/// Values of one feature column.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumn {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl FeatureColumn {
    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The column's kind.
    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::Numeric(_) => FeatureKind::Numeric,
            Self::Categorical(_) => FeatureKind::Categorical,
        }
    }

    /// Number of missing cells.
    pub fn null_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Self::Categorical(v) => {
                Self::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    pub values: FeatureColumn,
}

impl Feature {
    /// Create a numeric feature.
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: FeatureColumn::Numeric(values),
        }
    }

    /// Create a categorical feature.
    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self {
            name: name.into(),
            values: FeatureColumn::Categorical(
                values.into_iter().map(|v| v.map(Into::into)).collect(),
            ),
        }
    }

    /// The feature's kind.
    pub fn kind(&self) -> FeatureKind {
        self.values.kind()
    }
}

/// Ordered list of feature names and kinds.
///
/// Two datasets are compatible for fit/score only if their schemas are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema(pub Vec<(String, FeatureKind)>);

impl Schema {
    /// Describe how `other` differs from `self`, or `None` if they are equal.
    pub fn diff(&self, other: &Schema) -> Option<String> {
        if self == other {
            return None;
        }
        for (name, kind) in &self.0 {
            match other.0.iter().find(|(n, _)| n == name) {
                None => return Some(format!("column '{}' is missing", name)),
                Some((_, k)) if k != kind => {
                    return Some(format!(
                        "column '{}' changed kind from {:?} to {:?}",
                        name, kind, k
                    ));
                }
                _ => {}
            }
        }
        for (name, _) in &other.0 {
            if !self.0.iter().any(|(n, _)| n == name) {
                return Some(format!("unexpected column '{}'", name));
            }
        }
        Some("columns are in a different order".to_string())
    }
}

/// The two class labels of a binary target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabels {
    /// Label encoded as 0.0
    pub negative: String,
    /// Label encoded as 1.0
    pub positive: String,
}

impl ClassLabels {
    /// Label for an encoded value (>= 0.5 is positive).
    pub fn label_for(&self, encoded: f64) -> &str {
        if encoded >= 0.5 {
            &self.positive
        } else {
            &self.negative
        }
    }
}

/// Feature columns plus a binary target encoded as 0.0 / 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Vec<Feature>,
    target: Vec<f64>,
    labels: ClassLabels,
}

static_assertions::assert_impl_all!(Dataset: Send, Sync);

impl Dataset {
    /// Build a dataset from already-typed columns.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if column lengths disagree with the
    /// target length, names repeat, or a target value is not 0.0/1.0.
    pub fn new(features: Vec<Feature>, target: Vec<f64>, labels: ClassLabels) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for feature in &features {
            if feature.values.len() != target.len() {
                return Err(DataError::InvalidConfig(format!(
                    "feature '{}' has {} rows but the target has {}",
                    feature.name,
                    feature.values.len(),
                    target.len()
                )));
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(DataError::InvalidConfig(format!(
                    "duplicate feature name '{}'",
                    feature.name
                )));
            }
        }
        if let Some(bad) = target.iter().find(|&&y| y != 0.0 && y != 1.0) {
            return Err(DataError::InvalidConfig(format!(
                "target values must be 0.0 or 1.0, found {}",
                bad
            )));
        }
        Ok(Self {
            features,
            target,
            labels,
        })
    }

    /// Convert a polars DataFrame into a dataset.
    ///
    /// The target column is encoded as binary, configured columns are
    /// dropped, and missing markers become `None`. String columns whose
    /// non-missing values all parse as numbers are typed as numeric.
    ///
    /// # Errors
    ///
    /// - [`DataError::ColumnNotFound`] if the target or a dropped column is absent
    /// - [`DataError::InvalidTarget`] if the target does not have exactly two labels
    /// - [`DataError::EmptyDataset`] if no rows have a target value
    pub fn from_dataframe(df: &DataFrame, config: &DatasetConfig) -> Result<Self> {
        config.validate()?;

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        if !names.contains(&config.target_column) {
            return Err(DataError::ColumnNotFound(config.target_column.clone()));
        }
        for dropped in &config.drop_columns {
            if !names.contains(dropped) {
                return Err(DataError::ColumnNotFound(dropped.clone()));
            }
        }

        let raw_target = string_values(df, &config.target_column, config)?;
        let keep: Vec<usize> = raw_target
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|_| i))
            .collect();
        let dropped_rows = raw_target.len() - keep.len();
        if dropped_rows > 0 {
            warn!(
                "Dropping {} row(s) with a missing '{}' value",
                dropped_rows, config.target_column
            );
        }
        if keep.is_empty() {
            return Err(DataError::EmptyDataset(format!(
                "no rows with a value in target column '{}'",
                config.target_column
            )));
        }

        let present: Vec<&str> = keep
            .iter()
            .filter_map(|&i| raw_target[i].as_deref())
            .collect();
        let labels = resolve_labels(&present, config)?;
        let target: Vec<f64> = present
            .iter()
            .map(|v| if *v == labels.positive { 1.0 } else { 0.0 })
            .collect();

        let mut features = Vec::new();
        for name in &names {
            if name == &config.target_column || config.drop_columns.contains(name) {
                continue;
            }
            let column = feature_column(df, name, config)
                .context(format!("Converting column '{}'", name))?;
            debug!("Column '{}' typed as {:?}", name, column.kind());
            features.push(Feature {
                name: name.clone(),
                values: column.take(&keep),
            });
        }

        Self::new(features, target, labels)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Feature columns in order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Look up a feature by name.
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Feature names in order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    /// The dataset's schema.
    pub fn schema(&self) -> Schema {
        Schema(
            self.features
                .iter()
                .map(|f| (f.name.clone(), f.kind()))
                .collect(),
        )
    }

    /// Encoded target values.
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Encoded target values as an ndarray vector.
    pub fn target_array(&self) -> Array1<f64> {
        Array1::from_vec(self.target.clone())
    }

    /// The class labels behind the 0/1 encoding.
    pub fn class_labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Number of `(negative, positive)` rows.
    pub fn class_counts(&self) -> (usize, usize) {
        let positive = self.target.iter().filter(|&&y| y >= 0.5).count();
        (self.target.len() - positive, positive)
    }

    /// A new dataset containing only the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: self
                .features
                .iter()
                .map(|f| Feature {
                    name: f.name.clone(),
                    values: f.values.take(indices),
                })
                .collect(),
            target: indices.iter().map(|&i| self.target[i]).collect(),
            labels: self.labels.clone(),
        }
    }

    /// A new dataset without the named columns.
    pub fn drop_columns(&self, names: &[&str]) -> Result<Dataset> {
        for name in names {
            if self.feature(name).is_none() {
                return Err(DataError::ColumnNotFound((*name).to_string()));
            }
        }
        Ok(Dataset {
            features: self
                .features
                .iter()
                .filter(|f| !names.contains(&f.name.as_str()))
                .cloned()
                .collect(),
            target: self.target.clone(),
            labels: self.labels.clone(),
        })
    }
}

fn resolve_labels(present: &[&str], config: &DatasetConfig) -> Result<ClassLabels> {
    let distinct: BTreeSet<&str> = present.iter().copied().collect();
    if distinct.len() != 2 {
        return Err(DataError::InvalidTarget {
            column: config.target_column.clone(),
            reason: format!(
                "expected exactly 2 distinct labels, found {}",
                distinct.len()
            ),
        });
    }
    // BTreeSet iterates in sorted order
    let pair: Vec<&str> = distinct.into_iter().collect();
    let (low, high) = (pair[0], pair[1]);

    let positive = match &config.positive_label {
        None => high,
        Some(label) if label == low || label == high => label.as_str(),
        Some(label) => {
            return Err(DataError::InvalidTarget {
                column: config.target_column.clone(),
                reason: format!(
                    "positive label '{}' is not one of '{}', '{}'",
                    label, low, high
                ),
            });
        }
    };
    let negative = if positive == high { low } else { high };
    Ok(ClassLabels {
        negative: negative.to_string(),
        positive: positive.to_string(),
    })
}

/// Column values as trimmed strings with missing markers mapped to `None`.
fn string_values(df: &DataFrame, name: &str, config: &DatasetConfig) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::trim)
                .filter(|v| !config.is_missing_marker(v))
                .map(str::to_string)
        })
        .collect())
}

fn feature_column(df: &DataFrame, name: &str, config: &DatasetConfig) -> Result<FeatureColumn> {
    let column = df
        .column(name)
        .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;

    match get_dtype_category(column.dtype()) {
        DtypeCategory::Numeric => {
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            Ok(FeatureColumn::Numeric(
                series
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect(),
            ))
        }
        DtypeCategory::Boolean | DtypeCategory::String | DtypeCategory::Other => {
            let values = string_values(df, name, config)?;
            Ok(numeric_if_parseable(&values).unwrap_or(FeatureColumn::Categorical(values)))
        }
    }
}

/// Type-correct a string column whose present values are all numbers.
fn numeric_if_parseable(values: &[Option<String>]) -> Option<FeatureColumn> {
    let mut any_present = false;
    let mut parsed = Vec::with_capacity(values.len());
    for value in values {
        match value {
            None => parsed.push(None),
            Some(text) => {
                let number = text.parse::<f64>().ok().filter(|x| x.is_finite())?;
                any_present = true;
                parsed.push(Some(number));
            }
        }
    }
    any_present.then_some(FeatureColumn::Numeric(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn credit_frame() -> DataFrame {
        df! {
            "duration" => &[6i64, 48, 12, 42, 24, 36],
            "purpose" => &["radio/tv", "education", "?", "car", "radio/tv", "car"],
            "amount" => &["1169", "5951", "?", "7882", "4870", "9055"],
            "class" => &["good", "bad", "good", "good", "bad", "good"],
        }
        .unwrap()
    }

    #[test]
    fn test_from_dataframe_types_columns() {
        let ds = Dataset::from_dataframe(&credit_frame(), &DatasetConfig::default()).unwrap();

        assert_eq!(ds.n_rows(), 6);
        assert_eq!(ds.feature_names(), vec!["duration", "purpose", "amount"]);
        assert_eq!(
            ds.schema(),
            Schema(vec![
                ("duration".to_string(), FeatureKind::Numeric),
                ("purpose".to_string(), FeatureKind::Categorical),
                ("amount".to_string(), FeatureKind::Numeric),
            ])
        );
        assert_eq!(ds.feature("purpose").unwrap().values.null_count(), 1);
        assert_eq!(ds.feature("amount").unwrap().values.null_count(), 1);
    }

    #[test]
    fn test_target_encoding_default_positive_is_larger_label() {
        let ds = Dataset::from_dataframe(&credit_frame(), &DatasetConfig::default()).unwrap();
        assert_eq!(ds.class_labels().positive, "good");
        assert_eq!(ds.target(), &[1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
        assert_eq!(ds.class_counts(), (2, 4));
    }

    #[test]
    fn test_target_encoding_explicit_positive() {
        let config = DatasetConfig::builder().positive_label("bad").build().unwrap();
        let ds = Dataset::from_dataframe(&credit_frame(), &config).unwrap();
        assert_eq!(ds.class_labels().positive, "bad");
        assert_eq!(ds.target()[1], 1.0);
        assert_eq!(ds.class_labels().label_for(0.0), "good");
    }

    #[test]
    fn test_unknown_positive_label_is_rejected() {
        let config = DatasetConfig::builder().positive_label("ok").build().unwrap();
        let err = Dataset::from_dataframe(&credit_frame(), &config).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TARGET");
    }

    #[test]
    fn test_missing_target_column() {
        let config = DatasetConfig::builder().target_column("label").build().unwrap();
        let err = Dataset::from_dataframe(&credit_frame(), &config).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(ref c) if c == "label"));
    }

    #[test]
    fn test_multiclass_target_rejected() {
        let df = df! {
            "x" => &[1.0f64, 2.0, 3.0],
            "class" => &["a", "b", "c"],
        }
        .unwrap();
        let err = Dataset::from_dataframe(&df, &DatasetConfig::default()).unwrap_err();
        assert!(err.to_string().contains("found 3"));
    }

    #[test]
    fn test_rows_with_missing_target_are_dropped() {
        let df = df! {
            "x" => &[1.0f64, 2.0, 3.0, 4.0],
            "class" => &["yes", "?", "no", "yes"],
        }
        .unwrap();
        let ds = Dataset::from_dataframe(&df, &DatasetConfig::default()).unwrap();
        assert_eq!(ds.n_rows(), 3);
        match &ds.feature("x").unwrap().values {
            FeatureColumn::Numeric(v) => assert_eq!(v, &vec![Some(1.0), Some(3.0), Some(4.0)]),
            other => panic!("expected numeric column, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_columns_from_config() {
        let config = DatasetConfig::builder().drop_column("amount").build().unwrap();
        let ds = Dataset::from_dataframe(&credit_frame(), &config).unwrap();
        assert_eq!(ds.feature_names(), vec!["duration", "purpose"]);
    }

    #[test]
    fn test_subset_preserves_order() {
        let ds = Dataset::from_dataframe(&credit_frame(), &DatasetConfig::default()).unwrap();
        let sub = ds.subset(&[4, 0]);
        assert_eq!(sub.n_rows(), 2);
        assert_eq!(sub.target(), &[0.0, 1.0]);
        match &sub.feature("duration").unwrap().values {
            FeatureColumn::Numeric(v) => assert_eq!(v, &vec![Some(24.0), Some(6.0)]),
            other => panic!("expected numeric column, got {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        let labels = ClassLabels {
            negative: "0".into(),
            positive: "1".into(),
        };
        let err = Dataset::new(
            vec![Feature::numeric("x", vec![Some(1.0)])],
            vec![0.0, 1.0],
            labels,
        )
        .unwrap_err();
        assert!(err.to_string().contains("has 1 rows"));
    }

    #[test]
    fn test_schema_diff() {
        let a = Schema(vec![
            ("age".to_string(), FeatureKind::Numeric),
            ("job".to_string(), FeatureKind::Categorical),
        ]);
        let b = Schema(vec![("age".to_string(), FeatureKind::Numeric)]);
        assert_eq!(a.diff(&a), None);
        assert!(a.diff(&b).unwrap().contains("'job' is missing"));
        assert!(b.diff(&a).unwrap().contains("unexpected column 'job'"));
    }
}
