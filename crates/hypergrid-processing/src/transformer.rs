//! Column-wise preprocessing of a [`Dataset`] into a numeric matrix.
//!
//! [`ColumnTransformer`] imputes every column, encodes categorical columns
//! and optionally standardizes numeric ones. All statistics are learned in
//! [`fit`](ColumnTransformer::fit) and reused by
//! [`transform`](ColumnTransformer::transform).

use ndarray::{Array2, Axis, concatenate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CategoricalEncoding, CategoricalImputation, NumericImputation};
use crate::dataset::{Dataset, Schema};
use crate::encoders::{OneHotEncoder, OrdinalEncoder};
use crate::error::{DataError, Result};
use crate::imputers::{ImputedColumn, SimpleImputer};
use crate::scaler::StandardScaler;

/// Settings of a [`ColumnTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerParams {
    /// Standardize numeric columns. Default: true
    pub scale_numeric: bool,
    /// Default: one-hot
    pub categorical_encoding: CategoricalEncoding,
    /// Default: median
    pub numeric_imputation: NumericImputation,
    /// Default: mode
    pub categorical_imputation: CategoricalImputation,
}

impl Default for TransformerParams {
    fn default() -> Self {
        Self {
            scale_numeric: true,
            categorical_encoding: CategoricalEncoding::OneHot,
            numeric_imputation: NumericImputation::Median,
            categorical_imputation: CategoricalImputation::Mode,
        }
    }
}

#[derive(Debug, Clone)]
enum ColumnEncoder {
    Numeric,
    OneHot(OneHotEncoder),
    Ordinal(OrdinalEncoder),
}

#[derive(Debug, Clone)]
struct FittedState {
    schema: Schema,
    imputer: SimpleImputer,
    encoders: Vec<ColumnEncoder>,
    scaler: Option<StandardScaler>,
    numeric_positions: Vec<usize>,
    feature_names_out: Vec<String>,
}

/// Imputes, encodes and scales a dataset's feature columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnTransformer {
    params: TransformerParams,
    state: Option<FittedState>,
}

impl ColumnTransformer {
    /// Names accepted by [`set_param`](Self::set_param).
    pub const PARAM_NAMES: [&'static str; 4] = [
        "scale_numeric",
        "categorical_encoding",
        "numeric_imputation",
        "categorical_imputation",
    ];

    pub fn new(params: TransformerParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &TransformerParams {
        &self.params
    }

    /// Current settings as `(name, value)` string pairs.
    pub fn param_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("scale_numeric", self.params.scale_numeric.to_string()),
            (
                "categorical_encoding",
                self.params.categorical_encoding.to_string(),
            ),
            (
                "numeric_imputation",
                self.params.numeric_imputation.to_string(),
            ),
            (
                "categorical_imputation",
                self.params.categorical_imputation.to_string(),
            ),
        ]
    }

    /// Change one setting by name. Resets any fitted state.
    ///
    /// # Errors
    ///
    /// [`DataError::InvalidConfig`] for an unknown name or unparseable value.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "scale_numeric" => {
                self.params.scale_numeric = match value.trim().to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(DataError::InvalidConfig(format!(
                            "scale_numeric expects true or false, got '{}'",
                            other
                        )));
                    }
                }
            }
            "categorical_encoding" => self.params.categorical_encoding = value.parse()?,
            "numeric_imputation" => self.params.numeric_imputation = value.parse()?,
            "categorical_imputation" => self.params.categorical_imputation = value.parse()?,
            other => {
                return Err(DataError::InvalidConfig(format!(
                    "unknown preprocessor parameter '{}' (expected one of: {})",
                    other,
                    Self::PARAM_NAMES.join(", ")
                )));
            }
        }
        self.state = None;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Learn imputation values, categories and scaling from `dataset`.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        if dataset.n_rows() == 0 {
            return Err(DataError::EmptyDataset(
                "cannot fit ColumnTransformer on zero rows".to_string(),
            ));
        }

        let mut imputer = SimpleImputer::new(
            self.params.numeric_imputation,
            self.params.categorical_imputation,
        );
        imputer.fit(dataset)?;
        let columns = imputer.transform(dataset)?;

        let mut encoders = Vec::with_capacity(columns.len());
        let mut feature_names_out = Vec::new();
        let mut numeric_positions = Vec::new();
        for (feature, column) in dataset.features().iter().zip(&columns) {
            match column {
                ImputedColumn::Numeric(_) => {
                    numeric_positions.push(feature_names_out.len());
                    feature_names_out.push(feature.name.clone());
                    encoders.push(ColumnEncoder::Numeric);
                }
                ImputedColumn::Categorical(values) => match self.params.categorical_encoding {
                    CategoricalEncoding::OneHot => {
                        let mut enc = OneHotEncoder::new();
                        enc.fit(values);
                        feature_names_out.extend(enc.feature_names_out(&feature.name));
                        encoders.push(ColumnEncoder::OneHot(enc));
                    }
                    CategoricalEncoding::Ordinal => {
                        let mut enc = OrdinalEncoder::new();
                        enc.fit(values);
                        feature_names_out.push(feature.name.clone());
                        encoders.push(ColumnEncoder::Ordinal(enc));
                    }
                },
            }
        }

        let mut state = FittedState {
            schema: dataset.schema(),
            imputer,
            encoders,
            scaler: None,
            numeric_positions,
            feature_names_out,
        };

        if self.params.scale_numeric && !state.numeric_positions.is_empty() {
            let encoded = encode(&state, &columns)?;
            let numeric = encoded.select(Axis(1), &state.numeric_positions);
            let mut scaler = StandardScaler::new();
            scaler.fit(&numeric)?;
            state.scaler = Some(scaler);
        }

        debug!(
            "ColumnTransformer fitted: {} input columns -> {} output columns",
            dataset.n_features(),
            state.feature_names_out.len()
        );
        self.state = Some(state);
        Ok(())
    }

    /// Transform `dataset` into a `(n_rows, n_features_out)` matrix.
    ///
    /// # Errors
    ///
    /// [`DataError::NotFitted`] before `fit`, [`DataError::SchemaMismatch`]
    /// if the dataset's schema differs from the one seen at fit time.
    pub fn transform(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let state = self
            .state
            .as_ref()
            .ok_or(DataError::NotFitted("ColumnTransformer"))?;
        if let Some(diff) = state.schema.diff(&dataset.schema()) {
            return Err(DataError::SchemaMismatch(diff));
        }

        let columns = state.imputer.transform(dataset)?;
        let mut out = encode(state, &columns)?;

        if let Some(scaler) = &state.scaler {
            let scaled = scaler.transform(&out.select(Axis(1), &state.numeric_positions))?;
            for (j, &pos) in state.numeric_positions.iter().enumerate() {
                out.column_mut(pos).assign(&scaled.column(j));
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, dataset: &Dataset) -> Result<Array2<f64>> {
        self.fit(dataset)?;
        self.transform(dataset)
    }

    /// Output column names, available after fit.
    pub fn feature_names_out(&self) -> Option<&[String]> {
        self.state.as_ref().map(|s| s.feature_names_out.as_slice())
    }
}

fn encode(state: &FittedState, columns: &[ImputedColumn]) -> Result<Array2<f64>> {
    let n_rows = match columns.first() {
        Some(ImputedColumn::Numeric(v)) => v.len(),
        Some(ImputedColumn::Categorical(v)) => v.len(),
        None => 0,
    };
    let mut blocks: Vec<Array2<f64>> = Vec::with_capacity(columns.len());
    for (column, encoder) in columns.iter().zip(&state.encoders) {
        let block = match (column, encoder) {
            (ImputedColumn::Numeric(values), ColumnEncoder::Numeric) => {
                Array2::from_shape_vec((values.len(), 1), values.clone())
                    .map_err(|e| DataError::InvalidConfig(e.to_string()))?
            }
            (ImputedColumn::Categorical(values), ColumnEncoder::OneHot(enc)) => {
                enc.transform(values)?
            }
            (ImputedColumn::Categorical(values), ColumnEncoder::Ordinal(enc)) => {
                Array2::from_shape_vec((values.len(), 1), enc.transform(values)?)
                    .map_err(|e| DataError::InvalidConfig(e.to_string()))?
            }
            _ => {
                return Err(DataError::SchemaMismatch(
                    "column kind differs from the fitted encoder".to_string(),
                ));
            }
        };
        blocks.push(block);
    }
    if blocks.is_empty() {
        return Ok(Array2::zeros((n_rows, 0)));
    }
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| DataError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ClassLabels, Feature};
    use pretty_assertions::assert_eq;

    fn dataset() -> Dataset {
        Dataset::new(
            vec![
                Feature::numeric("duration", vec![Some(6.0), Some(12.0), None, Some(24.0)]),
                Feature::categorical(
                    "housing",
                    vec![Some("own"), Some("rent"), Some("own"), None],
                ),
                Feature::numeric("age", vec![Some(30.0), Some(30.0), Some(30.0), Some(30.0)]),
            ],
            vec![1.0, 0.0, 1.0, 0.0],
            ClassLabels {
                negative: "bad".into(),
                positive: "good".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_one_hot_output_layout() {
        let ds = dataset();
        let mut ct = ColumnTransformer::new(TransformerParams {
            scale_numeric: false,
            ..Default::default()
        });
        let x = ct.fit_transform(&ds).unwrap();

        assert_eq!(
            ct.feature_names_out().unwrap(),
            &["duration", "housing=own", "housing=rent", "age"]
        );
        assert_eq!(x.dim(), (4, 4));
        // duration median of [6, 12, 24] is 12
        assert_eq!(x.column(0).to_vec(), vec![6.0, 12.0, 12.0, 24.0]);
        assert_eq!(x.row(3).to_vec(), vec![24.0, 1.0, 0.0, 30.0]);
    }

    #[test]
    fn test_ordinal_and_scaling() {
        let ds = dataset();
        let mut ct = ColumnTransformer::default();
        ct.set_param("categorical_encoding", "ordinal").unwrap();
        let x = ct.fit_transform(&ds).unwrap();

        assert_eq!(x.dim(), (4, 3));
        assert_eq!(x.column(1).to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
        assert!(x.column(0).sum().abs() < 1e-9);
        assert_eq!(x.column(2).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_unknown_category_at_transform() {
        let ds = dataset();
        let mut ct = ColumnTransformer::default();
        ct.fit(&ds.subset(&[0, 2])).unwrap();
        assert_eq!(ct.feature_names_out().unwrap().len(), 3);

        let x = ct.transform(&ds.subset(&[1])).unwrap();
        // "rent" was never seen: the one-hot block is all zeros
        assert_eq!(x[[0, 1]], 0.0);
    }

    #[test]
    fn test_schema_mismatch() {
        let ds = dataset();
        let mut ct = ColumnTransformer::default();
        ct.fit(&ds).unwrap();
        let err = ct.transform(&ds.drop_columns(&["age"]).unwrap()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }

    #[test]
    fn test_set_param_validation_resets_fit() {
        let ds = dataset();
        let mut ct = ColumnTransformer::default();
        ct.fit(&ds).unwrap();
        ct.set_param("scale_numeric", "false").unwrap();
        assert!(!ct.is_fitted());
        assert!(!ct.params().scale_numeric);

        assert!(ct.set_param("scale_numeric", "maybe").is_err());
        assert!(ct.set_param("categorical_encoding", "binary").is_err());
        let err = ct.set_param("bogus", "1").unwrap_err();
        assert!(err.to_string().contains("scale_numeric"));
    }
}
