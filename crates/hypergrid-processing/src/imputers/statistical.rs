//! Statistical imputation methods.
//!
//! Fill values are learned from the training rows at fit time and applied
//! unchanged to any later rows, so held-out data never influences them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{CategoricalImputation, NumericImputation};
use crate::dataset::{Dataset, FeatureColumn, Schema};
use crate::error::{DataError, Result};
use crate::utils::{mean, median, string_mode};

/// Category used by [`CategoricalImputation::Constant`] and as a fallback
/// for columns with no observed values.
pub const MISSING_CATEGORY: &str = "missing";

/// A learned fill value for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Numeric(f64),
    Categorical(String),
}

/// A feature column with every missing cell filled.
#[derive(Debug, Clone, PartialEq)]
pub enum ImputedColumn {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// Per-column imputer for datasets with mixed numeric/categorical columns.
#[derive(Debug, Clone, Default)]
pub struct SimpleImputer {
    numeric: NumericImputation,
    categorical: CategoricalImputation,
    fitted: Option<FittedImputer>,
}

#[derive(Debug, Clone)]
struct FittedImputer {
    schema: Schema,
    fill: Vec<FillValue>,
    steps: Vec<String>,
}

impl SimpleImputer {
    pub fn new(numeric: NumericImputation, categorical: CategoricalImputation) -> Self {
        Self {
            numeric,
            categorical,
            fitted: None,
        }
    }

    pub fn numeric_strategy(&self) -> NumericImputation {
        self.numeric
    }

    pub fn categorical_strategy(&self) -> CategoricalImputation {
        self.categorical
    }

    /// Learn one fill value per feature column.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        let mut fill = Vec::with_capacity(dataset.n_features());
        let mut steps = Vec::new();

        for feature in dataset.features() {
            let value = match &feature.values {
                FeatureColumn::Numeric(values) => {
                    let learned = match self.numeric {
                        NumericImputation::Mean => mean(values),
                        NumericImputation::Median => median(values),
                        NumericImputation::Zero => Some(0.0),
                    };
                    let value = learned.unwrap_or_else(|| {
                        warn!(
                            "Column '{}' has no observed values, filling with 0",
                            feature.name
                        );
                        0.0
                    });
                    if values.iter().any(Option::is_none) {
                        steps.push(format!(
                            "Filled '{}' with {}: {:.2}",
                            feature.name, self.numeric, value
                        ));
                    }
                    FillValue::Numeric(value)
                }
                FeatureColumn::Categorical(values) => {
                    let value = match self.categorical {
                        CategoricalImputation::Mode => string_mode(values)
                            .unwrap_or_else(|| MISSING_CATEGORY.to_string()),
                        CategoricalImputation::Constant => MISSING_CATEGORY.to_string(),
                    };
                    if values.iter().any(Option::is_none) {
                        steps.push(format!(
                            "Filled '{}' with {}: '{}'",
                            feature.name, self.categorical, value
                        ));
                    }
                    FillValue::Categorical(value)
                }
            };
            fill.push(value);
        }

        for step in &steps {
            debug!("{}", step);
        }
        self.fitted = Some(FittedImputer {
            schema: dataset.schema(),
            fill,
            steps,
        });
        Ok(())
    }

    /// Fill missing cells using the values learned at fit time.
    ///
    /// # Errors
    ///
    /// [`DataError::NotFitted`] before `fit`, [`DataError::SchemaMismatch`]
    /// if the dataset's columns differ from the fitted ones.
    pub fn transform(&self, dataset: &Dataset) -> Result<Vec<ImputedColumn>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(DataError::NotFitted("SimpleImputer"))?;
        if let Some(diff) = fitted.schema.diff(&dataset.schema()) {
            return Err(DataError::SchemaMismatch(diff));
        }

        Ok(dataset
            .features()
            .iter()
            .zip(&fitted.fill)
            .map(|(feature, fill)| match (&feature.values, fill) {
                (FeatureColumn::Numeric(values), FillValue::Numeric(v)) => {
                    ImputedColumn::Numeric(values.iter().map(|x| x.unwrap_or(*v)).collect())
                }
                (FeatureColumn::Categorical(values), FillValue::Categorical(v)) => {
                    ImputedColumn::Categorical(
                        values
                            .iter()
                            .map(|x| x.clone().unwrap_or_else(|| v.clone()))
                            .collect(),
                    )
                }
                // Schema equality guarantees matching kinds
                (FeatureColumn::Numeric(values), FillValue::Categorical(_)) => {
                    ImputedColumn::Numeric(values.iter().map(|x| x.unwrap_or(0.0)).collect())
                }
                (FeatureColumn::Categorical(values), FillValue::Numeric(_)) => {
                    ImputedColumn::Categorical(
                        values
                            .iter()
                            .map(|x| x.clone().unwrap_or_else(|| MISSING_CATEGORY.to_string()))
                            .collect(),
                    )
                }
            })
            .collect())
    }

    /// Learned fill values in feature order, if fitted.
    pub fn fill_values(&self) -> Option<&[FillValue]> {
        self.fitted.as_ref().map(|f| f.fill.as_slice())
    }

    /// Human-readable description of what was filled at fit time.
    pub fn processing_steps(&self) -> &[String] {
        self.fitted.as_ref().map_or(&[], |f| f.steps.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ClassLabels, Feature};
    use pretty_assertions::assert_eq;

    fn labels() -> ClassLabels {
        ClassLabels {
            negative: "bad".into(),
            positive: "good".into(),
        }
    }

    fn dataset() -> Dataset {
        Dataset::new(
            vec![
                Feature::numeric("amount", vec![Some(1.0), None, Some(3.0), None, Some(8.0)]),
                Feature::categorical(
                    "housing",
                    vec![Some("own"), Some("rent"), None, Some("rent"), Some("own")],
                ),
            ],
            vec![1.0, 0.0, 1.0, 0.0, 1.0],
            labels(),
        )
        .unwrap()
    }

    #[test]
    fn test_median_and_mode() {
        let ds = dataset();
        let mut imputer = SimpleImputer::default();
        imputer.fit(&ds).unwrap();

        let columns = imputer.transform(&ds).unwrap();
        assert_eq!(
            columns[0],
            ImputedColumn::Numeric(vec![1.0, 3.0, 3.0, 3.0, 8.0])
        );
        // "own" and "rent" tie; the first seen wins
        assert_eq!(
            columns[1],
            ImputedColumn::Categorical(
                ["own", "rent", "own", "rent", "own"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            )
        );
        assert_eq!(imputer.processing_steps().len(), 2);
        assert!(imputer.processing_steps()[0].contains("median"));
    }

    #[test]
    fn test_mean_and_constant() {
        let ds = dataset();
        let mut imputer =
            SimpleImputer::new(NumericImputation::Mean, CategoricalImputation::Constant);
        imputer.fit(&ds).unwrap();

        assert_eq!(
            imputer.fill_values().unwrap(),
            &[
                FillValue::Numeric(4.0),
                FillValue::Categorical(MISSING_CATEGORY.to_string())
            ]
        );
    }

    #[test]
    fn test_fill_values_come_from_training_rows() {
        let ds = dataset();
        let train = ds.subset(&[0, 1, 2]);
        let test = ds.subset(&[3, 4]);
        let mut imputer = SimpleImputer::new(NumericImputation::Mean, CategoricalImputation::Mode);
        imputer.fit(&train).unwrap();

        match &imputer.transform(&test).unwrap()[0] {
            ImputedColumn::Numeric(v) => assert_eq!(v, &vec![2.0, 8.0]),
            other => panic!("expected numeric column, got {:?}", other),
        }
    }

    #[test]
    fn test_all_missing_column_falls_back() {
        let ds = Dataset::new(
            vec![
                Feature::numeric("x", vec![None, None]),
                Feature::categorical::<String>("c", vec![None, None]),
            ],
            vec![0.0, 1.0],
            labels(),
        )
        .unwrap();
        let mut imputer = SimpleImputer::default();
        imputer.fit(&ds).unwrap();
        assert_eq!(
            imputer.fill_values().unwrap(),
            &[
                FillValue::Numeric(0.0),
                FillValue::Categorical(MISSING_CATEGORY.to_string())
            ]
        );
    }

    #[test]
    fn test_transform_before_fit() {
        let err = SimpleImputer::default().transform(&dataset()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FITTED");
    }

    #[test]
    fn test_schema_mismatch() {
        let ds = dataset();
        let mut imputer = SimpleImputer::default();
        imputer.fit(&ds).unwrap();
        let narrowed = ds.drop_columns(&["housing"]).unwrap();
        let err = imputer.transform(&narrowed).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }
}
