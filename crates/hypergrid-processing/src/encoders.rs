//! Categorical encoders.
//!
//! Both encoders learn the sorted set of categories of a single column at
//! fit time. Categories that only appear later are handled without error:
//! [`OneHotEncoder`] emits an all-zero row, [`OrdinalEncoder`] emits its
//! configured unknown value.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DataError, Result};

fn learn_categories(values: &[String]) -> Vec<String> {
    values
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One indicator column per category seen at fit time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Option<Vec<String>>,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, values: &[String]) -> &mut Self {
        self.categories = Some(learn_categories(values));
        self
    }

    /// Learned categories in output column order.
    pub fn categories(&self) -> Option<&[String]> {
        self.categories.as_deref()
    }

    /// Encode to a `(values.len(), n_categories)` indicator matrix.
    pub fn transform(&self, values: &[String]) -> Result<Array2<f64>> {
        let categories = self
            .categories
            .as_ref()
            .ok_or(DataError::NotFitted("OneHotEncoder"))?;
        let mut out = Array2::zeros((values.len(), categories.len()));
        for (row, value) in values.iter().enumerate() {
            if let Ok(col) = categories.binary_search(value) {
                out[[row, col]] = 1.0;
            }
        }
        Ok(out)
    }

    /// Output column names as `<column>=<category>`.
    pub fn feature_names_out(&self, column: &str) -> Vec<String> {
        self.categories
            .iter()
            .flatten()
            .map(|c| format!("{}={}", column, c))
            .collect()
    }
}

/// A single column holding each category's index in sorted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    unknown_value: f64,
    categories: Option<Vec<String>>,
}

impl Default for OrdinalEncoder {
    fn default() -> Self {
        Self {
            unknown_value: -1.0,
            categories: None,
        }
    }
}

impl OrdinalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value emitted for categories not seen at fit time.
    pub fn with_unknown_value(mut self, value: f64) -> Self {
        self.unknown_value = value;
        self
    }

    pub fn fit(&mut self, values: &[String]) -> &mut Self {
        self.categories = Some(learn_categories(values));
        self
    }

    pub fn categories(&self) -> Option<&[String]> {
        self.categories.as_deref()
    }

    pub fn transform(&self, values: &[String]) -> Result<Vec<f64>> {
        let categories = self
            .categories
            .as_ref()
            .ok_or(DataError::NotFitted("OrdinalEncoder"))?;
        Ok(values
            .iter()
            .map(|v| {
                categories
                    .binary_search(v)
                    .map_or(self.unknown_value, |i| i as f64)
            })
            .collect())
    }
}
