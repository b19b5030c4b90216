//! Imputation module for handling missing values.
//!
//! Numeric columns are filled with the mean, median or zero; categorical
//! columns with the mode or a constant "missing" category.

mod statistical;

pub use statistical::{FillValue, ImputedColumn, MISSING_CATEGORY, SimpleImputer};
