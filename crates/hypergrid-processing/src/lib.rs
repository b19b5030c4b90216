//! Tabular Dataset Processing Library
//!
//! Loads a CSV file into a typed [`Dataset`] with a binary target, splits it
//! into seeded train/test subsets, and turns feature columns into a numeric
//! matrix ready for a classifier.
//!
//! # Overview
//!
//! - **Loading**: polars CSV reader with lenient fallbacks and configurable
//!   missing-value markers ([`load_csv`])
//! - **Typing**: every column becomes numeric or categorical; string columns
//!   that hold only numbers are type-corrected
//! - **Splitting**: shuffled, optionally stratified [`train_test_split`]
//! - **Preprocessing**: [`SimpleImputer`], [`OneHotEncoder`],
//!   [`OrdinalEncoder`], [`StandardScaler`], combined by [`ColumnTransformer`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hypergrid_processing::{ColumnTransformer, DatasetConfig, load_csv, train_test_split};
//!
//! let config = DatasetConfig::builder()
//!     .target_column("class")
//!     .positive_label("good")
//!     .build()?;
//! let dataset = load_csv("credit.csv", &config)?;
//! let (train, test) = train_test_split(&dataset, config.test_size, config.random_seed, true)?;
//!
//! let mut preprocessor = ColumnTransformer::default();
//! let x_train = preprocessor.fit_transform(&train)?;
//! let x_test = preprocessor.transform(&test)?;
//! println!("{} -> {} columns", train.n_features(), x_train.ncols());
//! ```
//!
//! # Configuration
//!
//! [`ColumnTransformer`] settings can be changed by name, which is how the
//! search layer tunes them:
//!
//! ```rust,ignore
//! let mut preprocessor = ColumnTransformer::default();
//! preprocessor.set_param("categorical_encoding", "ordinal")?;
//! preprocessor.set_param("scale_numeric", "false")?;
//! ```

pub mod config;
pub mod dataset;
pub mod encoders;
pub mod error;
pub mod imputers;
pub mod loader;
pub mod scaler;
pub mod split;
pub mod transformer;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    CategoricalEncoding, CategoricalImputation, ConfigValidationError, DatasetConfig,
    DatasetConfigBuilder, NumericImputation,
};
pub use dataset::{ClassLabels, Dataset, Feature, FeatureColumn, FeatureKind, Schema};
pub use encoders::{OneHotEncoder, OrdinalEncoder};
pub use error::{DataError, Result as DataResult, ResultExt};
pub use imputers::{FillValue, ImputedColumn, SimpleImputer};
pub use loader::{load_csv, read_csv};
pub use scaler::StandardScaler;
pub use split::{SplitIndices, split_indices, train_test_split};
pub use transformer::{ColumnTransformer, TransformerParams};
pub use utils::{DtypeCategory, get_dtype_category, is_numeric_dtype};
