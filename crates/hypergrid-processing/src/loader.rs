//! CSV loading with progressively more lenient read strategies.

use polars::io::csv::read::{CsvParseOptions, CsvReadOptions, NullValues};
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DatasetConfig;
use crate::dataset::Dataset;
use crate::error::{DataError, Result, ResultExt};

/// Rows used for schema inference.
const INFER_SCHEMA_ROWS: usize = 1000;

/// Load a CSV file and convert it into a [`Dataset`].
///
/// # Errors
///
/// Returns [`DataError::Io`] if the file does not exist, a polars error if
/// every read strategy fails, or any error from
/// [`Dataset::from_dataframe`].
pub fn load_csv(path: impl AsRef<Path>, config: &DatasetConfig) -> Result<Dataset> {
    let path = path.as_ref();
    let df = read_csv(path, config)?;
    info!(
        "Loaded {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Dataset::from_dataframe(&df, config).context(format!("Building dataset from {}", path.display()))
}

/// Read a CSV file into a polars DataFrame.
///
/// Tries, in order: a standard quoted read with the configured null
/// markers, a read without quote handling, and finally a read of the
/// file content after collapsing doubled quotes and blank lines.
pub fn read_csv(path: &Path, config: &DatasetConfig) -> Result<DataFrame> {
    if !path.exists() {
        return Err(DataError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }

    // Strategy 1: Standard loading with quote handling
    match base_options()
        .with_parse_options(parse_options(config).with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Standard loading failed: {}", e),
    }

    // Strategy 2: Without quote handling
    match base_options()
        .with_parse_options(parse_options(config).with_quote_char(None))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Loading without quotes failed: {}", e),
    }

    // Strategy 3: Pre-clean content
    let content = std::fs::read_to_string(path)?;
    let cleaned = clean_csv_content(&content);
    base_options()
        .with_parse_options(parse_options(config))
        .into_reader_with_file_handle(Cursor::new(cleaned))
        .finish()
        .context(format!("Reading {}", path.display()))
}

fn base_options() -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
}

fn parse_options(config: &DatasetConfig) -> CsvParseOptions {
    let markers: Vec<PlSmallStr> = config
        .missing_markers
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| PlSmallStr::from(m.as_str()))
        .collect();
    CsvParseOptions::default().with_null_values(Some(NullValues::AllColumns(markers)))
}

fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_csv_content_drops_blank_lines() {
        let cleaned = clean_csv_content("a,b\n\n1,\"\"x\"\"\n   \n2,y\n");
        assert_eq!(cleaned, "a,b\n1,\"x\"\n2,y");
    }

    #[test]
    fn test_read_csv_missing_file() {
        let err = read_csv(Path::new("does/not/exist.csv"), &DatasetConfig::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
