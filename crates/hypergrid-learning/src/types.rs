//! Result records returned by searches.
//!
//! - [`CandidateResult`]: one evaluated configuration with its fold scores
//! - [`SearchResults`]: every candidate, ranked, plus the best one
//! - [`PivotTable`]: mean scores across two parameters (heatmap data)
//!
//! # Example
//!
//! ```ignore
//! let fitted = search.fit(&train)?;
//! println!("{}", fitted.results);
//! println!("{}", fitted.results.pivot("classifier__max_depth", "classifier__learning_rate")?);
//! fitted.results.write_csv("results.csv")?;
//! ```

use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::Path;

use crate::error::{LearningError, Result};
use crate::metrics::Scoring;
use crate::params::{ParamSet, ParamValue};

/// How the candidates were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Grid,
    Randomized,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Grid => "grid",
            SearchStrategy::Randomized => "randomized",
        }
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct CandidateResult {
    /// Position in enumeration / sampling order.
    pub index: usize,
    pub params: ParamSet,
    /// One score per fold; `NaN` for every fold if the candidate failed.
    pub test_scores: Vec<f64>,
    pub mean_test_score: f64,
    pub std_test_score: f64,
    pub train_scores: Option<Vec<f64>>,
    pub mean_train_score: Option<f64>,
    pub std_train_score: Option<f64>,
    /// Seconds, averaged over folds.
    pub mean_fit_time: f64,
    /// 1-based; tied scores share the lowest rank.
    pub rank: usize,
    /// First fit error, if the candidate failed.
    pub error: Option<String>,
}

impl CandidateResult {
    pub(crate) fn new(index: usize, params: ParamSet) -> Self {
        Self {
            index,
            params,
            test_scores: Vec::new(),
            mean_test_score: f64::NAN,
            std_test_score: f64::NAN,
            train_scores: None,
            mean_train_score: None,
            std_train_score: None,
            mean_fit_time: 0.0,
            rank: 0,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    fn score_key(&self) -> Option<f64> {
        Some(self.mean_test_score).filter(|s| !s.is_nan())
    }
}

fn ranks_above(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x > y,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Assign "min" ranks by descending mean test score; NaN ranks last.
pub(crate) fn assign_ranks(candidates: &mut [CandidateResult]) {
    let keys: Vec<Option<f64>> = candidates.iter().map(CandidateResult::score_key).collect();
    for (candidate, key) in candidates.iter_mut().zip(&keys) {
        candidate.rank = 1 + keys.iter().filter(|other| ranks_above(**other, *key)).count();
    }
}

/// Index of the first candidate with the maximal mean test score.
pub(crate) fn best_candidate(candidates: &[CandidateResult]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if let Some(score) = candidate.score_key() {
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((i, score));
            }
        }
    }
    best.map(|(i, _)| i)
}

/// Every candidate of a search, ranked.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct SearchResults {
    pub strategy: SearchStrategy,
    pub scoring: Scoring,
    pub n_folds: usize,
    /// In candidate index order.
    pub candidates: Vec<CandidateResult>,
    pub best_index: usize,
    pub best_params: ParamSet,
    pub best_score: f64,
    /// One entry per failed candidate.
    pub warnings: Vec<String>,
    pub wall_time_secs: f64,
}

impl SearchResults {
    /// Rank `candidates` and pick the best one.
    ///
    /// # Errors
    ///
    /// [`LearningError::TrainingFailed`] if every candidate failed.
    pub(crate) fn from_candidates(
        strategy: SearchStrategy,
        scoring: Scoring,
        n_folds: usize,
        mut candidates: Vec<CandidateResult>,
        warnings: Vec<String>,
        wall_time_secs: f64,
    ) -> Result<Self> {
        assign_ranks(&mut candidates);
        let Some(best_index) = best_candidate(&candidates) else {
            let first_error = candidates
                .iter()
                .find_map(|c| c.error.clone())
                .or_else(|| warnings.first().cloned())
                .unwrap_or_else(|| "no candidates were evaluated".to_string());
            return Err(LearningError::TrainingFailed(format!(
                "all {} candidates failed; first error: {}",
                candidates.len(),
                first_error
            )));
        };
        let best = &candidates[best_index];
        let best_params = best.params.clone();
        let best_score = best.mean_test_score;
        Ok(Self {
            strategy,
            scoring,
            n_folds,
            candidates,
            best_index,
            best_params,
            best_score,
            warnings,
            wall_time_secs,
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn best(&self) -> &CandidateResult {
        &self.candidates[self.best_index]
    }

    pub fn n_failed(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_failed()).count()
    }

    /// The `n` best candidates, by rank then index.
    pub fn top(&self, n: usize) -> Vec<&CandidateResult> {
        let mut ordered: Vec<&CandidateResult> = self.candidates.iter().collect();
        ordered.sort_by_key(|c| (c.rank, c.index));
        ordered.truncate(n);
        ordered
    }

    /// Parameter names across all candidates, in first-seen order.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for candidate in &self.candidates {
            for name in candidate.params.names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// One row per candidate in index order.
    ///
    /// Columns: `rank`, `mean_test_score`, `std_test_score`,
    /// `mean_train_score` / `std_train_score` when recorded,
    /// `mean_fit_time`, `split<i>_test_score`, `param_<name>`, `params`,
    /// `error`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let c = &self.candidates;
        let mut columns: Vec<Column> = vec![
            Series::new(
                "rank".into(),
                c.iter().map(|r| r.rank as u32).collect::<Vec<u32>>(),
            )
            .into(),
            Series::new(
                "mean_test_score".into(),
                c.iter().map(|r| r.mean_test_score).collect::<Vec<f64>>(),
            )
            .into(),
            Series::new(
                "std_test_score".into(),
                c.iter().map(|r| r.std_test_score).collect::<Vec<f64>>(),
            )
            .into(),
        ];
        if c.iter().any(|r| r.mean_train_score.is_some()) {
            columns.push(
                Series::new(
                    "mean_train_score".into(),
                    c.iter().map(|r| r.mean_train_score).collect::<Vec<Option<f64>>>(),
                )
                .into(),
            );
            columns.push(
                Series::new(
                    "std_train_score".into(),
                    c.iter().map(|r| r.std_train_score).collect::<Vec<Option<f64>>>(),
                )
                .into(),
            );
        }
        columns.push(
            Series::new(
                "mean_fit_time".into(),
                c.iter().map(|r| r.mean_fit_time).collect::<Vec<f64>>(),
            )
            .into(),
        );
        for fold in 0..self.n_folds {
            columns.push(
                Series::new(
                    format!("split{}_test_score", fold).into(),
                    c.iter()
                        .map(|r| r.test_scores.get(fold).copied())
                        .collect::<Vec<Option<f64>>>(),
                )
                .into(),
            );
        }
        for name in self.param_names() {
            columns.push(
                Series::new(
                    format!("param_{}", name).into(),
                    c.iter()
                        .map(|r| r.params.get(name).map(ToString::to_string))
                        .collect::<Vec<Option<String>>>(),
                )
                .into(),
            );
        }
        columns.push(
            Series::new(
                "params".into(),
                c.iter().map(|r| r.params.to_string()).collect::<Vec<String>>(),
            )
            .into(),
        );
        columns.push(
            Series::new(
                "error".into(),
                c.iter().map(|r| r.error.clone()).collect::<Vec<Option<String>>>(),
            )
            .into(),
        );
        Ok(DataFrame::new(columns)?)
    }

    /// Write [`to_dataframe`](Self::to_dataframe) as CSV.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(&mut df)?;
        Ok(())
    }

    /// Mean test score for every `(row_param, col_param)` value pair.
    ///
    /// Candidates sharing a pair (other parameters differing) are averaged;
    /// failed candidates are left out. Values appear in first-seen order.
    ///
    /// # Errors
    ///
    /// [`LearningError::InvalidParameter`] if no candidate has one of the
    /// parameters.
    pub fn pivot(&self, row_param: &str, col_param: &str) -> Result<PivotTable> {
        for name in [row_param, col_param] {
            if !self.candidates.iter().any(|c| c.params.get(name).is_some()) {
                return Err(LearningError::invalid_parameter(
                    name,
                    format!(
                        "not a searched parameter (searched: {})",
                        self.param_names().join(", ")
                    ),
                ));
            }
        }

        let key = |value: Option<&ParamValue>| {
            value.map_or_else(|| "-".to_string(), ToString::to_string)
        };
        let mut row_values: Vec<String> = Vec::new();
        let mut col_values: Vec<String> = Vec::new();
        for candidate in &self.candidates {
            let r = key(candidate.params.get(row_param));
            let c = key(candidate.params.get(col_param));
            if !row_values.contains(&r) {
                row_values.push(r);
            }
            if !col_values.contains(&c) {
                col_values.push(c);
            }
        }

        let mut sums = vec![vec![(0.0f64, 0usize); col_values.len()]; row_values.len()];
        for candidate in &self.candidates {
            let Some(score) = candidate.score_key() else {
                continue;
            };
            let r = key(candidate.params.get(row_param));
            let c = key(candidate.params.get(col_param));
            let ri = row_values.iter().position(|v| *v == r);
            let ci = col_values.iter().position(|v| *v == c);
            if let (Some(ri), Some(ci)) = (ri, ci) {
                sums[ri][ci].0 += score;
                sums[ri][ci].1 += 1;
            }
        }
        let scores = sums
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
                    .collect()
            })
            .collect();

        Ok(PivotTable {
            row_param: row_param.to_string(),
            col_param: col_param.to_string(),
            row_values,
            col_values,
            scores,
        })
    }
}

/// Width of the widest entry, at least `min`.
fn column_width<'a>(entries: impl Iterator<Item = &'a str>, min: usize) -> usize {
    entries.map(str::len).fold(min, usize::max)
}

fn format_score(score: f64) -> String {
    if score.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.4}", score)
    }
}

impl fmt::Display for SearchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} search: {} candidates x {} folds, scoring={}, {:.2}s",
            self.strategy.as_str(),
            self.candidates.len(),
            self.n_folds,
            self.scoring,
            self.wall_time_secs
        )?;
        writeln!(
            f,
            "{:>4}  {:>9}  {:>8}  {:>9}  params",
            "rank", "mean_test", "std_test", "fit_time"
        )?;
        for candidate in self.top(self.candidates.len()) {
            let params = if let Some(error) = &candidate.error {
                format!("{}  [failed: {}]", candidate.params, error)
            } else {
                candidate.params.to_string()
            };
            writeln!(
                f,
                "{:>4}  {:>9}  {:>8}  {:>8.3}s  {}",
                candidate.rank,
                format_score(candidate.mean_test_score),
                format_score(candidate.std_test_score),
                candidate.mean_fit_time,
                params
            )?;
        }
        write!(
            f,
            "best: #{} {} = {:.4} ({})",
            self.best_index,
            self.scoring,
            self.best_score,
            self.best_params
        )
    }
}

/// Mean scores laid out over two parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub row_param: String,
    pub col_param: String,
    pub row_values: Vec<String>,
    pub col_values: Vec<String>,
    /// `scores[row][col]`; `None` where no successful candidate had the pair.
    pub scores: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn get(&self, row_value: &str, col_value: &str) -> Option<f64> {
        let r = self.row_values.iter().position(|v| v == row_value)?;
        let c = self.col_values.iter().position(|v| v == col_value)?;
        self.scores[r][c]
    }
}

impl fmt::Display for PivotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let corner = format!("{} \\ {}", self.row_param, self.col_param);
        let first = column_width(
            self.row_values.iter().map(String::as_str),
            corner.len(),
        );
        let cell = column_width(self.col_values.iter().map(String::as_str), 6);

        write!(f, "{:<first$}", corner, first = first)?;
        for value in &self.col_values {
            write!(f, "  {:>cell$}", value, cell = cell)?;
        }
        for (row_value, row) in self.row_values.iter().zip(&self.scores) {
            writeln!(f)?;
            write!(f, "{:<first$}", row_value, first = first)?;
            for score in row {
                let text = score.map_or_else(|| "-".to_string(), |s| format!("{:.4}", s));
                write!(f, "  {:>cell$}", text, cell = cell)?;
            }
        }
        Ok(())
    }
}
