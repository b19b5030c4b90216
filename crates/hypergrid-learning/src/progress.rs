//! Progress reporting types for searches.
//!
//! This module defines [`SearchStage`], [`ProgressUpdate`] and the
//! [`ProgressCallback`] type alias.
//!
//! # Example
//!
//! ```
//! use hypergrid_learning::{ProgressUpdate, SearchStage};
//! use std::sync::Arc;
//!
//! let callback: hypergrid_learning::ProgressCallback = Arc::new(|update: ProgressUpdate| {
//!     println!(
//!         "[{:?}] {:.0}% - {}",
//!         update.stage,
//!         update.progress * 100.0,
//!         update.message
//!     );
//!     if let Some((done, total)) = update.fits_completed {
//!         println!("  Fits: {}/{}", done, total);
//!     }
//! });
//! ```

use std::str::FromStr;
use std::sync::Arc;

/// The current stage of a search.
///
/// Searches progress through these stages in order (unless cancelled or failed):
///
/// 1. [`Initializing`](Self::Initializing) - Expanding the grid or sampling candidates
/// 2. [`CrossValidating`](Self::CrossValidating) - Fitting every candidate on every fold
/// 3. [`Refitting`](Self::Refitting) - Fitting the best candidate on all rows
/// 4. [`Complete`](Self::Complete) - Search finished successfully
///
/// Terminal states: [`Complete`](Self::Complete), [`Failed`](Self::Failed),
/// [`Cancelled`](Self::Cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum SearchStage {
    #[default]
    Initializing,
    CrossValidating,
    Refitting,
    /// Terminal. Results are available.
    Complete,
    /// Terminal. The search returned an error.
    Failed,
    /// Terminal.
    Cancelled,
}

impl SearchStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStage::Initializing => "initializing",
            SearchStage::CrossValidating => "cross_validating",
            SearchStage::Refitting => "refitting",
            SearchStage::Complete => "complete",
            SearchStage::Failed => "failed",
            SearchStage::Cancelled => "cancelled",
        }
    }

    /// Returns `true` if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchStage::Complete | SearchStage::Failed | SearchStage::Cancelled
        )
    }
}

/// Error type for parsing a [`SearchStage`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSearchStageError {
    invalid_value: String,
}

impl ParseSearchStageError {
    /// Returns the invalid value that caused the parse error.
    #[must_use]
    pub fn invalid_value(&self) -> &str {
        &self.invalid_value
    }
}

impl std::fmt::Display for ParseSearchStageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid search stage: '{}'. Valid values are: initializing, cross_validating, \
             refitting, complete, failed, cancelled",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseSearchStageError {}

impl FromStr for SearchStage {
    type Err = ParseSearchStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(SearchStage::Initializing),
            "cross_validating" => Ok(SearchStage::CrossValidating),
            "refitting" => Ok(SearchStage::Refitting),
            "complete" => Ok(SearchStage::Complete),
            "failed" => Ok(SearchStage::Failed),
            "cancelled" => Ok(SearchStage::Cancelled),
            _ => Err(ParseSearchStageError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// A progress update from a running search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    /// The current search stage.
    pub stage: SearchStage,

    /// Overall progress from 0.0 to 1.0.
    pub progress: f64,

    /// Human-readable status message.
    pub message: String,

    /// Index of the candidate whose fit just finished (if applicable).
    pub current_candidate: Option<usize>,

    /// Number of `(candidate, fold)` fits completed and total.
    pub fits_completed: Option<(u32, u32)>,
}

impl ProgressUpdate {
    pub(crate) fn stage(stage: SearchStage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Type alias for a progress callback function.
///
/// Callbacks must be thread-safe (`Send + Sync`): during cross-validation
/// they are invoked from the worker threads as fits complete.
///
/// The callback should execute quickly to avoid blocking the workers.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_stage_roundtrip() {
        let stages = [
            SearchStage::Initializing,
            SearchStage::CrossValidating,
            SearchStage::Refitting,
            SearchStage::Complete,
            SearchStage::Failed,
            SearchStage::Cancelled,
        ];
        for stage in stages {
            assert_eq!(stage.as_str().parse::<SearchStage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_search_stage_from_str_error() {
        let err = "training".parse::<SearchStage>().unwrap_err();
        assert_eq!(err.invalid_value(), "training");
        assert!(err.to_string().contains("Valid values"));
    }

    #[test]
    fn test_search_stage_is_terminal() {
        assert!(!SearchStage::Initializing.is_terminal());
        assert!(!SearchStage::CrossValidating.is_terminal());
        assert!(!SearchStage::Refitting.is_terminal());
        assert!(SearchStage::Complete.is_terminal());
        assert!(SearchStage::Failed.is_terminal());
        assert!(SearchStage::Cancelled.is_terminal());
    }

    #[test]
    fn test_progress_update_default() {
        let update = ProgressUpdate::default();
        assert_eq!(update.stage, SearchStage::Initializing);
        assert_eq!(update.progress, 0.0);
        assert!(update.message.is_empty());
        assert!(update.current_candidate.is_none());
        assert!(update.fits_completed.is_none());
    }
}
