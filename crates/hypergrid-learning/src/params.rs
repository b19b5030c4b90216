//! Hyper-parameter values, grids and sampling distributions.
//!
//! Parameter names are stage-scoped: `preprocessor__<name>` targets the
//! [`ColumnTransformer`](hypergrid_processing::ColumnTransformer) and
//! `classifier__<name>` the classifier (see [`ModelPipeline`](crate::ModelPipeline)).
//!
//! # Example
//!
//! ```
//! use hypergrid_learning::{ParamGrid, ParamValue};
//!
//! let grid = ParamGrid::new()
//!     .add("classifier__learning_rate", [0.01, 0.1, 1.0])
//!     .add("classifier__max_leaf_nodes", [3i64, 10, 30]);
//! assert_eq!(grid.len(), 9);
//!
//! let candidates = grid.candidates().unwrap();
//! assert_eq!(candidates[1].get("classifier__max_leaf_nodes"), Some(&ParamValue::Int(10)));
//! ```

use once_cell::sync::Lazy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{LearningError, Result};

/// `name=value` with a stage-scoped or bare parameter name.
static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").expect("valid assignment regex")
});

/// `kind:a:b` or `choice:v1,v2,...`.
static DISTRIBUTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(choice|uniform|loguniform|randint)\s*:\s*(.+?)\s*$")
        .expect("valid distribution regex")
});

// =============================================================================
// Values
// =============================================================================

/// A single hyper-parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    None,
}

impl ParamValue {
    /// Parse a command-line literal: `none`, `true`/`false`, an integer, a
    /// float, or else a string.
    pub fn parse_literal(text: &str) -> Self {
        let text = text.trim();
        match text.to_ascii_lowercase().as_str() {
            "none" | "null" => return ParamValue::None,
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            ParamValue::Int(i)
        } else if let Ok(f) = text.parse::<f64>() {
            ParamValue::Float(f)
        } else {
            ParamValue::Str(text.to_string())
        }
    }

    /// Numeric value of an `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer value of an `Int`, or of a `Float` with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::None => "none",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::None => f.write_str("none"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::None, Into::into)
    }
}

// =============================================================================
// Parameter sets
// =============================================================================

/// One configuration: an ordered map from parameter name to value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSet(Vec<(String, ParamValue)>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self.0.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        f.write_str(&parts.join(", "))
    }
}

impl Serialize for ParamSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParamSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

// =============================================================================
// Grids
// =============================================================================

type SubGrid = Vec<(String, Vec<ParamValue>)>;

/// A search space of explicit value lists.
///
/// A grid holds one or more sub-grids; its candidates are the Cartesian
/// product of each sub-grid's lists, concatenated in sub-grid order. Within
/// a sub-grid the last-added parameter varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    subgrids: Vec<SubGrid>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamGrid {
    /// A grid with one empty sub-grid (a single default candidate).
    pub fn new() -> Self {
        Self {
            subgrids: vec![Vec::new()],
        }
    }

    /// Add a parameter to the current sub-grid.
    pub fn add<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        let entry = (name.into(), values.into_iter().map(Into::into).collect());
        if let Some(current) = self.subgrids.last_mut() {
            current.push(entry);
        }
        self
    }

    /// Start a new sub-grid; following [`add`](Self::add) calls go to it.
    ///
    /// Calling it while the current sub-grid is still empty is a no-op.
    pub fn or(mut self) -> Self {
        if self.subgrids.last().is_some_and(|sub| !sub.is_empty()) {
            self.subgrids.push(Vec::new());
        }
        self
    }

    /// Sub-grids that contribute candidates. An empty sub-grid only counts
    /// when the whole grid is empty, where it stands for the default
    /// configuration.
    fn active_subgrids(&self) -> impl Iterator<Item = &SubGrid> {
        let any_filled = self.subgrids.iter().any(|sub| !sub.is_empty());
        self.subgrids
            .iter()
            .filter(move |sub| !any_filled || !sub.is_empty())
            .take(if any_filled { usize::MAX } else { 1 })
    }

    pub fn n_subgrids(&self) -> usize {
        self.active_subgrids().count()
    }

    /// Number of candidates: the sum over sub-grids of the product of list lengths.
    pub fn len(&self) -> usize {
        self.active_subgrids()
            .map(|sub| sub.iter().map(|(_, values)| values.len()).product::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every list is non-empty and no name repeats within a sub-grid.
    pub fn validate(&self) -> Result<()> {
        for sub in &self.subgrids {
            let mut seen = HashSet::new();
            for (name, values) in sub {
                if values.is_empty() {
                    return Err(LearningError::invalid_parameter(
                        name,
                        "grid value list is empty",
                    ));
                }
                if !seen.insert(name.as_str()) {
                    return Err(LearningError::invalid_parameter(
                        name,
                        "listed twice in the same sub-grid",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Expand the grid into its candidates, in enumeration order.
    pub fn candidates(&self) -> Result<Vec<ParamSet>> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.len());
        for sub in self.active_subgrids() {
            let mut counters = vec![0usize; sub.len()];
            'odometer: loop {
                out.push(
                    sub.iter()
                        .zip(&counters)
                        .map(|((name, values), &i)| (name.clone(), values[i].clone()))
                        .collect(),
                );
                // Last position turns fastest
                let mut pos = sub.len();
                loop {
                    if pos == 0 {
                        break 'odometer;
                    }
                    pos -= 1;
                    counters[pos] += 1;
                    if counters[pos] < sub[pos].1.len() {
                        continue 'odometer;
                    }
                    counters[pos] = 0;
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Distributions
// =============================================================================

/// A distribution a randomized search samples one parameter from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum Distribution {
    /// Uniform over a finite list.
    Choice(Vec<ParamValue>),
    /// Continuous uniform on `[low, high)`.
    Uniform { low: f64, high: f64 },
    /// Log-uniform on `[low, high)`, `low > 0`.
    LogUniform { low: f64, high: f64 },
    /// Integer uniform on `[low, high]` (inclusive).
    IntUniform { low: i64, high: i64 },
}

impl Distribution {
    pub fn validate(&self, name: &str) -> Result<()> {
        let bad = |reason: String| -> Result<()> {
            Err(LearningError::invalid_parameter(name, reason))
        };
        match self {
            Distribution::Choice(values) if values.is_empty() => {
                bad("choice list is empty".to_string())
            }
            Distribution::Uniform { low, high }
                if !(low.is_finite() && high.is_finite() && low < high) =>
            {
                bad(format!("uniform needs finite low < high, got {}..{}", low, high))
            }
            Distribution::LogUniform { low, high }
                if !(*low > 0.0 && high.is_finite() && low < high) =>
            {
                bad(format!(
                    "loguniform needs finite 0 < low < high, got {}..{}",
                    low, high
                ))
            }
            Distribution::IntUniform { low, high } if low > high => {
                bad(format!("randint needs low <= high, got {}..{}", low, high))
            }
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Distribution::Choice(values) => values[rng.gen_range(0..values.len())].clone(),
            Distribution::Uniform { low, high } => ParamValue::Float(rng.gen_range(*low..*high)),
            Distribution::LogUniform { low, high } => {
                ParamValue::Float(rng.gen_range(low.ln()..high.ln()).exp())
            }
            Distribution::IntUniform { low, high } => ParamValue::Int(rng.gen_range(*low..=*high)),
        }
    }
}

impl FromStr for Distribution {
    type Err = LearningError;

    /// Parse `choice:a,b,c`, `uniform:low:high`, `loguniform:low:high`
    /// or `randint:low:high`.
    fn from_str(s: &str) -> Result<Self> {
        let caps = DISTRIBUTION_RE.captures(s).ok_or_else(|| {
            LearningError::InvalidConfig(format!(
                "cannot parse distribution '{}' (expected choice:a,b | uniform:lo:hi | loguniform:lo:hi | randint:lo:hi)",
                s
            ))
        })?;
        let kind = &caps[1];
        let args = &caps[2];

        if kind == "choice" {
            return Ok(Distribution::Choice(
                args.split(',').map(ParamValue::parse_literal).collect(),
            ));
        }

        let bounds: Vec<&str> = args.split(':').map(str::trim).collect();
        let &[low, high] = bounds.as_slice() else {
            return Err(LearningError::InvalidConfig(format!(
                "{} needs exactly two bounds, got '{}'",
                kind, args
            )));
        };
        let float = |v: &str| {
            v.parse::<f64>()
                .map_err(|_| LearningError::InvalidConfig(format!("'{}' is not a number", v)))
        };
        let int = |v: &str| {
            v.parse::<i64>()
                .map_err(|_| LearningError::InvalidConfig(format!("'{}' is not an integer", v)))
        };
        Ok(match kind {
            "uniform" => Distribution::Uniform {
                low: float(low)?,
                high: float(high)?,
            },
            "loguniform" => Distribution::LogUniform {
                low: float(low)?,
                high: float(high)?,
            },
            _ => Distribution::IntUniform {
                low: int(low)?,
                high: int(high)?,
            },
        })
    }
}

/// Named distributions for a randomized search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamDistributions(Vec<(String, Distribution)>);

impl ParamDistributions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the distribution for `name`.
    pub fn add(mut self, name: impl Into<String>, distribution: Distribution) -> Self {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = distribution,
            None => self.0.push((name, distribution)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, dist) in &self.0 {
            dist.validate(name)?;
        }
        Ok(())
    }

    /// Draw `n` configurations, each parameter independently and with
    /// replacement. The same seed always yields the same configurations.
    pub fn sample(&self, n: usize, seed: u64) -> Result<Vec<ParamSet>> {
        if n == 0 {
            return Err(LearningError::InvalidConfig(
                "n_iter must be at least 1".to_string(),
            ));
        }
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Ok((0..n)
            .map(|_| {
                self.0
                    .iter()
                    .map(|(name, dist)| (name.clone(), dist.sample(&mut rng)))
                    .collect()
            })
            .collect())
    }
}

/// Split `name=value` into its parts.
pub fn parse_assignment(text: &str) -> Result<(String, String)> {
    let caps = ASSIGNMENT_RE.captures(text).ok_or_else(|| {
        LearningError::InvalidConfig(format!("expected name=value, got '{}'", text))
    })?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_grid_len_is_product() {
        let grid = ParamGrid::new()
            .add("classifier__learning_rate", [0.01, 0.1, 1.0, 10.0])
            .add("classifier__max_leaf_nodes", [3i64, 10, 30]);
        assert_eq!(grid.len(), 12);
        assert_eq!(grid.candidates().unwrap().len(), 12);
    }

    #[test]
    fn test_grid_order_last_param_fastest() {
        let grid = ParamGrid::new().add("a", [1i64, 2]).add("b", ["x", "y", "z"]);
        let rendered: Vec<String> = grid
            .candidates()
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "a=1, b=x", "a=1, b=y", "a=1, b=z", "a=2, b=x", "a=2, b=y", "a=2, b=z"
            ]
        );
    }

    #[test]
    fn test_multiple_subgrids() {
        let grid = ParamGrid::new()
            .add("classifier__penalty", ["l1", "elasticnet"])
            .add("classifier__solver", ["proximal"])
            .or()
            .add("classifier__penalty", ["l2"])
            .add("classifier__C", [0.1, 1.0, 10.0]);
        assert_eq!(grid.n_subgrids(), 2);
        assert_eq!(grid.len(), 5);
        let candidates = grid.candidates().unwrap();
        assert_eq!(candidates.len(), 5);
        assert_eq!(
            candidates[2].get("classifier__penalty"),
            Some(&ParamValue::Str("l2".into()))
        );
        assert!(candidates[2].get("classifier__solver").is_none());
    }

    #[test]
    fn test_empty_grid_yields_one_default_candidate() {
        let candidates = ParamGrid::new().candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_empty());
    }

    #[test]
    fn test_empty_subgrids_add_no_candidates() {
        let leading = ParamGrid::new().or().add("classifier__C", [1.0, 2.0]);
        assert_eq!(leading.len(), 2);
        assert_eq!(leading.n_subgrids(), 1);

        let trailing = ParamGrid::new().add("classifier__C", [1.0, 2.0]).or();
        assert_eq!(trailing.candidates().unwrap().len(), 2);
        assert_eq!(ParamGrid::new().or().len(), 1);
    }

    #[test]
    fn test_infinite_bounds_rejected_when_parsed() {
        for text in ["uniform:-inf:1", "loguniform:1:inf"] {
            let parsed: Result<Distribution> = text.parse();
            let rejected = parsed.and_then(|d| d.validate("classifier__C"));
            assert!(rejected.is_err(), "{} should be rejected", text);
        }
    }

    #[test]
    fn test_empty_value_list_rejected() {
        let grid = ParamGrid::new().add("a", Vec::<i64>::new());
        assert_eq!(grid.len(), 0);
        let err = grid.candidates().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_sample_exact_count_and_reproducible() {
        let dists = ParamDistributions::new()
            .add(
                "classifier__learning_rate",
                Distribution::LogUniform {
                    low: 1e-3,
                    high: 10.0,
                },
            )
            .add(
                "classifier__max_leaf_nodes",
                Distribution::IntUniform { low: 2, high: 256 },
            )
            .add(
                "classifier__penalty",
                Distribution::Choice(vec!["l1".into(), "l2".into()]),
            );
        let a = dists.sample(17, 3).unwrap();
        let b = dists.sample(17, 3).unwrap();
        assert_eq!(a.len(), 17);
        assert_eq!(a, b);

        for candidate in &a {
            let lr = candidate.get("classifier__learning_rate").unwrap().as_f64().unwrap();
            assert!((1e-3..10.0).contains(&lr));
            let leaves = candidate.get("classifier__max_leaf_nodes").unwrap().as_i64().unwrap();
            assert!((2..=256).contains(&leaves));
        }
    }

    #[test]
    fn test_sample_zero_rejected() {
        assert!(ParamDistributions::new().sample(0, 1).is_err());
    }

    #[test]
    fn test_invalid_distributions() {
        let bad = [
            Distribution::Choice(vec![]),
            Distribution::Uniform { low: 1.0, high: 1.0 },
            Distribution::LogUniform { low: 0.0, high: 1.0 },
            Distribution::IntUniform { low: 5, high: 1 },
            Distribution::Uniform {
                low: f64::NEG_INFINITY,
                high: 1.0,
            },
            Distribution::LogUniform {
                low: 1.0,
                high: f64::INFINITY,
            },
        ];
        for dist in bad {
            assert!(dist.validate("x").is_err(), "{:?} should be rejected", dist);
        }
    }

    #[test]
    fn test_parse_distribution() {
        assert_eq!(
            "loguniform:0.001:10".parse::<Distribution>().unwrap(),
            Distribution::LogUniform {
                low: 0.001,
                high: 10.0
            }
        );
        assert_eq!(
            "randint:2:64".parse::<Distribution>().unwrap(),
            Distribution::IntUniform { low: 2, high: 64 }
        );
        assert_eq!(
            "choice:l1,l2,none".parse::<Distribution>().unwrap(),
            Distribution::Choice(vec!["l1".into(), "l2".into(), ParamValue::None])
        );
        assert!("normal:0:1".parse::<Distribution>().is_err());
        assert!("uniform:0".parse::<Distribution>().is_err());
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(ParamValue::parse_literal("3"), ParamValue::Int(3));
        assert_eq!(ParamValue::parse_literal("0.5"), ParamValue::Float(0.5));
        assert_eq!(ParamValue::parse_literal("True"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse_literal("None"), ParamValue::None);
        assert_eq!(ParamValue::parse_literal("onehot"), ParamValue::Str("onehot".into()));
    }

    #[test]
    fn test_parse_assignment() {
        let (name, value) = parse_assignment(" classifier__C = 0.1,1,10 ").unwrap();
        assert_eq!(name, "classifier__C");
        assert_eq!(value, "0.1,1,10");
        assert!(parse_assignment("=3").is_err());
    }

    #[test]
    fn test_param_set_serializes_in_order() {
        let set = ParamSet::new()
            .with("classifier__max_depth", ParamValue::None)
            .with("classifier__learning_rate", 0.1)
            .with("preprocessor__scale_numeric", true);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(
            json,
            r#"{"classifier__max_depth":null,"classifier__learning_rate":0.1,"preprocessor__scale_numeric":true}"#
        );
    }
}
