//! Binary classification metrics.
//!
//! Every [`Scoring`] is oriented so that greater is better; log-loss is
//! reported negated.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{LearningError, Result};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs.
const LOG_LOSS_EPS: f64 = 1e-15;

/// Metric used to score a fitted pipeline on held-out rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// Fraction of correct predictions.
    #[default]
    Accuracy,
    /// Mean of the per-class recalls.
    BalancedAccuracy,
    /// Area under the ROC curve, computed from probabilities.
    RocAuc,
    /// F1 score of the positive class.
    F1,
    /// Negative mean log-loss, computed from probabilities.
    NegLogLoss,
}

impl Scoring {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::Accuracy => "accuracy",
            Scoring::BalancedAccuracy => "balanced_accuracy",
            Scoring::RocAuc => "roc_auc",
            Scoring::F1 => "f1",
            Scoring::NegLogLoss => "neg_log_loss",
        }
    }

    /// Whether the metric is computed from probabilities rather than labels.
    #[must_use]
    pub fn needs_proba(&self) -> bool {
        matches!(self, Scoring::RocAuc | Scoring::NegLogLoss)
    }

    /// Score predictions against `y_true`.
    ///
    /// `proba` holds positive-class probabilities; labels are obtained by
    /// thresholding at 0.5.
    pub fn score(&self, y_true: ArrayView1<f64>, proba: ArrayView1<f64>) -> Result<f64> {
        if y_true.len() != proba.len() {
            return Err(LearningError::InvalidData(format!(
                "y_true has {} rows but predictions have {}",
                y_true.len(),
                proba.len()
            )));
        }
        if y_true.is_empty() {
            return Err(LearningError::InvalidData(
                "cannot score zero rows".to_string(),
            ));
        }
        let y_pred: Vec<f64> = proba
            .iter()
            .map(|&p| if p >= 0.5 { 1.0 } else { 0.0 })
            .collect();
        let y_pred = ArrayView1::from(&y_pred);
        Ok(match self {
            Scoring::Accuracy => accuracy(y_true, y_pred),
            Scoring::BalancedAccuracy => balanced_accuracy(y_true, y_pred),
            Scoring::RocAuc => roc_auc(y_true, proba),
            Scoring::F1 => f1(y_true, y_pred),
            Scoring::NegLogLoss => -log_loss(y_true, proba),
        })
    }
}

impl FromStr for Scoring {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Scoring::Accuracy),
            "balanced_accuracy" => Ok(Scoring::BalancedAccuracy),
            "roc_auc" => Ok(Scoring::RocAuc),
            "f1" => Ok(Scoring::F1),
            "neg_log_loss" => Ok(Scoring::NegLogLoss),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown scoring '{}'. Valid values are: accuracy, balanced_accuracy, roc_auc, f1, neg_log_loss",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Scoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Confusion {
    tp: f64,
    tn: f64,
    fp: f64,
    fn_: f64,
}

fn confusion(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Confusion {
    let mut c = Confusion {
        tp: 0.0,
        tn: 0.0,
        fp: 0.0,
        fn_: 0.0,
    };
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (t >= 0.5, p >= 0.5) {
            (true, true) => c.tp += 1.0,
            (false, false) => c.tn += 1.0,
            (false, true) => c.fp += 1.0,
            (true, false) => c.fn_ += 1.0,
        }
    }
    c
}

pub fn accuracy(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let c = confusion(y_true, y_pred);
    (c.tp + c.tn) / y_true.len() as f64
}

/// Mean recall over the classes present in `y_true`.
pub fn balanced_accuracy(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let c = confusion(y_true, y_pred);
    let mut recalls = Vec::with_capacity(2);
    if c.tp + c.fn_ > 0.0 {
        recalls.push(c.tp / (c.tp + c.fn_));
    }
    if c.tn + c.fp > 0.0 {
        recalls.push(c.tn / (c.tn + c.fp));
    }
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

/// F1 of the positive class; 0.0 when there are no true or predicted positives.
pub fn f1(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let c = confusion(y_true, y_pred);
    let denom = 2.0 * c.tp + c.fp + c.fn_;
    if denom == 0.0 { 0.0 } else { 2.0 * c.tp / denom }
}

/// ROC AUC via the rank-sum statistic with average ranks for ties.
///
/// Returns NaN when `y_true` holds a single class.
pub fn roc_auc(y_true: ArrayView1<f64>, scores: ArrayView1<f64>) -> f64 {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie block i..=j
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] >= 0.5 {
                pos_rank_sum += rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

pub fn log_loss(y_true: ArrayView1<f64>, proba: ArrayView1<f64>) -> f64 {
    let total: f64 = y_true
        .iter()
        .zip(proba.iter())
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y >= 0.5 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_and_f1() {
        let y = array![1.0, 0.0, 1.0, 1.0];
        let p = array![0.9, 0.6, 0.4, 0.8];
        assert_eq!(Scoring::Accuracy.score(y.view(), p.view()).unwrap(), 0.5);
        // tp=2 fp=1 fn=1
        assert!((Scoring::F1.score(y.view(), p.view()).unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_accuracy() {
        let y = array![1.0, 1.0, 1.0, 0.0];
        let pred = array![1.0, 1.0, 1.0, 1.0];
        assert_eq!(balanced_accuracy(y.view(), pred.view()), 0.5);
    }

    #[test]
    fn test_roc_auc_with_ties() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc(y.view(), s.view()) - 0.75).abs() < 1e-12);

        let tied = array![0.5, 0.5, 0.5, 0.5];
        assert_eq!(roc_auc(y.view(), tied.view()), 0.5);
        assert!(roc_auc(array![1.0, 1.0].view(), array![0.2, 0.3].view()).is_nan());
    }

    #[test]
    fn test_neg_log_loss_is_greater_is_better() {
        let y = array![1.0, 0.0];
        let good = Scoring::NegLogLoss
            .score(y.view(), array![0.9, 0.1].view())
            .unwrap();
        let bad = Scoring::NegLogLoss
            .score(y.view(), array![0.6, 0.4].view())
            .unwrap();
        assert!(good > bad);
        assert!(good < 0.0);
        // Clipping keeps certainty finite
        let certain = Scoring::NegLogLoss
            .score(y.view(), array![0.0, 1.0].view())
            .unwrap();
        assert!(certain.is_finite());
    }

    #[test]
    fn test_length_mismatch() {
        let err = Scoring::Accuracy
            .score(array![1.0].view(), array![0.5, 0.5].view())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_scoring_parse_roundtrip() {
        for s in [
            Scoring::Accuracy,
            Scoring::BalancedAccuracy,
            Scoring::RocAuc,
            Scoring::F1,
            Scoring::NegLogLoss,
        ] {
            assert_eq!(s.as_str().parse::<Scoring>().unwrap(), s);
        }
        assert!("precision".parse::<Scoring>().is_err());
    }
}
