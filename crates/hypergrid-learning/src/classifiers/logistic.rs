//! Regularized logistic regression.
//!
//! Minimizes `C * sum(log_loss) + penalty(w)` (the intercept is never
//! penalized), rescaled internally to a mean loss. Two solvers:
//!
//! - `newton`: damped Newton steps with a backtracking line search;
//!   supports the `l2` and `none` penalties.
//! - `proximal`: accelerated proximal gradient (FISTA) with
//!   soft-thresholding; supports `l1`, `l2`, `elasticnet` and `none`.
//!
//! An unsupported solver/penalty pairing is only detected at fit time so a
//! search can record the candidate as failed and move on.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{LearningError, Result};
use crate::estimator::{
    Classifier, check_n_features, check_training_data, param_bool, param_f64,
    param_positive_f64, param_str, param_usize, unknown_param,
};
use crate::params::{ParamSet, ParamValue};

const PARAM_NAMES: [&str; 7] = [
    "C",
    "penalty",
    "solver",
    "l1_ratio",
    "max_iter",
    "tol",
    "fit_intercept",
];

/// Ridge added to the Newton system for numerical stability.
const NEWTON_JITTER: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    L1,
    L2,
    ElasticNet,
    None,
}

impl Penalty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Penalty::L1 => "l1",
            Penalty::L2 => "l2",
            Penalty::ElasticNet => "elasticnet",
            Penalty::None => "none",
        }
    }
}

impl FromStr for Penalty {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l1" => Ok(Penalty::L1),
            "l2" => Ok(Penalty::L2),
            "elasticnet" => Ok(Penalty::ElasticNet),
            "none" => Ok(Penalty::None),
            other => Err(LearningError::invalid_parameter(
                "penalty",
                format!("unknown penalty '{}' (valid: l1, l2, elasticnet, none)", other),
            )),
        }
    }
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    Newton,
    Proximal,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Newton => "newton",
            Solver::Proximal => "proximal",
        }
    }

    pub fn supports(&self, penalty: Penalty) -> bool {
        match self {
            Solver::Newton => matches!(penalty, Penalty::L2 | Penalty::None),
            Solver::Proximal => true,
        }
    }
}

impl FromStr for Solver {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newton" => Ok(Solver::Newton),
            "proximal" => Ok(Solver::Proximal),
            other => Err(LearningError::invalid_parameter(
                "solver",
                format!("unknown solver '{}' (valid: newton, proximal)", other),
            )),
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyper-parameters of [`LogisticRegression`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticParams {
    /// Inverse regularization strength (default: 1.0).
    pub c: f64,
    /// Default: l2
    pub penalty: Penalty,
    /// Default: newton
    pub solver: Solver,
    /// Share of L1 in the elastic-net penalty; required for `elasticnet`.
    pub l1_ratio: Option<f64>,
    /// Default: 100
    pub max_iter: usize,
    /// Stop once no coefficient moves more than this (default: 1e-4).
    pub tol: f64,
    /// Default: true
    pub fit_intercept: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            penalty: Penalty::L2,
            solver: Solver::Newton,
            l1_ratio: None,
            max_iter: 100,
            tol: 1e-4,
            fit_intercept: true,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedLogistic {
    coef: Array1<f64>,
    intercept: f64,
    n_iter: usize,
}

/// Binary logistic regression.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    params: LogisticParams,
    fitted: Option<FittedLogistic>,
}

static_assertions::assert_impl_all!(LogisticRegression: Send, Sync);

/// Penalty strengths on the mean-loss scale.
#[derive(Debug, Clone, Copy)]
struct Strengths {
    l1: f64,
    l2: f64,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn hyper_params(&self) -> &LogisticParams {
        &self.params
    }

    pub fn coef(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coef)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }

    /// Iterations used by the last fit.
    pub fn n_iter(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.n_iter)
    }

    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(LearningError::NotFitted("LogisticRegression"))?;
        check_n_features(x, fitted.coef.len())?;
        Ok(x.dot(&fitted.coef) + fitted.intercept)
    }

    fn strengths(&self, n_rows: usize) -> Result<Strengths> {
        let p = &self.params;
        let alpha = 1.0 / (p.c * n_rows as f64);
        Ok(match p.penalty {
            Penalty::None => Strengths { l1: 0.0, l2: 0.0 },
            Penalty::L2 => Strengths { l1: 0.0, l2: alpha },
            Penalty::L1 => Strengths { l1: alpha, l2: 0.0 },
            Penalty::ElasticNet => {
                let ratio = p.l1_ratio.ok_or_else(|| {
                    LearningError::IncompatibleParameters(
                        "penalty 'elasticnet' requires l1_ratio".to_string(),
                    )
                })?;
                Strengths {
                    l1: alpha * ratio,
                    l2: alpha * (1.0 - ratio),
                }
            }
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Design matrix with an optional trailing column of ones.
fn design(x: ArrayView2<f64>, fit_intercept: bool) -> Array2<f64> {
    if fit_intercept {
        let ones = Array2::ones((x.nrows(), 1));
        concatenate(Axis(1), &[x.view(), ones.view()]).unwrap_or_else(|_| x.to_owned())
    } else {
        x.to_owned()
    }
}

/// Mean log-loss plus penalties; the last entry is unpenalized when `n_penalized < len`.
fn objective(
    xa: &Array2<f64>,
    y: ArrayView1<f64>,
    theta: &Array1<f64>,
    n_penalized: usize,
    strengths: Strengths,
) -> f64 {
    let z = xa.dot(theta);
    let loss = z
        .iter()
        .zip(y.iter())
        .map(|(&z, &y)| softplus(z) - y * z)
        .sum::<f64>()
        / y.len() as f64;
    let w = theta.slice(s![..n_penalized]);
    loss + 0.5 * strengths.l2 * w.dot(&w) + strengths.l1 * w.iter().map(|v| v.abs()).sum::<f64>()
}

/// Gradient of the smooth part (mean loss + L2).
fn smooth_gradient(
    xa: &Array2<f64>,
    y: ArrayView1<f64>,
    theta: &Array1<f64>,
    n_penalized: usize,
    l2: f64,
) -> (Array1<f64>, Array1<f64>) {
    let p = xa.dot(theta).mapv(sigmoid);
    let residual = &p - &y;
    let mut grad = xa.t().dot(&residual) / y.len() as f64;
    for j in 0..n_penalized {
        grad[j] += l2 * theta[j];
    }
    (grad, p)
}

/// Solve `a x = b` for symmetric positive-definite `a` via Cholesky.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    Some(x)
}

fn fit_newton(
    xa: &Array2<f64>,
    y: ArrayView1<f64>,
    n_penalized: usize,
    strengths: Strengths,
    max_iter: usize,
    tol: f64,
) -> (Array1<f64>, usize) {
    let n = y.len() as f64;
    let dim = xa.ncols();
    let mut theta = Array1::<f64>::zeros(dim);
    let mut current = objective(xa, y, &theta, n_penalized, strengths);

    for iter in 1..=max_iter {
        let (grad, p) = smooth_gradient(xa, y, &theta, n_penalized, strengths.l2);
        let weights = p.mapv(|v| (v * (1.0 - v)).max(1e-12));
        let weighted = xa * &weights.insert_axis(Axis(1));
        let mut hessian = xa.t().dot(&weighted) / n;
        for j in 0..dim {
            hessian[[j, j]] += NEWTON_JITTER + if j < n_penalized { strengths.l2 } else { 0.0 };
        }
        let direction = cholesky_solve(&hessian, &grad).unwrap_or_else(|| grad.clone());

        // Backtracking (Armijo) line search
        let slope = grad.dot(&direction);
        let mut step = 1.0;
        let mut candidate = &theta - &(&direction * step);
        let mut value = objective(xa, y, &candidate, n_penalized, strengths);
        while value > current - 1e-4 * step * slope && step > 1e-10 {
            step *= 0.5;
            candidate = &theta - &(&direction * step);
            value = objective(xa, y, &candidate, n_penalized, strengths);
        }

        let max_change = (&candidate - &theta)
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        theta = candidate;
        current = value;
        if max_change < tol {
            return (theta, iter);
        }
    }
    debug!("newton solver reached max_iter={} without converging", max_iter);
    (theta, max_iter)
}

/// Largest eigenvalue of `xa^T xa / n` by power iteration.
fn lipschitz_bound(xa: &Array2<f64>) -> f64 {
    let n = xa.nrows() as f64;
    let mut v = Array1::<f64>::ones(xa.ncols());
    let mut eigen = 0.0;
    for _ in 0..50 {
        let w = xa.t().dot(&xa.dot(&v)) / n;
        let norm = w.dot(&w).sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        eigen = norm / v.dot(&v).sqrt();
        v = w / norm;
    }
    eigen
}

fn fit_proximal(
    xa: &Array2<f64>,
    y: ArrayView1<f64>,
    n_penalized: usize,
    strengths: Strengths,
    max_iter: usize,
    tol: f64,
) -> (Array1<f64>, usize) {
    let dim = xa.ncols();
    // Logistic curvature is at most 1/4; 10% headroom on the power estimate
    let lipschitz = 1.1 * (0.25 * lipschitz_bound(xa) + strengths.l2);
    let step = if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 };
    let threshold = step * strengths.l1;

    let mut theta = Array1::<f64>::zeros(dim);
    let mut momentum = theta.clone();
    let mut t = 1.0f64;

    for iter in 1..=max_iter {
        let (grad, _) = smooth_gradient(xa, y, &momentum, n_penalized, strengths.l2);
        let mut next = &momentum - &(&grad * step);
        for j in 0..n_penalized {
            let v = next[j];
            next[j] = v.signum() * (v.abs() - threshold).max(0.0);
        }

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let delta = &next - &theta;
        momentum = &next + &(&delta * ((t - 1.0) / t_next));
        t = t_next;

        let max_change = delta.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        theta = next;
        if max_change < tol {
            return (theta, iter);
        }
    }
    debug!("proximal solver reached max_iter={} without converging", max_iter);
    (theta, max_iter)
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let p = &self.params;
        if !p.solver.supports(p.penalty) {
            return Err(LearningError::IncompatibleParameters(format!(
                "solver '{}' supports only penalties l2 and none, got '{}'",
                p.solver, p.penalty
            )));
        }
        check_training_data(x, y)?;
        let strengths = self.strengths(x.nrows())?;

        let xa = design(x, p.fit_intercept);
        let n_penalized = x.ncols();
        let (theta, n_iter) = match p.solver {
            Solver::Newton => fit_newton(&xa, y, n_penalized, strengths, p.max_iter, p.tol),
            Solver::Proximal => fit_proximal(&xa, y, n_penalized, strengths, p.max_iter, p.tol),
        };
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(LearningError::InvalidData(
                "logistic regression diverged to non-finite coefficients".to_string(),
            ));
        }

        let coef = theta.slice(s![..n_penalized]).to_owned();
        let intercept = if p.fit_intercept { theta[n_penalized] } else { 0.0 };
        debug!(
            "Fitted logistic regression ({} / {}) in {} iterations",
            p.solver, p.penalty, n_iter
        );
        self.fitted = Some(FittedLogistic {
            coef,
            intercept,
            n_iter,
        });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let p = &mut self.params;
        match name {
            "C" => p.c = param_positive_f64(name, value)?,
            "penalty" => {
                p.penalty = if value.is_none() {
                    Penalty::None
                } else {
                    param_str(name, value)?.parse()?
                }
            }
            "solver" => p.solver = param_str(name, value)?.parse()?,
            "l1_ratio" => {
                p.l1_ratio = if value.is_none() {
                    None
                } else {
                    let v = param_f64(name, value)?;
                    if !(0.0..=1.0).contains(&v) {
                        return Err(LearningError::invalid_parameter(name, "must be in [0, 1]"));
                    }
                    Some(v)
                }
            }
            "max_iter" => p.max_iter = param_usize(name, value, 1)?,
            "tol" => p.tol = param_positive_f64(name, value)?,
            "fit_intercept" => p.fit_intercept = param_bool(name, value)?,
            other => return Err(unknown_param("logistic_regression", other, &PARAM_NAMES)),
        }
        self.fitted = None;
        Ok(())
    }

    fn params(&self) -> ParamSet {
        let p = &self.params;
        ParamSet::new()
            .with("C", p.c)
            .with("penalty", p.penalty.as_str())
            .with("solver", p.solver.as_str())
            .with("l1_ratio", p.l1_ratio)
            .with("max_iter", p.max_iter as i64)
            .with("tol", p.tol)
            .with("fit_intercept", p.fit_intercept)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn boxed_clone(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
