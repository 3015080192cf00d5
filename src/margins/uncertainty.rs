//! margins::uncertainty — delta-method standard errors and intervals.
//!
//! Purpose
//! -------
//! Attach a standard error, test statistic, p-value and confidence interval
//! to every scalar function of the model parameters the core reports
//! (predictions, slopes, comparisons, contrasts), by linearizing through
//! its parameter gradient: `Var ≈ gᵀ Σ g`.
//!
//! Key behaviors
//! -------------
//! - [`check_covariance`] screens `Σ` once per request: non-finite entries,
//!   asymmetry, singularity and indefiniteness are reported as
//!   `IllConditionedCovariance`, using a symmetric eigendecomposition from
//!   `nalgebra` of the correlation-scaled `Σ`, with eigenvalues at or
//!   below `EIGEN_EPS · max|λ|` treated as zero.
//! - [`DeltaMethod`] caches that verdict and turns `(value, gradient)`
//!   pairs into [`Estimate`]s. When `Σ` is ill-conditioned the point value
//!   is kept and every inference field is `None`, with the error recorded
//!   in `Estimate::issue`.
//! - [`parameter_gradient`] differentiates any fallible scalar function of
//!   `θ` with `finitediff` central differences, capturing the first error
//!   raised inside the closure.
//! - [`Reference`] evaluates normal or Student-t critical values and
//!   two-sided p-values via `statrs`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Gradients have the same length as `θ` and as each side of `Σ`.
//! - Negative variances from rounding (`gᵀΣg` slightly below zero for a
//!   PSD `Σ`) are clamped to zero.
//!
//! Downstream usage
//! ----------------
//! - The effect engine averages per-row gradients (the mean is linear, so
//!   the mean of gradients is the gradient of the mean) and hands the
//!   result to [`DeltaMethod::estimate`].
//! - The contrast engine combines stored gradients linearly, or by the
//!   quotient rule for ratios, and calls back into [`DeltaMethod`].
use crate::margins::{
    errors::{MarginsError, MarginsResult},
    estimate::Estimate,
};
use crate::numerical_stability::transformations::{
    EIGEN_EPS, GENERAL_TOL, SYMMETRY_TOL, normal_cdf, normal_quantile, unit_diagonal_scaling,
};
use finitediff::FiniteDiff;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cell::RefCell;

/// Reference distribution for intervals and p-values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    Normal,
    StudentT(f64),
}

impl Reference {
    /// Two-sided critical value for `confidence`.
    pub fn critical_value(&self, confidence: f64) -> f64 {
        let upper = 0.5 * (1.0 + confidence);
        match self.students_t() {
            Some(t) => t.inverse_cdf(upper),
            None => normal_quantile(upper),
        }
    }

    /// Two-sided p-value of `statistic`.
    pub fn p_value(&self, statistic: f64) -> f64 {
        let z = statistic.abs();
        let upper_tail = match self.students_t() {
            Some(t) => 1.0 - t.cdf(z),
            None => 1.0 - normal_cdf(z),
        };
        (2.0 * upper_tail).clamp(0.0, 1.0)
    }

    // Falls back to the normal reference if statrs rejects the df.
    fn students_t(&self) -> Option<StudentsT> {
        match self {
            Reference::Normal => None,
            Reference::StudentT(df) => StudentsT::new(0.0, 1.0, *df).ok(),
        }
    }
}

/// Resolved inference settings for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub confidence: f64,
    pub reference: Reference,
    pub null_value: f64,
}

impl Default for Inference {
    fn default() -> Self {
        Self { confidence: 0.95, reference: Reference::Normal, null_value: 0.0 }
    }
}

/// Point value, standard error and interval of one delta-method summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub conf_low: Option<f64>,
    pub conf_high: Option<f64>,
    pub issue: Option<MarginsError>,
}

/// check_covariance — screen a parameter covariance matrix.
///
/// Parameters
/// ----------
/// - `cov`: `&Array2<f64>`
///   Candidate `Var(θ̂)`, expected square, symmetric and positive definite.
///
/// Returns
/// -------
/// `Ok(())` when `Σ` is usable for delta-method standard errors.
///
/// The symmetry and eigenvalue screens run on the correlation-scaled
/// matrix `D^{-1/2} Σ D^{-1/2}`, so parameters measured in very different
/// units are not mistaken for a singular `Σ`. The reported
/// `min_eigenvalue` is that of the scaled matrix.
///
/// Errors
/// ------
/// - `IllConditionedCovariance` with reason "non-finite entries",
///   "asymmetric", "not positive semidefinite" or "singular".
/// - `DimensionMismatch` if `cov` is not square.
pub fn check_covariance(cov: &Array2<f64>) -> MarginsResult<()> {
    let p = cov.nrows();
    if cov.ncols() != p {
        return Err(MarginsError::DimensionMismatch {
            what: "covariance columns",
            expected: p,
            found: cov.ncols(),
        });
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(MarginsError::IllConditionedCovariance {
            min_eigenvalue: f64::NAN,
            reason: "non-finite entries",
        });
    }
    let (scaled, _) = unit_diagonal_scaling(cov);
    let scale = scaled.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    for i in 0..p {
        for j in (i + 1)..p {
            if (scaled[[i, j]] - scaled[[j, i]]).abs() > SYMMETRY_TOL * scale.max(GENERAL_TOL) {
                return Err(MarginsError::IllConditionedCovariance {
                    min_eigenvalue: f64::NAN,
                    reason: "asymmetric",
                });
            }
        }
    }

    let mut sigma = DMatrix::<f64>::zeros(p, p);
    fill_dmatrix(&scaled, &mut sigma);
    let eigenvalues = sigma.symmetric_eigen().eigenvalues;
    let max_abs = eigenvalues.iter().fold(0.0_f64, |m, l| m.max(l.abs()));
    let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    let floor = EIGEN_EPS * max_abs;
    if min < -floor {
        return Err(MarginsError::IllConditionedCovariance {
            min_eigenvalue: min,
            reason: "not positive semidefinite",
        });
    }
    if max_abs == 0.0 || min <= floor {
        return Err(MarginsError::IllConditionedCovariance { min_eigenvalue: min, reason: "singular" });
    }
    Ok(())
}

/// `gᵀ Σ g`.
pub fn delta_variance(gradient: &Array1<f64>, cov: &Array2<f64>) -> f64 {
    gradient.dot(&cov.dot(gradient))
}

/// parameter_gradient — central-difference gradient of a fallible scalar map.
///
/// The `finitediff` closure must return `f64`, so the first error raised by
/// `f` is stored and the closure returns `NaN`; the stored error is returned
/// after differencing.
///
/// Errors
/// ------
/// - Any error raised by `f`.
/// - `InvalidGradient` if an entry is not finite.
pub fn parameter_gradient<F>(f: &F, params: &Array1<f64>) -> MarginsResult<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> MarginsResult<f64>,
{
    let closure_err: RefCell<Option<MarginsError>> = RefCell::new(None);
    let scalar = |theta: &Array1<f64>| -> f64 {
        match f(theta) {
            Ok(value) => value,
            Err(e) => {
                let mut slot = closure_err.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                f64::NAN
            }
        }
    };
    let grad = params.central_diff(&scalar);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_gradient(&grad, params.len())?;
    Ok(grad)
}

pub(crate) fn validate_gradient(grad: &Array1<f64>, dim: usize) -> MarginsResult<()> {
    if grad.len() != dim {
        return Err(MarginsError::DimensionMismatch {
            what: "parameter gradient",
            expected: dim,
            found: grad.len(),
        });
    }
    for (index, &value) in grad.iter().enumerate() {
        if !value.is_finite() {
            return Err(MarginsError::InvalidGradient { index, value });
        }
    }
    Ok(())
}

/// `DeltaMethod` — covariance plus resolved inference settings.
///
/// Built once per request; the covariance check runs at construction.
#[derive(Debug, Clone)]
pub struct DeltaMethod<'a> {
    cov: &'a Array2<f64>,
    inference: Inference,
    issue: Option<MarginsError>,
}

impl<'a> DeltaMethod<'a> {
    pub fn new(cov: &'a Array2<f64>, inference: Inference) -> Self {
        let issue = check_covariance(cov).err();
        if let Some(err) = &issue {
            log::warn!("standard errors unavailable: {err}");
        }
        Self { cov, inference, issue }
    }

    pub fn inference(&self) -> &Inference {
        &self.inference
    }

    pub fn issue(&self) -> Option<&MarginsError> {
        self.issue.as_ref()
    }

    pub fn n_params(&self) -> usize {
        self.cov.nrows()
    }

    /// Summarize a value with its parameter gradient.
    pub fn interval(&self, estimate: f64, gradient: &Array1<f64>) -> MarginsResult<Interval> {
        if gradient.len() != self.cov.nrows() {
            return Err(MarginsError::DimensionMismatch {
                what: "parameter gradient",
                expected: self.cov.nrows(),
                found: gradient.len(),
            });
        }
        if let Some(issue) = &self.issue {
            return Ok(Interval {
                estimate,
                std_error: None,
                statistic: None,
                p_value: None,
                conf_low: None,
                conf_high: None,
                issue: Some(issue.clone()),
            });
        }
        let se = delta_variance(gradient, self.cov).max(0.0).sqrt();
        let crit = self.inference.reference.critical_value(self.inference.confidence);
        let (statistic, p_value) = if se > GENERAL_TOL {
            let stat = (estimate - self.inference.null_value) / se;
            (Some(stat), Some(self.inference.reference.p_value(stat)))
        } else {
            (None, None)
        };
        Ok(Interval {
            estimate,
            std_error: Some(se),
            statistic,
            p_value,
            conf_low: Some(estimate - crit * se),
            conf_high: Some(estimate + crit * se),
            issue: None,
        })
    }

    /// Build an unlabeled [`Estimate`] from a value and its gradient.
    pub fn estimate(&self, estimate: f64, gradient: Array1<f64>) -> MarginsResult<Estimate> {
        let interval = self.interval(estimate, &gradient)?;
        Ok(Estimate {
            label: String::new(),
            term: String::new(),
            contrast: String::new(),
            group: Vec::new(),
            rows: Vec::new(),
            estimate: interval.estimate,
            std_error: interval.std_error,
            statistic: interval.statistic,
            p_value: interval.p_value,
            conf_low: interval.conf_low,
            conf_high: interval.conf_high,
            gradient,
            issue: interval.issue,
        })
    }
}

/// delta_se — point value, standard error and interval of `f(θ̂)`.
///
/// The gradient is taken by central differences on the parameters.
///
/// Errors
/// ------
/// - Any error raised by `f`.
/// - `DimensionMismatch` if `params` and `cov` disagree.
///
/// An ill-conditioned `cov` is not an error: the returned interval carries
/// the point value, `None` inference fields and the recorded issue.
pub fn delta_se<F>(
    f: &F, params: &Array1<f64>, cov: &Array2<f64>, inference: Inference,
) -> MarginsResult<Interval>
where
    F: Fn(&Array1<f64>) -> MarginsResult<f64>,
{
    let point = f(params)?;
    let gradient = parameter_gradient(f, params)?;
    DeltaMethod::new(cov, inference).interval(point, &gradient)
}

pub(crate) fn fill_dmatrix(src: &Array2<f64>, dst: &mut DMatrix<f64>) {
    for ((i, j), &v) in src.indexed_iter() {
        dst[(i, j)] = v;
    }
}
