//! margins::model — link functions, the model-adapter trait and fitted models.
//!
//! Purpose
//! -------
//! Describe a fitted regression model the way the effect engine consumes
//! it: a named coefficient vector, its covariance matrix, a link function,
//! and an adapter ([`LinearPredictor`]) mapping `(θ, row)` to the linear
//! predictor `η`.
//!
//! Key behaviors
//! -------------
//! - [`Link`] provides `g`, `g⁻¹` and the first two derivatives of `g⁻¹`,
//!   used for response-scale predictions and analytic delta-method
//!   gradients.
//! - [`LinearPredictor`] is the single seam between the core and any
//!   model family. Only `linear_predictor` is required; analytic
//!   parameter gradients and covariate derivatives are optional and
//!   default to `GradientNotImplemented`, in which case callers fall back
//!   to finite differences.
//! - [`FittedModel`] validates dimensions at construction and is
//!   read-only afterwards; every downstream function borrows it.
//!
//! Invariants & assumptions
//! ------------------------
//! - `names.len() == coefficients.len() == adapter.n_params()`.
//! - `covariance` is `p × p`. Its conditioning is checked lazily when
//!   standard errors are requested, not here.
//! - Adapters are `Send + Sync` so rows can be evaluated in parallel.
use crate::margins::{
    data::CovariateRow,
    errors::{MarginsError, MarginsResult},
};
use crate::numerical_stability::transformations::{
    inv_cloglog, normal_cdf, normal_pdf, normal_quantile, safe_logistic, safe_logit, PROB_EPS,
};
use ndarray::{Array1, Array2};
use std::str::FromStr;

/// Link function `g` with `η = g(μ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Logit,
    Probit,
    Log,
    Cloglog,
}

impl Link {
    /// Forward link `g(μ)`.
    pub fn link(&self, mu: f64) -> f64 {
        match self {
            Link::Identity => mu,
            Link::Logit => safe_logit(mu),
            Link::Probit => normal_quantile(mu),
            Link::Log => mu.ln(),
            Link::Cloglog => {
                let mu = mu.clamp(PROB_EPS, 1.0 - PROB_EPS);
                (-(-mu).ln_1p()).ln()
            }
        }
    }

    /// Inverse link `μ = g⁻¹(η)`.
    pub fn inverse(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => eta,
            Link::Logit => safe_logistic(eta),
            Link::Probit => normal_cdf(eta),
            Link::Log => eta.exp(),
            Link::Cloglog => inv_cloglog(eta),
        }
    }

    /// `dμ/dη`.
    pub fn inverse_deriv(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => 1.0,
            Link::Logit => {
                let mu = safe_logistic(eta);
                mu * (1.0 - mu)
            }
            Link::Probit => normal_pdf(eta),
            Link::Log => eta.exp(),
            Link::Cloglog => (eta - eta.exp()).exp(),
        }
    }

    /// `d²μ/dη²`.
    pub fn inverse_deriv2(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => 0.0,
            Link::Logit => {
                let mu = safe_logistic(eta);
                mu * (1.0 - mu) * (1.0 - 2.0 * mu)
            }
            Link::Probit => -eta * normal_pdf(eta),
            Link::Log => eta.exp(),
            Link::Cloglog => (eta - eta.exp()).exp() * (1.0 - eta.exp()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Link::Identity => "identity",
            Link::Logit => "logit",
            Link::Probit => "probit",
            Link::Log => "log",
            Link::Cloglog => "cloglog",
        }
    }
}

impl FromStr for Link {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" | "linear" => Ok(Link::Identity),
            "logit" | "logistic" => Ok(Link::Logit),
            "probit" => Ok(Link::Probit),
            "log" => Ok(Link::Log),
            "cloglog" => Ok(Link::Cloglog),
            _ => Err(MarginsError::InvalidLink { name: s.to_string() }),
        }
    }
}

/// Scale on which predictions are reported.
///
/// `Response` applies `g⁻¹`; `Link` reports `η` directly. For the identity
/// link the two coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionScale {
    #[default]
    Response,
    Link,
}

impl PredictionScale {
    /// Map `η` to the reporting scale.
    pub fn apply(&self, link: Link, eta: f64) -> f64 {
        match self {
            PredictionScale::Response => link.inverse(eta),
            PredictionScale::Link => eta,
        }
    }

    /// Derivative of [`PredictionScale::apply`] with respect to `η`.
    pub fn deriv(&self, link: Link, eta: f64) -> f64 {
        match self {
            PredictionScale::Response => link.inverse_deriv(eta),
            PredictionScale::Link => 1.0,
        }
    }

    /// Second derivative of [`PredictionScale::apply`] with respect to `η`.
    pub fn deriv2(&self, link: Link, eta: f64) -> f64 {
        match self {
            PredictionScale::Response => link.inverse_deriv2(eta),
            PredictionScale::Link => 0.0,
        }
    }
}

/// LinearPredictor — adapter from `(θ, row)` to the linear predictor `η`.
///
/// Purpose
/// -------
/// Keep the core model-agnostic: grids, effects and contrasts only ever
/// call through this trait.
///
/// Required methods
/// ----------------
/// - `predictors`: predictor names every evaluated row must carry.
/// - `n_params`: length of `θ`.
/// - `linear_predictor`: `η(θ, row)`.
///
/// Optional methods
/// ----------------
/// - `eta_gradient`: `∂η/∂θ` at `row`.
/// - `design_derivative`: `∂/∂θ (∂η/∂x)` for a numeric predictor `x`.
///   Only meaningful when `η` is linear in `θ`, where it equals the
///   derivative of the design row with respect to `x` and
///   `∂η/∂x = θ · design_derivative`.
///
/// Both optional methods return `GradientNotImplemented` by default;
/// callers then use finite differences.
pub trait LinearPredictor: Send + Sync {
    fn predictors(&self) -> Vec<String>;

    fn n_params(&self) -> usize;

    fn linear_predictor(&self, theta: &Array1<f64>, row: &CovariateRow) -> MarginsResult<f64>;

    fn eta_gradient(&self, _theta: &Array1<f64>, _row: &CovariateRow) -> MarginsResult<Array1<f64>> {
        Err(MarginsError::GradientNotImplemented)
    }

    fn design_derivative(&self, _row: &CovariateRow, _predictor: &str) -> MarginsResult<Array1<f64>> {
        Err(MarginsError::GradientNotImplemented)
    }
}

/// Adapter wrapping an arbitrary prediction closure.
///
/// Has no analytic derivatives, so every slope and delta-method gradient
/// computed through it uses finite differences.
pub struct PredictionFn<F> {
    predictors: Vec<String>,
    n_params: usize,
    f: F,
}

impl<F> PredictionFn<F>
where
    F: Fn(&Array1<f64>, &CovariateRow) -> MarginsResult<f64> + Send + Sync,
{
    pub fn new<S: Into<String>>(predictors: Vec<S>, n_params: usize, f: F) -> Self {
        Self { predictors: predictors.into_iter().map(Into::into).collect(), n_params, f }
    }
}

impl<F> LinearPredictor for PredictionFn<F>
where
    F: Fn(&Array1<f64>, &CovariateRow) -> MarginsResult<f64> + Send + Sync,
{
    fn predictors(&self) -> Vec<String> {
        self.predictors.clone()
    }

    fn n_params(&self) -> usize {
        self.n_params
    }

    fn linear_predictor(&self, theta: &Array1<f64>, row: &CovariateRow) -> MarginsResult<f64> {
        (self.f)(theta, row)
    }
}

/// `FittedModel` — immutable fitted regression model.
///
/// Fields
/// ------
/// - `names`: coefficient labels, in parameter order.
/// - `coefficients`: point estimates `θ̂`.
/// - `covariance`: `Var(θ̂)`, `p × p`.
/// - `link`: link function of the model family.
/// - `adapter`: the [`LinearPredictor`] computing `η`.
/// - `df_residual`: residual degrees of freedom when known (OLS), used
///   for t-based intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel<P> {
    names: Vec<String>,
    coefficients: Array1<f64>,
    covariance: Array2<f64>,
    link: Link,
    adapter: P,
    df_residual: Option<f64>,
}

impl<P: LinearPredictor> FittedModel<P> {
    /// Validate and assemble a fitted model.
    ///
    /// # Errors
    /// - `DimensionMismatch` if names, coefficients, adapter parameter count
    ///   or covariance shape disagree.
    /// - `InvalidCoefficient` for a non-finite coefficient.
    pub fn new<S: Into<String>>(
        names: Vec<S>, coefficients: Array1<f64>, covariance: Array2<f64>, link: Link, adapter: P,
    ) -> MarginsResult<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let p = coefficients.len();
        if names.len() != p {
            return Err(MarginsError::DimensionMismatch {
                what: "coefficient names",
                expected: p,
                found: names.len(),
            });
        }
        if adapter.n_params() != p {
            return Err(MarginsError::DimensionMismatch {
                what: "adapter parameters",
                expected: p,
                found: adapter.n_params(),
            });
        }
        if covariance.nrows() != p {
            return Err(MarginsError::DimensionMismatch {
                what: "covariance rows",
                expected: p,
                found: covariance.nrows(),
            });
        }
        if covariance.ncols() != p {
            return Err(MarginsError::DimensionMismatch {
                what: "covariance columns",
                expected: p,
                found: covariance.ncols(),
            });
        }
        for (name, &value) in names.iter().zip(coefficients.iter()) {
            if !value.is_finite() {
                return Err(MarginsError::InvalidCoefficient { name: name.clone(), value });
            }
        }
        Ok(Self { names, coefficients, covariance, link, adapter, df_residual: None })
    }

    /// Attach residual degrees of freedom.
    pub fn with_df_residual(mut self, df: f64) -> MarginsResult<Self> {
        if !df.is_finite() || df <= 0.0 {
            return Err(MarginsError::InvalidDf { value: df });
        }
        self.df_residual = Some(df);
        Ok(self)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn adapter(&self) -> &P {
        &self.adapter
    }

    pub fn df_residual(&self) -> Option<f64> {
        self.df_residual
    }

    pub fn predictors(&self) -> Vec<String> {
        self.adapter.predictors()
    }

    pub fn has_predictor(&self, name: &str) -> bool {
        self.adapter.predictors().iter().any(|p| p == name)
    }

    /// Prediction at the fitted coefficients.
    pub fn predict(&self, row: &CovariateRow, scale: PredictionScale) -> MarginsResult<f64> {
        self.predict_at(&self.coefficients, row, scale)
    }

    /// Prediction at an arbitrary parameter vector.
    pub fn predict_at(
        &self, theta: &Array1<f64>, row: &CovariateRow, scale: PredictionScale,
    ) -> MarginsResult<f64> {
        let eta = self.adapter.linear_predictor(theta, row)?;
        Ok(scale.apply(self.link, eta))
    }
}
