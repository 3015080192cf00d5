//! estimation — reference fitters producing [`FittedModel`]s.
//!
//! Purpose
//! -------
//! Supply least-squares and binary-response maximum-likelihood fits so the
//! marginal-effects core can be used end to end without an external
//! modeling library. Any other source of coefficients and covariance works
//! equally well through `FittedModel::new`.
//!
//! Key behaviors
//! -------------
//! - [`fit_ols`]: `σ̂²(XᵀX)⁻¹` covariance and `n − p` residual degrees of
//!   freedom for t-based inference.
//! - [`fit_binary`]: logit / probit / cloglog MLE via the argmin L-BFGS
//!   [`optimizer`], with covariance from the eigen pseudo-inverse of the
//!   finite-difference observed information ([`covariance`]).
//!
//! Conventions
//! -----------
//! - Coefficient names are the [`LinearSpec`] term labels, in design order.
//! - Errors are reported as [`FitError`]; model-layer failures are wrapped.
//!
//! Testing notes
//! -------------
//! - Closed-form checks (simple regression, saturated two-group logit)
//!   live next to each fitter.
//!
//! [`FittedModel`]: crate::margins::FittedModel
//! [`LinearSpec`]: crate::margins::LinearSpec

pub mod binary;
pub mod covariance;
pub mod errors;
pub mod ols;
pub mod optimizer;

pub use self::binary::{BinaryData, BinaryLikelihood, fit_binary};
pub use self::errors::{FitError, FitResult};
pub use self::ols::fit_ols;
pub use self::optimizer::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
