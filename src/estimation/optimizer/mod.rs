//! optimizer — argmin-powered log-likelihood maximizer.
//!
//! Purpose
//! -------
//! Maximize a log-likelihood `ℓ(θ)` with L-BFGS for the binary-response
//! fitter (and any other [`LogLikelihood`] implementor). Callers implement
//! one trait and call [`maximize`].
//!
//! Key behaviors
//! -------------
//! - [`adapter::ArgMinAdapter`] turns `ℓ(θ)` into the argmin cost
//!   `c(θ) = -ℓ(θ)`, with a finite-difference gradient fallback.
//! - [`builders`] pick the line search and apply tolerances.
//! - [`run::run_lbfgs`] executes the solver and normalizes its state into
//!   an [`OptimOutcome`].
//! - [`finite_diff`] provides validated finite-difference gradients and
//!   symmetrized Hessians.
//!
//! Invariants & assumptions
//! ------------------------
//! - User code implements `ℓ` and `∇ℓ`, never the cost.
//! - Invalid inputs are reported as [`FitError`](crate::estimation::FitError)
//!   values, not panics.
//!
//! Testing notes
//! -------------
//! - Unit tests in each submodule; [`api`] runs full solves on a concave
//!   toy objective with both line searches.

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

pub use self::api::maximize;
pub use self::traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
pub use self::types::{Cost, FnEvalMap, Grad, Hessian, Theta};
