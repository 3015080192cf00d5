//! numerical_stability — shared tolerances and stable link transforms.
//!
//! Purpose
//! -------
//! Collect the small numeric tolerances and overflow-safe scalar transforms
//! used by both the marginal-effects core and the fitting collaborator, so
//! every layer agrees on what "numerically zero" and "numerically one" mean.
//!
//! Key behaviors
//! -------------
//! - Centralize tolerances (`EIGEN_EPS`, `GENERAL_TOL`, `PROB_EPS`,
//!   `SYMMETRY_TOL`) used for covariance conditioning checks, symmetric
//!   comparisons, and probability clamping.
//! - Provide stable logistic / logit transforms and the complementary
//!   log-log pair without overflow for large `|η|`.
//! - Provide standard-normal CDF/PDF/quantile helpers built on the `statrs`
//!   error functions for the probit link and normal-reference inference.
//!
//! Invariants & assumptions
//! ------------------------
//! - All transforms accept any finite `f64`; non-finite inputs propagate
//!   as `NaN` and are rejected by validation upstream.
//! - Probabilities returned by inverse links lie in `[0, 1]`; forward links
//!   clamp their input into `[PROB_EPS, 1 − PROB_EPS]` first.
//!
//! Conventions
//! -----------
//! - This module never logs and touches no global state; its helpers are
//!   safe to call from inside per-row parallel loops.
//!
//! Downstream usage
//! ----------------
//! - `margins::model::Link` delegates its scalar maps to these helpers.
//! - `margins::uncertainty` and `estimation::covariance` use `EIGEN_EPS`
//!   for eigenvalue truncation and conditioning checks, applied after
//!   `unit_diagonal_scaling` so the verdict does not depend on units.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] compare the stable transforms with
//!   naive formulas on safe inputs, check tail behavior, and check that
//!   forward and inverse maps round-trip.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    EIGEN_EPS, GENERAL_TOL, PROB_EPS, SYMMETRY_TOL, inv_cloglog, normal_cdf, normal_pdf,
    normal_quantile, safe_logistic, safe_logit, unit_diagonal_scaling,
};
