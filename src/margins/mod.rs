//! margins — marginal effects, marginal means and contrasts for fitted
//! regression models.
//!
//! Purpose
//! -------
//! Turn a fitted model (coefficients, covariance, link, prediction adapter)
//! and a dataset into interpretable quantities: predictions, slopes,
//! elasticities and comparisons, averaged or evaluated at chosen covariate
//! values, each with a delta-method standard error and confidence interval.
//!
//! Key behaviors
//! -------------
//! - [`grid::build_grid`] constructs typical, counterfactual or as-is
//!   reference grids from a [`Dataset`].
//! - [`effects::evaluate`] computes per-row values and parameter gradients
//!   of a [`Target`]; [`effects::aggregate`] summarizes them under an
//!   explicit [`AveragingPolicy`] (AME vs MEM vs per-grid-row).
//! - [`contrast`] forms pairwise differences, ratios and arbitrary linear
//!   hypotheses from the stored gradients.
//! - [`uncertainty`] screens the covariance once per request and attaches
//!   `gᵀΣg` standard errors with normal or Student-t references.
//! - [`api`] wires these stages into single requests ([`compute`]) and a
//!   session type ([`Margins`]) with AME/MEM/prediction helpers.
//!
//! Invariants & assumptions
//! ------------------------
//! - The model is read-only and shared; every computation is a pure
//!   function of its inputs, so rows may be evaluated in parallel.
//! - Every predictor the model adapter reads must be present in every
//!   evaluated row.
//! - Only `IllConditionedCovariance` is recoverable; it is recorded on the
//!   affected estimates instead of failing the request.
//!
//! Conventions
//! -----------
//! - Positional estimate names in expressions are 1-based (`b1`, `b2`, ...).
//! - Categorical levels keep the dataset's level order; the first level is
//!   the reference for treatment coding and level comparisons.
//! - The default reporting scale is the response scale.
//!
//! Downstream usage
//! ----------------
//! - Fit a model (e.g. with `crate::estimation`), wrap dataset and model in
//!   [`Margins`], and call `avg_slopes`, `slopes_at_mean`,
//!   `avg_predictions`, `predictions` or `avg_comparisons`; combine results
//!   with `pairwise` or `hypothesis`.
//! - Custom models implement [`LinearPredictor`] (or use [`PredictionFn`]).
//!
//! Testing notes
//! -------------
//! - Unit tests sit next to each stage; `tests/integration_margins_pipeline.rs`
//!   runs the fit → grid → effect → contrast pipeline end to end.

pub mod api;
pub mod contrast;
pub mod data;
pub mod design;
pub mod effects;
pub mod errors;
pub mod estimate;
pub mod grid;
pub mod model;
pub mod options;
pub mod uncertainty;
pub mod validation;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::api::{Margins, Request, compute};
pub use self::contrast::{ContrastFn, PairOrder, contrast, contrast_weights, pairwise};
pub use self::data::{Column, CovariateRow, Dataset, PredictorKind, Value};
pub use self::design::{LinearSpec, Term};
pub use self::effects::{RowEffect, aggregate, evaluate};
pub use self::errors::{MarginsError, MarginsResult};
pub use self::estimate::Estimate;
pub use self::grid::{Grid, GridSpec, ValueSpec, build_grid};
pub use self::model::{FittedModel, LinearPredictor, Link, PredictionFn, PredictionScale};
pub use self::options::{
    AveragingPolicy, CategoricalTypical, Change, DerivativeMethod, DfPolicy, EffectOptions,
    GradientMethod, GridPolicy, InferenceOptions, SlopeKind, StepPolicy, Target, TypicalOptions,
};
pub use self::uncertainty::{DeltaMethod, Inference, Interval, Reference, delta_se};

// ---- Optional convenience prelude for downstream crates ------------------
//
// Downstream crates can `use rust_margins::margins::prelude::*;` to import
// the request surface in a single line.

pub mod prelude {
    pub use super::api::{Margins, Request, compute};
    pub use super::contrast::{ContrastFn, PairOrder};
    pub use super::data::{Column, CovariateRow, Dataset, Value};
    pub use super::design::LinearSpec;
    pub use super::errors::{MarginsError, MarginsResult};
    pub use super::estimate::Estimate;
    pub use super::grid::GridSpec;
    pub use super::model::{FittedModel, Link, PredictionScale};
    pub use super::options::{
        AveragingPolicy, Change, DerivativeMethod, EffectOptions, GridPolicy, InferenceOptions,
        SlopeKind, StepPolicy, Target, TypicalOptions,
    };
}
