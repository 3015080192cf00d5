//! margins::errors — error taxonomy for grid, effect, contrast and inference work.
//!
//! Purpose
//! -------
//! Provide one error enum and result alias for every request-scoped
//! computation in the marginal-effects core, together with a conversion
//! layer to Python exceptions for PyO3-based bindings.
//!
//! Key behaviors
//! -------------
//! - Define [`MarginsResult`] and [`MarginsError`] as the canonical result
//!   and error types of the `margins` subtree.
//! - Every fatal variant carries the offending predictor or term name and
//!   the operation that was requested, so messages are actionable without
//!   extra context.
//! - Implement `From<MarginsError> for PyErr` (feature `python-bindings`)
//!   mapping every variant to `ValueError`.
//!
//! Invariants & assumptions
//! ------------------------
//! - All variants except [`MarginsError::IllConditionedCovariance`] abort
//!   the request that raised them; no partial results are returned.
//! - `IllConditionedCovariance` is produced by the covariance checks in
//!   `margins::uncertainty` and is normally recorded on the affected
//!   `Estimate` rather than returned as `Err`.
//!
//! Conventions
//! -----------
//! - Operation names are `&'static str` (e.g. `"build_grid"`,
//!   `"evaluate"`) to keep the enum cheap to clone.
//! - Messages describe the violated domain constraint rather than
//!   implementation details.
//!
//! Testing notes
//! -------------
//! - Unit tests check that `Display` embeds the payload of representative
//!   variants. The PyErr bridge is not exercised from Rust tests.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

/// Result alias for the marginal-effects core.
pub type MarginsResult<T> = Result<T, MarginsError>;

/// MarginsError — failures raised while building grids, evaluating effects,
/// forming contrasts or attaching uncertainty.
///
/// Variants
/// --------
/// - Grid / data: `UnknownPredictor`, `MissingPredictor`, `KindMismatch`,
///   `UnknownLevel`, `InvalidValue`, `ColumnLengthMismatch`,
///   `DuplicatePredictor`, `InvalidMixture`, `EmptyGrid`.
/// - Effects: `InvalidStep`, `GradientNotImplemented`, `NonFinitePrediction`,
///   `InvalidGradient`.
/// - Contrasts: `UnknownTerm`, `UnsupportedExpression`, `EmptyEstimates`,
///   `ZeroDenominator`.
/// - Model / inference: `DimensionMismatch`, `InvalidCoefficient`,
///   `InvalidLink`, `InvalidFormula`, `InvalidConfidence`, `InvalidDf`,
///   `InvalidOption`, `IllConditionedCovariance`.
#[derive(Debug, Clone, PartialEq)]
pub enum MarginsError {
    // ---- Grid / data ----
    /// A predictor name is not known to the dataset or the model.
    UnknownPredictor { name: String, operation: &'static str },

    /// A row does not carry a predictor the computation needs.
    MissingPredictor { name: String, row: usize },

    /// A predictor was used with the wrong kind (numeric vs categorical).
    KindMismatch { name: String, expected: &'static str, operation: &'static str },

    /// A categorical level is not among the predictor's observed levels.
    UnknownLevel { predictor: String, level: String },

    /// A numeric entry is NaN or infinite.
    InvalidValue { name: String, index: usize, value: f64 },

    /// Columns passed to a dataset constructor differ in length.
    ColumnLengthMismatch { name: String, expected: usize, found: usize },

    /// The same predictor was supplied twice.
    DuplicatePredictor { name: String },

    /// Proportional-mix weights are negative or do not sum to one.
    InvalidMixture { name: String, total: f64 },

    /// The requested grid would contain no rows.
    EmptyGrid { operation: &'static str },

    // ---- Effects ----
    /// The finite-difference step resolved to a non-positive or non-finite value.
    InvalidStep { predictor: String, step: f64 },

    /// The model adapter does not implement an analytic derivative.
    GradientNotImplemented,

    /// The model produced a NaN or infinite prediction.
    NonFinitePrediction { row: usize, value: f64 },

    /// A parameter gradient has a NaN or infinite entry.
    InvalidGradient { index: usize, value: f64 },

    // ---- Contrasts ----
    /// An expression references a term that is not among the estimates.
    UnknownTerm { name: String, operation: &'static str },

    /// The expression is not a linear combination of estimates.
    UnsupportedExpression { expression: String, reason: &'static str },

    /// A contrast was requested over an empty set of estimates.
    EmptyEstimates { operation: &'static str },

    /// A ratio contrast has a zero denominator estimate.
    ZeroDenominator { label: String },

    // ---- Model / inference ----
    /// Two objects that must agree in size do not.
    DimensionMismatch { what: &'static str, expected: usize, found: usize },

    /// A coefficient is NaN or infinite.
    InvalidCoefficient { name: String, value: f64 },

    /// An unrecognized link function name.
    InvalidLink { name: String },

    /// A model term could not be parsed or expanded.
    InvalidFormula { term: String, reason: &'static str },

    /// Confidence level outside `(0, 1)`.
    InvalidConfidence { value: f64 },

    /// Degrees of freedom must be finite and positive.
    InvalidDf { value: f64 },

    /// An option string did not name a known choice.
    InvalidOption { value: String, reason: &'static str },

    /// Covariance matrix is asymmetric, singular or not positive semidefinite.
    IllConditionedCovariance { min_eigenvalue: f64, reason: &'static str },
}

impl std::error::Error for MarginsError {}

impl std::fmt::Display for MarginsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Grid / data ----
            MarginsError::UnknownPredictor { name, operation } => {
                write!(f, "Unknown predictor '{name}' in {operation}")
            }
            MarginsError::MissingPredictor { name, row } => {
                write!(f, "Row {row} is missing predictor '{name}'")
            }
            MarginsError::KindMismatch { name, expected, operation } => {
                write!(f, "Predictor '{name}' must be {expected} in {operation}")
            }
            MarginsError::UnknownLevel { predictor, level } => {
                write!(f, "Level '{level}' is not an observed level of '{predictor}'")
            }
            MarginsError::InvalidValue { name, index, value } => {
                write!(f, "Invalid value for '{name}' at index {index}: {value}, must be finite")
            }
            MarginsError::ColumnLengthMismatch { name, expected, found } => {
                write!(f, "Column '{name}' has length {found}, expected {expected}")
            }
            MarginsError::DuplicatePredictor { name } => {
                write!(f, "Predictor '{name}' supplied more than once")
            }
            MarginsError::InvalidMixture { name, total } => {
                write!(
                    f,
                    "Invalid level mixture for '{name}': weights must be non-negative and sum to 1 (sum = {total})"
                )
            }
            MarginsError::EmptyGrid { operation } => {
                write!(f, "Empty grid in {operation}: no rows to evaluate")
            }

            // ---- Effects ----
            MarginsError::InvalidStep { predictor, step } => {
                write!(f, "Invalid step {step} for '{predictor}': must be finite and > 0")
            }
            MarginsError::GradientNotImplemented => {
                write!(f, "Analytic derivative not implemented by the model adapter")
            }
            MarginsError::NonFinitePrediction { row, value } => {
                write!(f, "Non-finite prediction {value} at row {row}")
            }
            MarginsError::InvalidGradient { index, value } => {
                write!(f, "Invalid parameter gradient at index {index}: {value}, must be finite")
            }

            // ---- Contrasts ----
            MarginsError::UnknownTerm { name, operation } => {
                write!(f, "Unknown term '{name}' in {operation}")
            }
            MarginsError::UnsupportedExpression { expression, reason } => {
                write!(f, "Unsupported expression '{expression}': {reason}")
            }
            MarginsError::EmptyEstimates { operation } => {
                write!(f, "No estimates supplied to {operation}")
            }
            MarginsError::ZeroDenominator { label } => {
                write!(f, "Ratio denominator '{label}' is zero")
            }

            // ---- Model / inference ----
            MarginsError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, found {found}")
            }
            MarginsError::InvalidCoefficient { name, value } => {
                write!(f, "Invalid coefficient '{name}': {value}, must be finite")
            }
            MarginsError::InvalidLink { name } => {
                write!(
                    f,
                    "Invalid link '{name}'. Valid options are 'identity', 'logit', 'probit', 'log', 'cloglog'."
                )
            }
            MarginsError::InvalidFormula { term, reason } => {
                write!(f, "Invalid model term '{term}': {reason}")
            }
            MarginsError::InvalidConfidence { value } => {
                write!(f, "Invalid confidence level {value}: must lie strictly between 0 and 1")
            }
            MarginsError::InvalidDf { value } => {
                write!(f, "Invalid degrees of freedom {value}: must be finite and > 0")
            }
            MarginsError::InvalidOption { value, reason } => {
                write!(f, "Invalid option '{value}': {reason}")
            }
            MarginsError::IllConditionedCovariance { min_eigenvalue, reason } => {
                write!(f, "Ill-conditioned covariance (min eigenvalue {min_eigenvalue}): {reason}")
            }
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<MarginsError> for PyErr {
    fn from(err: MarginsError) -> PyErr {
        PyValueError::new_err(format!("MarginsError: {err}"))
    }
}
