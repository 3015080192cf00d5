//! estimation::errors — error type for the reference model fitters.
//!
//! Purpose
//! -------
//! Provide one error enum and result alias for the OLS and binary-response
//! fitters and the argmin-backed optimizer they share.
//!
//! Key behaviors
//! -------------
//! - Define [`FitResult`] and [`FitError`] for everything under
//!   `crate::estimation`.
//! - Convert `argmin::core::Error` into [`FitError`], recovering our own
//!   errors raised inside cost/gradient callbacks and mapping
//!   `ArgminError` variants one-to-one.
//! - Wrap [`MarginsError`] raised while building design matrices or the
//!   final [`FittedModel`](crate::margins::FittedModel).
//! - Map to Python `ValueError` under the `python-bindings` feature.
//!
//! Conventions
//! -----------
//! - Reasons are `&'static str`; payloads carry the offending index or
//!   value so messages are actionable.

use crate::margins::errors::MarginsError;
use argmin::core::{ArgminError, Error};

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

/// Result alias for model fitting.
pub type FitResult<T> = Result<T, FitError>;

#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    // ---- Gradient ----
    /// Implies that FD should be used
    GradientNotImplemented,

    /// Gradient dimensions do not match parameter dimensions.
    GradientDimMismatch { expected: usize, found: usize },

    /// Gradient elements need to be finite
    InvalidGradient { index: usize, value: f64, reason: &'static str },

    // ---- MLEOptions ----
    /// Gradient tolerance needs to be positive and finite.
    InvalidTolGrad { tol: f64, reason: &'static str },

    /// Cost change tolerance needs to be positive and finite.
    InvalidTolCost { tol: f64, reason: &'static str },

    /// Maximum iterations needs to be positive.
    InvalidMaxIter { max_iter: usize, reason: &'static str },

    /// At least one tolerance must be provided.
    NoTolerancesProvided,

    /// Invalid line searcher name.
    InvalidLineSearch { name: String, reason: &'static str },

    /// lbfgs_mem needs to be at least 1.
    InvalidLBFGSMem { mem: usize, reason: &'static str },

    // ---- Objective ----
    /// Log-likelihood returned a non-finite value.
    NonFiniteCost { value: f64 },

    /// Parameter vector has the wrong length for the model.
    ThetaLengthMismatch { expected: usize, found: usize },

    /// Parameter vector entries must be finite.
    InvalidThetaInput { index: usize, value: f64 },

    // ---- Optimizer outcome ----
    /// Estimated parameters must be finite.
    InvalidThetaHat { index: usize, value: f64, reason: &'static str },

    /// Solver finished without a best parameter vector.
    MissingThetaHat,

    // ---- Argmin ----
    InvalidParameter { text: String },
    NotImplemented { text: String },
    NotInitialized { text: String },
    ConditionViolated { text: String },
    CheckPointNotFound { text: String },
    PotentialBug { text: String },
    ImpossibleError { text: String },
    /// Any other error surfaced by the argmin backend.
    BackendError { text: String },

    // ---- Finite differences ----
    HessianDimMismatch { expected: usize, found: (usize, usize) },

    InvalidHessian { row: usize, col: usize, value: f64 },

    // ---- Data ----
    /// No observations to fit.
    EmptyData,

    /// Response length differs from the number of rows.
    ResponseLengthMismatch { expected: usize, found: usize },

    /// Response entries must be finite.
    InvalidResponse { index: usize, value: f64 },

    /// Binary models need 0/1 responses.
    NonBinaryResponse { index: usize, value: f64 },

    /// Fewer observations than needed to estimate the residual variance.
    InsufficientObservations { n: usize, p: usize },

    /// Design matrix columns are (numerically) linearly dependent.
    RankDeficient { min_eigenvalue: f64 },

    /// Link not supported by the requested family.
    UnsupportedLink { name: &'static str, family: &'static str },

    // ---- Model assembly ----
    /// Error from the marginal-effects model layer.
    Model(MarginsError),

    // ---- Fallback ----
    UnknownError,
}

impl std::error::Error for FitError {}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Gradient ----
            FitError::GradientNotImplemented => {
                write!(f, "Analytic gradient not implemented")
            }
            FitError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient dimension mismatch: expected {expected}, found {found}")
            }
            FitError::InvalidGradient { index, value, reason } => {
                write!(f, "Invalid gradient at index {index}: {value}: {reason}")
            }

            // ---- MLEOptions ----
            FitError::InvalidTolGrad { tol, reason } => {
                write!(f, "Invalid gradient tolerance {tol}: {reason}")
            }
            FitError::InvalidTolCost { tol, reason } => {
                write!(f, "Invalid cost function change tolerance {tol}: {reason}")
            }
            FitError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "Invalid maximum iterations {max_iter}: {reason}")
            }
            FitError::NoTolerancesProvided => {
                write!(f, "No tolerances provided")
            }
            FitError::InvalidLineSearch { name, reason } => {
                write!(f, "Invalid line searcher '{name}': {reason}")
            }
            FitError::InvalidLBFGSMem { mem, reason } => {
                write!(f, "Invalid L-BFGS memory {mem}: {reason}")
            }

            // ---- Objective ----
            FitError::NonFiniteCost { value } => {
                write!(f, "Non-finite log-likelihood value: {value}")
            }
            FitError::ThetaLengthMismatch { expected, found } => {
                write!(f, "Parameter length mismatch: expected {expected}, found {found}")
            }
            FitError::InvalidThetaInput { index, value } => {
                write!(f, "Invalid parameter at index {index}: {value}, must be finite")
            }

            // ---- Optimizer outcome ----
            FitError::InvalidThetaHat { index, value, reason } => {
                write!(f, "Invalid estimated parameter at index {index}: {value}: {reason}")
            }
            FitError::MissingThetaHat => {
                write!(f, "Missing estimated parameters (theta hat)")
            }

            // ---- Argmin ----
            FitError::InvalidParameter { text } => write!(f, "Invalid parameter: {text}"),
            FitError::NotImplemented { text } => write!(f, "Not implemented: {text}"),
            FitError::NotInitialized { text } => write!(f, "Not initialized: {text}"),
            FitError::ConditionViolated { text } => write!(f, "Condition violated: {text}"),
            FitError::CheckPointNotFound { text } => write!(f, "Checkpoint not found: {text}"),
            FitError::PotentialBug { text } => write!(f, "Potential bug: {text}"),
            FitError::ImpossibleError { text } => write!(f, "Impossible error: {text}"),
            FitError::BackendError { text } => write!(f, "Backend error: {text}"),

            // ---- Finite differences ----
            FitError::HessianDimMismatch { expected, found } => {
                write!(
                    f,
                    "Hessian dimension mismatch: expected ({expected}, {expected}), found {found:?}"
                )
            }
            FitError::InvalidHessian { row, col, value } => {
                write!(f, "Invalid Hessian at ({row}, {col}): {value}, must be finite")
            }

            // ---- Data ----
            FitError::EmptyData => write!(f, "Cannot fit a model to an empty dataset"),
            FitError::ResponseLengthMismatch { expected, found } => {
                write!(f, "Response length mismatch: expected {expected} rows, found {found}")
            }
            FitError::InvalidResponse { index, value } => {
                write!(f, "Invalid response at row {index}: {value}, must be finite")
            }
            FitError::NonBinaryResponse { index, value } => {
                write!(f, "Non-binary response at row {index}: {value}, expected 0 or 1")
            }
            FitError::InsufficientObservations { n, p } => {
                write!(f, "Need more observations than parameters: n = {n}, p = {p}")
            }
            FitError::RankDeficient { min_eigenvalue } => {
                write!(f, "Design matrix is rank deficient (min eigenvalue of XᵀX {min_eigenvalue})")
            }
            FitError::UnsupportedLink { name, family } => {
                write!(f, "Link '{name}' is not supported for the {family} family")
            }

            // ---- Model assembly ----
            FitError::Model(err) => write!(f, "Model error: {err}"),

            // ---- Fallback ----
            FitError::UnknownError => write!(f, "Unknown error"),
        }
    }
}

impl From<Error> for FitError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<FitError>() {
            Ok(fit_err) => return fit_err,
            Err(err) => err,
        };
        match original_err.downcast() {
            Ok(argmin_err) => match argmin_err {
                ArgminError::InvalidParameter { text } => FitError::InvalidParameter { text },
                ArgminError::NotImplemented { text } => FitError::NotImplemented { text },
                ArgminError::NotInitialized { text } => FitError::NotInitialized { text },
                ArgminError::ConditionViolated { text } => FitError::ConditionViolated { text },
                ArgminError::CheckpointNotFound { text } => FitError::CheckPointNotFound { text },
                ArgminError::PotentialBug { text } => FitError::PotentialBug { text },
                ArgminError::ImpossibleError { text } => FitError::ImpossibleError { text },
                _ => FitError::UnknownError,
            },
            Err(err) => FitError::BackendError { text: err.to_string() },
        }
    }
}

impl From<MarginsError> for FitError {
    fn from(err: MarginsError) -> Self {
        FitError::Model(err)
    }
}

#[cfg(feature = "python-bindings")]
impl From<FitError> for PyErr {
    fn from(err: FitError) -> PyErr {
        PyValueError::new_err(format!("FitError: {err}"))
    }
}
