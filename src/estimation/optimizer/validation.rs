//! Validation helpers for the optimizer.
//!
//! - [`verify_tol_grad`], [`verify_tol_cost`]: tolerances must be finite and
//!   strictly positive when provided.
//! - [`validate_theta`]: candidate parameters passed into a likelihood.
//! - [`validate_grad`], [`validate_hessian`]: derivative shape and finiteness.
//! - [`validate_theta_hat`], [`validate_value`]: solver output.
use crate::estimation::{
    errors::{FitError, FitResult},
    optimizer::types::{Grad, Hessian, Theta},
};

/// Validate the optional gradient-norm tolerance.
///
/// # Errors
/// [`FitError::InvalidTolGrad`] if the value is non-finite or ≤ 0.0.
pub fn verify_tol_grad(tol: Option<f64>) -> FitResult<()> {
    if let Some(tol) = tol {
        if !tol.is_finite() {
            return Err(FitError::InvalidTolGrad { tol, reason: "Tolerance must be finite." });
        }
        if tol <= 0.0 {
            return Err(FitError::InvalidTolGrad { tol, reason: "Tolerance must be positive." });
        }
    }
    Ok(())
}

/// Validate the optional cost-change tolerance.
///
/// # Errors
/// [`FitError::InvalidTolCost`] if the value is non-finite or ≤ 0.0.
pub fn verify_tol_cost(tol: Option<f64>) -> FitResult<()> {
    if let Some(tol) = tol {
        if !tol.is_finite() {
            return Err(FitError::InvalidTolCost { tol, reason: "Tolerance must be finite." });
        }
        if tol <= 0.0 {
            return Err(FitError::InvalidTolCost { tol, reason: "Tolerance must be positive." });
        }
    }
    Ok(())
}

/// Check a parameter vector against the model dimension.
///
/// # Errors
/// - [`FitError::ThetaLengthMismatch`] if `theta.len() != dim`.
/// - [`FitError::InvalidThetaInput`] for the first non-finite entry.
pub fn validate_theta(theta: &Theta, dim: usize) -> FitResult<()> {
    if theta.len() != dim {
        return Err(FitError::ThetaLengthMismatch { expected: dim, found: theta.len() });
    }
    if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(FitError::InvalidThetaInput { index, value });
    }
    Ok(())
}

/// Validate a gradient vector against dimension and finiteness.
///
/// # Errors
/// - [`FitError::GradientDimMismatch`] if length does not match `dim`.
/// - [`FitError::InvalidGradient`] for the first offending element.
pub fn validate_grad(grad: &Grad, dim: usize) -> FitResult<()> {
    if grad.len() != dim {
        return Err(FitError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    for (index, &value) in grad.iter().enumerate() {
        if !value.is_finite() {
            return Err(FitError::InvalidGradient {
                index,
                value,
                reason: "Gradient elements must be finite.",
            });
        }
    }
    Ok(())
}

/// Unwrap the solver's best parameter vector, rejecting non-finite entries.
///
/// # Errors
/// - [`FitError::MissingThetaHat`] if no vector was produced.
/// - [`FitError::InvalidThetaHat`] if any element is non-finite.
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> FitResult<Theta> {
    let t = theta_hat.ok_or(FitError::MissingThetaHat)?;
    for (index, &value) in t.iter().enumerate() {
        if !value.is_finite() {
            return Err(FitError::InvalidThetaHat {
                index,
                value,
                reason: "Parameter estimates must be finite.",
            });
        }
    }
    Ok(t)
}

/// Log-likelihood values must be finite; negative values are fine.
pub fn validate_value(value: f64) -> FitResult<()> {
    if !value.is_finite() {
        return Err(FitError::NonFiniteCost { value });
    }
    Ok(())
}

/// Validate the shape and entries of a Hessian matrix.
///
/// # Errors
/// - [`FitError::HessianDimMismatch`] if the matrix is not `dim × dim`.
/// - [`FitError::InvalidHessian`] with the first non-finite entry.
pub fn validate_hessian(hessian: &Hessian, dim: usize) -> FitResult<()> {
    if hessian.nrows() != dim || hessian.ncols() != dim {
        return Err(FitError::HessianDimMismatch {
            expected: dim,
            found: (hessian.nrows(), hessian.ncols()),
        });
    }
    for ((i, j), &value) in hessian.indexed_iter() {
        if !value.is_finite() {
            return Err(FitError::InvalidHessian { row: i, col: j, value });
        }
    }
    Ok(())
}
