//! optimizer::finite_diff — finite-difference gradients and Hessians.
//!
//! Purpose
//! -------
//! Wrap the `finitediff` routines with error capture, validation and
//! symmetry cleanup so the adapter and the covariance step never depend
//! on the raw `finitediff` API.
//!
//! Key behaviors
//! -------------
//! - [`central_grad`]: central differences of a fallible scalar objective,
//!   falling back to forward differences when an evaluation failed or the
//!   central result is not finite.
//! - [`compute_hessian`]: central-difference Hessian of a gradient map,
//!   forward-difference fallback, then in-place symmetrization.
//!
//! Conventions
//! -----------
//! - `finitediff` closures must return `f64`, so the first error raised
//!   inside the objective is parked in a `RefCell` and the closure
//!   returns `NaN`. The parked error is surfaced after differencing.
use crate::estimation::{
    errors::{FitError, FitResult},
    optimizer::{
        types::{Grad, Hessian, Theta},
        validation::{validate_grad, validate_hessian},
    },
};
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Finite-difference gradient of a fallible scalar objective.
///
/// Tries central differences first. If any evaluation failed or the
/// result fails [`validate_grad`], retries once with forward differences.
///
/// # Errors
/// - The first error raised by `func` on the forward pass.
/// - `GradientDimMismatch` / `InvalidGradient` from validation.
pub fn central_grad<G>(theta: &Theta, func: &G) -> FitResult<Grad>
where
    G: Fn(&Theta) -> FitResult<f64>,
{
    let closure_err: RefCell<Option<FitError>> = RefCell::new(None);
    let scalar = |x: &Theta| -> f64 {
        match func(x) {
            Ok(v) => v,
            Err(e) => {
                let mut slot = closure_err.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                f64::NAN
            }
        }
    };
    let central = theta.central_diff(&scalar);
    if closure_err.borrow().is_none() && validate_grad(&central, theta.len()).is_ok() {
        return Ok(central);
    }
    run_fd_diff(theta, &scalar, &closure_err)
}

/// Forward-difference gradient with error capture and validation.
///
/// Clears `closure_err`, differentiates, and returns the captured error if
/// `func` reported one.
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<FitError>>,
) -> FitResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}

/// Finite-difference Hessian of a gradient map, symmetrized.
///
/// The central-difference validation error is discarded; only the
/// forward-difference result is surfaced when both fail.
///
/// # Errors
/// - `HessianDimMismatch` / `InvalidHessian` from the forward fallback.
pub fn compute_hessian<F: Fn(&Theta) -> Grad>(f: &F, theta: &Theta) -> FitResult<Hessian> {
    let dim = theta.len();
    let mut cent_hess = theta.central_hessian(f);
    if validate_hessian(&cent_hess, dim).is_ok() {
        symmetrize_hess(&mut cent_hess);
        return Ok(cent_hess);
    }
    let mut forward_hess = theta.forward_hessian(f);
    validate_hessian(&forward_hess, dim)?;
    symmetrize_hess(&mut forward_hess);
    Ok(forward_hess)
}

// ---- Helper methods ----

/// Average each off-diagonal pair; the diagonal is untouched.
fn symmetrize_hess(hess: &mut Hessian) {
    for i in 0..hess.nrows() {
        for j in 0..i {
            let avg = 0.5 * (hess[[i, j]] + hess[[j, i]]);
            hess[[i, j]] = avg;
            hess[[j, i]] = avg;
        }
    }
}
