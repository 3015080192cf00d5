//! estimation::covariance — parameter covariance from curvature.
//!
//! Purpose
//! -------
//! Turn second-order information into `Var(θ̂)`: the inverse observed
//! information for likelihood fits and `(XᵀX)⁻¹` scaling for least
//! squares, both through a symmetric eigendecomposition in `nalgebra`.
//!
//! Key behaviors
//! -------------
//! - [`pseudo_inverse`]: eigen pseudo-inverse of a symmetric matrix after
//!   unit-diagonal scaling, truncating eigenvalues at or below
//!   `EIGEN_EPS · max|λ|`.
//! - [`check_full_rank`]: reject cross-product matrices whose scaled form
//!   has a truncated direction, before any inverse is formed.
//! - [`observed_information_covariance`]: finite-difference Hessian of the
//!   average log-likelihood gradient, negated, pseudo-inverted and divided
//!   by `n`.
//!
//! Conventions
//! -----------
//! - Hessians are on the average log-likelihood scale, so the covariance
//!   of the sum-scale estimator is `J̄⁺ / n`.
//! - No explicit inverse is formed; weakly identified directions get
//!   zero weight instead of exploding.
use crate::estimation::{
    errors::{FitError, FitResult},
    optimizer::{Grad, Theta, finite_diff::compute_hessian},
};
use crate::margins::uncertainty::fill_dmatrix;
use crate::numerical_stability::{EIGEN_EPS, unit_diagonal_scaling};
use nalgebra::DMatrix;
use ndarray::Array2;

/// Eigen pseudo-inverse of a symmetric matrix, computed on its
/// unit-diagonal scaling.
///
/// With `A = S⁻¹ R S⁻¹`, returns `S R⁺ S` where
/// `R⁺ = Σ_{k: λ_k > EIGEN_EPS·max|λ|} q_k q_kᵀ / λ_k`. This is `A⁻¹` for
/// invertible `A`; for singular `A` it is a symmetric generalized inverse
/// that ignores the truncated directions of `R`.
pub fn pseudo_inverse(matrix: &Array2<f64>) -> Array2<f64> {
    let n = matrix.nrows();
    let (scaled, s) = unit_diagonal_scaling(matrix);
    let mut m = DMatrix::<f64>::zeros(n, n);
    fill_dmatrix(&scaled, &mut m);
    let eigen = m.symmetric_eigen();
    let q = eigen.eigenvectors;
    let lambdas = eigen.eigenvalues;
    let floor = EIGEN_EPS * lambdas.iter().fold(0.0_f64, |acc, l| acc.max(l.abs()));

    let mut out = Array2::<f64>::zeros((n, n));
    for (k, &lambda) in lambdas.iter().enumerate() {
        if lambda <= floor {
            continue;
        }
        for i in 0..n {
            let w = q[(i, k)] / lambda;
            for j in 0..n {
                out[[i, j]] += w * q[(j, k)];
            }
        }
    }
    for ((i, j), v) in out.indexed_iter_mut() {
        *v *= s[i] * s[j];
    }
    out
}

/// Reject a cross-product matrix `XᵀX` whose unit-diagonal scaling has a
/// smallest eigenvalue at or below `EIGEN_EPS · max λ`.
///
/// Scaling first keeps columns in large units (e.g. `x` and `x²` for
/// `x ≈ 10⁵`) from being mistaken for a collinear design.
///
/// # Errors
/// [`FitError::RankDeficient`] with the smallest eigenvalue of the scaled
/// matrix.
pub fn check_full_rank(xtx: &Array2<f64>) -> FitResult<()> {
    let n = xtx.nrows();
    let (scaled, _) = unit_diagonal_scaling(xtx);
    let mut m = DMatrix::<f64>::zeros(n, n);
    fill_dmatrix(&scaled, &mut m);
    let lambdas = m.symmetric_eigen().eigenvalues;
    let max = lambdas.iter().fold(0.0_f64, |acc, l| acc.max(l.abs()));
    let min = lambdas.iter().copied().fold(f64::INFINITY, f64::min);
    if max == 0.0 || min <= EIGEN_EPS * max {
        return Err(FitError::RankDeficient { min_eigenvalue: min });
    }
    Ok(())
}

/// Covariance of an MLE from the average log-likelihood gradient.
///
/// Parameters
/// ----------
/// - `avg_grad`: `θ ↦ ∇ℓ̄(θ)`, the gradient of the average log-likelihood.
/// - `theta_hat`: the maximizer.
/// - `n`: number of observations.
///
/// # Errors
/// Hessian validation failures from [`compute_hessian`].
pub fn observed_information_covariance<F: Fn(&Theta) -> Grad>(
    avg_grad: &F, theta_hat: &Theta, n: usize,
) -> FitResult<Array2<f64>> {
    let hessian = compute_hessian(avg_grad, theta_hat)?;
    let info = -hessian;
    Ok(pseudo_inverse(&info) / n as f64)
}
