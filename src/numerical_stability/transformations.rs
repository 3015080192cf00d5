//! Numerical stability utilities.
//!
//! Provides safe implementations of the scalar transforms behind the
//! supported link functions. Naive forms such as `1 / (1 + exp(-x))` or
//! `1 - exp(-exp(x))` overflow or cancel catastrophically in the tails; the
//! functions here branch on the sign or size of the input to stay in a
//! well-conditioned regime for `f64`.
//!
//! # Provided items
//! - [`EIGEN_EPS`]: relative eigenvalue floor for covariance checks.
//! - [`GENERAL_TOL`]: generic small-denominator guard.
//! - [`PROB_EPS`]: clamp applied to probabilities before `logit`/`probit`.
//! - [`SYMMETRY_TOL`]: relative asymmetry tolerated in covariance input.
//! - [`safe_logistic`], [`safe_logit`], [`inv_cloglog`], [`normal_cdf`],
//!   [`normal_pdf`].
//! - [`unit_diagonal_scaling`]: equilibrate a symmetric matrix before an
//!   eigenvalue screen.
use ndarray::{Array1, Array2};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{PI, SQRT_2};

/// Eigenvalues at or below `EIGEN_EPS · max(|λ|)` are treated as zero.
///
/// Used when deciding whether a covariance matrix is singular or indefinite
/// and when forming eigen pseudo-inverses of information matrices.
pub const EIGEN_EPS: f64 = 1e-12;

/// Generic guard for denominators and variances that should be nonzero.
pub const GENERAL_TOL: f64 = 1e-14;

/// Probabilities are clamped into `[PROB_EPS, 1 − PROB_EPS]` before applying
/// a forward link.
pub const PROB_EPS: f64 = 1e-12;

/// Maximum relative asymmetry `|Σᵢⱼ − Σⱼᵢ| / max(|Σ|)` accepted for a
/// covariance matrix.
pub const SYMMETRY_TOL: f64 = 1e-8;

/// Numerically stable logistic function `1 / (1 + exp(−x))`.
///
/// For negative `x` the equivalent form `exp(x) / (1 + exp(x))` is used so
/// the exponential never overflows.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Logit `ln(p / (1 − p))` with `p` clamped away from 0 and 1.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
    p.ln() - (-p).ln_1p()
}

/// Inverse complementary log-log `1 − exp(−exp(η))`.
///
/// Uses `−expm1(−exp(η))` so small probabilities keep full precision.
pub fn inv_cloglog(eta: f64) -> f64 {
    -(-eta.exp()).exp_m1()
}

/// Standard normal CDF `Φ(x) = erfc(−x/√2) / 2`.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal density `φ(x)`.
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal quantile `Φ⁻¹(p)` for `p` clamped into the open unit interval.
pub fn normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p.clamp(PROB_EPS, 1.0 - PROB_EPS))
}

/// Symmetric equilibration `R = S A S` with `S = diag(|Aᵢᵢ|^{-1/2})`.
///
/// Zero diagonal entries keep a unit factor. Returns `(R, s)`; `A` is
/// recovered as `S⁻¹ R S⁻¹`, and `S R⁻¹ S` inverts `A` when `R` is
/// invertible. Eigenvalue floors applied to `R` are independent of the
/// units of each coordinate.
pub fn unit_diagonal_scaling(matrix: &Array2<f64>) -> (Array2<f64>, Array1<f64>) {
    let s = matrix.diag().mapv(|d| if d != 0.0 { 1.0 / d.abs().sqrt() } else { 1.0 });
    let mut scaled = matrix.clone();
    for ((i, j), v) in scaled.indexed_iter_mut() {
        *v *= s[i] * s[j];
    }
    (scaled, s)
}
