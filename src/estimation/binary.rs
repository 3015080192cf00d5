//! estimation::binary — maximum-likelihood fits for 0/1 responses.
//!
//! Purpose
//! -------
//! Fit `P(y = 1 | x) = g⁻¹(xᵀθ)` for the logit, probit and complementary
//! log-log links with the L-BFGS optimizer, and attach the inverse
//! observed information as the coefficient covariance.
//!
//! Key behaviors
//! -------------
//! - [`BinaryLikelihood`] implements [`LogLikelihood`] on the average
//!   Bernoulli log-likelihood with an analytic score.
//! - [`fit_binary`] validates the response, screens the design for rank,
//!   starts from the intercept-only solution, maximizes, and builds a
//!   [`FittedModel`] on the response scale of `link`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Probabilities are clamped into `[PROB_EPS, 1 − PROB_EPS]` before logs
//!   and divisions; the logit branch uses the exact softplus form instead.
//! - Perfect separation is not detected; the optimizer stops at its
//!   iteration cap and a warning is logged.
use crate::estimation::{
    covariance::{check_full_rank, observed_information_covariance},
    errors::{FitError, FitResult},
    ols::check_response,
    optimizer::{
        Grad, LogLikelihood, MLEOptions, Theta, maximize, validation::validate_theta,
    },
};
use crate::margins::{
    data::Dataset,
    design::{LinearSpec, Term},
    model::{FittedModel, Link},
};
use crate::numerical_stability::PROB_EPS;
use ndarray::{Array1, Array2};

/// Design matrix and response of a binary fit.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

/// Average Bernoulli log-likelihood under a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryLikelihood {
    link: Link,
}

impl BinaryLikelihood {
    /// # Errors
    /// `UnsupportedLink` unless `link` maps onto `(0, 1)`.
    pub fn new(link: Link) -> FitResult<Self> {
        match link {
            Link::Logit | Link::Probit | Link::Cloglog => Ok(Self { link }),
            other => Err(FitError::UnsupportedLink { name: other.name(), family: "binomial" }),
        }
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// `(ln μ, ln(1 − μ))` at `η`.
    fn log_probs(&self, eta: f64) -> (f64, f64) {
        match self.link {
            Link::Logit => (-softplus(-eta), -softplus(eta)),
            _ => {
                let mu = self.link.inverse(eta).clamp(PROB_EPS, 1.0 - PROB_EPS);
                (mu.ln(), (-mu).ln_1p())
            }
        }
    }

    /// Score weight `dμ/dη / (μ(1 − μ))`; identically one for the logit.
    fn score_weight(&self, eta: f64, mu: f64) -> f64 {
        match self.link {
            Link::Logit => 1.0,
            _ => {
                let mu = mu.clamp(PROB_EPS, 1.0 - PROB_EPS);
                self.link.inverse_deriv(eta) / (mu * (1.0 - mu))
            }
        }
    }
}

impl LogLikelihood for BinaryLikelihood {
    type Data = BinaryData;

    fn value(&self, theta: &Theta, data: &BinaryData) -> FitResult<f64> {
        let eta = data.x.dot(theta);
        let total: f64 = eta
            .iter()
            .zip(data.y.iter())
            .map(|(&e, &y)| {
                let (log_mu, log_one_minus) = self.log_probs(e);
                y * log_mu + (1.0 - y) * log_one_minus
            })
            .sum();
        Ok(total / data.y.len() as f64)
    }

    fn check(&self, theta: &Theta, data: &BinaryData) -> FitResult<()> {
        validate_theta(theta, data.x.ncols())
    }

    fn grad(&self, theta: &Theta, data: &BinaryData) -> FitResult<Grad> {
        let eta = data.x.dot(theta);
        let resid: Array1<f64> = eta
            .iter()
            .zip(data.y.iter())
            .map(|(&e, &y)| {
                let mu = self.link.inverse(e);
                self.score_weight(e, mu) * (y - mu)
            })
            .collect();
        Ok(data.x.t().dot(&resid) / data.y.len() as f64)
    }
}

/// Fit a binary-response GLM by maximum likelihood.
///
/// The start value sets the intercept (if `spec` has one) to `g(ȳ)` and
/// every other coefficient to zero.
///
/// # Errors
/// - `UnsupportedLink` for links other than logit, probit and cloglog.
/// - `EmptyData`, `ResponseLengthMismatch`, `InvalidResponse`,
///   `NonBinaryResponse`.
/// - `RankDeficient` when `XᵀX` is numerically singular.
/// - Optimizer and Hessian errors.
pub fn fit_binary(
    data: &Dataset, y: &Array1<f64>, spec: LinearSpec, link: Link, opts: &MLEOptions,
) -> FitResult<FittedModel<LinearSpec>> {
    let likelihood = BinaryLikelihood::new(link)?;
    check_response(data, y)?;
    let non_binary = y.iter().enumerate().find(|(_, v)| **v != 0.0 && **v != 1.0);
    if let Some((index, &value)) = non_binary {
        return Err(FitError::NonBinaryResponse { index, value });
    }
    let x = spec.design_matrix(data)?;
    check_full_rank(&x.t().dot(&x))?;
    let (n, p) = x.dim();

    let mut theta0 = Theta::zeros(p);
    if let Some(k) = spec.terms().iter().position(|t| matches!(t, Term::Intercept)) {
        let ybar = y.mean().unwrap_or(0.5).clamp(0.01, 0.99);
        theta0[k] = link.link(ybar);
    }

    let bin = BinaryData { x, y: y.clone() };
    let outcome = maximize(&likelihood, theta0, &bin, opts)?;
    if !outcome.converged {
        log::warn!("{} fit did not converge: {}", link.name(), outcome.status);
    }
    log::debug!(
        "{} fit: n = {n}, p = {p}, loglik = {:.6}, iterations = {}",
        link.name(),
        outcome.value * n as f64,
        outcome.iterations
    );

    let avg_grad = |t: &Theta| -> Grad {
        likelihood.grad(t, &bin).unwrap_or_else(|_| Array1::from_elem(p, f64::NAN))
    };
    let cov = observed_information_covariance(&avg_grad, &outcome.theta_hat, n)?;
    Ok(FittedModel::new(spec.labels(), outcome.theta_hat, cov, link, spec)?)
}

/// `ln(1 + eˣ)` without overflow.
fn softplus(x: f64) -> f64 {
    if x > 0.0 { x + (-x).exp().ln_1p() } else { x.exp().ln_1p() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::optimizer::finite_diff::central_grad;
    use crate::margins::data::Column;
    use crate::numerical_stability::{normal_quantile, safe_logit};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Analytic score against finite differences for every supported link.
    // - Closed-form MLE and covariance of a saturated two-group model.
    // - Rejection of unsupported links and non-binary responses.
    //
    // They intentionally DO NOT cover:
    // - Marginal effects on the fitted model (integration tests).
    // -------------------------------------------------------------------------

    /// Two groups of ten: 3 successes in `a`, 7 in `b`.
    fn two_group_data() -> (Dataset, Array1<f64>) {
        let mut groups = Vec::new();
        let mut y = Vec::new();
        for (label, successes) in [("a", 3), ("b", 7)] {
            for i in 0..10 {
                groups.push(label);
                y.push(if i < successes { 1.0 } else { 0.0 });
            }
        }
        let data = Dataset::from_columns(vec![("g", Column::categorical(&groups))])
            .expect("valid dataset");
        (data, Array1::from(y))
    }

    #[test]
    // Purpose
    // -------
    // The analytic score equals the finite-difference gradient of `value`.
    //
    // Given
    // -----
    // - A 3-column design, a mixed response and θ = (0.2, -0.4, 0.7).
    //
    // Expect
    // ------
    // - Agreement within 1e-6 for logit, probit and cloglog.
    fn score_matches_finite_differences_for_each_link() {
        // Arrange
        let bin = BinaryData {
            x: array![[1.0, 0.5, -1.0], [1.0, -0.3, 0.2], [1.0, 1.2, 0.4], [1.0, -0.8, -0.6]],
            y: array![1.0, 0.0, 1.0, 0.0],
        };
        let theta = array![0.2, -0.4, 0.7];

        for link in [Link::Logit, Link::Probit, Link::Cloglog] {
            let lik = BinaryLikelihood::new(link).expect("binary link");

            // Act
            let analytic = lik.grad(&theta, &bin).expect("score");
            let numeric = central_grad(&theta, &|t: &Theta| lik.value(t, &bin)).expect("fd");

            // Assert
            for (a, n) in analytic.iter().zip(numeric.iter()) {
                assert_abs_diff_eq!(*a, *n, epsilon = 1e-6);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // A saturated logit recovers group log-odds and their textbook variances.
    //
    // Given
    // -----
    // - Group rates 0.3 and 0.7 with ten observations each.
    //
    // Expect
    // ------
    // - Intercept = logit(0.3), slope = logit(0.7) - logit(0.3).
    // - Var(intercept) = 1/(10·0.21); Var(slope) = 2/(10·0.21).
    fn fit_binary_logit_matches_saturated_closed_form() {
        // Arrange
        let (data, y) = two_group_data();
        let spec = LinearSpec::from_formula("g", &data).expect("valid formula");

        // Act
        let model = fit_binary(&data, &y, spec, Link::Logit, &MLEOptions::default())
            .expect("identified fit");

        // Assert
        let b = model.coefficients();
        let v = model.covariance();
        assert_abs_diff_eq!(b[0], safe_logit(0.3), epsilon = 1e-4);
        assert_abs_diff_eq!(b[1], safe_logit(0.7) - safe_logit(0.3), epsilon = 1e-4);
        assert_abs_diff_eq!(v[[0, 0]], 1.0 / 2.1, epsilon = 1e-3);
        assert_abs_diff_eq!(v[[1, 1]], 2.0 / 2.1, epsilon = 1e-3);
        assert_abs_diff_eq!(v[[0, 1]], -1.0 / 2.1, epsilon = 1e-3);
        assert_eq!(model.df_residual(), None);
    }

    #[test]
    // Purpose
    // -------
    // The probit fit of the same data recovers group normal quantiles.
    //
    // Given
    // -----
    // - Group rates 0.3 and 0.7.
    //
    // Expect
    // ------
    // - Intercept = Φ⁻¹(0.3), slope = Φ⁻¹(0.7) - Φ⁻¹(0.3).
    fn fit_binary_probit_matches_group_quantiles() {
        // Arrange
        let (data, y) = two_group_data();
        let spec = LinearSpec::from_formula("g", &data).expect("valid formula");

        // Act
        let model = fit_binary(&data, &y, spec, Link::Probit, &MLEOptions::default())
            .expect("identified fit");

        // Assert
        let b = model.coefficients();
        assert_abs_diff_eq!(b[0], normal_quantile(0.3), epsilon = 1e-4);
        assert_abs_diff_eq!(b[1], normal_quantile(0.7) - normal_quantile(0.3), epsilon = 1e-4);
    }

    #[test]
    // Purpose
    // -------
    // Invalid family / response combinations fail before optimizing.
    //
    // Given
    // -----
    // - The log link, and a response containing 0.5.
    //
    // Expect
    // ------
    // - `UnsupportedLink` and `NonBinaryResponse { index: 0 }`.
    fn fit_binary_rejects_bad_link_and_response() {
        // Arrange
        let (data, mut y) = two_group_data();
        let spec = LinearSpec::from_formula("g", &data).expect("valid formula");

        // Act
        let link_err =
            fit_binary(&data, &y, spec.clone(), Link::Log, &MLEOptions::default()).unwrap_err();
        y[0] = 0.5;
        let resp_err = fit_binary(&data, &y, spec, Link::Logit, &MLEOptions::default()).unwrap_err();

        // Assert
        assert!(matches!(link_err, FitError::UnsupportedLink { name: "log", .. }));
        assert_eq!(resp_err, FitError::NonBinaryResponse { index: 0, value: 0.5 });
    }
}
