//! estimation::ols — ordinary least squares for linear-in-parameter specs.
//!
//! `β̂ = (XᵀX)⁻¹Xᵀy` with one step of iterative refinement, residual
//! variance `σ̂² = RSS / (n − p)` and `Var(β̂) = σ̂²(XᵀX)⁻¹`. The fitted
//! model carries `df_residual = n − p` so intervals default to Student-t.
use crate::estimation::{
    covariance::{check_full_rank, pseudo_inverse},
    errors::{FitError, FitResult},
};
use crate::margins::{
    data::Dataset,
    design::LinearSpec,
    model::{FittedModel, Link},
};
use ndarray::Array1;

/// Fit `y ~ spec` by least squares.
///
/// # Errors
/// - `EmptyData`, `ResponseLengthMismatch`, `InvalidResponse`.
/// - `InsufficientObservations` when `n ≤ p`.
/// - `RankDeficient` when `XᵀX` is numerically singular.
/// - `Model` for design-row failures (missing or mistyped predictors).
pub fn fit_ols(
    data: &Dataset, y: &Array1<f64>, spec: LinearSpec,
) -> FitResult<FittedModel<LinearSpec>> {
    check_response(data, y)?;
    let x = spec.design_matrix(data)?;
    let (n, p) = x.dim();
    if n <= p {
        return Err(FitError::InsufficientObservations { n, p });
    }

    let xt = x.t();
    let xtx = xt.dot(&x);
    check_full_rank(&xtx)?;
    let xtx_inv = pseudo_inverse(&xtx);
    let xty = xt.dot(y);
    let mut beta = xtx_inv.dot(&xty);
    let correction = xtx_inv.dot(&(&xty - &xtx.dot(&beta)));
    beta += &correction;

    let resid = y - &x.dot(&beta);
    let df = (n - p) as f64;
    let sigma2 = resid.dot(&resid) / df;
    let cov = &xtx_inv * sigma2;
    log::debug!("OLS fit: n = {n}, p = {p}, sigma^2 = {sigma2:.6e}");

    let names = spec.labels();
    Ok(FittedModel::new(names, beta, cov, Link::Identity, spec)?.with_df_residual(df)?)
}

/// Shared response checks: non-empty data, matching length, finite entries.
pub(crate) fn check_response(data: &Dataset, y: &Array1<f64>) -> FitResult<()> {
    if data.is_empty() {
        return Err(FitError::EmptyData);
    }
    if y.len() != data.len() {
        return Err(FitError::ResponseLengthMismatch { expected: data.len(), found: y.len() });
    }
    if let Some((index, &value)) = y.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(FitError::InvalidResponse { index, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margins::data::Column;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Coefficients, residual variance and covariance of a hand-computed
    //   simple regression.
    // - Rejection of bad responses and collinear designs.
    // - Polynomial terms in large units, compared with the same fit in
    //   rescaled units.
    //
    // They intentionally DO NOT cover:
    // - Marginal effects on the fitted model (integration tests).
    // -------------------------------------------------------------------------

    fn simple_data() -> Dataset {
        Dataset::from_columns(vec![("x", Column::Numeric(vec![0.0, 1.0, 2.0, 3.0]))])
            .expect("valid dataset")
    }

    #[test]
    // Purpose
    // -------
    // OLS matches the closed-form simple-regression solution.
    //
    // Given
    // -----
    // - x = (0, 1, 2, 3), y = (1, 3, 4, 8): b = 2.2, a = 0.7, RSS = 1.8,
    //   σ̂² = 0.9, Var(a) = 0.63, Var(b) = 0.18, Cov(a, b) = -0.27.
    //
    // Expect
    // ------
    // - Those values within 1e-10 and `df_residual = 2`.
    fn fit_ols_matches_closed_form() {
        // Arrange
        let data = simple_data();
        let y = array![1.0, 3.0, 4.0, 8.0];
        let spec = LinearSpec::from_formula("x", &data).expect("valid formula");

        // Act
        let model = fit_ols(&data, &y, spec).expect("well-posed fit");

        // Assert
        let b = model.coefficients();
        let v = model.covariance();
        assert_eq!(model.names(), &["(Intercept)".to_string(), "x".to_string()]);
        assert_abs_diff_eq!(b[0], 0.7, epsilon = 1e-10);
        assert_abs_diff_eq!(b[1], 2.2, epsilon = 1e-10);
        assert_abs_diff_eq!(v[[0, 0]], 0.63, epsilon = 1e-10);
        assert_abs_diff_eq!(v[[1, 1]], 0.18, epsilon = 1e-10);
        assert_abs_diff_eq!(v[[0, 1]], -0.27, epsilon = 1e-10);
        assert_eq!(model.df_residual(), Some(2.0));
        assert_eq!(model.link(), Link::Identity);
    }

    #[test]
    // Purpose
    // -------
    // Response problems are reported before any algebra.
    //
    // Given
    // -----
    // - A 3-element response for 4 rows and a response containing NaN.
    //
    // Expect
    // ------
    // - `ResponseLengthMismatch` and `InvalidResponse { index: 2 }`.
    fn fit_ols_rejects_bad_responses() {
        // Arrange
        let data = simple_data();
        let spec = LinearSpec::from_formula("x", &data).expect("valid formula");

        // Act
        let short = fit_ols(&data, &array![1.0, 2.0, 3.0], spec.clone());
        let nan = fit_ols(&data, &array![1.0, 2.0, f64::NAN, 4.0], spec);

        // Assert
        assert_eq!(short.unwrap_err(), FitError::ResponseLengthMismatch { expected: 4, found: 3 });
        assert!(matches!(nan, Err(FitError::InvalidResponse { index: 2, .. })));
    }

    #[test]
    // Purpose
    // -------
    // Exactly collinear predictors are reported as rank deficient.
    //
    // Given
    // -----
    // - `z = 2x` alongside `x` and an intercept.
    //
    // Expect
    // ------
    // - `RankDeficient`.
    fn fit_ols_rejects_collinear_design() {
        // Arrange
        let data = Dataset::from_columns(vec![
            ("x", Column::Numeric(vec![0.0, 1.0, 2.0, 3.0, 4.0])),
            ("z", Column::Numeric(vec![0.0, 2.0, 4.0, 6.0, 8.0])),
        ])
        .expect("valid dataset");
        let y = array![1.0, 2.0, 2.5, 4.0, 5.5];
        let spec = LinearSpec::from_formula("x + z", &data).expect("valid formula");

        // Act
        let err = fit_ols(&data, &y, spec).expect_err("collinear design");

        // Assert
        assert!(matches!(err, FitError::RankDeficient { .. }));
    }

    #[test]
    // Purpose
    // -------
    // A quadratic in large units is fitted, not rejected as collinear, and
    // agrees with the same model in rescaled units.
    //
    // Given
    // -----
    // - x = 20000, 25000, …, 115000 (20 rows) and u = x / 1e4.
    // - y = 10 + 0.002x − 1e-8x² + 0.05·(−1)ⁱ.
    //
    // Expect
    // ------
    // - `x + I(x^2)` fits with `df_residual = 17`.
    // - Its coefficients equal those of `u + I(u^2)` divided by 1e4 and 1e8,
    //   and the quadratic SE matches likewise, to relative 1e-6.
    fn fit_ols_handles_polynomial_in_large_units() {
        // Arrange
        let x: Vec<f64> = (0..20).map(|i| 20000.0 + 5000.0 * i as f64).collect();
        let u: Vec<f64> = x.iter().map(|v| v / 1e4).collect();
        let y: Array1<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let noise = if i % 2 == 0 { 0.05 } else { -0.05 };
                10.0 + 0.002 * v - 1e-8 * v * v + noise
            })
            .collect();
        let data = Dataset::from_columns(vec![
            ("x", Column::Numeric(x)),
            ("u", Column::Numeric(u)),
        ])
        .expect("valid dataset");
        let raw = LinearSpec::from_formula("x + I(x^2)", &data).expect("valid formula");
        let rescaled = LinearSpec::from_formula("u + I(u^2)", &data).expect("valid formula");

        // Act
        let big = fit_ols(&data, &y, raw).expect("full-rank design in large units");
        let small = fit_ols(&data, &y, rescaled).expect("full-rank design");

        // Assert
        let (b, c) = (big.coefficients(), small.coefficients());
        assert_eq!(big.df_residual(), Some(17.0));
        assert_relative_eq!(b[0], c[0], max_relative = 1e-6);
        assert_relative_eq!(b[1], c[1] / 1e4, max_relative = 1e-6);
        assert_relative_eq!(b[2], c[2] / 1e8, max_relative = 1e-6);
        assert_relative_eq!(
            big.covariance()[[2, 2]].sqrt(),
            small.covariance()[[2, 2]].sqrt() / 1e8,
            max_relative = 1e-6
        );
    }
}
