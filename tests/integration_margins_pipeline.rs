//! Integration tests for the fit → grid → effect → contrast pipeline.
//!
//! Purpose
//! -------
//! - Validate end-to-end behavior: fitting reference models, building
//!   reference grids, evaluating slopes, predictions and comparisons, and
//!   combining results into contrasts with delta-method inference.
//! - Check the averaging properties that distinguish AME from MEM on
//!   linear and nonlinear models, using closed forms wherever they exist.
//!
//! Coverage
//! --------
//! - `estimation::fit_ols` and `estimation::fit_binary` as model sources.
//! - `margins::Margins` session helpers: `avg_slopes`, `slopes_at_mean`,
//!   `avg_predictions`, `avg_comparisons`, `pairwise`, `hypothesis`.
//! - `margins::compute` with counterfactual grids, analytic vs
//!   finite-difference derivatives and finite-difference parameter
//!   gradients.
//! - Ill-conditioned covariance handling through the public surface.
//!
//! Exclusions
//! ----------
//! - Low-level building blocks (term parsing, level coding, Student-t
//!   quantiles, expression parsing); those are covered by unit tests.
//! - Python bindings, which need an interpreter.
use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, array};
use rust_margins::{
    estimation::{MLEOptions, fit_binary, fit_ols},
    margins::{
        AveragingPolicy, Change, Column, ContrastFn, Dataset, DerivativeMethod, DfPolicy,
        EffectOptions, FittedModel, GradientMethod, GridPolicy, GridSpec, InferenceOptions,
        LinearSpec, Link, Margins, MarginsError, PairOrder, PredictionScale, Request, StepPolicy,
        Target, TypicalOptions, build_grid, compute,
    },
};

/// Purpose
/// -------
/// Provide a 20-row dataset with a numeric predictor `x = i / 2` and a
/// categorical predictor `g` cycling through levels `a`, `b`, `c`.
///
/// Returns
/// -------
/// - `(data, x)` where `x` is the numeric column as an array, handy for
///   closed-form expectations.
fn make_mixed_data() -> (Dataset, Array1<f64>) {
    let x: Vec<f64> = (0..20).map(|i| i as f64 / 2.0).collect();
    let g: Vec<&str> = (0..20).map(|i| ["a", "b", "c"][i % 3]).collect();
    let data = Dataset::from_columns(vec![
        ("x", Column::Numeric(x.clone())),
        ("g", Column::categorical(&g)),
    ])
    .expect("Dataset::from_columns should accept equally long columns");
    (data, Array1::from(x))
}

/// Purpose
/// -------
/// Quadratic model `y = 1.5 + 3x − 0.5x²` with known coefficients and a
/// small diagonal covariance.
///
/// Invariants
/// ----------
/// - The slope at row `i` is `3 − x_i`, so the AME is `3 − mean(x)`.
fn quadratic_model() -> FittedModel<LinearSpec> {
    let names = ["(Intercept)", "x", "I(x^2)"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("coefficient names should parse");
    let cov = Array2::from_diag(&array![0.04, 0.01, 0.0004]);
    FittedModel::new(names.to_vec(), array![1.5, 3.0, -0.5], cov, Link::Identity, spec)
        .expect("quadratic model should assemble")
}

/// Purpose
/// -------
/// Logistic data with five design points and ten trials each; success
/// counts `[2, 3, 5, 7, 8]` are symmetric around `x = 0`, so the MLE has
/// a zero intercept and the observed success rate is exactly 0.5.
fn make_logistic_data() -> (Dataset, Array1<f64>) {
    let points = [-2.0, -1.0, 0.0, 1.0, 2.0];
    let successes = [2, 3, 5, 7, 8];
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (&xv, &k) in points.iter().zip(successes.iter()) {
        for trial in 0..10 {
            x.push(xv);
            y.push(if trial < k { 1.0 } else { 0.0 });
        }
    }
    let data = Dataset::from_columns(vec![("x", Column::Numeric(x))])
        .expect("Dataset::from_columns should accept a single column");
    (data, Array1::from(y))
}

fn logistic(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

#[test]
// Purpose
// -------
// OLS recovers the quadratic coefficients, and the AME of `x` matches the
// closed form `mean(3 − x_i)` when evaluated with the true coefficients.
//
// Given
// -----
// - `y_i = 1.5 + 3x_i − 0.5x_i² + 0.1·sin(i)` on the 20-row dataset.
// - The formula `x + I(x^2)`.
//
// Expect
// ------
// - Fitted coefficients within a small tolerance of the truth and a
//   residual df of 17.
// - With the true coefficients, AME = MEM = 3 − 4.75 = −1.75 to 1e-6.
// - The fitted model's AME interval brackets its point estimate.
fn quadratic_ame_matches_closed_form_and_ols_recovers_coefficients() {
    let (data, x) = make_mixed_data();
    let y = Array1::from_iter(
        x.iter().enumerate().map(|(i, &xv)| 1.5 + 3.0 * xv - 0.5 * xv * xv + 0.1 * (i as f64).sin()),
    );
    let spec = LinearSpec::from_formula("x + I(x^2)", &data).expect("formula should expand");
    let fitted = fit_ols(&data, &y, spec).expect("OLS should fit a full-rank design");

    let beta = fitted.coefficients();
    assert_abs_diff_eq!(beta[0], 1.5, epsilon = 0.15);
    assert_abs_diff_eq!(beta[1], 3.0, epsilon = 0.05);
    assert_abs_diff_eq!(beta[2], -0.5, epsilon = 0.01);
    assert_eq!(fitted.df_residual(), Some(17.0));

    let truth = quadratic_model();
    let session = Margins::new(&truth, &data);
    let expected = x.iter().map(|&xv| 3.0 - xv).sum::<f64>() / x.len() as f64;
    let ame = session.avg_slopes("x").expect("AME should compute");
    let mem = session.slopes_at_mean("x").expect("MEM should compute");
    assert_eq!(ame.len(), 1);
    assert_abs_diff_eq!(ame[0].estimate, expected, epsilon = 1e-6);
    assert_abs_diff_eq!(mem[0].estimate, expected, epsilon = 1e-6);

    let fitted_ame = Margins::new(&fitted, &data).avg_slopes("x").expect("fitted AME");
    let est = &fitted_ame[0];
    let (lo, hi) = (est.conf_low.expect("CI low"), est.conf_high.expect("CI high"));
    assert!(est.std_error.expect("SE") > 0.0);
    assert!(lo < est.estimate && est.estimate < hi);
}

#[test]
// Purpose
// -------
// On an identity-link model linear in `x`, AME and MEM both equal the
// coefficient, and the standard error equals the coefficient's.
//
// Given
// -----
// - `y = 2 + 0.7x` with Var(β_x) = 0.09.
//
// Expect
// ------
// - AME = MEM = 0.7 and SE = 0.3.
fn linear_model_ame_and_mem_equal_coefficient() {
    let (data, _) = make_mixed_data();
    let names = ["(Intercept)", "x"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("names parse");
    let cov = array![[0.25, 0.0], [0.0, 0.09]];
    let model = FittedModel::new(names.to_vec(), array![2.0, 0.7], cov, Link::Identity, spec)
        .expect("linear model should assemble");
    let session = Margins::new(&model, &data);

    let ame = session.avg_slopes("x").unwrap();
    let mem = session.slopes_at_mean("x").unwrap();
    for est in ame.iter().chain(mem.iter()) {
        assert_abs_diff_eq!(est.estimate, 0.7, epsilon = 1e-8);
        assert_abs_diff_eq!(est.std_error.unwrap(), 0.3, epsilon = 1e-6);
    }
}

#[test]
// Purpose
// -------
// On a fitted logit model, the AME and MEM differ, and each matches its
// closed form computed from the fitted coefficients.
//
// Given
// -----
// - Symmetric grouped binary data (see `make_logistic_data`).
// - `fit_binary` with the logit link and default optimizer options.
//
// Expect
// ------
// - Intercept ≈ 0 and average prediction ≈ 0.5.
// - AME = mean(β μ_i(1 − μ_i)); MEM = β / 4 at x̄ = 0; AME < MEM.
fn logistic_ame_differs_from_mem() {
    let (data, y) = make_logistic_data();
    let spec = LinearSpec::from_formula("x", &data).expect("formula should expand");
    let fitted = fit_binary(&data, &y, spec, Link::Logit, &MLEOptions::default())
        .expect("logit fit should converge on non-separable data");
    let (a, b) = (fitted.coefficients()[0], fitted.coefficients()[1]);
    assert_abs_diff_eq!(a, 0.0, epsilon = 1e-4);
    assert!(b > 0.0);

    let session = Margins::new(&fitted, &data);
    let x = data.numeric_column("x").expect("x is numeric");
    let ame_expected =
        x.iter().map(|&xv| b * logistic(a + b * xv) * (1.0 - logistic(a + b * xv))).sum::<f64>()
            / x.len() as f64;
    let mem_expected = b * logistic(a) * (1.0 - logistic(a));

    let ame = session.avg_slopes("x").unwrap()[0].estimate;
    let mem = session.slopes_at_mean("x").unwrap()[0].estimate;
    assert_abs_diff_eq!(ame, ame_expected, epsilon = 1e-6);
    assert_abs_diff_eq!(mem, mem_expected, epsilon = 1e-6);
    assert!(ame < mem - 1e-3);

    let avg = session.avg_predictions(&[]).unwrap();
    assert_abs_diff_eq!(avg[0].estimate, 0.5, epsilon = 1e-4);
}

#[test]
// Purpose
// -------
// Counterfactual grids replicate every row for each listed value, and
// averaging by the listed predictor yields one estimate per value.
//
// Given
// -----
// - The 20-row dataset and `x ∈ {0, 5, 9}`.
// - The quadratic model, whose prediction depends on `x` only.
//
// Expect
// ------
// - `build_grid` yields 60 rows.
// - Averaged predictions by `x` are 1.5, 4.0 and −11.0 in value order.
fn counterfactual_grid_has_n_times_k_rows() {
    let (data, _) = make_mixed_data();
    let spec = GridSpec::new().values("x", vec![0.0, 5.0, 9.0]);
    let grid = build_grid(&data, &spec, GridPolicy::Counterfactual, &TypicalOptions::default())
        .expect("counterfactual grid should build");
    assert_eq!(grid.len(), 60);

    let model = quadratic_model();
    let request = Request::new(Target::Prediction).with_grid(spec).by(["x"]);
    assert_eq!(request.resolved_grid_policy(), GridPolicy::Counterfactual);
    let estimates = compute(&model, &data, &request).expect("counterfactual predictions");
    let values: Vec<f64> = estimates.iter().map(|e| e.estimate).collect();
    assert_eq!(values.len(), 3);
    assert_abs_diff_eq!(values[0], 1.5, epsilon = 1e-10);
    assert_abs_diff_eq!(values[1], 4.0, epsilon = 1e-10);
    assert_abs_diff_eq!(values[2], -11.0, epsilon = 1e-10);
}

#[test]
// Purpose
// -------
// Group means, level comparisons, pairwise contrasts and a hypothesis
// agree with the coefficients of a treatment-coded model.
//
// Given
// -----
// - `y = 1 + 2·g[b] + 5·g[c]`, Σ = 0.04·I, residual df 17.
//
// Expect
// ------
// - Predictions by `g`: 1, 3, 6.
// - Level comparisons vs `a`: 2 and 5.
// - C(3, 2) = 3 pairwise differences (2, 5, 3) each with a standard
//   error; `b − a` has SE 0.2 and `c − b` has SE √0.08.
// - The difference in differences `(b3 − b2) − (b2 − b1)` is 1.
fn categorical_means_comparisons_and_pairwise_contrasts() {
    let (data, _) = make_mixed_data();
    let names = ["(Intercept)", "g[b]", "g[c]"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("names parse");
    let cov = Array2::from_diag(&array![0.04, 0.04, 0.04]);
    let model = FittedModel::new(names.to_vec(), array![1.0, 2.0, 5.0], cov, Link::Identity, spec)
        .and_then(|m| m.with_df_residual(17.0))
        .expect("categorical model should assemble");
    let session = Margins::new(&model, &data);

    let means = session.avg_predictions(&["g"]).expect("predictions by g");
    let values: Vec<f64> = means.iter().map(|e| e.estimate).collect();
    assert_eq!(values.len(), 3);
    assert_abs_diff_eq!(values[0], 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(values[1], 3.0, epsilon = 1e-10);
    assert_abs_diff_eq!(values[2], 6.0, epsilon = 1e-10);

    let cmp = session
        .avg_comparisons("g", Change::Levels { baseline: None })
        .expect("level comparisons");
    assert_eq!(cmp.len(), 2);
    assert_abs_diff_eq!(cmp[0].estimate, 2.0, epsilon = 1e-10);
    assert_abs_diff_eq!(cmp[1].estimate, 5.0, epsilon = 1e-10);

    let pairs = session
        .pairwise(&means, PairOrder::Pairwise, ContrastFn::Difference)
        .expect("pairwise differences");
    assert_eq!(pairs.len(), 3);
    assert!(pairs.iter().all(|p| p.std_error.is_some()));
    assert_abs_diff_eq!(pairs[0].estimate, 2.0, epsilon = 1e-10);
    assert_abs_diff_eq!(pairs[0].std_error.unwrap(), 0.2, epsilon = 1e-10);
    assert_abs_diff_eq!(pairs[1].estimate, 5.0, epsilon = 1e-10);
    assert_abs_diff_eq!(pairs[2].estimate, 3.0, epsilon = 1e-10);
    assert_abs_diff_eq!(pairs[2].std_error.unwrap(), 0.08_f64.sqrt(), epsilon = 1e-10);

    let dd = session.hypothesis(&means, "(b3 - b2) - (b2 - b1)").expect("difference in differences");
    assert_abs_diff_eq!(dd.estimate, 1.0, epsilon = 1e-10);
    assert!(dd.std_error.is_some());
}

#[test]
// Purpose
// -------
// Central-difference slopes and finite-difference parameter gradients
// converge to their analytic counterparts on a nonlinear model.
//
// Given
// -----
// - A probit model `Φ(0.3 − 0.2x)` on the 20-row dataset.
// - AME computed with analytic derivatives and analytic gradients, and
//   again with central differences and finite-difference gradients.
//
// Expect
// ------
// - Point estimates agree to 1e-6 and standard errors to 1e-5.
fn finite_difference_slopes_converge_to_analytic() {
    let (data, _) = make_mixed_data();
    let names = ["(Intercept)", "x"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("names parse");
    let cov = array![[0.02, -0.003], [-0.003, 0.001]];
    let model = FittedModel::new(names.to_vec(), array![0.3, -0.2], cov, Link::Probit, spec)
        .expect("probit model should assemble");

    let analytic_effect =
        EffectOptions::new(PredictionScale::Response, StepPolicy::default(), DerivativeMethod::Analytic)
            .unwrap();
    let fd_inference =
        InferenceOptions::new(0.95, DfPolicy::Normal, GradientMethod::FiniteDifference, 0.0)
            .unwrap();

    let analytic =
        compute(&model, &data, &Request::new(Target::slope("x")).with_effect(analytic_effect))
            .expect("analytic AME");
    let numeric =
        compute(&model, &data, &Request::new(Target::slope("x")).with_inference(fd_inference))
            .expect("finite-difference AME");

    assert_abs_diff_eq!(analytic[0].estimate, numeric[0].estimate, epsilon = 1e-6);
    assert_abs_diff_eq!(
        analytic[0].std_error.unwrap(),
        numeric[0].std_error.unwrap(),
        epsilon = 1e-5
    );
}

#[test]
// Purpose
// -------
// An indefinite covariance does not fail the request: point estimates
// are returned and inference is withheld with the reason recorded.
//
// Given
// -----
// - A linear model whose covariance has eigenvalues 1 and −1.
//
// Expect
// ------
// - AME = coefficient, `std_error` / `conf_low` / `conf_high` are `None`,
//   and `issue` is `IllConditionedCovariance`.
fn indefinite_covariance_withholds_inference() {
    let (data, _) = make_mixed_data();
    let names = ["(Intercept)", "x"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("names parse");
    let cov = array![[1.0, 0.0], [0.0, -1.0]];
    let model = FittedModel::new(names.to_vec(), array![2.0, 0.7], cov, Link::Identity, spec)
        .expect("model assembly does not screen the covariance");

    let est = &Margins::new(&model, &data).avg_slopes("x").expect("AME still computes")[0];
    assert_abs_diff_eq!(est.estimate, 0.7, epsilon = 1e-8);
    assert!(est.std_error.is_none() && est.conf_low.is_none() && est.conf_high.is_none());
    assert!(matches!(est.issue, Some(MarginsError::IllConditionedCovariance { .. })));
}

#[test]
// Purpose
// -------
// A typical-value grid evaluates predictions at the mean of `x` and each
// listed level of `g`, one estimate per grid row.
//
// Given
// -----
// - The categorical model `y = 1 + 2·g[b] + 5·g[c]`.
// - Grid with `g ∈ {a, c}`; `x` is not read by the model.
//
// Expect
// ------
// - Two estimates, 1 and 6, under the explicit `PredictionOnGrid`
//   averaging the `predictions` helper uses.
fn typical_grid_predictions_per_row() {
    let (data, _) = make_mixed_data();
    let names = ["(Intercept)", "g[b]", "g[c]"];
    let spec = LinearSpec::from_coefficient_names(&names).expect("names parse");
    let cov = Array2::from_diag(&array![0.04, 0.04, 0.04]);
    let model = FittedModel::new(names.to_vec(), array![1.0, 2.0, 5.0], cov, Link::Identity, spec)
        .expect("categorical model should assemble");

    let grid = GridSpec::new().values("g", vec!["a".to_string(), "c".to_string()]);
    let request = Request::new(Target::Prediction)
        .with_grid(grid.clone())
        .with_averaging(AveragingPolicy::PredictionOnGrid);
    assert_eq!(request.resolved_grid_policy(), GridPolicy::Typical);

    let estimates = Margins::new(&model, &data).predictions(grid).expect("grid predictions");
    assert_eq!(estimates.len(), 2);
    assert_abs_diff_eq!(estimates[0].estimate, 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(estimates[1].estimate, 6.0, epsilon = 1e-10);
}
