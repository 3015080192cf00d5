//! High-level entry points: one request in, a list of [`Estimate`]s out.
//!
//! A request names the target (prediction, slope or comparison), the grid,
//! the averaging policy and the inference settings explicitly; [`compute`]
//! runs grid construction, per-row evaluation and aggregation in that order
//! and attaches delta-method uncertainty from the model covariance.
//! [`Margins`] binds a model and dataset once and exposes the common
//! requests (AME, MEM, average and grid predictions, comparisons) plus the
//! contrast helpers.
use crate::margins::{
    contrast::{ContrastFn, PairOrder, contrast, contrast_weights, pairwise},
    data::Dataset,
    effects::{aggregate, evaluate},
    errors::MarginsResult,
    estimate::Estimate,
    grid::{GridSpec, build_grid},
    model::{FittedModel, LinearPredictor},
    options::{
        AveragingPolicy, Change, EffectOptions, GridPolicy, InferenceOptions, Target, TypicalOptions,
    },
    uncertainty::DeltaMethod,
};
use ndarray::Array1;

/// `Request` — a fully specified marginal-effects computation.
///
/// Defaults (via [`Request::new`])
/// -------------------------------
/// - empty grid spec; grid policy derived from `averaging`
///   ([`AveragingPolicy::default_grid`]).
/// - `averaging = MeanOfPredictions`, no `by` grouping.
/// - default [`EffectOptions`], [`InferenceOptions`] and [`TypicalOptions`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub target: Target,
    pub grid: GridSpec,
    pub grid_policy: Option<GridPolicy>,
    pub averaging: AveragingPolicy,
    pub by: Vec<String>,
    pub effect: EffectOptions,
    pub inference: InferenceOptions,
    pub typical: TypicalOptions,
}

impl Request {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            grid: GridSpec::new(),
            grid_policy: None,
            averaging: AveragingPolicy::default(),
            by: Vec::new(),
            effect: EffectOptions::default(),
            inference: InferenceOptions::default(),
            typical: TypicalOptions::default(),
        }
    }

    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_grid_policy(mut self, policy: GridPolicy) -> Self {
        self.grid_policy = Some(policy);
        self
    }

    pub fn with_averaging(mut self, averaging: AveragingPolicy) -> Self {
        self.averaging = averaging;
        self
    }

    pub fn by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_effect(mut self, effect: EffectOptions) -> Self {
        self.effect = effect;
        self
    }

    pub fn with_inference(mut self, inference: InferenceOptions) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_typical(mut self, typical: TypicalOptions) -> Self {
        self.typical = typical;
        self
    }

    /// The explicit grid policy, or the averaging policy's default.
    pub fn resolved_grid_policy(&self) -> GridPolicy {
        self.grid_policy.unwrap_or_else(|| self.averaging.default_grid(!self.grid.is_empty()))
    }
}

/// Run one request against a fitted model and dataset.
///
/// # Behavior
/// - Resolves the reference distribution from `request.inference` and the
///   model's residual df.
/// - Builds the grid, evaluates the target on every row, aggregates under
///   `request.averaging` and attaches delta-method uncertainty.
///
/// # Errors
/// Any fatal `MarginsError` from the grid builder, the effect engine or the
/// aggregation step. An ill-conditioned covariance is not an error: the
/// estimates carry point values and `issue` instead of standard errors.
pub fn compute<P: LinearPredictor>(
    model: &FittedModel<P>, data: &Dataset, request: &Request,
) -> MarginsResult<Vec<Estimate>> {
    let policy = request.resolved_grid_policy();
    log::debug!(
        "computing {:?} with {:?} averaging on a {:?} grid",
        request.target,
        request.averaging,
        policy
    );
    let grid = build_grid(data, &request.grid, policy, &request.typical)?;
    let effects = evaluate(model, &grid, &request.target, &request.effect, request.inference.gradient)?;
    let delta = DeltaMethod::new(model.covariance(), request.inference.resolve(model.df_residual()));
    aggregate(&grid, &effects, request.averaging, &request.by, &delta)
}

/// `Margins` — a fitted model and its dataset, borrowed for a session of
/// requests.
#[derive(Debug, Clone)]
pub struct Margins<'a, P> {
    model: &'a FittedModel<P>,
    data: &'a Dataset,
    inference: InferenceOptions,
}

impl<'a, P: LinearPredictor> Margins<'a, P> {
    pub fn new(model: &'a FittedModel<P>, data: &'a Dataset) -> Self {
        Self { model, data, inference: InferenceOptions::default() }
    }

    /// Inference settings used by every request of this session.
    pub fn with_inference(mut self, inference: InferenceOptions) -> Self {
        self.inference = inference;
        self
    }

    pub fn model(&self) -> &FittedModel<P> {
        self.model
    }

    pub fn data(&self) -> &Dataset {
        self.data
    }

    /// Run a request; the session's inference settings replace the request's.
    pub fn compute(&self, request: Request) -> MarginsResult<Vec<Estimate>> {
        compute(self.model, self.data, &request.with_inference(self.inference))
    }

    /// Average marginal effect (AME) of `predictor` over the dataset.
    pub fn avg_slopes(&self, predictor: &str) -> MarginsResult<Vec<Estimate>> {
        self.compute(Request::new(Target::slope(predictor)))
    }

    /// Marginal effect of `predictor` at typical values (MEM).
    pub fn slopes_at_mean(&self, predictor: &str) -> MarginsResult<Vec<Estimate>> {
        self.compute(
            Request::new(Target::slope(predictor)).with_averaging(AveragingPolicy::PredictionAtMean),
        )
    }

    /// Average prediction, optionally per group of `by`.
    pub fn avg_predictions(&self, by: &[&str]) -> MarginsResult<Vec<Estimate>> {
        self.compute(Request::new(Target::Prediction).by(by.iter().copied()))
    }

    /// One prediction per row of a typical-value grid.
    pub fn predictions(&self, grid: GridSpec) -> MarginsResult<Vec<Estimate>> {
        self.compute(
            Request::new(Target::Prediction)
                .with_grid(grid)
                .with_averaging(AveragingPolicy::PredictionOnGrid),
        )
    }

    /// Average comparison of `predictor` under `change`.
    pub fn avg_comparisons(&self, predictor: &str, change: Change) -> MarginsResult<Vec<Estimate>> {
        self.compute(Request::new(Target::Comparison { predictor: predictor.to_string(), change }))
    }

    /// Model coefficients as estimates, with unit parameter gradients.
    pub fn coefficients(&self) -> MarginsResult<Vec<Estimate>> {
        let delta = self.delta();
        let p = self.model.coefficients().len();
        self.model
            .names()
            .iter()
            .zip(self.model.coefficients().iter())
            .enumerate()
            .map(|(i, (name, &value))| -> MarginsResult<Estimate> {
                let mut gradient = Array1::<f64>::zeros(p);
                gradient[i] = 1.0;
                Ok(delta.estimate(value, gradient)?.with_labels(name, "", Vec::new(), Vec::new()))
            })
            .collect()
    }

    /// Differences (or ratios) between estimates of this session.
    pub fn pairwise(
        &self, estimates: &[Estimate], order: PairOrder, func: ContrastFn,
    ) -> MarginsResult<Vec<Estimate>> {
        pairwise(estimates, order, func, &self.delta())
    }

    /// Linear hypothesis over estimates, e.g. `"b2 - b1"`.
    pub fn hypothesis(&self, estimates: &[Estimate], expression: &str) -> MarginsResult<Estimate> {
        contrast(estimates, expression, &self.delta())
    }

    /// Weighted sum of estimates.
    pub fn weighted(
        &self, estimates: &[Estimate], weights: &[f64], label: &str,
    ) -> MarginsResult<Estimate> {
        contrast_weights(estimates, weights, label, &self.delta())
    }

    fn delta(&self) -> DeltaMethod<'a> {
        DeltaMethod::new(self.model.covariance(), self.inference.resolve(self.model.df_residual()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margins::{
        data::Column,
        design::LinearSpec,
        errors::MarginsError,
        model::Link,
        options::{DfPolicy, GradientMethod},
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Grid policy defaults per averaging policy.
    // - The session helpers (AME, MEM, grouped and grid predictions,
    //   comparisons, coefficients, hypotheses).
    // - The recoverable ill-conditioned covariance path end to end.
    // -------------------------------------------------------------------------

    fn data() -> Dataset {
        let x: Vec<f64> = (0..9).map(|i| 0.5 * i as f64).collect();
        let g: Vec<&str> = (0..9).map(|i| ["a", "b", "c"][i % 3]).collect();
        Dataset::from_columns(vec![("x", Column::Numeric(x)), ("g", Column::categorical(&g))])
            .unwrap()
    }

    fn model(cov: Array2<f64>) -> FittedModel<LinearSpec> {
        let spec = LinearSpec::from_coefficient_names(&["(Intercept)", "x", "g[b]", "g[c]"]).unwrap();
        FittedModel::new(spec.labels(), array![1.0, 0.5, 2.0, -1.0], cov, Link::Identity, spec)
            .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Check grid policy resolution.
    //
    // Given
    // -----
    // - AME with and without listed values; MEM; an explicit policy.
    //
    // Expect
    // ------
    // - AsIs, Counterfactual, Typical, the explicit policy.
    fn request_resolves_grid_policy() {
        let ame = Request::new(Target::Prediction);
        assert_eq!(ame.resolved_grid_policy(), GridPolicy::AsIs);
        let listed = ame.clone().with_grid(GridSpec::new().observed("g"));
        assert_eq!(listed.resolved_grid_policy(), GridPolicy::Counterfactual);
        let mem = ame.clone().with_averaging(AveragingPolicy::PredictionAtMean);
        assert_eq!(mem.resolved_grid_policy(), GridPolicy::Typical);
        let explicit = mem.with_grid_policy(GridPolicy::AsIs);
        assert_eq!(explicit.resolved_grid_policy(), GridPolicy::AsIs);
    }

    #[test]
    // Purpose
    // -------
    // Session helpers return the closed-form values of a linear model.
    //
    // Given
    // -----
    // - η = 1 + 0.5x + 2·g[b] − g[c], diagonal covariance, residual df 5.
    //
    // Expect
    // ------
    // - AME = MEM = 0.5; average prediction by g is 1 + 0.5·mean(x_g) +
    //   offset; grid predictions at x ∈ {0, 2} are 1 and 2 (g at "a").
    fn session_helpers_match_closed_form() {
        // Arrange
        let d = data();
        let m = model(Array2::eye(4) * 0.01).with_df_residual(5.0).unwrap();
        let margins = Margins::new(&m, &d);

        // Act
        let ame = margins.avg_slopes("x").unwrap();
        let mem = margins.slopes_at_mean("x").unwrap();
        let by_g = margins.avg_predictions(&["g"]).unwrap();
        let grid = margins.predictions(GridSpec::new().values("x", vec![0.0, 2.0])).unwrap();

        // Assert
        assert_abs_diff_eq!(ame[0].estimate, 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(mem[0].estimate, 0.5, epsilon = 1e-8);
        assert_eq!(ame[0].label, "x dY/dX");
        assert_eq!(by_g.len(), 3);
        assert_abs_diff_eq!(by_g[0].estimate, 1.0 + 0.5 * 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(by_g[1].estimate, 1.0 + 0.5 * 2.0 + 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(by_g[2].estimate, 1.0 + 0.5 * 2.5 - 1.0, epsilon = 1e-12);
        assert_eq!(grid.len(), 2);
        assert_abs_diff_eq!(grid[0].estimate, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid[1].estimate, 2.0, epsilon = 1e-12);
        assert_eq!(grid[1].label, "prediction [x=2]");
        // t(5) interval is wider than the normal one.
        let se = ame[0].std_error.unwrap();
        assert!(ame[0].conf_high.unwrap() - ame[0].estimate > 1.96 * se);
    }

    #[test]
    // Purpose
    // -------
    // Counterfactual averages per level and hypotheses on them.
    //
    // Given
    // -----
    // - Average predictions with g set to each level on every row.
    //
    // Expect
    // ------
    // - Three estimates differing by the level coefficients; "b2 - b1" = 2
    //   with SE sqrt(Var(g[b])) = 0.1.
    fn counterfactual_predictions_and_hypothesis() {
        let d = data();
        let m = model(Array2::eye(4) * 0.01);
        let margins = Margins::new(&m, &d)
            .with_inference(InferenceOptions::new(0.95, DfPolicy::Normal, GradientMethod::Auto, 0.0).unwrap());

        let est = margins
            .compute(Request::new(Target::Prediction).with_grid(GridSpec::new().observed("g")))
            .unwrap();
        let diff = margins.hypothesis(&est, "b2 - b1").unwrap();

        assert_eq!(est.len(), 3);
        assert_eq!(est[0].rows.len(), d.len());
        assert_eq!(est[1].group, vec![("g".to_string(), "b".to_string())]);
        assert_abs_diff_eq!(diff.estimate, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(diff.std_error.unwrap(), 0.1, epsilon = 1e-12);

        let pairs = margins.pairwise(&est, PairOrder::Pairwise, ContrastFn::Difference).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_abs_diff_eq!(pairs[2].estimate, -3.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Coefficients as estimates reproduce the model's own standard errors.
    //
    // Given
    // -----
    // - Diagonal covariance with variances 0.01, 0.04, 0.09, 0.16.
    //
    // Expect
    // ------
    // - SEs 0.1, 0.2, 0.3, 0.4; labels are the coefficient names.
    fn coefficients_carry_model_standard_errors() {
        let d = data();
        let m = model(Array2::from_diag(&array![0.01, 0.04, 0.09, 0.16]));

        let coefs = Margins::new(&m, &d).coefficients().unwrap();

        for (k, c) in coefs.iter().enumerate() {
            assert_abs_diff_eq!(c.std_error.unwrap(), 0.1 * (k + 1) as f64, epsilon = 1e-12);
            assert_eq!(c.label, m.names()[k]);
        }
    }

    #[test]
    // Purpose
    // -------
    // A singular covariance keeps point estimates and drops inference.
    //
    // Given
    // -----
    // - A rank-deficient covariance.
    //
    // Expect
    // ------
    // - AME = 0.5 with `std_error = None` and an ill-conditioned issue.
    fn singular_covariance_keeps_point_estimates() {
        let d = data();
        let m = model(Array2::ones((4, 4)));

        let ame = Margins::new(&m, &d).avg_slopes("x").unwrap();

        assert_abs_diff_eq!(ame[0].estimate, 0.5, epsilon = 1e-8);
        assert!(ame[0].std_error.is_none());
        assert!(matches!(ame[0].issue, Some(MarginsError::IllConditionedCovariance { .. })));
    }
}
