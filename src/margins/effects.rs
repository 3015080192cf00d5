//! margins::effects — per-row predictions, slopes and comparisons, and their
//! aggregation into [`Estimate`]s.
//!
//! Purpose
//! -------
//! Evaluate a [`Target`] on every row of a [`Grid`] and summarize the
//! per-row values according to an [`AveragingPolicy`]. Every per-row value
//! carries its parameter gradient so aggregation and contrasts can attach
//! delta-method uncertainty without re-evaluating the model.
//!
//! Key behaviors
//! -------------
//! - Predictions: `s(η(θ, row))` with `s` the reporting scale
//!   ([`PredictionScale`]).
//! - Numeric slopes: central differences `(f(x + h) − f(x − h)) / 2h` with
//!   `h` resolved once per request from the [`StepPolicy`](crate::margins::options::StepPolicy),
//!   or the chain rule through `LinearPredictor::design_derivative`
//!   ([`DerivativeMethod::Analytic`]), falling back to central differences
//!   for adapters that do not provide it. Elasticities rescale the derivative
//!   by `x` and/or `1/μ`.
//! - Categorical slopes and level comparisons: prediction at each level
//!   minus prediction at the baseline level, row by row.
//! - Step comparisons: `f(x + δ) − f(x)`.
//! - Parameter gradients are analytic when the adapter implements
//!   `eta_gradient` (and [`GradientMethod::Auto`] is requested), otherwise
//!   central differences in `θ`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Rows are evaluated independently; above [`PARALLEL_THRESHOLD`] rows
//!   they are evaluated on the rayon pool and collected in row order.
//! - Group means are sequential sums in row order, so results do not depend
//!   on the thread count.
//! - `MeanOfPredictions` averages within each (term, contrast, group) cell;
//!   `PredictionAtMean` and `PredictionOnGrid` report one estimate per
//!   evaluated row.
use crate::margins::{
    data::{CovariateRow, Value},
    errors::{MarginsError, MarginsResult},
    estimate::Estimate,
    grid::Grid,
    model::{FittedModel, LinearPredictor, PredictionScale},
    options::{
        AveragingPolicy, Change, DerivativeMethod, EffectOptions, GradientMethod, SlopeKind, Target,
    },
    uncertainty::{DeltaMethod, parameter_gradient, validate_gradient},
    validation::{verify_known_predictor, verify_rows_complete},
};
use ndarray::Array1;
use rayon::prelude::*;

/// Grids with at least this many rows are evaluated in parallel.
pub const PARALLEL_THRESHOLD: usize = 1_000;

/// One per-row value of a target, with its parameter gradient.
///
/// `term` is the predictor name (or `"prediction"`); `contrast` is the slope
/// label (`"dY/dX"`), the level pair (`"b - a"`) or the step (`"+1"`).
#[derive(Debug, Clone, PartialEq)]
pub struct RowEffect {
    pub row: usize,
    pub term: String,
    pub contrast: String,
    pub value: f64,
    pub gradient: Array1<f64>,
}

/// Weighted sum of predictions `Σ w_k s(η(θ, r_k))`.
type Combination = Vec<(f64, CovariateRow)>;

/// evaluate — per-row values of `target` on every grid row.
///
/// Parameters
/// ----------
/// - `model`: fitted model; read-only, shared across rows.
/// - `grid`: rows to evaluate on.
/// - `target`: prediction, slope or comparison.
/// - `options`: reporting scale, finite-difference step, derivative method.
/// - `gradient`: parameter-gradient strategy.
///
/// Returns
/// -------
/// Row effects ordered by grid row, then by contrast within a row.
///
/// Errors
/// ------
/// - `EmptyGrid` for a grid without rows.
/// - `UnknownPredictor` if the target predictor is not a model predictor.
/// - `MissingPredictor` if a grid row lacks a model predictor.
/// - `KindMismatch` for a numeric change on a categorical predictor and
///   vice versa.
/// - `InvalidStep` for a non-positive resolved step or a zero comparison step.
/// - `UnknownLevel` for an unknown comparison baseline.
/// - `NonFinitePrediction` / `InvalidGradient` for non-finite results.
pub fn evaluate<P: LinearPredictor>(
    model: &FittedModel<P>, grid: &Grid, target: &Target, options: &EffectOptions,
    gradient: GradientMethod,
) -> MarginsResult<Vec<RowEffect>> {
    if grid.is_empty() {
        return Err(MarginsError::EmptyGrid { operation: "evaluate" });
    }
    let predictors = model.predictors();
    if let Some(name) = target.predictor() {
        verify_known_predictor(name, &predictors, "evaluate")?;
    }
    verify_rows_complete(grid.rows(), &predictors)?;

    let plan = Plan::new(model, grid, target, options, gradient)?;
    let n = grid.len();
    let per_row: Vec<Vec<RowEffect>> = if n < PARALLEL_THRESHOLD {
        log::debug!("evaluating {n} rows sequentially");
        grid.rows()
            .iter()
            .enumerate()
            .map(|(i, row)| plan.row_effects(i, row))
            .collect::<MarginsResult<_>>()?
    } else {
        log::debug!("evaluating {n} rows in parallel");
        grid.rows()
            .par_iter()
            .enumerate()
            .map(|(i, row)| plan.row_effects(i, row))
            .collect::<MarginsResult<_>>()?
    };

    let effects: Vec<RowEffect> = per_row.into_iter().flatten().collect();
    if effects.is_empty() {
        return Err(MarginsError::EmptyEstimates { operation: "evaluate" });
    }
    Ok(effects)
}

/// Resolved per-request evaluation settings.
struct Plan<'a, P> {
    model: &'a FittedModel<P>,
    target: &'a Target,
    scale: PredictionScale,
    method: DerivativeMethod,
    gradient: GradientMethod,
    /// Finite-difference step of a numeric slope.
    step: Option<f64>,
    /// `(baseline, other levels)` of a categorical slope or comparison.
    levels: Option<(String, Vec<String>)>,
}

impl<'a, P: LinearPredictor> Plan<'a, P> {
    fn new(
        model: &'a FittedModel<P>, grid: &Grid, target: &'a Target, options: &EffectOptions,
        gradient: GradientMethod,
    ) -> MarginsResult<Self> {
        let mut plan = Plan {
            model,
            target,
            scale: options.scale,
            method: options.method,
            gradient,
            step: None,
            levels: None,
        };
        match target {
            Target::Prediction => {}
            Target::Slope { predictor, .. } => match grid.levels(predictor) {
                Some(levels) => plan.levels = Some(split_levels(predictor, levels, None)?),
                None => {
                    let h = options.step.resolve(predictor, grid.scale(predictor))?;
                    log::debug!("finite-difference step for '{predictor}': {h:e}");
                    plan.step = Some(h);
                }
            },
            Target::Comparison { predictor, change } => match (change, grid.levels(predictor)) {
                (Change::Levels { baseline }, Some(levels)) => {
                    plan.levels = Some(split_levels(predictor, levels, baseline.as_deref())?);
                }
                (Change::Levels { .. }, None) => {
                    return Err(MarginsError::KindMismatch {
                        name: predictor.clone(),
                        expected: "categorical",
                        operation: "evaluate",
                    });
                }
                (Change::Step(delta), None) => {
                    if !delta.is_finite() || *delta == 0.0 {
                        return Err(MarginsError::InvalidStep {
                            predictor: predictor.clone(),
                            step: *delta,
                        });
                    }
                }
                (Change::Step(_), Some(_)) => {
                    return Err(MarginsError::KindMismatch {
                        name: predictor.clone(),
                        expected: "numeric",
                        operation: "evaluate",
                    });
                }
            },
        }
        Ok(plan)
    }

    fn row_effects(&self, i: usize, row: &CovariateRow) -> MarginsResult<Vec<RowEffect>> {
        let mut out = Vec::new();
        match self.target {
            Target::Prediction => {
                let (value, gradient) = self.combination(&vec![(1.0, row.clone())])?;
                out.push(self.effect(i, "prediction", String::new(), value, gradient)?);
            }
            Target::Slope { predictor, kind } => {
                if self.levels.is_some() {
                    self.level_effects(i, row, predictor, &mut out)?;
                } else {
                    let (value, gradient) = self.slope(i, row, predictor, *kind)?;
                    out.push(self.effect(i, predictor, kind.label().to_string(), value, gradient)?);
                }
            }
            Target::Comparison { predictor, change } => match change {
                Change::Levels { .. } => self.level_effects(i, row, predictor, &mut out)?,
                Change::Step(delta) => {
                    let x = row.numeric(predictor, i, "evaluate")?;
                    let combo = vec![
                        (1.0, shifted(row, predictor, x + delta)),
                        (-1.0, row.clone()),
                    ];
                    let (value, gradient) = self.combination(&combo)?;
                    out.push(self.effect(i, predictor, format!("{delta:+}"), value, gradient)?);
                }
            },
        }
        Ok(out)
    }

    fn level_effects(
        &self, i: usize, row: &CovariateRow, predictor: &str, out: &mut Vec<RowEffect>,
    ) -> MarginsResult<()> {
        let Some((baseline, others)) = &self.levels else {
            return Ok(());
        };
        let base_row = shifted_level(row, predictor, baseline);
        for level in others {
            let combo = vec![(1.0, shifted_level(row, predictor, level)), (-1.0, base_row.clone())];
            let (value, gradient) = self.combination(&combo)?;
            out.push(self.effect(i, predictor, format!("{level} - {baseline}"), value, gradient)?);
        }
        Ok(())
    }

    fn slope(
        &self, i: usize, row: &CovariateRow, predictor: &str, kind: SlopeKind,
    ) -> MarginsResult<(f64, Array1<f64>)> {
        let x = row.numeric(predictor, i, "evaluate")?;
        let (value, gradient) = match self.method {
            DerivativeMethod::CentralDifference => self.central_slope(row, predictor, x)?,
            // Adapters without `design_derivative` fall back to differences.
            DerivativeMethod::Analytic => match self.analytic_slope(row, predictor) {
                Err(MarginsError::GradientNotImplemented) => self.central_slope(row, predictor, x)?,
                other => other?,
            },
        };
        match kind {
            SlopeKind::Dydx => Ok((value, gradient)),
            SlopeKind::Dyex => Ok((value * x, gradient * x)),
            SlopeKind::Eyex | SlopeKind::Eydx => {
                let (mu, mu_grad) = self.combination(&vec![(1.0, row.clone())])?;
                let factor = if kind == SlopeKind::Eyex { x } else { 1.0 };
                let elasticity = value * factor / mu;
                let grad = (gradient * mu - mu_grad * value) * (factor / (mu * mu));
                Ok((elasticity, grad))
            }
        }
    }

    /// `(f(x + h) − f(x − h)) / 2h` with the request's resolved step.
    fn central_slope(
        &self, row: &CovariateRow, predictor: &str, x: f64,
    ) -> MarginsResult<(f64, Array1<f64>)> {
        let Some(h) = self.step else {
            return Err(MarginsError::InvalidStep { predictor: predictor.to_string(), step: f64::NAN });
        };
        let combo = vec![
            (0.5 / h, shifted(row, predictor, x + h)),
            (-0.5 / h, shifted(row, predictor, x - h)),
        ];
        self.combination(&combo)
    }

    /// `∂μ/∂x = s'(η) · (θ · d)` with `d = ∂(design row)/∂x`.
    fn analytic_slope(&self, row: &CovariateRow, predictor: &str) -> MarginsResult<(f64, Array1<f64>)> {
        let adapter = self.model.adapter();
        let link = self.model.link();
        let scale = self.scale;
        let dd = adapter.design_derivative(row, predictor)?;
        let at = |theta: &Array1<f64>| -> MarginsResult<f64> {
            let eta = adapter.linear_predictor(theta, row)?;
            Ok(scale.deriv(link, eta) * theta.dot(&dd))
        };
        let theta = self.model.coefficients();
        let value = at(theta)?;
        let gradient = self.gradient_or_fallback(
            || {
                let eta = adapter.linear_predictor(theta, row)?;
                let eta_grad = adapter.eta_gradient(theta, row)?;
                let slope_eta = theta.dot(&dd);
                Ok(eta_grad * (scale.deriv2(link, eta) * slope_eta) + &dd * scale.deriv(link, eta))
            },
            &at,
        )?;
        Ok((value, gradient))
    }

    fn combination(&self, combo: &Combination) -> MarginsResult<(f64, Array1<f64>)> {
        let adapter = self.model.adapter();
        let link = self.model.link();
        let scale = self.scale;
        let at = |theta: &Array1<f64>| -> MarginsResult<f64> {
            let mut total = 0.0;
            for (w, row) in combo {
                total += w * scale.apply(link, adapter.linear_predictor(theta, row)?);
            }
            Ok(total)
        };
        let theta = self.model.coefficients();
        let value = at(theta)?;
        let gradient = self.gradient_or_fallback(
            || {
                let mut grad = Array1::<f64>::zeros(theta.len());
                for (w, row) in combo {
                    let eta = adapter.linear_predictor(theta, row)?;
                    let eta_grad = adapter.eta_gradient(theta, row)?;
                    grad.scaled_add(w * scale.deriv(link, eta), &eta_grad);
                }
                Ok(grad)
            },
            &at,
        )?;
        Ok((value, gradient))
    }

    fn gradient_or_fallback<A, F>(&self, analytic: A, f: &F) -> MarginsResult<Array1<f64>>
    where
        A: FnOnce() -> MarginsResult<Array1<f64>>,
        F: Fn(&Array1<f64>) -> MarginsResult<f64>,
    {
        let theta = self.model.coefficients();
        if self.gradient == GradientMethod::Auto {
            match analytic() {
                Ok(grad) => {
                    validate_gradient(&grad, theta.len())?;
                    return Ok(grad);
                }
                Err(MarginsError::GradientNotImplemented) => {}
                Err(e) => return Err(e),
            }
        }
        parameter_gradient(f, theta)
    }

    fn effect(
        &self, row: usize, term: &str, contrast: String, value: f64, gradient: Array1<f64>,
    ) -> MarginsResult<RowEffect> {
        if !value.is_finite() {
            return Err(MarginsError::NonFinitePrediction { row, value });
        }
        Ok(RowEffect { row, term: term.to_string(), contrast, value, gradient })
    }
}

fn split_levels(
    predictor: &str, levels: &[String], baseline: Option<&str>,
) -> MarginsResult<(String, Vec<String>)> {
    let baseline = match baseline {
        Some(b) if levels.iter().any(|l| l == b) => b.to_string(),
        Some(b) => {
            return Err(MarginsError::UnknownLevel {
                predictor: predictor.to_string(),
                level: b.to_string(),
            });
        }
        None => levels
            .first()
            .cloned()
            .ok_or(MarginsError::EmptyEstimates { operation: "evaluate" })?,
    };
    let others = levels.iter().filter(|l| **l != baseline).cloned().collect();
    Ok((baseline, others))
}

fn shifted(row: &CovariateRow, predictor: &str, x: f64) -> CovariateRow {
    let mut out = row.clone();
    out.set(predictor, Value::Numeric(x));
    out
}

fn shifted_level(row: &CovariateRow, predictor: &str, level: &str) -> CovariateRow {
    let mut out = row.clone();
    out.set(predictor, Value::Level(level.to_string()));
    out
}

/// aggregate — summarize row effects into estimates.
///
/// Parameters
/// ----------
/// - `grid`: the grid the effects were evaluated on (supplies group values).
/// - `effects`: output of [`evaluate`].
/// - `policy`: `MeanOfPredictions` averages each (term, contrast, group)
///   cell; the other policies report every effect as its own estimate.
/// - `by`: extra grouping predictors. Grid focal predictors always group.
/// - `delta`: covariance and inference settings.
///
/// Returns
/// -------
/// Estimates ordered by term (first appearance), then group (level order
/// for categorical values, ascending for numeric values).
///
/// Errors
/// ------
/// - `EmptyEstimates` for no effects.
/// - `UnknownPredictor` for a `by` name absent from the grid rows.
/// - `KindMismatch` for grouping on a proportional-mix value.
pub fn aggregate(
    grid: &Grid, effects: &[RowEffect], policy: AveragingPolicy, by: &[String],
    delta: &DeltaMethod<'_>,
) -> MarginsResult<Vec<Estimate>> {
    if effects.is_empty() {
        return Err(MarginsError::EmptyEstimates { operation: "aggregate" });
    }
    for name in by {
        if !grid.rows().iter().all(|r| r.contains(name)) {
            return Err(MarginsError::UnknownPredictor { name: name.clone(), operation: "aggregate" });
        }
    }
    let mut keys: Vec<String> = grid.focal().to_vec();
    for name in by {
        if !keys.contains(name) {
            keys.push(name.clone());
        }
    }

    let mut cells: Vec<Cell> = Vec::new();
    for (k, effect) in effects.iter().enumerate() {
        let (group, order) = group_of(grid, effect.row, &keys)?;
        let pooled = policy == AveragingPolicy::MeanOfPredictions;
        let existing = cells.iter_mut().find(|c| {
            pooled && c.term == effect.term && c.contrast == effect.contrast && c.group == group
        });
        match existing {
            Some(cell) => cell.members.push(k),
            None => cells.push(Cell {
                term: effect.term.clone(),
                contrast: effect.contrast.clone(),
                group,
                order,
                members: vec![k],
            }),
        }
    }

    // Term-major: (term, contrast) by first appearance, then group order.
    let mut term_order: Vec<(String, String)> = Vec::new();
    for cell in &cells {
        let key = (cell.term.clone(), cell.contrast.clone());
        if !term_order.contains(&key) {
            term_order.push(key);
        }
    }
    let rank = |c: &Cell| term_order.iter().position(|(t, k)| *t == c.term && *k == c.contrast);
    if policy == AveragingPolicy::MeanOfPredictions {
        cells.sort_by(|a, b| {
            rank(a).cmp(&rank(b)).then_with(|| compare_orders(&a.order, &b.order))
        });
    } else {
        cells.sort_by_key(|c| rank(c));
    }

    let p = delta.n_params();
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        let n = cell.members.len() as f64;
        let mut value = 0.0;
        let mut gradient = Array1::<f64>::zeros(p);
        for &k in &cell.members {
            value += effects[k].value;
            gradient += &effects[k].gradient;
        }
        value /= n;
        gradient /= n;
        let rows = cell.members.iter().map(|&k| effects[k].row).collect();
        let estimate =
            delta.estimate(value, gradient)?.with_labels(&cell.term, &cell.contrast, cell.group, rows);
        out.push(estimate);
    }
    log::debug!("aggregated {} row effects into {} estimates ({policy:?})", effects.len(), out.len());
    Ok(out)
}

struct Cell {
    term: String,
    contrast: String,
    group: Vec<(String, String)>,
    order: Vec<f64>,
    members: Vec<usize>,
}

/// Display values and sort keys of the grouping predictors at one row.
fn group_of(grid: &Grid, row: usize, keys: &[String]) -> MarginsResult<(Vec<(String, String)>, Vec<f64>)> {
    let mut group = Vec::with_capacity(keys.len());
    let mut order = Vec::with_capacity(keys.len());
    let Some(values) = grid.rows().get(row) else {
        return Err(MarginsError::DimensionMismatch { what: "grid rows", expected: grid.len(), found: row + 1 });
    };
    for name in keys {
        let value = values.require(name, row)?;
        let rank = match value {
            Value::Numeric(x) => *x,
            Value::Level(level) => grid
                .levels(name)
                .and_then(|ls| ls.iter().position(|l| l == level))
                .map_or(f64::INFINITY, |p| p as f64),
            Value::Mixture(_) => {
                return Err(MarginsError::KindMismatch {
                    name: name.clone(),
                    expected: "numeric or a single level",
                    operation: "aggregate",
                });
            }
        };
        group.push((name.clone(), value.to_string()));
        order.push(rank);
    }
    Ok((group, order))
}

fn compare_orders(a: &[f64], b: &[f64]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.total_cmp(y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}
