//! rust_margins — marginal effects, marginal means and contrasts for fitted
//! regression models, with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the marginal-effects engine to Python via the `_rust_margins`
//! extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the core modules: [`margins`] (grids, effects, contrasts,
//!   delta-method inference), [`estimation`] (reference OLS and binary
//!   GLM fitters) and [`numerical_stability`].
//! - Define `#[pyclass]` wrappers (`Margins`, `Estimate`) and the
//!   `#[pymodule]` initializer when `python-bindings` is enabled.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs only
//!   FFI glue, input conversion and error mapping.
//! - A Python `Margins` object owns its dataset and fitted model; each
//!   method call borrows them for one request.
//!
//! Conventions
//! -----------
//! - Python datasets are `{name: column}` dicts; float columns are numeric,
//!   string columns categorical with sorted levels.
//! - Coefficient names follow the `LinearSpec` grammar (`(Intercept)`, `x`,
//!   `I(x^2)`, `g[b]`, `x:g[b]`).
//! - Core errors convert to `ValueError` at the boundary.
//!
//! Downstream usage
//! ----------------
//! - Rust code depends on [`margins`] and [`estimation`] directly and can
//!   ignore the PyO3 items.
//! - Python code imports `_rust_margins.Margins` and calls `avg_slopes`,
//!   `slopes_at_mean`, `avg_predictions`, `predictions`, `avg_comparisons`,
//!   `pairwise` and `hypothesis`.
//!
//! Testing notes
//! -------------
//! - Core behavior is covered by unit tests in the inner modules and by
//!   `tests/integration_margins_pipeline.rs`; the bindings are thin enough
//!   to be exercised from Python only.

pub mod estimation;
pub mod margins;
pub mod numerical_stability;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyDict};

#[cfg(feature = "python-bindings")]
use crate::{
    margins::{
        Change, ContrastFn, Dataset, Estimate, FittedModel, InferenceOptions, LinearSpec, Link,
        Margins, PairOrder,
        options::{DfPolicy, GradientMethod},
    },
    utils::{extract_dataset, extract_grid, extract_matrix, extract_vector},
};

/// Estimate — Python view of one reported quantity.
///
/// Read-only; the parameter gradient stays on the Rust side so that
/// estimates passed back into `pairwise` / `hypothesis` keep full
/// delta-method information.
#[cfg(feature = "python-bindings")]
#[pyclass(name = "Estimate", module = "rust_margins")]
#[derive(Clone)]
pub struct PyEstimate {
    inner: Estimate,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl PyEstimate {
    #[getter]
    pub fn label(&self) -> String {
        self.inner.label.clone()
    }

    #[getter]
    pub fn term(&self) -> String {
        self.inner.term.clone()
    }

    #[getter]
    pub fn contrast(&self) -> String {
        self.inner.contrast.clone()
    }

    #[getter]
    pub fn group(&self) -> Vec<(String, String)> {
        self.inner.group.clone()
    }

    #[getter]
    pub fn estimate(&self) -> f64 {
        self.inner.estimate
    }

    #[getter]
    pub fn std_error(&self) -> Option<f64> {
        self.inner.std_error
    }

    #[getter]
    pub fn statistic(&self) -> Option<f64> {
        self.inner.statistic
    }

    #[getter]
    pub fn p_value(&self) -> Option<f64> {
        self.inner.p_value
    }

    #[getter]
    pub fn conf_low(&self) -> Option<f64> {
        self.inner.conf_low
    }

    #[getter]
    pub fn conf_high(&self) -> Option<f64> {
        self.inner.conf_high
    }

    /// Reason inference is missing, if the covariance was ill-conditioned.
    #[getter]
    pub fn issue(&self) -> Option<String> {
        self.inner.issue.as_ref().map(|e| e.to_string())
    }

    pub fn __repr__(&self) -> String {
        format!("Estimate({})", self.inner)
    }
}

/// Margins — Python-facing session over a fitted linear-in-parameter model.
///
/// Constructed from Python via
/// `Margins(data, names, coefficients, covariance, link="identity",
/// df_residual=None, confidence=0.95)`:
/// - `data`: `dict[str, sequence]` of equally long columns.
/// - `names`: coefficient names, parsed into the design adapter.
/// - `coefficients` / `covariance`: `p` vector and `p × p` matrix.
/// - `link`: `identity`, `logit`, `probit`, `log` or `cloglog`.
/// - `df_residual`: enables Student-t intervals when given.
#[cfg(feature = "python-bindings")]
#[pyclass(name = "Margins", module = "rust_margins")]
pub struct PyMargins {
    model: FittedModel<LinearSpec>,
    data: Dataset,
    inference: InferenceOptions,
}

#[cfg(feature = "python-bindings")]
impl PyMargins {
    fn session(&self) -> Margins<'_, LinearSpec> {
        Margins::new(&self.model, &self.data).with_inference(self.inference)
    }
}

#[cfg(feature = "python-bindings")]
fn wrap(estimates: Vec<Estimate>) -> Vec<PyEstimate> {
    estimates.into_iter().map(|inner| PyEstimate { inner }).collect()
}

#[cfg(feature = "python-bindings")]
fn into_inner(estimates: Vec<PyEstimate>) -> Vec<Estimate> {
    estimates.into_iter().map(|e| e.inner).collect()
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl PyMargins {
    #[new]
    #[pyo3(
        signature = (data, names, coefficients, covariance, link = "identity", df_residual = None, confidence = 0.95)
    )]
    pub fn new<'py>(
        py: Python<'py>, data: &Bound<'py, PyDict>, names: Vec<String>,
        coefficients: &Bound<'py, PyAny>, covariance: &Bound<'py, PyAny>, link: &str,
        df_residual: Option<f64>, confidence: f64,
    ) -> PyResult<Self> {
        let data = extract_dataset(py, data)?;
        let spec = LinearSpec::from_coefficient_names(&names)?;
        let coefficients = extract_vector(py, coefficients)?;
        let covariance = extract_matrix(covariance)?;
        let link: Link = link.parse()?;
        let mut model = FittedModel::new(names, coefficients, covariance, link, spec)?;
        if let Some(df) = df_residual {
            model = model.with_df_residual(df)?;
        }
        let inference =
            InferenceOptions::new(confidence, DfPolicy::Residual, GradientMethod::Auto, 0.0)?;
        Ok(PyMargins { model, data, inference })
    }

    /// Average marginal effect of `predictor`.
    pub fn avg_slopes(&self, predictor: &str) -> PyResult<Vec<PyEstimate>> {
        Ok(wrap(self.session().avg_slopes(predictor)?))
    }

    /// Marginal effect of `predictor` at typical values.
    pub fn slopes_at_mean(&self, predictor: &str) -> PyResult<Vec<PyEstimate>> {
        Ok(wrap(self.session().slopes_at_mean(predictor)?))
    }

    /// Average prediction, optionally by the listed predictors.
    #[pyo3(signature = (by = None))]
    pub fn avg_predictions(&self, by: Option<Vec<String>>) -> PyResult<Vec<PyEstimate>> {
        let by = by.unwrap_or_default();
        let by: Vec<&str> = by.iter().map(String::as_str).collect();
        Ok(wrap(self.session().avg_predictions(&by)?))
    }

    /// Predictions on a typical-value grid described by a dict.
    pub fn predictions(&self, grid: &Bound<'_, PyDict>) -> PyResult<Vec<PyEstimate>> {
        Ok(wrap(self.session().predictions(extract_grid(grid)?)?))
    }

    /// Average comparison: level contrasts against `baseline`, or a numeric
    /// `step` when given.
    #[pyo3(signature = (predictor, baseline = None, step = None))]
    pub fn avg_comparisons(
        &self, predictor: &str, baseline: Option<String>, step: Option<f64>,
    ) -> PyResult<Vec<PyEstimate>> {
        let change = match step {
            Some(delta) => Change::Step(delta),
            None => Change::Levels { baseline },
        };
        Ok(wrap(self.session().avg_comparisons(predictor, change)?))
    }

    /// Coefficients as estimates with standard errors.
    pub fn coefficients(&self) -> PyResult<Vec<PyEstimate>> {
        Ok(wrap(self.session().coefficients()?))
    }

    #[pyo3(signature = (estimates, order = "pairwise", func = "difference"))]
    pub fn pairwise(
        &self, estimates: Vec<PyEstimate>, order: &str, func: &str,
    ) -> PyResult<Vec<PyEstimate>> {
        let order: PairOrder = order.parse()?;
        let func: ContrastFn = func.parse()?;
        Ok(wrap(self.session().pairwise(&into_inner(estimates), order, func)?))
    }

    /// Linear hypothesis such as `"b2 - b1"` or `"b1 = b2"`.
    pub fn hypothesis(&self, estimates: Vec<PyEstimate>, expression: &str) -> PyResult<PyEstimate> {
        let inner = self.session().hypothesis(&into_inner(estimates), expression)?;
        Ok(PyEstimate { inner })
    }
}

#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_margins(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMargins>()?;
    m.add_class::<PyEstimate>()?;
    Ok(())
}
