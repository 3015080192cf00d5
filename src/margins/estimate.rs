//! margins::estimate — the terminal record produced by effects and contrasts.
use crate::margins::errors::MarginsError;
use ndarray::Array1;
use std::fmt;

/// `Estimate` — one reported quantity with its uncertainty.
///
/// Purpose
/// -------
/// Carry a point estimate together with its delta-method standard error,
/// test statistic, p-value and confidence interval, the labels needed to
/// identify it, and the parameter gradient the contrast engine combines.
///
/// Fields
/// ------
/// - `label`: display label, unique within one result set.
/// - `term`: what was estimated (predictor name, `"prediction"`, or a
///   contrast expression).
/// - `contrast`: the kind of effect (`"dY/dX"`, `"b - a"`, `"+1"`), empty
///   for plain predictions and user contrasts.
/// - `group`: `(predictor, value)` pairs identifying the grid cell or
///   subgroup the estimate belongs to.
/// - `rows`: originating grid rows.
/// - `gradient`: `∂estimate/∂θ`.
/// - `issue`: set when the covariance was ill-conditioned; all inference
///   fields are then `None`.
///
/// Invariants
/// ----------
/// - `std_error`, `conf_low`, `conf_high` are all `Some` or all `None`.
/// - `issue.is_some()` implies `std_error.is_none()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub label: String,
    pub term: String,
    pub contrast: String,
    pub group: Vec<(String, String)>,
    pub rows: Vec<usize>,
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub conf_low: Option<f64>,
    pub conf_high: Option<f64>,
    pub gradient: Array1<f64>,
    pub issue: Option<MarginsError>,
}

impl Estimate {
    /// `true` when a standard error could be attached.
    pub fn has_inference(&self) -> bool {
        self.std_error.is_some()
    }

    pub(crate) fn with_labels(
        mut self, term: &str, contrast: &str, group: Vec<(String, String)>, rows: Vec<usize>,
    ) -> Self {
        self.label = compose_label(term, contrast, &group);
        self.term = term.to_string();
        self.contrast = contrast.to_string();
        self.group = group;
        self.rows = rows;
        self
    }
}

/// `term`, `term contrast`, or `term contrast [a=1, g=b]`.
pub(crate) fn compose_label(term: &str, contrast: &str, group: &[(String, String)]) -> String {
    let mut label = term.to_string();
    if !contrast.is_empty() && contrast != term {
        label.push(' ');
        label.push_str(contrast);
    }
    if !group.is_empty() {
        let cells: Vec<String> = group.iter().map(|(k, v)| format!("{k}={v}")).collect();
        label.push_str(&format!(" [{}]", cells.join(", ")));
    }
    label
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.6}", self.label, self.estimate)?;
        match (self.std_error, self.conf_low, self.conf_high) {
            (Some(se), Some(lo), Some(hi)) => write!(f, " (SE {se:.6}, CI [{lo:.6}, {hi:.6}])"),
            _ => write!(f, " (SE unavailable)"),
        }
    }
}
