//! margins::options — request configuration for grids, effects and inference.
//!
//! Purpose
//! -------
//! Collect every user-facing choice that changes a marginal-effects result
//! into small, validated option types with documented defaults, so no
//! behavior is picked silently.
//!
//! Key behaviors
//! -------------
//! - [`AveragingPolicy`] makes AME vs MEM vs per-grid-row evaluation an
//!   explicit request parameter.
//! - [`GridPolicy`] and [`TypicalOptions`] control how reference grids are
//!   built, including the categorical collapse rule per predictor.
//! - [`Target`], [`SlopeKind`], [`Change`], [`StepPolicy`] and
//!   [`DerivativeMethod`] describe what is computed per row.
//! - [`InferenceOptions`] controls confidence level, reference
//!   distribution, parameter-gradient strategy and null value.
//!
//! Conventions
//! -----------
//! - Constructors that can fail return `MarginsResult<Self>`; `Default`
//!   impls document the defaults.
//! - String parsing (`FromStr`) is case-insensitive, for the bindings.
use crate::margins::{
    errors::{MarginsError, MarginsResult},
    model::PredictionScale,
    uncertainty::{Inference, Reference},
    validation::{verify_confidence, verify_df, verify_step},
};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Order of averaging and prediction.
///
/// - `MeanOfPredictions`: evaluate on every row, then average (AME / AAP).
/// - `PredictionAtMean`: evaluate once per collapsed grid row (MEM).
/// - `PredictionOnGrid`: evaluate once per grid row, no averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AveragingPolicy {
    #[default]
    MeanOfPredictions,
    PredictionAtMean,
    PredictionOnGrid,
}

impl AveragingPolicy {
    /// Grid policy used when a request does not name one.
    ///
    /// Averaging over listed values needs one dataset copy per value, so
    /// `MeanOfPredictions` switches from `AsIs` to `Counterfactual` when the
    /// grid spec lists any predictor.
    pub fn default_grid(&self, lists_values: bool) -> GridPolicy {
        match self {
            AveragingPolicy::MeanOfPredictions if lists_values => GridPolicy::Counterfactual,
            AveragingPolicy::MeanOfPredictions => GridPolicy::AsIs,
            AveragingPolicy::PredictionAtMean | AveragingPolicy::PredictionOnGrid => {
                GridPolicy::Typical
            }
        }
    }
}

impl FromStr for AveragingPolicy {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean-of-predictions" | "average" | "ame" => Ok(AveragingPolicy::MeanOfPredictions),
            "prediction-at-mean" | "mem" => Ok(AveragingPolicy::PredictionAtMean),
            "prediction-on-grid" | "grid" => Ok(AveragingPolicy::PredictionOnGrid),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "averaging must be 'mean-of-predictions', 'prediction-at-mean' or 'prediction-on-grid'",
            }),
        }
    }
}

/// How a reference grid is derived from the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPolicy {
    /// Unspecified predictors collapse to typical values; cross product of
    /// the specified ones.
    Typical,
    /// One copy of the dataset per combination of specified values.
    Counterfactual,
    /// The dataset unchanged.
    AsIs,
}

impl FromStr for GridPolicy {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "typical" => Ok(GridPolicy::Typical),
            "counterfactual" => Ok(GridPolicy::Counterfactual),
            "as-is" | "asis" | "data" => Ok(GridPolicy::AsIs),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "grid policy must be 'typical', 'counterfactual' or 'as-is'",
            }),
        }
    }
}

/// Typical value of a categorical predictor under [`GridPolicy::Typical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoricalTypical {
    /// First level in level order.
    #[default]
    ReferenceLevel,
    /// Most frequent level (ties to the earliest level).
    ModalLevel,
    /// Observed level shares as fractional dummies.
    ProportionalMix,
}

impl FromStr for CategoricalTypical {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reference" | "reference-level" => Ok(CategoricalTypical::ReferenceLevel),
            "mode" | "modal" | "modal-level" => Ok(CategoricalTypical::ModalLevel),
            "proportional" | "mix" | "proportional-mix" => Ok(CategoricalTypical::ProportionalMix),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "categorical typical value must be 'reference', 'mode' or 'proportional'",
            }),
        }
    }
}

/// Categorical collapse rule, with per-predictor overrides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypicalOptions {
    pub categorical: CategoricalTypical,
    pub overrides: BTreeMap<String, CategoricalTypical>,
}

impl TypicalOptions {
    pub fn new(categorical: CategoricalTypical) -> Self {
        Self { categorical, overrides: BTreeMap::new() }
    }

    pub fn with_override(mut self, predictor: impl Into<String>, rule: CategoricalTypical) -> Self {
        self.overrides.insert(predictor.into(), rule);
        self
    }

    pub fn rule_for(&self, predictor: &str) -> CategoricalTypical {
        self.overrides.get(predictor).copied().unwrap_or(self.categorical)
    }
}

/// Finite-difference step for numeric slopes.
///
/// `Relative(f)` resolves to `f` times the predictor's observed range
/// (or `max(|mean|, 1)` when the range is zero). Default `Relative(1e-4)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPolicy {
    Relative(f64),
    Absolute(f64),
}

impl Default for StepPolicy {
    fn default() -> Self {
        StepPolicy::Relative(1e-4)
    }
}

impl StepPolicy {
    /// Concrete step for `predictor` with scale `scale`.
    ///
    /// # Errors
    /// `InvalidStep` if the result is not finite and positive.
    pub fn resolve(&self, predictor: &str, scale: f64) -> MarginsResult<f64> {
        let step = match self {
            StepPolicy::Relative(f) => f * scale,
            StepPolicy::Absolute(h) => *h,
        };
        verify_step(predictor, step)
    }
}

/// How `∂μ/∂x` is obtained for numeric slopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivativeMethod {
    /// `(f(x + h) − f(x − h)) / 2h`.
    #[default]
    CentralDifference,
    /// Chain rule through `LinearPredictor::design_derivative`.
    Analytic,
}

/// Slope type: derivative or elasticity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeKind {
    /// `dμ/dx`.
    #[default]
    Dydx,
    /// `dμ/dx · x / μ`.
    Eyex,
    /// `dμ/dx / μ`.
    Eydx,
    /// `dμ/dx · x`.
    Dyex,
}

impl SlopeKind {
    pub fn label(&self) -> &'static str {
        match self {
            SlopeKind::Dydx => "dY/dX",
            SlopeKind::Eyex => "eY/eX",
            SlopeKind::Eydx => "eY/dX",
            SlopeKind::Dyex => "dY/eX",
        }
    }
}

impl FromStr for SlopeKind {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dydx" => Ok(SlopeKind::Dydx),
            "eyex" => Ok(SlopeKind::Eyex),
            "eydx" => Ok(SlopeKind::Eydx),
            "dyex" => Ok(SlopeKind::Dyex),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "slope must be 'dydx', 'eyex', 'eydx' or 'dyex'",
            }),
        }
    }
}

/// Change applied to the focal predictor in a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Every level minus `baseline` (default: first level).
    Levels { baseline: Option<String> },
    /// `f(x + step) − f(x)` for a numeric predictor.
    Step(f64),
}

/// What the effect engine computes per row.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The model prediction.
    Prediction,
    /// Derivative (numeric) or first difference vs the first level
    /// (categorical) with respect to `predictor`.
    Slope { predictor: String, kind: SlopeKind },
    /// Explicit comparison on `predictor`.
    Comparison { predictor: String, change: Change },
}

impl Target {
    pub fn slope(predictor: impl Into<String>) -> Self {
        Target::Slope { predictor: predictor.into(), kind: SlopeKind::Dydx }
    }

    pub fn levels(predictor: impl Into<String>) -> Self {
        Target::Comparison { predictor: predictor.into(), change: Change::Levels { baseline: None } }
    }

    pub fn predictor(&self) -> Option<&str> {
        match self {
            Target::Prediction => None,
            Target::Slope { predictor, .. } | Target::Comparison { predictor, .. } => {
                Some(predictor)
            }
        }
    }
}

/// Per-row evaluation settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectOptions {
    pub scale: PredictionScale,
    pub step: StepPolicy,
    pub method: DerivativeMethod,
}

impl EffectOptions {
    /// # Errors
    /// `InvalidStep` if the step factor is not finite and positive.
    pub fn new(
        scale: PredictionScale, step: StepPolicy, method: DerivativeMethod,
    ) -> MarginsResult<Self> {
        match step {
            StepPolicy::Relative(f) => verify_step("<relative step>", f)?,
            StepPolicy::Absolute(h) => verify_step("<absolute step>", h)?,
        };
        Ok(Self { scale, step, method })
    }
}

/// Degrees of freedom for intervals and p-values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DfPolicy {
    /// Normal reference.
    Normal,
    /// The model's residual df when known, else normal.
    #[default]
    Residual,
    /// Student-t with the given df.
    Fixed(f64),
}

/// How parameter gradients are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientMethod {
    /// Analytic when the adapter provides it, else finite differences.
    #[default]
    Auto,
    FiniteDifference,
}

/// `InferenceOptions` — confidence level, reference distribution and
/// gradient strategy.
///
/// Defaults
/// --------
/// - `confidence = 0.95`
/// - `df = DfPolicy::Residual`
/// - `gradient = GradientMethod::Auto`
/// - `null_value = 0.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOptions {
    pub confidence: f64,
    pub df: DfPolicy,
    pub gradient: GradientMethod,
    pub null_value: f64,
}

impl InferenceOptions {
    /// # Errors
    /// - `InvalidConfidence` outside `(0, 1)`.
    /// - `InvalidDf` for a non-positive fixed df.
    /// - `InvalidValue` for a non-finite null value.
    pub fn new(
        confidence: f64, df: DfPolicy, gradient: GradientMethod, null_value: f64,
    ) -> MarginsResult<Self> {
        verify_confidence(confidence)?;
        if let DfPolicy::Fixed(v) = df {
            verify_df(v)?;
        }
        if !null_value.is_finite() {
            return Err(MarginsError::InvalidValue {
                name: "null_value".to_string(),
                index: 0,
                value: null_value,
            });
        }
        Ok(Self { confidence, df, gradient, null_value })
    }

    /// Resolve the reference distribution given the model's residual df.
    pub fn resolve(&self, df_residual: Option<f64>) -> Inference {
        let reference = match (self.df, df_residual) {
            (DfPolicy::Normal, _) => Reference::Normal,
            (DfPolicy::Residual, Some(df)) => Reference::StudentT(df),
            (DfPolicy::Residual, None) => Reference::Normal,
            (DfPolicy::Fixed(df), _) => Reference::StudentT(df),
        };
        Inference { confidence: self.confidence, reference, null_value: self.null_value }
    }
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            df: DfPolicy::Residual,
            gradient: GradientMethod::Auto,
            null_value: 0.0,
        }
    }
}
