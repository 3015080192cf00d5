//! margins::data — covariate values, rows and validated datasets.
//!
//! Purpose
//! -------
//! Provide the in-memory data model the rest of the core evaluates models
//! on: a [`Value`] per predictor, a [`CovariateRow`] mapping predictor names
//! to values, and a validated [`Dataset`] of observed rows with a fixed
//! schema and per-predictor level orders.
//!
//! Key behaviors
//! -------------
//! - [`Dataset::from_columns`] and [`Dataset::new`] enforce a consistent
//!   schema: every row carries every predictor, with one kind per predictor,
//!   and numeric entries are finite.
//! - Categorical level order is either declared by the caller or the sorted
//!   set of observed levels. The first level is the reference level.
//! - Column summaries (`mean`, `range`, `mode`, `proportions`) back the
//!   typical-value collapse of the grid builder and step resolution of the
//!   effect engine.
//!
//! Invariants & assumptions
//! ------------------------
//! - Observed datasets never contain [`Value::Mixture`]; mixtures only occur
//!   in synthetic grid rows.
//! - `Dataset` is immutable after construction; grids clone rows out of it.
//!
//! Conventions
//! -----------
//! - Row indices in error payloads are 0-based.
//! - Predictor order is the column order given at construction (or the
//!   sorted names of the first row for [`Dataset::new`]).
use crate::margins::errors::{MarginsError, MarginsResult};
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance on the sum of proportional-mix weights.
const MIXTURE_TOL: f64 = 1e-8;

/// A single covariate value.
///
/// `Mixture` is the proportional-mix representation of a collapsed
/// categorical predictor: each `(level, weight)` pair contributes `weight`
/// to that level's dummy column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Level(String),
    Mixture(Vec<(String, f64)>),
}

impl Value {
    /// Build a validated proportional mix for predictor `name`.
    ///
    /// # Errors
    /// `InvalidMixture` if a weight is negative or non-finite, or the
    /// weights do not sum to one.
    pub fn mixture(name: &str, weights: Vec<(String, f64)>) -> MarginsResult<Self> {
        let total: f64 = weights.iter().map(|(_, w)| *w).sum();
        let bad_weight = weights.iter().any(|(_, w)| !w.is_finite() || *w < 0.0);
        if bad_weight || (total - 1.0).abs() > MIXTURE_TOL {
            return Err(MarginsError::InvalidMixture { name: name.to_string(), total });
        }
        Ok(Value::Mixture(weights))
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<&str> {
        match self {
            Value::Level(level) => Some(level.as_str()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Numeric(_))
    }

    /// Dummy-coding weight of `level`: 1/0 for a plain level, the mixing
    /// weight for a mixture, `None` for numeric values.
    pub fn level_weight(&self, level: &str) -> Option<f64> {
        match self {
            Value::Numeric(_) => None,
            Value::Level(own) => Some(if own == level { 1.0 } else { 0.0 }),
            Value::Mixture(weights) => {
                Some(weights.iter().filter(|(l, _)| l == level).map(|(_, w)| *w).sum())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(x) => write!(f, "{x}"),
            Value::Level(level) => write!(f, "{level}"),
            Value::Mixture(weights) => {
                write!(f, "mix(")?;
                for (i, (level, w)) in weights.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{level}={w:.4}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Numeric(x)
    }
}

impl From<&str> for Value {
    fn from(level: &str) -> Self {
        Value::Level(level.to_string())
    }
}

impl From<String> for Value {
    fn from(level: String) -> Self {
        Value::Level(level)
    }
}

/// Mapping from predictor name to value for one observation or grid point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CovariateRow {
    values: BTreeMap<String, Value>,
}

impl CovariateRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Insert or overwrite a predictor value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of `name`, or `MissingPredictor` naming row `row`.
    pub fn require(&self, name: &str, row: usize) -> MarginsResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| MarginsError::MissingPredictor { name: name.to_string(), row })
    }

    /// Numeric value of `name`.
    ///
    /// # Errors
    /// `MissingPredictor` if absent, `KindMismatch` if categorical.
    pub fn numeric(&self, name: &str, row: usize, operation: &'static str) -> MarginsResult<f64> {
        self.require(name, row)?.as_numeric().ok_or_else(|| MarginsError::KindMismatch {
            name: name.to_string(),
            expected: "numeric",
            operation,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for CovariateRow {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorKind {
    Numeric,
    Categorical,
}

/// Column-wise input for [`Dataset::from_columns`].
///
/// For categorical columns, `levels` fixes the natural level order (the
/// first entry is the reference level). When `None`, the sorted set of
/// observed values is used.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical { values: Vec<String>, levels: Option<Vec<String>> },
}

impl Column {
    /// Categorical column with observed-order levels sorted lexically.
    pub fn categorical<S: AsRef<str>>(values: &[S]) -> Self {
        Column::Categorical {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
            levels: None,
        }
    }

    /// Categorical column with declared level order.
    pub fn categorical_with_levels<S: AsRef<str>, L: AsRef<str>>(values: &[S], levels: &[L]) -> Self {
        Column::Categorical {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
            levels: Some(levels.iter().map(|l| l.as_ref().to_string()).collect()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Dataset` — validated, ordered sequence of observed covariate rows.
///
/// Purpose
/// -------
/// Hold the original observations a model is evaluated on, together with
/// the schema (predictor names and kinds) and categorical level orders
/// needed by the grid builder and the effect engine.
///
/// Invariants
/// ----------
/// - Every row carries exactly the predictors in `predictors()`.
/// - Each predictor has one kind across all rows.
/// - Numeric entries are finite; no row holds a `Value::Mixture`.
/// - Every observed level of a categorical predictor appears in `levels`.
///
/// Notes
/// -----
/// - An empty dataset is valid; grid construction rejects it where a
///   non-empty grid is required.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    rows: Vec<CovariateRow>,
    predictors: Vec<String>,
    kinds: BTreeMap<String, PredictorKind>,
    levels: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    /// Build a dataset from named columns of equal length.
    ///
    /// # Errors
    /// - `DuplicatePredictor` if a name repeats.
    /// - `ColumnLengthMismatch` if lengths differ.
    /// - `InvalidValue` for a non-finite numeric entry.
    /// - `UnknownLevel` if a value is not among the declared levels.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Column)>) -> MarginsResult<Self> {
        let columns: Vec<(String, Column)> =
            columns.into_iter().map(|(name, col)| (name.into(), col)).collect();
        let n = columns.first().map(|(_, c)| c.len()).unwrap_or(0);

        let mut predictors = Vec::with_capacity(columns.len());
        let mut kinds = BTreeMap::new();
        let mut levels = BTreeMap::new();
        for (name, column) in &columns {
            if kinds.contains_key(name) {
                return Err(MarginsError::DuplicatePredictor { name: name.clone() });
            }
            if column.len() != n {
                return Err(MarginsError::ColumnLengthMismatch {
                    name: name.clone(),
                    expected: n,
                    found: column.len(),
                });
            }
            match column {
                Column::Numeric(values) => {
                    check_finite(name, values.iter().copied())?;
                    kinds.insert(name.clone(), PredictorKind::Numeric);
                }
                Column::Categorical { values, levels: declared } => {
                    let order = match declared {
                        Some(declared) => {
                            for value in values {
                                if !declared.contains(value) {
                                    return Err(MarginsError::UnknownLevel {
                                        predictor: name.clone(),
                                        level: value.clone(),
                                    });
                                }
                            }
                            declared.clone()
                        }
                        None => sorted_unique(values.iter().map(String::as_str)),
                    };
                    kinds.insert(name.clone(), PredictorKind::Categorical);
                    levels.insert(name.clone(), order);
                }
            }
            predictors.push(name.clone());
        }

        let rows: Vec<CovariateRow> = (0..n)
            .map(|i| {
                columns
                    .iter()
                    .map(|(name, column)| {
                        let value = match column {
                            Column::Numeric(values) => Value::Numeric(values[i]),
                            Column::Categorical { values, .. } => Value::Level(values[i].clone()),
                        };
                        (name.clone(), value)
                    })
                    .collect::<CovariateRow>()
            })
            .collect();

        Ok(Self { rows, predictors, kinds, levels })
    }

    /// Build a dataset from rows. The first row fixes the schema.
    ///
    /// # Errors
    /// - `MissingPredictor` / `UnknownPredictor` if a row's predictor set
    ///   differs from the first row's.
    /// - `KindMismatch` if a predictor changes kind or holds a mixture.
    /// - `InvalidValue` for a non-finite numeric entry.
    pub fn new(rows: Vec<CovariateRow>) -> MarginsResult<Self> {
        let Some(first) = rows.first() else {
            return Ok(Self::default());
        };
        let predictors: Vec<String> = first.names().map(str::to_string).collect();
        let mut kinds = BTreeMap::new();
        for (name, value) in first.iter() {
            kinds.insert(name.to_string(), kind_of(name, value)?);
        }

        let mut observed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            for name in row.names() {
                if !kinds.contains_key(name) {
                    return Err(MarginsError::UnknownPredictor {
                        name: name.to_string(),
                        operation: "Dataset::new",
                    });
                }
            }
            for name in &predictors {
                let value = row.require(name, index)?;
                if kind_of(name, value)? != kinds[name] {
                    return Err(MarginsError::KindMismatch {
                        name: name.clone(),
                        expected: match kinds[name] {
                            PredictorKind::Numeric => "numeric",
                            PredictorKind::Categorical => "categorical",
                        },
                        operation: "Dataset::new",
                    });
                }
                match value {
                    Value::Numeric(x) if !x.is_finite() => {
                        return Err(MarginsError::InvalidValue {
                            name: name.clone(),
                            index,
                            value: *x,
                        });
                    }
                    Value::Level(level) => {
                        observed.entry(name.clone()).or_default().push(level.clone());
                    }
                    _ => {}
                }
            }
        }
        let levels: BTreeMap<String, Vec<String>> = observed
            .into_iter()
            .map(|(name, values)| {
                let order = sorted_unique(values.iter().map(String::as_str));
                (name, order)
            })
            .collect();

        Ok(Self { rows, predictors, kinds, levels })
    }

    /// Replace the level order of a categorical predictor.
    ///
    /// # Errors
    /// `UnknownLevel` if an observed level is missing from `order`.
    pub fn with_levels<S: AsRef<str>>(mut self, name: &str, order: &[S]) -> MarginsResult<Self> {
        let order: Vec<String> = order.iter().map(|s| s.as_ref().to_string()).collect();
        let current = self.levels(name)?;
        if let Some(missing) = current.iter().find(|level| !order.contains(level)) {
            return Err(MarginsError::UnknownLevel {
                predictor: name.to_string(),
                level: missing.clone(),
            });
        }
        self.levels.insert(name.to_string(), order);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[CovariateRow] {
        &self.rows
    }

    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<PredictorKind> {
        self.kinds.get(name).copied()
    }

    /// Ordered levels of a categorical predictor; the first is the reference.
    pub fn levels(&self, name: &str) -> MarginsResult<&[String]> {
        self.expect_kind(name, PredictorKind::Categorical, "levels")?;
        Ok(self.levels.get(name).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// All level orders, keyed by predictor.
    pub fn level_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.levels
    }

    pub fn numeric_column(&self, name: &str) -> MarginsResult<Array1<f64>> {
        self.expect_kind(name, PredictorKind::Numeric, "numeric_column")?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| row.numeric(name, i, "numeric_column"))
            .collect::<MarginsResult<Vec<f64>>>()
            .map(Array1::from)
    }

    /// Arithmetic mean of a numeric predictor.
    pub fn mean(&self, name: &str) -> MarginsResult<f64> {
        let column = self.numeric_column(name)?;
        column.mean().ok_or(MarginsError::EmptyGrid { operation: "mean" })
    }

    /// `max − min` of a numeric predictor.
    pub fn range(&self, name: &str) -> MarginsResult<f64> {
        let column = self.numeric_column(name)?;
        if column.is_empty() {
            return Err(MarginsError::EmptyGrid { operation: "range" });
        }
        let (lo, hi) = column
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        Ok(hi - lo)
    }

    /// Scale used for relative finite-difference steps: the observed range,
    /// or `max(|mean|, 1)` when the range is zero.
    pub fn step_scale(&self, name: &str) -> MarginsResult<f64> {
        let range = self.range(name)?;
        if range > 0.0 {
            return Ok(range);
        }
        Ok(self.mean(name)?.abs().max(1.0))
    }

    /// Level shares of a categorical predictor, in level order.
    pub fn proportions(&self, name: &str) -> MarginsResult<Vec<(String, f64)>> {
        let levels = self.levels(name)?;
        if self.rows.is_empty() {
            return Err(MarginsError::EmptyGrid { operation: "proportions" });
        }
        let mut counts = vec![0usize; levels.len()];
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(level) = row.require(name, i)?.as_level() {
                if let Some(pos) = levels.iter().position(|l| l == level) {
                    counts[pos] += 1;
                }
            }
        }
        let n = self.rows.len() as f64;
        Ok(levels.iter().cloned().zip(counts.into_iter().map(|c| c as f64 / n)).collect())
    }

    /// Most frequent level; ties resolve to the earliest level in level order.
    pub fn mode(&self, name: &str) -> MarginsResult<String> {
        let shares = self.proportions(name)?;
        let mut best: Option<(String, f64)> = None;
        for (level, share) in shares {
            if best.as_ref().map_or(true, |(_, s)| share > *s) {
                best = Some((level, share));
            }
        }
        best.map(|(level, _)| level).ok_or(MarginsError::EmptyGrid { operation: "mode" })
    }

    fn expect_kind(
        &self, name: &str, kind: PredictorKind, operation: &'static str,
    ) -> MarginsResult<()> {
        match self.kinds.get(name) {
            None => Err(MarginsError::UnknownPredictor { name: name.to_string(), operation }),
            Some(k) if *k != kind => Err(MarginsError::KindMismatch {
                name: name.to_string(),
                expected: match kind {
                    PredictorKind::Numeric => "numeric",
                    PredictorKind::Categorical => "categorical",
                },
                operation,
            }),
            Some(_) => Ok(()),
        }
    }
}

fn kind_of(name: &str, value: &Value) -> MarginsResult<PredictorKind> {
    match value {
        Value::Numeric(_) => Ok(PredictorKind::Numeric),
        Value::Level(_) => Ok(PredictorKind::Categorical),
        Value::Mixture(_) => Err(MarginsError::KindMismatch {
            name: name.to_string(),
            expected: "an observed numeric or level value",
            operation: "Dataset::new",
        }),
    }
}

fn check_finite(name: &str, values: impl Iterator<Item = f64>) -> MarginsResult<()> {
    for (index, value) in values.enumerate() {
        if !value.is_finite() {
            return Err(MarginsError::InvalidValue { name: name.to_string(), index, value });
        }
    }
    Ok(())
}

fn sorted_unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values.map(str::to_string).collect();
    out.sort();
    out.dedup();
    out
}
