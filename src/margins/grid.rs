//! margins::grid — reference-grid construction.
//!
//! Purpose
//! -------
//! Build the ordered set of covariate rows a model is evaluated on, under
//! one of three policies:
//!
//! - `Typical`: predictors named in the [`GridSpec`] take their listed
//!   values; every other predictor collapses to one representative value
//!   (numeric mean; categorical per [`TypicalOptions`]). One row per
//!   combination of listed values.
//! - `Counterfactual`: one full copy of the dataset per combination of
//!   listed values, overwriting only the listed predictors.
//! - `AsIs`: the dataset unchanged.
//!
//! Key behaviors
//! -------------
//! - Names in the `GridSpec` are validated against the dataset for every policy
//!   (`UnknownPredictor`), listed values against each predictor's kind and
//!   levels.
//! - The grid records which predictors were listed (`focal`), where each row
//!   came from, the dataset's level orders and a step scale per numeric
//!   predictor, so later stages need not consult the dataset again.
//!
//! Invariants & assumptions
//! ------------------------
//! - Combinations are enumerated with the first listed predictor outermost.
//! - Counterfactual rows are ordered combination-major, observation-minor,
//!   so `rows[c * n + i]` is observation `i` under combination `c`.
//! - An empty dataset yields `EmptyGrid` under every policy.
use crate::margins::{
    data::{CovariateRow, Dataset, PredictorKind, Value},
    errors::{MarginsError, MarginsResult},
    options::{CategoricalTypical, GridPolicy, TypicalOptions},
};
use std::collections::BTreeMap;

/// Values assigned to one predictor by a [`GridSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    /// A single value.
    Fixed(Value),
    /// An explicit list of values.
    Values(Vec<Value>),
    /// The distinct observed values of the predictor (levels in level
    /// order; numeric values ascending).
    Observed,
}

/// Ordered per-predictor value assignments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridSpec {
    entries: Vec<(String, ValueSpec)>,
}

impl GridSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), ValueSpec::Fixed(value.into())));
        self
    }

    pub fn values<V: Into<Value>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.push((name.into(), ValueSpec::Values(values)));
        self
    }

    pub fn observed(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), ValueSpec::Observed));
        self
    }

    pub fn entries(&self) -> &[(String, ValueSpec)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `Grid` — synthetic (or copied) rows to evaluate a model on.
///
/// Fields
/// ------
/// - `rows`: the covariate rows, in evaluation order.
/// - `source`: for each row, the dataset observation it was copied from
///   (`None` for collapsed typical rows).
/// - `focal`: predictors listed in the `GridSpec`, in listing order.
/// - `levels`: level order of every categorical predictor.
/// - `scales`: finite-difference step scale of every numeric predictor.
/// - `policy`: the policy the grid was built under.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: Vec<CovariateRow>,
    source: Vec<Option<usize>>,
    focal: Vec<String>,
    levels: BTreeMap<String, Vec<String>>,
    scales: BTreeMap<String, f64>,
    policy: GridPolicy,
}

impl Grid {
    pub fn rows(&self) -> &[CovariateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn source(&self) -> &[Option<usize>] {
        &self.source
    }

    pub fn focal(&self) -> &[String] {
        &self.focal
    }

    pub fn policy(&self) -> GridPolicy {
        self.policy
    }

    pub fn levels(&self, predictor: &str) -> Option<&[String]> {
        self.levels.get(predictor).map(Vec::as_slice)
    }

    /// Step scale of a numeric predictor; `1.0` when unknown.
    pub fn scale(&self, predictor: &str) -> f64 {
        self.scales.get(predictor).copied().unwrap_or(1.0)
    }
}

/// build_grid — construct a reference grid from a dataset.
///
/// Parameters
/// ----------
/// - `data`: observed rows; supplies kinds, levels, means and modes.
/// - `spec`: per-predictor value assignments.
/// - `policy`: [`GridPolicy::Typical`], `Counterfactual` or `AsIs`.
/// - `typical`: categorical collapse rules (used by `Typical` only).
///
/// Errors
/// ------
/// - `UnknownPredictor` for a spec name absent from `data`.
/// - `EmptyGrid` for an empty dataset or an empty value list.
/// - `KindMismatch`, `UnknownLevel`, `InvalidValue`, `InvalidMixture` for
///   listed values incompatible with their predictor.
pub fn build_grid(
    data: &Dataset, spec: &GridSpec, policy: GridPolicy, typical: &TypicalOptions,
) -> MarginsResult<Grid> {
    for name in spec.names() {
        if !data.contains(name) {
            return Err(MarginsError::UnknownPredictor {
                name: name.to_string(),
                operation: "build_grid",
            });
        }
    }
    if data.is_empty() {
        return Err(MarginsError::EmptyGrid { operation: "build_grid" });
    }

    let mut scales = BTreeMap::new();
    for name in data.predictors() {
        if data.kind(name) == Some(PredictorKind::Numeric) {
            scales.insert(name.clone(), data.step_scale(name)?);
        }
    }
    let levels = data.level_map().clone();

    let (rows, source, focal) = match policy {
        GridPolicy::AsIs => {
            let rows = data.rows().to_vec();
            let source = (0..rows.len()).map(Some).collect();
            (rows, source, Vec::new())
        }
        GridPolicy::Typical => typical_rows(data, spec, typical)?,
        GridPolicy::Counterfactual => counterfactual_rows(data, spec)?,
    };
    log::debug!("built {:?} grid with {} rows (focal: {:?})", policy, rows.len(), focal);

    Ok(Grid { rows, source, focal, levels, scales, policy })
}

type GridRows = (Vec<CovariateRow>, Vec<Option<usize>>, Vec<String>);

fn typical_rows(data: &Dataset, spec: &GridSpec, typical: &TypicalOptions) -> MarginsResult<GridRows> {
    let mut base = CovariateRow::new();
    for name in data.predictors() {
        if spec.names().any(|n| n == name) {
            continue;
        }
        let value = typical_value(data, name, typical)?;
        log::debug!("typical value for '{name}': {value}");
        base.set(name.clone(), value);
    }

    let combos = combinations(data, spec)?;
    let rows: Vec<CovariateRow> = combos
        .iter()
        .map(|combo| {
            let mut row = base.clone();
            for (name, value) in combo {
                row.set(name.clone(), value.clone());
            }
            row
        })
        .collect();
    let source = vec![None; rows.len()];
    Ok((rows, source, spec.names().map(str::to_string).collect()))
}

fn counterfactual_rows(data: &Dataset, spec: &GridSpec) -> MarginsResult<GridRows> {
    let combos = combinations(data, spec)?;
    let n = data.len();
    let mut rows = Vec::with_capacity(combos.len() * n);
    let mut source = Vec::with_capacity(combos.len() * n);
    for combo in &combos {
        for (i, observed) in data.rows().iter().enumerate() {
            let mut row = observed.clone();
            for (name, value) in combo {
                row.set(name.clone(), value.clone());
            }
            rows.push(row);
            source.push(Some(i));
        }
    }
    Ok((rows, source, spec.names().map(str::to_string).collect()))
}

/// Collapsed value of a predictor not listed in the `GridSpec`.
fn typical_value(data: &Dataset, name: &str, typical: &TypicalOptions) -> MarginsResult<Value> {
    match data.kind(name) {
        Some(PredictorKind::Numeric) => Ok(Value::Numeric(data.mean(name)?)),
        Some(PredictorKind::Categorical) => match typical.rule_for(name) {
            CategoricalTypical::ReferenceLevel => {
                let levels = data.levels(name)?;
                levels
                    .first()
                    .map(|l| Value::Level(l.clone()))
                    .ok_or(MarginsError::EmptyGrid { operation: "typical_value" })
            }
            CategoricalTypical::ModalLevel => Ok(Value::Level(data.mode(name)?)),
            CategoricalTypical::ProportionalMix => Value::mixture(name, data.proportions(name)?),
        },
        None => Err(MarginsError::UnknownPredictor { name: name.to_string(), operation: "build_grid" }),
    }
}

/// Cross product of the `GridSpec` value lists, first entry outermost.
fn combinations(data: &Dataset, spec: &GridSpec) -> MarginsResult<Vec<Vec<(String, Value)>>> {
    let mut combos: Vec<Vec<(String, Value)>> = vec![Vec::new()];
    for (name, value_spec) in spec.entries() {
        let values = resolve_values(data, name, value_spec)?;
        if values.is_empty() {
            return Err(MarginsError::EmptyGrid { operation: "build_grid" });
        }
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in &values {
                let mut extended = combo.clone();
                extended.push((name.clone(), value.clone()));
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos)
}

fn resolve_values(data: &Dataset, name: &str, spec: &ValueSpec) -> MarginsResult<Vec<Value>> {
    let values = match spec {
        ValueSpec::Fixed(v) => vec![v.clone()],
        ValueSpec::Values(vs) => vs.clone(),
        ValueSpec::Observed => match data.kind(name) {
            Some(PredictorKind::Categorical) => {
                data.levels(name)?.iter().map(|l| Value::Level(l.clone())).collect()
            }
            _ => {
                let mut xs = data.numeric_column(name)?.to_vec();
                xs.sort_by(|a, b| a.total_cmp(b));
                xs.dedup();
                xs.into_iter().map(Value::Numeric).collect()
            }
        },
    };
    for (index, value) in values.iter().enumerate() {
        check_value(data, name, index, value)?;
    }
    Ok(values)
}

fn check_value(data: &Dataset, name: &str, index: usize, value: &Value) -> MarginsResult<()> {
    match (data.kind(name), value) {
        (Some(PredictorKind::Numeric), Value::Numeric(x)) => {
            if !x.is_finite() {
                return Err(MarginsError::InvalidValue { name: name.to_string(), index, value: *x });
            }
            Ok(())
        }
        (Some(PredictorKind::Numeric), _) => Err(MarginsError::KindMismatch {
            name: name.to_string(),
            expected: "numeric",
            operation: "build_grid",
        }),
        (Some(PredictorKind::Categorical), Value::Numeric(_)) => Err(MarginsError::KindMismatch {
            name: name.to_string(),
            expected: "categorical",
            operation: "build_grid",
        }),
        (Some(PredictorKind::Categorical), Value::Level(level)) => check_level(data, name, level),
        (Some(PredictorKind::Categorical), Value::Mixture(weights)) => {
            for (level, _) in weights {
                check_level(data, name, level)?;
            }
            Value::mixture(name, weights.clone()).map(|_| ())
        }
        (None, _) => {
            Err(MarginsError::UnknownPredictor { name: name.to_string(), operation: "build_grid" })
        }
    }
}

fn check_level(data: &Dataset, name: &str, level: &str) -> MarginsResult<()> {
    if !data.levels(name)?.iter().any(|l| l == level) {
        return Err(MarginsError::UnknownLevel {
            predictor: name.to_string(),
            level: level.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margins::data::Column;
    use approx::assert_abs_diff_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Typical grids: collapse rules, cross products and row counts.
    // - Counterfactual grids: size n × |values| and row ordering.
    // - AsIs grids and the error paths (unknown names, empty data, bad
    //   values).
    // -------------------------------------------------------------------------

    fn data() -> Dataset {
        Dataset::from_columns(vec![
            ("x", Column::Numeric(vec![1.0, 2.0, 3.0, 6.0])),
            ("z", Column::Numeric(vec![0.0, 0.0, 1.0, 1.0])),
            ("g", Column::categorical(&["b", "a", "b", "b"])),
        ])
        .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Check that an empty typical spec collapses every predictor to one row.
    //
    // Given
    // -----
    // - Default typical options (reference level).
    //
    // Expect
    // ------
    // - One row with x = 3, z = 0.5, g = "a".
    fn typical_grid_collapses_to_single_row() {
        let grid =
            build_grid(&data(), &GridSpec::new(), GridPolicy::Typical, &TypicalOptions::default())
                .unwrap();

        assert_eq!(grid.len(), 1);
        let row = &grid.rows()[0];
        assert_abs_diff_eq!(row.get("x").unwrap().as_numeric().unwrap(), 3.0);
        assert_abs_diff_eq!(row.get("z").unwrap().as_numeric().unwrap(), 0.5);
        assert_eq!(row.get("g"), Some(&Value::from("a")));
        assert_eq!(grid.source(), &[None]);
    }

    #[test]
    // Purpose
    // -------
    // Check the modal and proportional-mix collapse rules.
    //
    // Given
    // -----
    // - g = [b, a, b, b]; mode rule globally, mix override for g.
    //
    // Expect
    // ------
    // - Mode gives "b"; mix gives a=0.25, b=0.75.
    fn typical_grid_honors_categorical_rules() {
        let modal = TypicalOptions::new(CategoricalTypical::ModalLevel);
        let grid = build_grid(&data(), &GridSpec::new(), GridPolicy::Typical, &modal).unwrap();
        assert_eq!(grid.rows()[0].get("g"), Some(&Value::from("b")));

        let mix = modal.with_override("g", CategoricalTypical::ProportionalMix);
        let grid = build_grid(&data(), &GridSpec::new(), GridPolicy::Typical, &mix).unwrap();
        let g = grid.rows()[0].get("g").unwrap();
        assert_abs_diff_eq!(g.level_weight("a").unwrap(), 0.25);
        assert_abs_diff_eq!(g.level_weight("b").unwrap(), 0.75);
    }

    #[test]
    // Purpose
    // -------
    // Verify the typical cross product and its ordering.
    //
    // Given
    // -----
    // - x ∈ {0, 10}, g observed (a, b).
    //
    // Expect
    // ------
    // - 4 rows ordered (0,a), (0,b), (10,a), (10,b); z collapsed to 0.5.
    fn typical_grid_cross_product_order() {
        let spec = GridSpec::new().values("x", vec![0.0, 10.0]).observed("g");

        let grid = build_grid(&data(), &spec, GridPolicy::Typical, &TypicalOptions::default())
            .unwrap();

        assert_eq!(grid.len(), 4);
        assert_eq!(grid.focal(), &["x".to_string(), "g".to_string()]);
        let cells: Vec<(f64, String)> = grid
            .rows()
            .iter()
            .map(|r| {
                (r.get("x").unwrap().as_numeric().unwrap(), r.get("g").unwrap().to_string())
            })
            .collect();
        assert_eq!(
            cells,
            vec![
                (0.0, "a".to_string()),
                (0.0, "b".to_string()),
                (10.0, "a".to_string()),
                (10.0, "b".to_string())
            ]
        );
        assert!(grid.rows().iter().all(|r| r.get("z") == Some(&Value::Numeric(0.5))));
    }

    #[test]
    // Purpose
    // -------
    // Verify counterfactual size and row layout.
    //
    // Given
    // -----
    // - 4 observations; g set to each of {a, b}.
    //
    // Expect
    // ------
    // - 8 rows; rows 0..4 have g = a, rows 4..8 have g = b; other
    //   predictors keep observed values; `source` cycles 0..4.
    fn counterfactual_grid_copies_dataset_per_value() {
        let d = data();
        let spec = GridSpec::new().values("g", vec!["a", "b"]);

        let grid = build_grid(&d, &spec, GridPolicy::Counterfactual, &TypicalOptions::default())
            .unwrap();

        assert_eq!(grid.len(), d.len() * 2);
        for (k, row) in grid.rows().iter().enumerate() {
            let expected = if k < 4 { "a" } else { "b" };
            assert_eq!(row.get("g"), Some(&Value::from(expected)));
            assert_eq!(row.get("x"), d.rows()[k % 4].get("x"));
            assert_eq!(grid.source()[k], Some(k % 4));
        }
    }

    #[test]
    // Purpose
    // -------
    // Check AsIs returns the dataset and step scales are recorded.
    //
    // Given
    // -----
    // - The fixture dataset.
    //
    // Expect
    // ------
    // - Same rows; scale(x) = 5 (range), scale(z) = 1.
    fn as_is_grid_returns_dataset_rows() {
        let d = data();

        let grid =
            build_grid(&d, &GridSpec::new(), GridPolicy::AsIs, &TypicalOptions::default()).unwrap();

        assert_eq!(grid.rows(), d.rows());
        assert_abs_diff_eq!(grid.scale("x"), 5.0);
        assert_abs_diff_eq!(grid.scale("z"), 1.0);
        assert_eq!(grid.levels("g").unwrap(), &["a", "b"]);
    }

    #[test]
    // Purpose
    // -------
    // Exercise the error paths.
    //
    // Given
    // -----
    // - An unknown name; an empty dataset; a level on a numeric predictor;
    //   an unknown level; an empty value list.
    //
    // Expect
    // ------
    // - `UnknownPredictor`, `EmptyGrid`, `KindMismatch`, `UnknownLevel`,
    //   `EmptyGrid`.
    fn build_grid_error_paths() {
        let d = data();
        let opts = TypicalOptions::default();

        let unknown = GridSpec::new().fixed("nope", 1.0);
        assert!(matches!(
            build_grid(&d, &unknown, GridPolicy::Typical, &opts),
            Err(MarginsError::UnknownPredictor { ref name, operation: "build_grid" }) if name == "nope"
        ));

        let empty = Dataset::from_columns(vec![("x", Column::Numeric(vec![]))]).unwrap();
        let spec = GridSpec::new().values("x", vec![1.0, 2.0]);
        assert!(matches!(
            build_grid(&empty, &spec, GridPolicy::Counterfactual, &opts),
            Err(MarginsError::EmptyGrid { .. })
        ));

        let wrong_kind = GridSpec::new().fixed("x", "high");
        assert!(matches!(
            build_grid(&d, &wrong_kind, GridPolicy::Typical, &opts),
            Err(MarginsError::KindMismatch { .. })
        ));

        let bad_level = GridSpec::new().fixed("g", "zzz");
        assert!(matches!(
            build_grid(&d, &bad_level, GridPolicy::Counterfactual, &opts),
            Err(MarginsError::UnknownLevel { .. })
        ));

        let no_values = GridSpec::new().values::<f64>("x", vec![]);
        assert!(matches!(
            build_grid(&d, &no_values, GridPolicy::Typical, &opts),
            Err(MarginsError::EmptyGrid { .. })
        ));
    }
}
