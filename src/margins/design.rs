//! margins::design — design-row model adapter for linear-in-parameter models.
//!
//! Purpose
//! -------
//! Provide [`LinearSpec`], a concrete [`LinearPredictor`] for models whose
//! linear predictor is `η = θ · d(row)`, where `d` is a design row built
//! from [`Term`]s (intercept, numeric predictors, integer powers,
//! treatment-coded levels and their interactions). This covers the OLS,
//! logit and probit models used throughout marginal-effects work.
//!
//! Key behaviors
//! -------------
//! - Parse terms from coefficient names as regression software prints them:
//!   `(Intercept)`, `x`, `I(x^2)`, `g[b]` (also `g[T.b]`), `x:g[b]`.
//! - Expand an R-style right-hand side (`x + I(x^2) + g + x:g`, `x*g`,
//!   `- 1`) against a dataset, using treatment coding with the first level
//!   of each categorical predictor as reference.
//! - Supply analytic `∂η/∂θ` (the design row) and `∂d/∂x` (for slopes and
//!   their delta-method gradients) via the product and power rules.
//!
//! Invariants & assumptions
//! ------------------------
//! - Interactions are flat: an `Interaction` never contains another
//!   `Interaction` or an `Intercept`.
//! - A level term evaluates through `Value::level_weight`, so collapsed
//!   proportional mixes enter the design row as fractional dummies.
//! - Term labels are unique within a spec.
use crate::margins::{
    data::{CovariateRow, Dataset, PredictorKind},
    errors::{MarginsError, MarginsResult},
    model::LinearPredictor,
};
use ndarray::{Array1, Array2};

/// One column of the design row.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Intercept,
    Numeric(String),
    Power(String, i32),
    Level { predictor: String, level: String },
    Interaction(Vec<Term>),
}

impl Term {
    pub fn numeric(name: impl Into<String>) -> Self {
        Term::Numeric(name.into())
    }

    pub fn level(predictor: impl Into<String>, level: impl Into<String>) -> Self {
        Term::Level { predictor: predictor.into(), level: level.into() }
    }

    /// Coefficient label in the syntax accepted by [`Term::parse`].
    pub fn label(&self) -> String {
        match self {
            Term::Intercept => "(Intercept)".to_string(),
            Term::Numeric(x) => x.clone(),
            Term::Power(x, k) => format!("I({x}^{k})"),
            Term::Level { predictor, level } => format!("{predictor}[{level}]"),
            Term::Interaction(parts) => {
                parts.iter().map(Term::label).collect::<Vec<_>>().join(":")
            }
        }
    }

    /// Parse a coefficient name.
    ///
    /// # Errors
    /// `InvalidFormula` for malformed powers, empty names, or nested
    /// intercepts inside interactions.
    pub fn parse(name: &str) -> MarginsResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid(name, "empty term"));
        }
        if name == "(Intercept)" || name.eq_ignore_ascii_case("intercept") {
            return Ok(Term::Intercept);
        }
        let parts = split_top_level(name, ':');
        if parts.len() > 1 {
            let factors = parts.iter().map(|p| parse_factor(p)).collect::<MarginsResult<Vec<_>>>()?;
            return Ok(Term::Interaction(factors));
        }
        parse_factor(name)
    }

    /// Value of this design column at `row`.
    pub fn value(&self, row: &CovariateRow, index: usize) -> MarginsResult<f64> {
        match self {
            Term::Intercept => Ok(1.0),
            Term::Numeric(x) => row.numeric(x, index, "design_row"),
            Term::Power(x, k) => Ok(row.numeric(x, index, "design_row")?.powi(*k)),
            Term::Level { predictor, level } => {
                row.require(predictor, index)?.level_weight(level).ok_or_else(|| {
                    MarginsError::KindMismatch {
                        name: predictor.clone(),
                        expected: "categorical",
                        operation: "design_row",
                    }
                })
            }
            Term::Interaction(parts) => {
                let mut product = 1.0;
                for part in parts {
                    product *= part.value(row, index)?;
                }
                Ok(product)
            }
        }
    }

    /// Derivative of this design column with respect to numeric predictor `x`.
    pub fn derivative(&self, row: &CovariateRow, x: &str, index: usize) -> MarginsResult<f64> {
        match self {
            Term::Intercept | Term::Level { .. } => Ok(0.0),
            Term::Numeric(name) => Ok(if name == x { 1.0 } else { 0.0 }),
            Term::Power(name, k) => {
                if name != x {
                    return Ok(0.0);
                }
                let v = row.numeric(name, index, "design_derivative")?;
                Ok(*k as f64 * v.powi(k - 1))
            }
            Term::Interaction(parts) => {
                let values =
                    parts.iter().map(|p| p.value(row, index)).collect::<MarginsResult<Vec<_>>>()?;
                let mut total = 0.0;
                for (i, part) in parts.iter().enumerate() {
                    let d = part.derivative(row, x, index)?;
                    if d == 0.0 {
                        continue;
                    }
                    let rest: f64 =
                        values.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, v)| v).product();
                    total += d * rest;
                }
                Ok(total)
            }
        }
    }

    fn collect_predictors(&self, out: &mut Vec<String>) {
        match self {
            Term::Intercept => {}
            Term::Numeric(x) | Term::Power(x, _) => push_unique(out, x),
            Term::Level { predictor, .. } => push_unique(out, predictor),
            Term::Interaction(parts) => {
                for part in parts {
                    part.collect_predictors(out);
                }
            }
        }
    }
}

/// `LinearSpec` — design-row adapter `η = θ · d(row)`.
///
/// Purpose
/// -------
/// Serve as the reference [`LinearPredictor`] for linear-in-parameter
/// models, with exact parameter gradients and covariate derivatives.
///
/// Invariants
/// ----------
/// - `terms` are unique by label; interactions are flat.
/// - `predictors` lists every predictor any term reads, in first-use order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSpec {
    terms: Vec<Term>,
    predictors: Vec<String>,
}

impl LinearSpec {
    /// Build a spec from explicit terms.
    ///
    /// # Errors
    /// `InvalidFormula` for duplicate labels or nested interactions.
    pub fn new(terms: Vec<Term>) -> MarginsResult<Self> {
        let mut labels: Vec<String> = Vec::with_capacity(terms.len());
        let mut predictors = Vec::new();
        for term in &terms {
            let label = term.label();
            if let Term::Interaction(parts) = term {
                if parts.is_empty()
                    || parts.iter().any(|p| matches!(p, Term::Interaction(_) | Term::Intercept))
                {
                    return Err(invalid(&label, "interactions must be flat products of predictors"));
                }
            }
            if labels.contains(&label) {
                return Err(invalid(&label, "duplicate term"));
            }
            labels.push(label);
            term.collect_predictors(&mut predictors);
        }
        Ok(Self { terms, predictors })
    }

    /// Build a spec from printed coefficient names, in parameter order.
    pub fn from_coefficient_names<S: AsRef<str>>(names: &[S]) -> MarginsResult<Self> {
        let terms =
            names.iter().map(|n| Term::parse(n.as_ref())).collect::<MarginsResult<Vec<_>>>()?;
        Self::new(terms)
    }

    /// Expand an R-style right-hand side against `data`.
    ///
    /// Supported syntax: `+`, `a:b`, `a*b` (all sub-interactions), `I(x^k)`,
    /// `0` or `- 1` to drop the intercept. Categorical predictors expand
    /// to one level term per non-reference level.
    ///
    /// # Errors
    /// - `UnknownPredictor` for names absent from `data`.
    /// - `InvalidFormula` for unsupported syntax.
    pub fn from_formula(rhs: &str, data: &Dataset) -> MarginsResult<Self> {
        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();

        for (sign, chunk) in split_signed(rhs) {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                return Err(invalid(rhs, "empty term"));
            }
            if chunk == "0" || (sign < 0 && chunk == "1") {
                intercept = false;
                continue;
            }
            if sign < 0 {
                return Err(invalid(chunk, "only '- 1' may be subtracted"));
            }
            if chunk == "1" {
                continue;
            }
            for factors in expand_products(chunk) {
                for term in expand_factors(&factors, data)? {
                    if !terms.contains(&term) {
                        terms.push(term);
                    }
                }
            }
        }
        if intercept {
            terms.insert(0, Term::Intercept);
        }
        Self::new(terms)
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn labels(&self) -> Vec<String> {
        self.terms.iter().map(Term::label).collect()
    }

    /// Design row `d(row)`.
    pub fn design_row(&self, row: &CovariateRow, index: usize) -> MarginsResult<Array1<f64>> {
        self.terms.iter().map(|t| t.value(row, index)).collect::<MarginsResult<Vec<_>>>().map(Array1::from)
    }

    /// Stacked design rows of every observation in `data`.
    pub fn design_matrix(&self, data: &Dataset) -> MarginsResult<Array2<f64>> {
        let p = self.terms.len();
        let mut x = Array2::<f64>::zeros((data.len(), p));
        for (i, row) in data.rows().iter().enumerate() {
            let d = self.design_row(row, i)?;
            x.row_mut(i).assign(&d);
        }
        Ok(x)
    }
}

impl LinearPredictor for LinearSpec {
    fn predictors(&self) -> Vec<String> {
        self.predictors.clone()
    }

    fn n_params(&self) -> usize {
        self.terms.len()
    }

    fn linear_predictor(&self, theta: &Array1<f64>, row: &CovariateRow) -> MarginsResult<f64> {
        if theta.len() != self.terms.len() {
            return Err(MarginsError::DimensionMismatch {
                what: "parameter vector",
                expected: self.terms.len(),
                found: theta.len(),
            });
        }
        Ok(self.design_row(row, 0)?.dot(theta))
    }

    fn eta_gradient(&self, _theta: &Array1<f64>, row: &CovariateRow) -> MarginsResult<Array1<f64>> {
        self.design_row(row, 0)
    }

    fn design_derivative(&self, row: &CovariateRow, predictor: &str) -> MarginsResult<Array1<f64>> {
        if !self.predictors.iter().any(|p| p == predictor) {
            return Err(MarginsError::UnknownPredictor {
                name: predictor.to_string(),
                operation: "design_derivative",
            });
        }
        if !row.require(predictor, 0)?.is_numeric() {
            return Err(MarginsError::KindMismatch {
                name: predictor.to_string(),
                expected: "numeric",
                operation: "design_derivative",
            });
        }
        self.terms
            .iter()
            .map(|t| t.derivative(row, predictor, 0))
            .collect::<MarginsResult<Vec<_>>>()
            .map(Array1::from)
    }
}

// ---- Parsing helpers ----

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn invalid(term: &str, reason: &'static str) -> MarginsError {
    MarginsError::InvalidFormula { term: term.to_string(), reason }
}

/// Split on `sep` outside parentheses and brackets.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split a right-hand side into signed chunks on top-level `+` and `-`.
fn split_signed(rhs: &str) -> Vec<(i8, &str)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut sign = 1i8;
    for (i, c) in rhs.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '+' | '-' if depth == 0 => {
                let chunk = &rhs[start..i];
                if !chunk.trim().is_empty() {
                    out.push((sign, chunk));
                }
                sign = if c == '-' { -1 } else { 1 };
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((sign, &rhs[start..]));
    out
}

/// `a*b` becomes `[a], [b], [a, b]`; `a:b` stays one product.
fn expand_products(chunk: &str) -> Vec<Vec<String>> {
    let starred: Vec<&str> = split_top_level(chunk, '*');
    if starred.len() == 1 {
        return vec![split_top_level(chunk, ':').iter().map(|s| s.trim().to_string()).collect()];
    }
    let atoms: Vec<String> = starred.iter().map(|s| s.trim().to_string()).collect();
    let k = atoms.len();
    let mut subsets: Vec<Vec<String>> = (1u32..(1 << k))
        .map(|mask| {
            (0..k).filter(|i| mask & (1 << i) != 0).map(|i| atoms[i].clone()).collect::<Vec<_>>()
        })
        .collect();
    subsets.sort_by_key(Vec::len);
    subsets
}

/// Expand one product of formula atoms into design terms.
fn expand_factors(factors: &[String], data: &Dataset) -> MarginsResult<Vec<Term>> {
    let mut combos: Vec<Vec<Term>> = vec![Vec::new()];
    for atom in factors {
        let options = expand_atom(atom, data)?;
        let mut next = Vec::with_capacity(combos.len() * options.len());
        for combo in &combos {
            for option in &options {
                let mut extended = combo.clone();
                extended.push(option.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos
        .into_iter()
        .map(|mut parts| if parts.len() == 1 { parts.remove(0) } else { Term::Interaction(parts) })
        .collect())
}

fn expand_atom(atom: &str, data: &Dataset) -> MarginsResult<Vec<Term>> {
    if atom.starts_with("I(") {
        let term = parse_factor(atom)?;
        if let Term::Power(x, _) | Term::Numeric(x) = &term {
            if data.kind(x) != Some(PredictorKind::Numeric) {
                return Err(MarginsError::UnknownPredictor {
                    name: x.clone(),
                    operation: "from_formula",
                });
            }
        }
        return Ok(vec![term]);
    }
    match data.kind(atom) {
        Some(PredictorKind::Numeric) => Ok(vec![Term::Numeric(atom.to_string())]),
        Some(PredictorKind::Categorical) => Ok(data
            .levels(atom)?
            .iter()
            .skip(1)
            .map(|level| Term::level(atom, level.clone()))
            .collect()),
        None => Err(MarginsError::UnknownPredictor {
            name: atom.to_string(),
            operation: "from_formula",
        }),
    }
}

/// Parse a single (non-interaction) coefficient factor.
fn parse_factor(raw: &str) -> MarginsResult<Term> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid(raw, "empty factor"));
    }
    if s == "(Intercept)" {
        return Err(invalid(raw, "intercept cannot appear inside an interaction"));
    }
    if let Some(inner) = s.strip_prefix("I(").and_then(|r| r.strip_suffix(')')) {
        let (base, exp) = inner
            .split_once('^')
            .or_else(|| inner.split_once("**"))
            .ok_or_else(|| invalid(raw, "expected I(x^k)"))?;
        let k: i32 = exp.trim().parse().map_err(|_| invalid(raw, "power must be an integer"))?;
        if k < 1 {
            return Err(invalid(raw, "power must be at least 1"));
        }
        let base = base.trim().to_string();
        return Ok(if k == 1 { Term::Numeric(base) } else { Term::Power(base, k) });
    }
    if let Some(open) = s.find('[') {
        let close = s.rfind(']').ok_or_else(|| invalid(raw, "unclosed level bracket"))?;
        if close < open || close != s.len() - 1 {
            return Err(invalid(raw, "malformed level bracket"));
        }
        let predictor = s[..open].trim();
        let level = s[open + 1..close].trim();
        let level = level.strip_prefix("T.").unwrap_or(level);
        if predictor.is_empty() || level.is_empty() {
            return Err(invalid(raw, "level term needs a predictor and a level"));
        }
        return Ok(Term::level(predictor, level));
    }
    if s.contains(|c: char| "()^*/+-".contains(c)) {
        return Err(invalid(raw, "unsupported coefficient syntax"));
    }
    Ok(Term::Numeric(s.to_string()))
}
