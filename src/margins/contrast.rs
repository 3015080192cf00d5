//! margins::contrast — differences, ratios and linear hypotheses over
//! estimates.
//!
//! Purpose
//! -------
//! Combine already-computed [`Estimate`]s into new ones whose standard
//! errors come from the joint parameter gradient: for a linear combination
//! `Σ cᵢ eᵢ` the gradient is `Σ cᵢ gᵢ`, so `Var = (Σ cᵢ gᵢ)ᵀ Σ (Σ cᵢ gᵢ)`
//! and covariances between the combined estimates are accounted for.
//!
//! Key behaviors
//! -------------
//! - [`pairwise`] enumerates pairs under a [`PairOrder`] and reports
//!   differences or ratios (quotient rule on the two gradients).
//! - [`contrast`] parses a linear expression over positional names
//!   (`b1`, `b2`, ...) or estimate labels and evaluates it directly from the
//!   stored gradients. Labels containing spaces or operators are quoted
//!   with backticks: `` `x dY/dX [g=b]` - b1 ``.
//! - [`contrast_weights`] applies precomputed weights.
//!
//! Invariants & assumptions
//! ------------------------
//! - All estimates share one parameter vector; every gradient has
//!   `delta.n_params()` entries.
//! - Only linear combinations are accepted; products of terms, division
//!   by a term, powers and function calls are `UnsupportedExpression`.
use crate::margins::{
    errors::{MarginsError, MarginsResult},
    estimate::Estimate,
    uncertainty::DeltaMethod,
};
use crate::numerical_stability::transformations::GENERAL_TOL;
use ndarray::Array1;
use std::str::FromStr;

/// Which pairs [`pairwise`] reports, for estimates `e₁ .. e_k`.
///
/// - `Pairwise`: every pair, later minus earlier, ordered
///   `(e₂, e₁), (e₃, e₁), (e₃, e₂), ...`.
/// - `RevPairwise`: the same pairs, earlier minus later.
/// - `Reference`: every estimate minus the first.
/// - `Sequential`: every estimate minus its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairOrder {
    #[default]
    Pairwise,
    RevPairwise,
    Reference,
    Sequential,
}

impl FromStr for PairOrder {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pairwise" => Ok(PairOrder::Pairwise),
            "revpairwise" => Ok(PairOrder::RevPairwise),
            "reference" => Ok(PairOrder::Reference),
            "sequential" => Ok(PairOrder::Sequential),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "pair order must be 'pairwise', 'revpairwise', 'reference' or 'sequential'",
            }),
        }
    }
}

/// How two estimates are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContrastFn {
    #[default]
    Difference,
    Ratio,
}

impl FromStr for ContrastFn {
    type Err = MarginsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "difference" | "diff" => Ok(ContrastFn::Difference),
            "ratio" => Ok(ContrastFn::Ratio),
            _ => Err(MarginsError::InvalidOption {
                value: s.to_string(),
                reason: "contrast function must be 'difference' or 'ratio'",
            }),
        }
    }
}

/// pairwise — signed differences (or ratios) between estimates.
///
/// Parameters
/// ----------
/// - `estimates`: ordered estimates (e.g. one per level).
/// - `order`: which pairs to form.
/// - `func`: difference or ratio.
/// - `delta`: covariance and inference settings.
///
/// Returns
/// -------
/// One estimate per pair, labelled `"<a> - <b>"` or `"<a> / <b>"`.
/// `Pairwise` and `RevPairwise` yield `k(k−1)/2` results.
///
/// Errors
/// ------
/// - `EmptyEstimates` when `estimates` is empty.
/// - `ZeroDenominator` for a ratio whose denominator is zero.
/// - `DimensionMismatch` for gradients of the wrong length.
pub fn pairwise(
    estimates: &[Estimate], order: PairOrder, func: ContrastFn, delta: &DeltaMethod<'_>,
) -> MarginsResult<Vec<Estimate>> {
    if estimates.is_empty() {
        return Err(MarginsError::EmptyEstimates { operation: "pairwise" });
    }
    check_gradients(estimates, delta.n_params())?;
    let k = estimates.len();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    match order {
        PairOrder::Pairwise => {
            for j in 1..k {
                for i in 0..j {
                    pairs.push((j, i));
                }
            }
        }
        PairOrder::RevPairwise => {
            for j in 1..k {
                for i in 0..j {
                    pairs.push((i, j));
                }
            }
        }
        PairOrder::Reference => pairs.extend((1..k).map(|j| (j, 0))),
        PairOrder::Sequential => pairs.extend((1..k).map(|j| (j, j - 1))),
    }

    pairs
        .into_iter()
        .map(|(a, b)| -> MarginsResult<Estimate> {
            let (lhs, rhs) = (&estimates[a], &estimates[b]);
            let (label, value, gradient) = match func {
                ContrastFn::Difference => (
                    format!("{} - {}", lhs.label, rhs.label),
                    lhs.estimate - rhs.estimate,
                    &lhs.gradient - &rhs.gradient,
                ),
                ContrastFn::Ratio => {
                    if rhs.estimate.abs() < GENERAL_TOL {
                        return Err(MarginsError::ZeroDenominator { label: rhs.label.clone() });
                    }
                    let ratio = lhs.estimate / rhs.estimate;
                    let gradient = (&lhs.gradient - &(&rhs.gradient * ratio)) / rhs.estimate;
                    (format!("{} / {}", lhs.label, rhs.label), ratio, gradient)
                }
            };
            let rows = merged_rows([lhs, rhs]);
            Ok(delta.estimate(value, gradient)?.with_labels(&label, "", Vec::new(), rows))
        })
        .collect()
}

/// contrast — evaluate a linear expression over estimates.
///
/// Parameters
/// ----------
/// - `estimates`: the estimates the expression refers to; `bN` is the
///   N-th (1-based), and an estimate's label refers to that estimate.
/// - `expression`: e.g. `"b2 - b1"`, `"(b4 - b3) - (b2 - b1)"`,
///   `"b1 = 0.5 * b2"` (rewritten `b1 - 0.5 * b2`).
///
/// Errors
/// ------
/// - `EmptyEstimates` when `estimates` is empty.
/// - `UnknownTerm` for a name that matches no estimate.
/// - `UnsupportedExpression` for anything that is not linear in the
///   estimates, or that references none of them.
///
/// An expression whose weights cancel (`"b1 - b1"`) is the constant it
/// reduces to, with a zero gradient and a standard error of 0.
pub fn contrast(
    estimates: &[Estimate], expression: &str, delta: &DeltaMethod<'_>,
) -> MarginsResult<Estimate> {
    if estimates.is_empty() {
        return Err(MarginsError::EmptyEstimates { operation: "contrast" });
    }
    let form = Parser::new(expression, estimates)?.parse()?;
    if !form.referenced {
        return Err(unsupported(expression, "expression references no estimate"));
    }
    log::debug!("contrast '{expression}' weights: {:?}", form.coefs);
    let label = expression.trim();
    combine(estimates, &form.coefs, form.constant, label, delta)
}

/// contrast_weights — `Σ wᵢ eᵢ` with caller-supplied weights.
///
/// Errors
/// ------
/// - `EmptyEstimates` when `estimates` is empty.
/// - `DimensionMismatch` when `weights.len() != estimates.len()`.
pub fn contrast_weights(
    estimates: &[Estimate], weights: &[f64], label: &str, delta: &DeltaMethod<'_>,
) -> MarginsResult<Estimate> {
    if estimates.is_empty() {
        return Err(MarginsError::EmptyEstimates { operation: "contrast_weights" });
    }
    if weights.len() != estimates.len() {
        return Err(MarginsError::DimensionMismatch {
            what: "contrast weights",
            expected: estimates.len(),
            found: weights.len(),
        });
    }
    for (index, &w) in weights.iter().enumerate() {
        if !w.is_finite() {
            return Err(MarginsError::InvalidValue { name: label.to_string(), index, value: w });
        }
    }
    combine(estimates, weights, 0.0, label, delta)
}

fn combine(
    estimates: &[Estimate], coefs: &[f64], constant: f64, label: &str, delta: &DeltaMethod<'_>,
) -> MarginsResult<Estimate> {
    check_gradients(estimates, delta.n_params())?;
    let mut value = constant;
    let mut gradient = Array1::<f64>::zeros(delta.n_params());
    for (est, &c) in estimates.iter().zip(coefs) {
        if c == 0.0 {
            continue;
        }
        value += c * est.estimate;
        gradient.scaled_add(c, &est.gradient);
    }
    let used = estimates.iter().zip(coefs).filter(|(_, c)| **c != 0.0).map(|(e, _)| e);
    let rows = merged_rows(used);
    Ok(delta.estimate(value, gradient)?.with_labels(label, "", Vec::new(), rows))
}

fn check_gradients(estimates: &[Estimate], p: usize) -> MarginsResult<()> {
    for est in estimates {
        if est.gradient.len() != p {
            return Err(MarginsError::DimensionMismatch {
                what: "estimate gradient",
                expected: p,
                found: est.gradient.len(),
            });
        }
    }
    Ok(())
}

fn merged_rows<'e>(estimates: impl IntoIterator<Item = &'e Estimate>) -> Vec<usize> {
    let mut rows: Vec<usize> = estimates.into_iter().flat_map(|e| e.rows.iter().copied()).collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

fn unsupported(expression: &str, reason: &'static str) -> MarginsError {
    MarginsError::UnsupportedExpression { expression: expression.to_string(), reason }
}

// ---- Expression parsing ----

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Equals,
    Open,
    Close,
}

/// `Σ coefs[i] · eᵢ + constant`.
///
/// `referenced` records whether any estimate was named, even if its
/// weights later cancel.
#[derive(Debug, Clone)]
struct LinearForm {
    coefs: Vec<f64>,
    constant: f64,
    referenced: bool,
}

impl LinearForm {
    fn constant(k: usize, c: f64) -> Self {
        Self { coefs: vec![0.0; k], constant: c, referenced: false }
    }

    fn is_constant(&self) -> bool {
        self.coefs.iter().all(|c| *c == 0.0)
    }

    fn add(mut self, other: &LinearForm, sign: f64) -> Self {
        for (a, b) in self.coefs.iter_mut().zip(&other.coefs) {
            *a += sign * b;
        }
        self.constant += sign * other.constant;
        self.referenced |= other.referenced;
        self
    }

    fn scale(mut self, factor: f64) -> Self {
        for c in &mut self.coefs {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }
}

/// Recursive-descent parser for linear expressions.
///
/// ```text
/// hypothesis := sum ('=' sum)?
/// sum        := product (('+' | '-') product)*
/// product    := unary (('*' | '/') unary)*
/// unary      := ('+' | '-') unary | primary
/// primary    := number | name | '`' label '`' | '(' sum ')'
/// ```
struct Parser<'e> {
    expression: &'e str,
    estimates: &'e [Estimate],
    tokens: Vec<Token>,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn new(expression: &'e str, estimates: &'e [Estimate]) -> MarginsResult<Self> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(unsupported(expression, "empty expression"));
        }
        Ok(Self { expression, estimates, tokens, pos: 0 })
    }

    fn parse(mut self) -> MarginsResult<LinearForm> {
        let lhs = self.sum()?;
        let form = if self.eat(&Token::Equals) {
            let rhs = self.sum()?;
            lhs.add(&rhs, -1.0)
        } else {
            lhs
        };
        if self.pos != self.tokens.len() {
            return Err(unsupported(self.expression, "unexpected trailing input"));
        }
        Ok(form)
    }

    fn sum(&mut self) -> MarginsResult<LinearForm> {
        let mut acc = self.product()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.product()?;
                acc = acc.add(&rhs, 1.0);
            } else if self.eat(&Token::Minus) {
                let rhs = self.product()?;
                acc = acc.add(&rhs, -1.0);
            } else {
                return Ok(acc);
            }
        }
    }

    fn product(&mut self) -> MarginsResult<LinearForm> {
        let mut acc = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.unary()?;
                let referenced = acc.referenced || rhs.referenced;
                acc = match (acc.is_constant(), rhs.is_constant()) {
                    (true, _) => rhs.scale(acc.constant),
                    (false, true) => acc.scale(rhs.constant),
                    (false, false) => {
                        return Err(unsupported(self.expression, "product of two terms"));
                    }
                };
                acc.referenced = referenced;
            } else if self.eat(&Token::Slash) {
                let rhs = self.unary()?;
                if !rhs.is_constant() {
                    return Err(unsupported(self.expression, "division by a term"));
                }
                if rhs.constant == 0.0 {
                    return Err(unsupported(self.expression, "division by zero"));
                }
                acc = acc.scale(1.0 / rhs.constant);
                acc.referenced |= rhs.referenced;
            } else {
                return Ok(acc);
            }
        }
    }

    fn unary(&mut self) -> MarginsResult<LinearForm> {
        if self.eat(&Token::Minus) {
            return Ok(self.unary()?.scale(-1.0));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> MarginsResult<LinearForm> {
        let k = self.estimates.len();
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Number(c)) => {
                self.pos += 1;
                Ok(LinearForm::constant(k, c))
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if self.tokens.get(self.pos) == Some(&Token::Open) {
                    return Err(unsupported(self.expression, "function calls are not linear"));
                }
                let index = self.resolve(&name)?;
                let mut form = LinearForm::constant(k, 0.0);
                form.coefs[index] = 1.0;
                form.referenced = true;
                Ok(form)
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.sum()?;
                if !self.eat(&Token::Close) {
                    return Err(unsupported(self.expression, "unbalanced parentheses"));
                }
                Ok(inner)
            }
            _ => Err(unsupported(self.expression, "expected a term, number or '('")),
        }
    }

    /// Exact label match first, then positional `bN`.
    fn resolve(&self, name: &str) -> MarginsResult<usize> {
        if let Some(i) = self.estimates.iter().position(|e| e.label == name) {
            return Ok(i);
        }
        let positional = name
            .strip_prefix('b')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=self.estimates.len()).contains(n));
        positional.map(|n| n - 1).ok_or_else(|| MarginsError::UnknownTerm {
            name: name.to_string(),
            operation: "contrast",
        })
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

fn tokenize(expression: &str) -> MarginsResult<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '^' => return Err(unsupported(expression, "powers are not linear")),
            '`' => {
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&ch| ch == '`') else {
                    return Err(unsupported(expression, "unterminated backtick label"));
                };
                tokens.push(Token::Name(chars[start..start + len].iter().collect()));
                i = start + len + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent suffix, e.g. 1e-3.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| unsupported(expression, "malformed number"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            _ => return Err(unsupported(expression, "unexpected character")),
        }
    }
    Ok(tokens)
}
