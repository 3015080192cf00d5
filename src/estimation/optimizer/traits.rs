//! Public surface of the log-likelihood optimizer.
//!
//! - [`LogLikelihood`]: implemented by each fitted family.
//! - [`MLEOptions`] and [`Tolerances`]: optimizer configuration.
//! - [`LineSearcher`]: line search used inside L-BFGS.
//! - [`OptimOutcome`]: normalized result of [`maximize`](super::maximize).
//!
//! We *maximize* `ℓ(θ)` by minimizing `c(θ) = -ℓ(θ)`. Analytic gradients are
//! gradients of the log-likelihood; the adapter flips the sign.
use crate::estimation::{
    errors::{FitError, FitResult},
    optimizer::{
        types::{Cost, FnEvalMap, Grad, Theta},
        validation::{validate_theta_hat, validate_value, verify_tol_cost, verify_tol_grad},
    },
};
use argmin::core::TerminationStatus;
use argmin_math::ArgminL2Norm;
use std::str::FromStr;

/// Log-likelihood of a parametric family.
///
/// Required:
/// - `value(θ, data)`: `ℓ(θ)`.
/// - `check(θ, data)`: reject invalid `θ`/data pairs before optimization.
///
/// Optional:
/// - `grad(θ, data)`: `∇ℓ(θ)`. Defaults to `GradientNotImplemented`, in
///   which case finite differences of the cost are used.
pub trait LogLikelihood {
    type Data: 'static;

    fn value(&self, theta: &Theta, data: &Self::Data) -> FitResult<Cost>;
    fn check(&self, theta: &Theta, data: &Self::Data) -> FitResult<()>;

    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> FitResult<Grad> {
        Err(FitError::GradientNotImplemented)
    }
}

/// Line search used inside the L-BFGS solver.
///
/// Parses case-insensitively from `"MoreThuente"` / `"HagerZhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineSearcher {
    #[default]
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(FitError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            }),
        }
    }
}

/// Optimizer-level configuration.
///
/// Default
/// -------
/// - `tols`: `tol_grad = 1e-8`, `tol_cost = None`, `max_iter = 500`
/// - `line_searcher`: `MoreThuente`
/// - `verbose`: `false`
/// - `lbfgs_mem`: `None` (uses [`DEFAULT_LBFGS_MEM`](super::types::DEFAULT_LBFGS_MEM))
#[derive(Debug, Clone, PartialEq)]
pub struct MLEOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl MLEOptions {
    /// # Errors
    /// [`FitError::InvalidLBFGSMem`] if `lbfgs_mem == Some(0)`.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
    ) -> FitResult<Self> {
        if lbfgs_mem == Some(0) {
            return Err(FitError::InvalidLBFGSMem {
                mem: 0,
                reason: "L-BFGS memory must be greater than zero.",
            });
        }
        Ok(Self { tols, line_searcher, verbose, lbfgs_mem })
    }
}

impl Default for MLEOptions {
    fn default() -> Self {
        Self {
            tols: Tolerances { tol_grad: Some(1e-8), tol_cost: None, max_iter: Some(500) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

/// Numerical tolerances and iteration limits.
///
/// Any field can be `None` but at least one must be provided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Construct validated tolerances.
    ///
    /// # Errors
    /// - [`FitError::NoTolerancesProvided`] if all three are `None`.
    /// - [`FitError::InvalidTolGrad`] / [`FitError::InvalidTolCost`] for
    ///   non-finite or non-positive tolerances.
    /// - [`FitError::InvalidMaxIter`] if `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> FitResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(FitError::NoTolerancesProvided);
        }
        verify_tol_cost(tol_cost)?;
        verify_tol_grad(tol_grad)?;
        if max_iter == Some(0) {
            return Err(FitError::InvalidMaxIter {
                max_iter: 0,
                reason: "Maximum iterations must be greater than zero.",
            });
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

/// Result of [`maximize`](super::maximize).
///
/// - `theta_hat`: best parameter vector found.
/// - `value`: best log-likelihood `ℓ(θ̂)` (not the cost).
/// - `converged`: solver reported a terminating status.
/// - `status`: printable termination status.
/// - `fn_evals`: argmin counters (`cost_count`, `gradient_count`, ...).
/// - `grad_norm`: norm of the last cost gradient, if available.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Build a validated outcome from raw solver state.
    ///
    /// # Errors
    /// Propagates validation errors for `theta_hat` or `value`.
    pub fn new(
        theta_hat_opt: Option<Theta>, value: f64, termination: TerminationStatus, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> FitResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat_opt)?;
        validate_value(value)?;
        let (converged, status) = match termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            other => (true, format!("{other:?}")),
        };
        Ok(Self {
            theta_hat,
            value,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm: grad.map(|g| g.l2_norm()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmin::core::TerminationReason;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Line-search parsing, tolerance and option construction rules.
    // - Mapping of argmin termination status into `OptimOutcome`.
    //
    // They intentionally DO NOT cover:
    // - Solver execution (see `optimizer::run` and the fitters).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Line searchers parse case-insensitively; unknown names are rejected.
    //
    // Given
    // -----
    // - "hagerzhang", "MORETHUENTE" and "backtracking".
    //
    // Expect
    // ------
    // - The first two parse; the last yields `InvalidLineSearch`.
    fn line_searcher_parses_case_insensitively() {
        // Act / Assert
        assert_eq!("hagerzhang".parse::<LineSearcher>(), Ok(LineSearcher::HagerZhang));
        assert_eq!("MORETHUENTE".parse::<LineSearcher>(), Ok(LineSearcher::MoreThuente));
        assert!(matches!(
            "backtracking".parse::<LineSearcher>(),
            Err(FitError::InvalidLineSearch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Tolerances need at least one stopping rule and a positive iteration cap.
    //
    // Given
    // -----
    // - All-`None` tolerances and `max_iter = Some(0)`.
    //
    // Expect
    // ------
    // - `NoTolerancesProvided` and `InvalidMaxIter` respectively.
    fn tolerances_require_a_valid_stopping_rule() {
        // Act / Assert
        assert_eq!(Tolerances::new(None, None, None), Err(FitError::NoTolerancesProvided));
        assert!(matches!(
            Tolerances::new(Some(1e-6), None, Some(0)),
            Err(FitError::InvalidMaxIter { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Zero L-BFGS memory is rejected; the default options are usable.
    //
    // Given
    // -----
    // - `MLEOptions::new` with `lbfgs_mem = Some(0)` and `MLEOptions::default()`.
    //
    // Expect
    // ------
    // - An `InvalidLBFGSMem` error, and defaults with a gradient tolerance.
    fn mle_options_validate_memory_and_default() {
        // Arrange
        let tols = Tolerances::new(Some(1e-6), None, Some(10)).expect("valid tolerances");

        // Act
        let bad = MLEOptions::new(tols, LineSearcher::MoreThuente, false, Some(0));
        let default = MLEOptions::default();

        // Assert
        assert!(matches!(bad, Err(FitError::InvalidLBFGSMem { .. })));
        assert_eq!(default.tols.tol_grad, Some(1e-8));
        assert_eq!(default.line_searcher, LineSearcher::MoreThuente);
    }

    #[test]
    // Purpose
    // -------
    // Termination status maps onto the `converged` flag.
    //
    // Given
    // -----
    // - A `NotTerminated` status and a `SolverConverged` status.
    //
    // Expect
    // ------
    // - `converged == false` then `true`; the gradient norm is reported.
    fn optim_outcome_maps_termination_status() {
        // Arrange
        let theta = array![1.0, 2.0];

        // Act
        let open = OptimOutcome::new(
            Some(theta.clone()),
            -1.0,
            TerminationStatus::NotTerminated,
            3,
            FnEvalMap::new(),
            None,
        )
        .expect("valid outcome");
        let done = OptimOutcome::new(
            Some(theta),
            -1.0,
            TerminationStatus::Terminated(TerminationReason::SolverConverged),
            7,
            FnEvalMap::new(),
            Some(array![3.0, 4.0]),
        )
        .expect("valid outcome");

        // Assert
        assert!(!open.converged);
        assert!(done.converged);
        assert_eq!(done.iterations, 7);
        assert_eq!(done.grad_norm, Some(5.0));
    }
}
