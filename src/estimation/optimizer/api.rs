use crate::estimation::{
    errors::FitResult,
    optimizer::{
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome},
        types::Theta,
    },
};

/// Maximize a log-likelihood with L-BFGS.
///
/// Runs `f.check(θ₀, data)` once, builds the solver for
/// `opts.line_searcher`, and executes it. The outcome reports `ℓ(θ̂)`.
///
/// # Errors
/// - Any error from `check`.
/// - Solver construction or runtime errors.
/// - Validation failures of the final parameters or value.
pub fn maximize<F: LogLikelihood>(
    f: &F, theta0: Theta, data: &F::Data, opts: &MLEOptions,
) -> FitResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let solver = build_optimizer_more_thuente(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
        LineSearcher::HagerZhang => {
            let solver = build_optimizer_hager_zhang(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{
        errors::FitError,
        optimizer::{traits::Tolerances, types::Grad},
    };
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - End-to-end maximization of a concave objective with both line
    //   searches, with and without an analytic gradient.
    // - The pre-flight `check` hook.
    //
    // They intentionally DO NOT cover:
    // - Likelihoods of the fitted families (see `estimation::binary`).
    // -------------------------------------------------------------------------

    /// Gaussian-shaped log-likelihood peaked at `data`.
    struct Peak {
        analytic: bool,
    }

    impl LogLikelihood for Peak {
        type Data = Theta;

        fn value(&self, theta: &Theta, data: &Theta) -> FitResult<f64> {
            Ok(-0.5 * (theta - data).mapv(|d| d * d).sum())
        }

        fn check(&self, theta: &Theta, data: &Theta) -> FitResult<()> {
            if theta.len() != data.len() {
                return Err(FitError::ThetaLengthMismatch {
                    expected: data.len(),
                    found: theta.len(),
                });
            }
            Ok(())
        }

        fn grad(&self, theta: &Theta, data: &Theta) -> FitResult<Grad> {
            if self.analytic {
                Ok(data - theta)
            } else {
                Err(FitError::GradientNotImplemented)
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // `maximize` finds the peak for every line search / gradient combination.
    //
    // Given
    // -----
    // - `Peak` centered at (1.5, -2.0), started at the origin.
    //
    // Expect
    // ------
    // - θ̂ within 1e-4 of the peak, ℓ(θ̂) ≈ 0, and a converged status.
    fn maximize_finds_peak_for_all_configurations() {
        // Arrange
        let center = array![1.5, -2.0];
        let tols = Tolerances::new(Some(1e-8), None, Some(200)).expect("valid tolerances");

        for searcher in [LineSearcher::MoreThuente, LineSearcher::HagerZhang] {
            for analytic in [true, false] {
                let opts = MLEOptions::new(tols, searcher, false, None).expect("valid options");
                let model = Peak { analytic };

                // Act
                let out = maximize(&model, array![0.0, 0.0], &center, &opts)
                    .expect("concave objective should optimize");

                // Assert
                assert_abs_diff_eq!(out.theta_hat[0], 1.5, epsilon = 1e-4);
                assert_abs_diff_eq!(out.theta_hat[1], -2.0, epsilon = 1e-4);
                assert_abs_diff_eq!(out.value, 0.0, epsilon = 1e-6);
                assert!(out.converged);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // `check` runs before any solver work.
    //
    // Given
    // -----
    // - A length-1 start for a 2-parameter `Peak`.
    //
    // Expect
    // ------
    // - `ThetaLengthMismatch` is returned unchanged.
    fn maximize_runs_check_first() {
        // Arrange
        let center = array![0.0, 0.0];
        let model = Peak { analytic: true };

        // Act
        let err = maximize(&model, array![0.0], &center, &MLEOptions::default())
            .expect_err("wrong parameter length");

        // Assert
        assert_eq!(err, FitError::ThetaLengthMismatch { expected: 2, found: 1 });
    }
}
