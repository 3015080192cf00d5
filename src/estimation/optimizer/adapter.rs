//! Adapter that exposes a [`LogLikelihood`] as an argmin problem.
//!
//! Maximizing `ℓ(θ)` becomes minimizing `c(θ) = -ℓ(θ)`. Analytic gradients
//! are negated; without one we finite-difference the cost itself, so that
//! branch needs no sign flip.
use crate::estimation::{
    errors::FitError,
    optimizer::{
        finite_diff::central_grad,
        traits::LogLikelihood,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};

/// Bridges a [`LogLikelihood`] and its data to argmin's `CostFunction` and
/// `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: LogLikelihood> {
    pub f: &'a F,
    pub data: &'a F::Data,
}

impl<'a, F: LogLikelihood> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data }
    }

    fn neg_loglik(&self, theta: &Theta) -> Result<Cost, FitError> {
        let output = self.f.value(theta, self.data)?;
        if !output.is_finite() {
            return Err(FitError::NonFiniteCost { value: output });
        }
        Ok(-output)
    }
}

impl<'a, F: LogLikelihood> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// `c(θ) = -ℓ(θ)`; a non-finite `ℓ` is `NonFiniteCost`.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.neg_loglik(theta)?)
    }
}

impl<'a, F: LogLikelihood> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// `-∇ℓ(θ)` when the model provides it, otherwise a finite-difference
    /// gradient of the cost (central, with forward fallback).
    ///
    /// # Errors
    /// - Model errors other than `GradientNotImplemented`.
    /// - Cost errors raised during differencing.
    /// - Dimension / finiteness failures of the gradient.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, theta.len())?;
                Ok(-g)
            }
            Err(FitError::GradientNotImplemented) => {
                Ok(central_grad(theta, &|t: &Theta| self.neg_loglik(t))?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
