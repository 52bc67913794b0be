//! # Nelder-Mead
//!
//! $$
//! \mathbf{w}(\mathbf{x}) = P\left(b\,\frac{e^{\mathbf{x}}}{\mathbf{1}^\top e^{\mathbf{x}}}\right)
//! $$
//!
//! Derivative-free fallback. The simplex search runs unconstrained over the
//! softmax logits and every evaluated point is mapped back onto the feasible set.

use anyhow::anyhow;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

use super::ConstrainedMinimizer;
use super::ConstrainedProblem;
use super::FeasibleSet;
use super::Minimum;
use crate::error::Result;
use crate::types::SolverStatus;

/// Floor applied to the starting weights before taking logs.
const MIN_START_WEIGHT: f64 = 1e-12;

fn softmax(x: &[f64]) -> Vec<f64> {
  let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|xi| (xi - max).exp()).collect();
  let sum: f64 = exps.iter().sum();
  exps.iter().map(|e| e / sum).collect()
}

fn to_weights(feasible: &FeasibleSet, x: &[f64]) -> Vec<f64> {
  let total = feasible.total();
  let w: Vec<f64> = softmax(x).into_iter().map(|s| s * total).collect();
  feasible.project(&w)
}

struct SoftmaxCost<O> {
  inner: O,
  feasible: FeasibleSet,
}

impl<O> CostFunction for SoftmaxCost<O>
where
  O: CostFunction<Param = Vec<f64>, Output = f64>,
{
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    self.inner.cost(&to_weights(&self.feasible, x))
  }
}

/// argmin Nelder-Mead configuration.
#[derive(Clone, Debug)]
pub struct NelderMeadSolver {
  pub max_iters: u64,
  /// Stop once the standard deviation of simplex costs falls below this.
  pub sd_tolerance: f64,
}

impl Default for NelderMeadSolver {
  fn default() -> Self {
    Self {
      max_iters: 10_000,
      sd_tolerance: 1e-10,
    }
  }
}

impl NelderMeadSolver {
  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }
}

impl ConstrainedMinimizer for NelderMeadSolver {
  fn minimize<O>(&self, problem: ConstrainedProblem<O>) -> Result<Minimum>
  where
    O: CostFunction<Param = Vec<f64>, Output = f64>
      + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
  {
    let ConstrainedProblem {
      objective,
      feasible,
      initial,
    } = problem;
    let n = feasible.dim();

    let start = feasible.project(&initial);
    let x0: Vec<f64> = start.iter().map(|w| w.max(MIN_START_WEIGHT).ln()).collect();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
      let mut point = x0.clone();
      point[i] += 1.0;
      simplex.push(point);
    }

    let cost = SoftmaxCost {
      inner: objective,
      feasible: feasible.clone(),
    };
    let solver = NelderMead::new(simplex).with_sd_tolerance(self.sd_tolerance)?;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run()?;

    let status = match res.state.get_termination_status() {
      TerminationStatus::Terminated(TerminationReason::SolverConverged) => SolverStatus::Converged,
      TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
        SolverStatus::MaxItersReached
      }
      _ => SolverStatus::Stalled,
    };
    let iterations = res.state.get_iter();
    let best_cost = res.state.get_best_cost();
    let best_x = res
      .state
      .best_param
      .ok_or_else(|| anyhow!("nelder-mead finished without a best point"))?;

    let param = to_weights(&feasible, &best_x);
    debug!(iterations, loss = best_cost, ?status, "nelder-mead stopped");

    Ok(Minimum {
      param,
      cost: best_cost,
      iterations,
      status,
    })
  }
}
