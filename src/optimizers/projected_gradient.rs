//! # Spectral Projected Gradient
//!
//! $$
//! \mathbf{x}_{k+1} = \mathbf{x}_k + \alpha_k\left(P(\mathbf{x}_k - \lambda_k \nabla f(\mathbf{x}_k)) - \mathbf{x}_k\right),
//! \qquad \lambda_{k+1} = \frac{\mathbf{s}_k^\top\mathbf{s}_k}{\mathbf{s}_k^\top\mathbf{y}_k}
//! $$
//!
//! Barzilai-Borwein step length with Armijo backtracking along the projected
//! direction. Every iterate is feasible because it is a convex combination of
//! two feasible points.

use anyhow::anyhow;
use argmin::core::CostFunction;
use argmin::core::Gradient;
use tracing::debug;

use super::ConstrainedMinimizer;
use super::ConstrainedProblem;
use super::Minimum;
use crate::error::Result;
use crate::types::SolverStatus;

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
  a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

fn max_abs(a: &[f64]) -> f64 {
  a.iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Projected-gradient backend configuration.
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  /// Iteration budget.
  pub max_iters: u64,
  /// Converged once `‖P(x − ∇f) − x‖∞` is at most this.
  pub tolerance: f64,
  /// Converged once the objective is at most this.
  pub cost_tolerance: f64,
  /// Sufficient-decrease constant of the line search.
  pub armijo: f64,
  /// Lower safeguard on the spectral step.
  pub min_step: f64,
  /// Upper safeguard on the spectral step.
  pub max_step: f64,
}

impl Default for ProjectedGradient {
  fn default() -> Self {
    Self {
      max_iters: 1000,
      tolerance: 1e-10,
      cost_tolerance: 1e-20,
      armijo: 1e-4,
      min_step: 1e-10,
      max_step: 1e6,
    }
  }
}

impl ProjectedGradient {
  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }

  pub fn with_tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }

  fn converged(&self, cost: f64, stationarity: f64) -> bool {
    cost <= self.cost_tolerance || stationarity <= self.tolerance
  }

  /// Restart step `1 / ‖P(x − ∇f) − x‖∞`, used first and whenever the
  /// curvature estimate is not positive.
  fn restart_step(&self, stationarity: f64) -> f64 {
    if stationarity > 0.0 {
      (1.0 / stationarity).clamp(self.min_step, self.max_step)
    } else {
      1.0
    }
  }
}

fn evaluate<O>(objective: &O, x: &Vec<f64>) -> Result<(f64, Vec<f64>)>
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let cost = objective.cost(x)?;
  let grad = objective.gradient(x)?;
  if !cost.is_finite() || grad.iter().any(|g| !g.is_finite()) {
    return Err(anyhow!("objective is not finite at {x:?}").into());
  }
  Ok((cost, grad))
}

impl ConstrainedMinimizer for ProjectedGradient {
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

    let mut x = feasible.project(&initial);
    let (mut fx, mut g) = evaluate(&objective, &x)?;
    let mut pg = feasible.stationarity(&x, &g);
    let mut lambda = self.restart_step(pg);

    for iter in 0..self.max_iters {
      if self.converged(fx, pg) {
        debug!(iterations = iter, loss = fx, "projected gradient converged");
        return Ok(Minimum {
          param: x,
          cost: fx,
          iterations: iter,
          status: SolverStatus::Converged,
        });
      }

      let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - lambda * gi).collect();
      let d = sub(&feasible.project(&trial), &x);
      let slope = dot(&g, &d);
      if slope >= 0.0 {
        debug!(
          iterations = iter,
          loss = fx,
          slope,
          "projected direction is not a descent direction"
        );
        return Ok(Minimum {
          param: x,
          cost: fx,
          iterations: iter,
          status: SolverStatus::Stalled,
        });
      }

      let mut alpha = 1.0;
      let (candidate, f_candidate) = loop {
        let candidate: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + alpha * di).collect();
        let f_candidate = objective.cost(&candidate)?;
        if f_candidate.is_finite() && f_candidate <= fx + self.armijo * alpha * slope {
          break (candidate, f_candidate);
        }

        alpha *= 0.5;
        if alpha * max_abs(&d) <= f64::EPSILON * max_abs(&x).max(1.0) {
          debug!(iterations = iter, loss = fx, "projected gradient line search stalled");
          return Ok(Minimum {
            param: x,
            cost: fx,
            iterations: iter,
            status: SolverStatus::Stalled,
          });
        }
      };

      let g_candidate = objective.gradient(&candidate)?;
      if g_candidate.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("gradient is not finite at {candidate:?}").into());
      }
      let pg_candidate = feasible.stationarity(&candidate, &g_candidate);
      let s = sub(&candidate, &x);
      let y = sub(&g_candidate, &g);
      let sy = dot(&s, &y);
      lambda = if sy > 0.0 {
        (dot(&s, &s) / sy).clamp(self.min_step, self.max_step)
      } else {
        self.restart_step(pg_candidate)
      };

      x = candidate;
      fx = f_candidate;
      g = g_candidate;
      pg = pg_candidate;
    }

    let status = if self.converged(fx, pg) {
      SolverStatus::Converged
    } else {
      SolverStatus::MaxItersReached
    };
    debug!(iterations = self.max_iters, loss = fx, ?status, "projected gradient stopped");

    Ok(Minimum {
      param: x,
      cost: fx,
      iterations: self.max_iters,
      status,
    })
  }
}
