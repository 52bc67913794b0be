//! # Constrained Optimizers
//!
//! $$
//! \min_{\mathbf{w}} \ \mathcal{L}(\mathbf{w}) \quad \text{s.t.} \quad \mathbf{l} \le \mathbf{w} \le \mathbf{u},\ \ \mathbf{1}^\top\mathbf{w} = b
//! $$
//!
//! Backends for minimizing a smooth objective over box bounds and one budget
//! equality. The objective is any argmin [`CostFunction`] + [`Gradient`], so
//! backends can be swapped without touching the objective.

pub mod nelder_mead;
pub mod projected_gradient;

use std::str::FromStr;

use argmin::core::CostFunction;
use argmin::core::Gradient;

pub use nelder_mead::NelderMeadSolver;
pub use projected_gradient::ProjectedGradient;

use crate::error::Error;
use crate::error::Result;
use crate::types::SolverStatus;

/// Tolerance used when checking that bounds admit the budget.
const FEASIBILITY_TOL: f64 = 1e-12;

/// `{ x : lower ≤ x ≤ upper, Σx = total }`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeasibleSet {
  lower: Vec<f64>,
  upper: Vec<f64>,
  total: f64,
}

impl FeasibleSet {
  pub fn new(lower: Vec<f64>, upper: Vec<f64>, total: f64) -> Result<Self> {
    if lower.len() != upper.len() {
      return Err(Error::invalid(format!(
        "{} lower bounds but {} upper bounds",
        lower.len(),
        upper.len()
      )));
    }
    if lower.is_empty() {
      return Err(Error::invalid("feasible set has no dimensions"));
    }
    if !total.is_finite() {
      return Err(Error::invalid(format!("budget must be finite, got {total}")));
    }
    if let Some(i) = (0..lower.len())
      .find(|&i| !lower[i].is_finite() || !upper[i].is_finite() || lower[i] > upper[i])
    {
      return Err(Error::invalid(format!(
        "bounds [{}, {}] at position {i} are not a finite interval",
        lower[i], upper[i]
      )));
    }

    let lower_sum: f64 = lower.iter().sum();
    let upper_sum: f64 = upper.iter().sum();
    if lower_sum > total + FEASIBILITY_TOL || upper_sum < total - FEASIBILITY_TOL {
      return Err(Error::invalid(format!(
        "bounds sum to [{lower_sum}, {upper_sum}] which excludes budget {total}"
      )));
    }

    Ok(Self {
      lower,
      upper,
      total,
    })
  }

  /// Long-only, fully invested: `0 ≤ w ≤ 1`, `Σw = 1`.
  pub fn budget_simplex(n: usize) -> Result<Self> {
    Self::new(vec![0.0; n], vec![1.0; n], 1.0)
  }

  pub fn dim(&self) -> usize {
    self.lower.len()
  }

  /// Budget the coordinates sum to.
  pub fn total(&self) -> f64 {
    self.total
  }

  /// Membership test with slack `tol` on the bounds and the budget.
  pub fn contains(&self, x: &[f64], tol: f64) -> bool {
    x.len() == self.dim()
      && x
        .iter()
        .zip(self.lower.iter().zip(self.upper.iter()))
        .all(|(&xi, (&l, &u))| xi >= l - tol && xi <= u + tol)
      && (x.iter().sum::<f64>() - self.total).abs() <= tol
  }

  fn shifted(&self, x: &[f64], tau: f64) -> Vec<f64> {
    x.iter()
      .zip(self.lower.iter().zip(self.upper.iter()))
      .map(|(&xi, (&l, &u))| (xi - tau).clamp(l, u))
      .collect()
  }

  fn shifted_sum(&self, x: &[f64], tau: f64) -> f64 {
    self.shifted(x, tau).iter().sum()
  }

  /// Euclidean projection.
  ///
  /// The projection is `clamp(x - τ, l, u)` for the shift `τ` that meets the
  /// budget. `Σ clamp(x - τ, l, u)` is piecewise linear and non-increasing in
  /// `τ` with kinks at `x_i - u_i` and `x_i - l_i`, so `τ` is read off the
  /// sorted kinks and interpolated on the bracketing segment. Whatever rounding
  /// is left is pushed into coordinates that still have room, so the result
  /// always sums to the budget and stays inside the box.
  pub fn project(&self, x: &[f64]) -> Vec<f64> {
    let mut kinks: Vec<f64> = x
      .iter()
      .zip(self.lower.iter().zip(self.upper.iter()))
      .flat_map(|(&xi, (&l, &u))| [xi - u, xi - l])
      .collect();
    kinks.sort_by(f64::total_cmp);
    kinks.dedup();

    let sums: Vec<f64> = kinks.iter().map(|&t| self.shifted_sum(x, t)).collect();
    let k = sums.partition_point(|&s| s > self.total);
    let tau = if k == 0 {
      kinks[0]
    } else if k == kinks.len() {
      kinks[k - 1]
    } else {
      let (t0, t1) = (kinks[k - 1], kinks[k]);
      let (s0, s1) = (sums[k - 1], sums[k]);
      if s0 > s1 {
        t0 + (s0 - self.total) / (s0 - s1) * (t1 - t0)
      } else {
        t0
      }
    };

    let mut out = self.shifted(x, tau);

    // spread the rounding residual over coordinates strictly inside their bounds
    let residual = self.total - out.iter().sum::<f64>();
    let free: Vec<usize> = (0..out.len())
      .filter(|&i| out[i] > self.lower[i] && out[i] < self.upper[i])
      .collect();
    if !free.is_empty() {
      let share = residual / free.len() as f64;
      for i in free {
        out[i] = (out[i] + share).clamp(self.lower[i], self.upper[i]);
      }
    }

    // then hand what clamping refused to whichever coordinates have room
    let mut residual = self.total - out.iter().sum::<f64>();
    for i in 0..out.len() {
      if residual == 0.0 {
        break;
      }
      let room = if residual > 0.0 {
        self.upper[i] - out[i]
      } else {
        self.lower[i] - out[i]
      };
      let step = if residual > 0.0 {
        residual.min(room)
      } else {
        residual.max(room)
      };
      out[i] += step;
      residual -= step;
    }

    out
  }

  /// `‖P(x − g) − x‖∞`, zero exactly at a stationary point.
  pub fn stationarity(&self, x: &[f64], g: &[f64]) -> f64 {
    let step: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - gi).collect();
    self
      .project(&step)
      .iter()
      .zip(x.iter())
      .map(|(p, xi)| (p - xi).abs())
      .fold(0.0, f64::max)
  }
}

/// Objective plus feasible set plus starting point.
#[derive(Clone, Debug)]
pub struct ConstrainedProblem<O> {
  pub objective: O,
  pub feasible: FeasibleSet,
  pub initial: Vec<f64>,
}

impl<O> ConstrainedProblem<O> {
  pub fn new(objective: O, feasible: FeasibleSet, initial: Vec<f64>) -> Result<Self> {
    if initial.len() != feasible.dim() {
      return Err(Error::invalid(format!(
        "initial guess has {} entries for a {}-dimensional problem",
        initial.len(),
        feasible.dim()
      )));
    }

    Ok(Self {
      objective,
      feasible,
      initial,
    })
  }

  /// Budget simplex of dimension `n` started from uniform `1/n`.
  pub fn budget_simplex(objective: O, n: usize) -> Result<Self> {
    let feasible = FeasibleSet::budget_simplex(n)?;
    Self::new(objective, feasible, vec![1.0 / n as f64; n])
  }
}

/// Best point found by a backend.
#[derive(Clone, Debug)]
pub struct Minimum {
  pub param: Vec<f64>,
  pub cost: f64,
  pub iterations: u64,
  pub status: SolverStatus,
}

/// Minimizes an objective over a [`FeasibleSet`].
///
/// Implementations must be deterministic and must return a feasible point
/// whatever the status.
pub trait ConstrainedMinimizer {
  fn minimize<O>(&self, problem: ConstrainedProblem<O>) -> Result<Minimum>
  where
    O: CostFunction<Param = Vec<f64>, Output = f64>
      + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>;
}

/// Runtime-selectable backend.
#[derive(Clone, Debug)]
pub enum Solver {
  /// Spectral projected gradient.
  ProjectedGradient(ProjectedGradient),
  /// argmin Nelder-Mead over a softmax parameterisation.
  NelderMead(NelderMeadSolver),
}

impl Default for Solver {
  fn default() -> Self {
    Self::ProjectedGradient(ProjectedGradient::default())
  }
}

impl ConstrainedMinimizer for Solver {
  fn minimize<O>(&self, problem: ConstrainedProblem<O>) -> Result<Minimum>
  where
    O: CostFunction<Param = Vec<f64>, Output = f64>
      + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
  {
    match self {
      Self::ProjectedGradient(s) => s.minimize(problem),
      Self::NelderMead(s) => s.minimize(problem),
    }
  }
}

impl FromStr for Solver {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "projected-gradient" | "projectedgradient" | "spg" | "pg" => {
        Ok(Self::ProjectedGradient(ProjectedGradient::default()))
      }
      "nelder-mead" | "neldermead" | "nm" => Ok(Self::NelderMead(NelderMeadSolver::default())),
      other => Err(Error::invalid(format!("unknown solver backend '{other}'"))),
    }
  }
}
