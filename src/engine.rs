//! # Risk Parity Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Cap}\left(\operatorname*{arg\,min}_{\mathbf{w}\in\Delta} \mathcal{L}(\mathbf{w}, \hat\Sigma_{\text{prior}})\right)
//! $$
//!
//! Orchestrates the covariance estimate, the constrained solve and the optional
//! cap for one allocation request.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::covariance::CovarianceMatrix;
use crate::covariance::DEFAULT_EIGENVALUE_FLOOR;
use crate::covariance::DEFAULT_RIDGE;
use crate::error::Error;
use crate::error::Result;
use crate::objective::RiskParityObjective;
use crate::optimizers::ConstrainedMinimizer;
use crate::optimizers::ConstrainedProblem;
use crate::optimizers::FeasibleSet;
use crate::optimizers::Solver;
use crate::prices::PriceMatrix;
use crate::prices::ReportingWindows;
use crate::redistribute::CapAndRedistribute;
use crate::redistribute::RedistributionMode;
use crate::source::PriceSource;
use crate::types::AllocationWeight;
use crate::types::OptimizationResult;
use crate::types::SolverStatus;
use crate::types::WeightVector;

/// Fewest tickers a covariance solve accepts.
pub const MIN_TICKERS: usize = 2;

/// Fewest daily returns a ticker needs to take part in the covariance.
pub const MIN_RETURNS: usize = 2;

/// Largest loss accepted from a converged solve.
pub const DEFAULT_LOSS_TOLERANCE: f64 = 1e-6;

/// Runtime configuration for [`RiskParityEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
  /// Added to the covariance diagonal.
  pub ridge: f64,
  /// Smallest eigenvalue accepted before solving.
  pub eigenvalue_floor: f64,
  /// Redistribution mode used whenever a cap is applied.
  pub redistribution: RedistributionMode,
  /// A stationary point with a larger loss is reported as
  /// [`SolverStatus::LocalMinimum`].
  pub loss_tolerance: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      ridge: DEFAULT_RIDGE,
      eigenvalue_floor: DEFAULT_EIGENVALUE_FLOOR,
      redistribution: RedistributionMode::SinglePass,
      loss_tolerance: DEFAULT_LOSS_TOLERANCE,
    }
  }
}

/// Single entry point for risk-parity weight requests.
#[derive(Clone, Debug, Default)]
pub struct RiskParityEngine<S = Solver> {
  config: EngineConfig,
  solver: S,
}

impl<S: ConstrainedMinimizer> RiskParityEngine<S> {
  /// Engine with an explicit configuration and backend.
  pub fn new(config: EngineConfig, solver: S) -> Self {
    Self { config, solver }
  }

  /// Borrow the engine configuration.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Borrow the minimization backend.
  pub fn solver(&self) -> &S {
    &self.solver
  }

  /// Minimize the risk-parity loss on the long-only budget simplex, starting
  /// from uniform `1/n`.
  ///
  /// The result is returned whatever its status; callers decide what to do
  /// with an unconverged solve. The loss has an exact zero on the simplex, so
  /// a stationary point whose loss exceeds `loss_tolerance` is a spurious
  /// local minimum and is reported as [`SolverStatus::LocalMinimum`].
  pub fn optimize(&self, cov: &CovarianceMatrix) -> Result<OptimizationResult> {
    let n = cov.n();
    self.optimize_from(cov, vec![1.0 / n as f64; n])
  }

  /// [`Self::optimize`] from a caller-chosen starting point.
  ///
  /// Retrying a rejected solve from another guess is left to the caller.
  pub fn optimize_from(
    &self,
    cov: &CovarianceMatrix,
    initial: Vec<f64>,
  ) -> Result<OptimizationResult> {
    let n = cov.n();
    let objective = RiskParityObjective::new(cov.matrix().clone());
    let problem = ConstrainedProblem::new(objective, FeasibleSet::budget_simplex(n)?, initial)?;
    let min = self.solver.minimize(problem)?;

    let status = if min.status.is_converged() && min.cost > self.config.loss_tolerance {
      SolverStatus::LocalMinimum
    } else {
      min.status
    };
    debug!(
      tickers = n,
      iterations = min.iterations,
      loss = min.cost,
      ?status,
      "risk parity solve finished"
    );

    Ok(OptimizationResult {
      weights: WeightVector::new(cov.tickers().to_vec(), min.param)?,
      status,
      iterations: min.iterations,
      loss: min.cost,
    })
  }

  /// Uncapped risk-parity weights for the tickers with prior-year history.
  fn solve_uncapped(&self, prior: &PriceMatrix) -> Result<WeightVector> {
    if prior.n_tickers() < MIN_TICKERS {
      return Err(Error::InsufficientData {
        required: MIN_TICKERS,
        actual: prior.n_tickers(),
      });
    }

    let cov = CovarianceMatrix::estimate(prior, self.config.ridge)?;
    cov.ensure_positive_definite(self.config.eigenvalue_floor)?;

    let result = self.optimize(&cov)?;
    if !result.is_converged() {
      warn!(
        status = ?result.status,
        iterations = result.iterations,
        loss = result.loss,
        "risk parity solve did not converge"
      );
      return Err(Error::SolverNonConvergent {
        result: Box::new(result),
      });
    }

    Ok(result.weights)
  }

  fn capped(&self, cap: &CapAndRedistribute) -> CapAndRedistribute {
    cap.clone().with_mode(self.config.redistribution)
  }

  /// Prior-year columns that can enter the covariance.
  fn usable(prior: &PriceMatrix) -> PriceMatrix {
    let usable = prior.drop_short_histories(MIN_RETURNS);
    if usable.n_tickers() < prior.n_tickers() {
      let dropped: Vec<&String> = prior
        .tickers()
        .iter()
        .filter(|t| !usable.tickers().contains(*t))
        .collect();
      debug!(?dropped, min_returns = MIN_RETURNS, "dropped tickers with short prior history");
    }
    usable
  }

  /// Risk-parity weights from the prior-year window, optionally capped.
  ///
  /// Tickers with fewer than [`MIN_RETURNS`] prior-year returns are left out
  /// of the allocation. The current-year window takes no part in the weights.
  pub fn solve_weights(
    &self,
    prior: &PriceMatrix,
    current: &PriceMatrix,
    cap: Option<&CapAndRedistribute>,
  ) -> Result<WeightVector> {
    let prior = Self::usable(prior);
    let current = current.drop_empty_columns();
    debug!(
      prior_dates = prior.n_dates(),
      prior_tickers = prior.n_tickers(),
      current_dates = current.n_dates(),
      current_tickers = current.n_tickers(),
      "price windows"
    );

    let weights = self.solve_uncapped(&prior)?;
    match cap {
      Some(cap) => self.capped(cap).apply(&weights, &prior.trailing_returns()),
      None => Ok(weights),
    }
  }

  /// One solve, several cap options applied independently.
  pub fn solve_weights_many(
    &self,
    prior: &PriceMatrix,
    current: &PriceMatrix,
    caps: &[CapAndRedistribute],
  ) -> Result<Vec<WeightVector>> {
    let prior = Self::usable(prior);
    let weights = self.solve_weights(&prior, current, None)?;
    let trailing = prior.trailing_returns();
    let mode = self.config.redistribution;

    caps
      .par_iter()
      .map(|cap| cap.clone().with_mode(mode).apply(&weights, &trailing))
      .collect()
  }

  /// Fetch closes for the reporting windows of `as_of` and solve.
  pub fn calculate<P: PriceSource>(
    &self,
    source: &P,
    tickers: &BTreeSet<String>,
    as_of: NaiveDate,
    cap: Option<&CapAndRedistribute>,
  ) -> Result<Vec<AllocationWeight>> {
    let windows = ReportingWindows::for_date(as_of)?;
    let span = windows.span();
    let rows = source.get_prices(tickers, span.start, span.end)?;
    let (prior, current) = PriceMatrix::split_windows(&rows, tickers, &windows)?;

    let weights = self.solve_weights(&prior, &current, cap)?;
    info!(
      %as_of,
      requested = tickers.len(),
      allocated = weights.len(),
      capped = cap.is_some(),
      "computed risk parity weights"
    );

    Ok(weights.into_allocations())
  }
}

/// Risk-parity allocation with the default engine.
///
/// `cap` and `top_n` enable cap-and-redistribute and must be given together.
pub fn solve_weights(
  prior: &PriceMatrix,
  current: &PriceMatrix,
  cap: Option<f64>,
  top_n: Option<i64>,
) -> Result<Vec<AllocationWeight>> {
  let cap = CapAndRedistribute::from_options(cap, top_n)?;
  let engine = RiskParityEngine::<Solver>::default();
  engine
    .solve_weights(prior, current, cap.as_ref())
    .map(WeightVector::into_allocations)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;
  use ndarray::Array2;
  use proptest::prelude::*;
  use tracing_test::traced_test;

  use super::*;
  use crate::objective::risk_contributions;
  use crate::optimizers::NelderMeadSolver;
  use crate::optimizers::ProjectedGradient;
  use crate::prices::PriceRow;
  use crate::source::InMemoryPriceSource;

  const R: f64 = 0.05;
  const RETURN_DAYS: usize = 248;

  /// Mutually orthogonal return signs with period four.
  const PATTERNS: [[f64; 4]; 3] = [
    [1.0, 1.0, -1.0, -1.0],
    [1.0, -1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0, 1.0],
  ];

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  /// Prices over 2025 whose returns have zero sample covariance across columns.
  fn uncorrelated(scales: &[f64]) -> PriceMatrix {
    let start = day(2025, 1, 1);
    let dates: Vec<NaiveDate> = (0..=RETURN_DAYS)
      .map(|i| start + chrono::Days::new(i as u64))
      .collect();
    let tickers: Vec<String> = (0..scales.len())
      .map(|j| ((b'A' + j as u8) as char).to_string())
      .collect();

    let mut values = Array2::from_elem((dates.len(), scales.len()), 100.0);
    for (j, scale) in scales.iter().enumerate() {
      for t in 1..dates.len() {
        let r = scale * R * PATTERNS[j][(t - 1) % 4];
        values[[t, j]] = values[[t - 1, j]] * (1.0 + r);
      }
    }

    PriceMatrix::new(dates, tickers, values).unwrap()
  }

  /// Walsh function `k` at day `t`, period eight. Rows 1 to 7 have zero mean
  /// and are mutually orthogonal over every period.
  fn walsh(k: usize, t: usize) -> f64 {
    if (k & (t % 8)).count_ones() % 2 == 0 {
      1.0
    } else {
      -1.0
    }
  }

  /// Prices over 2025 whose daily returns are `0.01 * L * walsh`, so their
  /// sample covariance is proportional to `L Lᵀ`.
  fn correlated(loadings: &[&[f64]]) -> PriceMatrix {
    let start = day(2025, 1, 1);
    let dates: Vec<NaiveDate> = (0..=RETURN_DAYS)
      .map(|i| start + chrono::Days::new(i as u64))
      .collect();
    let tickers: Vec<String> = (0..loadings.len())
      .map(|j| ((b'A' + j as u8) as char).to_string())
      .collect();

    let mut values = Array2::from_elem((dates.len(), loadings.len()), 100.0);
    for (j, row) in loadings.iter().enumerate() {
      for t in 1..dates.len() {
        let r: f64 = row
          .iter()
          .enumerate()
          .map(|(k, l)| 0.01 * l * walsh(k + 1, t - 1))
          .sum();
        values[[t, j]] = values[[t - 1, j]] * (1.0 + r);
      }
    }

    PriceMatrix::new(dates, tickers, values).unwrap()
  }

  fn assert_equal_risk(prior: &PriceMatrix, w: &WeightVector) {
    let cov = CovarianceMatrix::estimate(prior, DEFAULT_RIDGE).unwrap();
    let n = w.len() as f64;
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-9);
    for f in risk_contributions(w.weights(), cov.matrix()).fractions().iter() {
      assert_abs_diff_eq!(*f, 1.0 / n, epsilon = 1e-6);
    }
  }

  fn empty() -> PriceMatrix {
    PriceMatrix::new(Vec::new(), Vec::new(), Array2::zeros((0, 0))).unwrap()
  }

  fn inverse_vol(prior: &PriceMatrix) -> Vec<f64> {
    let cov = CovarianceMatrix::estimate(prior, DEFAULT_RIDGE).unwrap();
    let raw: Vec<f64> = cov.variances().iter().map(|v| 1.0 / v.sqrt()).collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|x| x / total).collect()
  }

  #[test]
  fn equal_variances_give_equal_weights() {
    let prior = uncorrelated(&[1.0, 1.0, 1.0]);
    let out = solve_weights(&prior, &empty(), None, None).unwrap();

    assert_eq!(out.len(), 3);
    for w in &out {
      assert_eq!(w.percent(), "33.33%");
    }
  }

  #[test]
  fn weights_follow_inverse_volatility_without_correlation() {
    let prior = uncorrelated(&[2.0, 1.0]);
    let engine = RiskParityEngine::<Solver>::default();
    let w = engine.solve_weights(&prior, &empty(), None).unwrap();

    let expected = inverse_vol(&prior);
    assert_abs_diff_eq!(w.weights()[0], expected[0], epsilon = 1e-4);
    assert_abs_diff_eq!(w.weights()[1], expected[1], epsilon = 1e-4);
    assert_abs_diff_eq!(w.weights()[1] / w.weights()[0], 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn correlated_prices_reach_equal_risk_contributions() {
    let prior = correlated(&[&[1.0], &[0.6, 0.8], &[0.3, 0.4, 0.5]]);
    let w = RiskParityEngine::<Solver>::default()
      .solve_weights(&prior, &empty(), None)
      .unwrap();

    assert_equal_risk(&prior, &w);
    // C has the lowest variance and the highest weight.
    assert!(w.weights()[2] > w.weights()[0] && w.weights()[2] > w.weights()[1]);
  }

  #[test]
  fn negatively_correlated_prices_reach_equal_risk_contributions() {
    let prior = correlated(&[
      &[1.0],
      &[-0.4, 0.9],
      &[0.2, 0.3, 1.2],
      &[-0.3, -0.2, 0.1, 0.6],
    ]);
    let cov = CovarianceMatrix::estimate(&prior, DEFAULT_RIDGE).unwrap();
    assert!(cov.matrix()[(0, 1)] < 0.0 && cov.matrix()[(0, 3)] < 0.0);

    let w = RiskParityEngine::<Solver>::default()
      .solve_weights(&prior, &empty(), None)
      .unwrap();
    assert_equal_risk(&prior, &w);
  }

  #[test]
  fn offsetting_pair_reports_a_local_minimum() {
    // At uniform weights A's marginal risk is negative and the solve runs
    // onto a vertex, where one asset carries all the risk.
    let prior = correlated(&[&[1.0], &[-1.5, 2.6]]);
    let err = solve_weights(&prior, &empty(), None, None).unwrap_err();

    let result = err.unconverged_result().unwrap();
    assert_eq!(result.status, SolverStatus::LocalMinimum);
    assert_abs_diff_eq!(result.loss, 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn caller_can_restart_from_inverse_volatility() {
    let cov = CovarianceMatrix::new(
      vec!["A".into(), "B".into()],
      DMatrix::from_row_slice(2, 2, &[0.01, -0.045, -0.045, 0.25]),
    )
    .unwrap();
    let engine = RiskParityEngine::<Solver>::default();

    let uniform = engine.optimize(&cov).unwrap();
    assert_eq!(uniform.status, SolverStatus::LocalMinimum);

    // Two assets balance at w ∝ 1/σ whatever the correlation.
    let restarted = engine.optimize_from(&cov, vec![10.0 / 12.0, 2.0 / 12.0]).unwrap();
    assert!(restarted.is_converged(), "{:?}", restarted.status);
    assert_abs_diff_eq!(restarted.weights.weights()[0], 10.0 / 12.0, epsilon = 1e-9);
    assert!(restarted.loss <= 1e-20);
  }

  #[test]
  fn ticker_with_a_single_close_is_dropped() {
    let base = uncorrelated(&[1.0, 1.0, 1.0]);
    let mut values = base.values().clone();
    values.column_mut(1).fill(f64::NAN);
    values[[0, 1]] = 100.0;
    let prior = PriceMatrix::new(base.dates().to_vec(), base.tickers().to_vec(), values).unwrap();

    let out = solve_weights(&prior, &empty(), None, None).unwrap();
    let tickers: Vec<&str> = out.iter().map(|w| w.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["A", "C"]);
    assert!(out.iter().all(|w| w.percent() == "50.00%"));
  }

  #[test]
  fn pair_with_a_single_close_is_insufficient() {
    let base = uncorrelated(&[1.0, 1.0]);
    let mut values = base.values().clone();
    values.column_mut(1).fill(f64::NAN);
    values[[base.n_dates() - 1, 1]] = 42.0;
    let prior = PriceMatrix::new(base.dates().to_vec(), base.tickers().to_vec(), values).unwrap();

    assert!(matches!(
      solve_weights(&prior, &empty(), None, None),
      Err(Error::InsufficientData {
        required: 2,
        actual: 1
      })
    ));
  }

  #[test]
  fn backends_agree() {
    let prior = uncorrelated(&[2.0, 1.0, 0.5]);
    let pg = RiskParityEngine::new(EngineConfig::default(), ProjectedGradient::default())
      .solve_weights(&prior, &empty(), None)
      .unwrap();
    let nm = RiskParityEngine::new(EngineConfig::default(), NelderMeadSolver::default())
      .solve_weights(&prior, &empty(), None)
      .unwrap();

    for (a, b) in pg.weights().iter().zip(nm.weights().iter()) {
      assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
  }

  #[test]
  fn repeated_calls_are_identical() {
    let prior = uncorrelated(&[2.0, 1.0, 0.5]);
    let a = solve_weights(&prior, &empty(), None, None).unwrap();
    let b = solve_weights(&prior, &empty(), None, None).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn tickers_without_prior_history_are_dropped() {
    let mut values = uncorrelated(&[1.0, 1.0, 1.0]).values().clone();
    values.column_mut(1).fill(f64::NAN);
    let base = uncorrelated(&[1.0, 1.0, 1.0]);
    let prior = PriceMatrix::new(base.dates().to_vec(), base.tickers().to_vec(), values).unwrap();

    let out = solve_weights(&prior, &empty(), None, None).unwrap();
    let tickers: Vec<&str> = out.iter().map(|w| w.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["A", "C"]);
  }

  #[test]
  fn single_ticker_is_insufficient() {
    let prior = uncorrelated(&[1.0]);
    let err = solve_weights(&prior, &empty(), None, None).unwrap_err();
    assert!(matches!(
      err,
      Error::InsufficientData {
        required: 2,
        actual: 1
      }
    ));
  }

  #[test]
  fn disjoint_histories_are_degenerate() {
    let base = uncorrelated(&[1.0, 1.0]);
    let mut values = base.values().clone();
    let half = base.n_dates() / 2;
    for t in 0..base.n_dates() {
      if t < half {
        values[[t, 1]] = f64::NAN;
      } else {
        values[[t, 0]] = f64::NAN;
      }
    }
    let prior = PriceMatrix::new(base.dates().to_vec(), base.tickers().to_vec(), values).unwrap();

    assert!(matches!(
      solve_weights(&prior, &empty(), None, None),
      Err(Error::DegenerateCovariance { .. })
    ));
  }

  #[test]
  fn exhausted_budget_surfaces_the_unconverged_result() {
    let prior = uncorrelated(&[2.0, 1.0]);
    let engine = RiskParityEngine::new(
      EngineConfig::default(),
      ProjectedGradient::default().with_max_iters(1),
    );
    let err = engine.solve_weights(&prior, &empty(), None).unwrap_err();

    let result = err.unconverged_result().unwrap();
    assert_eq!(result.iterations, 1);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn cap_moves_surplus_and_keeps_full_investment() {
    let prior = uncorrelated(&[2.0, 1.0, 1.0]);
    let out = solve_weights(&prior, &empty(), Some(0.35), Some(1)).unwrap();

    let total: f64 = out.iter().map(|w| w.weight).sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(out[0].weight, 0.2, epsilon = 1e-3);
    let max = out.iter().map(|w| w.weight).fold(0.0, f64::max);
    assert_abs_diff_eq!(max, 0.45, epsilon = 1e-3);
  }

  #[test]
  fn cap_options_must_come_together() {
    let prior = uncorrelated(&[1.0, 1.0]);
    assert!(matches!(
      solve_weights(&prior, &empty(), Some(0.3), None),
      Err(Error::InvalidParameters { .. })
    ));
    assert!(matches!(
      solve_weights(&prior, &empty(), Some(0.3), Some(-1)),
      Err(Error::InvalidParameters { .. })
    ));
  }

  #[test]
  fn many_caps_match_individual_solves() {
    let prior = uncorrelated(&[2.0, 1.0, 1.0]);
    let engine = RiskParityEngine::<Solver>::default();
    let caps = vec![
      CapAndRedistribute::new(0.35, 1).unwrap(),
      CapAndRedistribute::new(0.5, 0).unwrap(),
    ];

    let many = engine.solve_weights_many(&prior, &empty(), &caps).unwrap();
    assert_eq!(many.len(), 2);
    for (cap, got) in caps.iter().zip(many.iter()) {
      let single = engine.solve_weights(&prior, &empty(), Some(cap)).unwrap();
      assert_eq!(&single, got);
    }
  }

  #[test]
  fn until_capped_mode_holds_the_cap() {
    let prior = uncorrelated(&[2.0, 1.0, 1.0]);
    let engine = RiskParityEngine::new(
      EngineConfig {
        redistribution: RedistributionMode::UntilCapped,
        ..EngineConfig::default()
      },
      Solver::default(),
    );
    let cap = CapAndRedistribute::new(0.35, 1).unwrap();
    let w = engine.solve_weights(&prior, &empty(), Some(&cap)).unwrap();

    assert!(w.max() <= 0.35 + 1e-9, "{w:?}");
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-9);
  }

  #[test]
  #[traced_test]
  fn calculate_reads_the_prior_year_from_a_source() {
    let prior = uncorrelated(&[2.0, 1.0]);
    let mut source = InMemoryPriceSource::new();
    for (j, ticker) in prior.tickers().iter().enumerate() {
      for (t, date) in prior.dates().iter().enumerate() {
        source.insert(ticker.clone(), *date, prior.values()[[t, j]]);
      }
    }
    // Closes outside the prior year must not affect the weights.
    source.extend([
      PriceRow::new("A".into(), day(2024, 12, 31), 1.0),
      PriceRow::new("A".into(), day(2026, 1, 5), 500.0),
      PriceRow::new("B".into(), day(2026, 1, 5), 0.5),
    ]);

    let tickers: BTreeSet<String> = ["A", "B"].iter().map(|t| t.to_string()).collect();
    let engine = RiskParityEngine::<Solver>::default();
    let out = engine
      .calculate(&source, &tickers, day(2026, 3, 1), None)
      .unwrap();
    let direct = engine.solve_weights(&prior, &empty(), None).unwrap();

    assert_eq!(out, direct.into_allocations());
    assert!(logs_contain("computed risk parity weights"));
  }

  proptest! {
    #[test]
    fn solves_are_feasible_and_only_balanced_solves_converge(
      n in 2usize..6,
      entries in prop::collection::vec(-1.0f64..1.0, 36),
    ) {
      let a = DMatrix::from_fn(n, n, |i, j| entries[i * 6 + j]);
      let s = &a * a.transpose() + DMatrix::identity(n, n) * 0.1;
      let s = (&s + s.transpose()) * 0.5;
      let tickers = (0..n).map(|i| format!("T{i}")).collect();
      let cov = CovarianceMatrix::new(tickers, s).unwrap();

      let result = RiskParityEngine::<Solver>::default().optimize(&cov).unwrap();
      let w = result.weights.weights();
      prop_assert!((result.weights.sum() - 1.0).abs() < 1e-9, "{w:?}");
      prop_assert!(w.iter().all(|&x| (-1e-12..=1.0 + 1e-12).contains(&x)), "{w:?}");

      if result.is_converged() {
        for f in risk_contributions(w, cov.matrix()).fractions().iter() {
          prop_assert!((f - 1.0 / n as f64).abs() <= 1e-3, "{result:?}");
        }
      }
    }
  }
}
