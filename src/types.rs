//! # Weight Types
//!
//! $$
//! \sum_i w_i = 1,\qquad 0 \le w_i \le 1
//! $$
//!
//! Shared result containers for the solver and the post-processing steps.

use std::fmt;

use crate::error::Error;
use crate::error::Result;

/// Why the optimizer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverStatus {
  /// Tolerance met.
  Converged,
  /// Iteration budget exhausted before the tolerance was met.
  MaxItersReached,
  /// Line search could not find a decreasing step.
  Stalled,
  /// Stationary, but the loss is above the acceptance threshold.
  LocalMinimum,
}

impl SolverStatus {
  /// Only [`SolverStatus::Converged`] counts.
  pub fn is_converged(self) -> bool {
    matches!(self, Self::Converged)
  }
}

/// Ordered ticker to weight mapping.
///
/// Order follows the columns of the price matrix the weights were solved on,
/// which is ascending by ticker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightVector {
  tickers: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  /// Pair tickers with weights.
  pub fn new(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    if tickers.len() != weights.len() {
      return Err(Error::invalid(format!(
        "{} tickers but {} weights",
        tickers.len(),
        weights.len()
      )));
    }
    Ok(Self { tickers, weights })
  }

  /// Equal weight `1/n` for every ticker.
  pub fn uniform(tickers: Vec<String>) -> Self {
    let n = tickers.len();
    let weights = vec![1.0 / n.max(1) as f64; n];
    Self { tickers, weights }
  }

  /// Number of tickers.
  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// Tickers in allocation order.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Weights aligned with [`Self::tickers`].
  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  pub(crate) fn weights_mut(&mut self) -> &mut [f64] {
    &mut self.weights
  }

  /// Weight of `ticker`, if present.
  pub fn get(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|i| self.weights[i])
  }

  /// Total weight, `1.0` for a fully invested vector.
  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  /// Largest single weight.
  pub fn max(&self) -> f64 {
    self.weights.iter().copied().fold(f64::NEG_INFINITY, f64::max)
  }

  /// `(ticker, weight)` pairs in allocation order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self
      .tickers
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  /// Convert into the caller-facing `(ticker, weight)` list.
  pub fn into_allocations(self) -> Vec<AllocationWeight> {
    self
      .tickers
      .into_iter()
      .zip(self.weights)
      .map(|(ticker, weight)| AllocationWeight { ticker, weight })
      .collect()
  }
}

/// One entry of the returned allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationWeight {
  pub ticker: String,
  /// Fraction of the portfolio in `[0, 1]`.
  pub weight: f64,
}

impl AllocationWeight {
  /// Weight as a percentage with two decimals, e.g. `"14.29%"`.
  pub fn percent(&self) -> String {
    format!("{:.2}%", self.weight * 100.0)
  }
}

impl fmt::Display for AllocationWeight {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.ticker, self.percent())
  }
}

/// Output of a constrained risk-parity solve.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Best weights found.
  pub weights: WeightVector,
  /// Termination status reported by the backend.
  pub status: SolverStatus,
  /// Iterations performed.
  pub iterations: u64,
  /// Risk-parity loss at `weights`.
  pub loss: f64,
}

impl OptimizationResult {
  pub fn is_converged(&self) -> bool {
    self.status.is_converged()
  }
}
