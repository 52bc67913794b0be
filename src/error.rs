//! # Errors
//!
//! Failure kinds surfaced by the weight solver. None of them is ever turned
//! into a fallback allocation.

use thiserror::Error;

use crate::types::OptimizationResult;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, solving or post-processing weights.
#[derive(Error, Debug)]
pub enum Error {
  /// Fewer tickers with prior-year history than a covariance solve needs.
  #[error("insufficient data: need at least {required} tickers with prior-year prices, got {actual}")]
  InsufficientData {
    /// Minimum number of tickers.
    required: usize,
    /// Tickers left after dropping empty columns.
    actual: usize,
  },

  /// The optimizer stopped before meeting its tolerance.
  ///
  /// The unconverged result is attached so the caller can inspect it and
  /// decide whether to use it anyway.
  #[error(
    "solver did not converge ({:?}) after {} iterations (loss: {:.2e})",
    .result.status,
    .result.iterations,
    .result.loss
  )]
  SolverNonConvergent {
    /// Best iterate found before stopping.
    result: Box<OptimizationResult>,
  },

  /// Covariance has non-finite entries or a near-zero/negative eigenvalue.
  #[error("degenerate covariance matrix: {reason}")]
  DegenerateCovariance {
    /// What the check found.
    reason: String,
  },

  /// Caller supplied parameters outside their domain.
  #[error("invalid parameters: {reason}")]
  InvalidParameters {
    /// Which parameter and why.
    reason: String,
  },

  /// Price rows violate the series invariants.
  #[error("malformed price data: {reason}")]
  MalformedPrices {
    /// Offending ticker/date and the violated rule.
    reason: String,
  },

  /// Failure reported by a collaborator (price source, optimizer backend).
  #[error(transparent)]
  External(#[from] anyhow::Error),
}

impl Error {
  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    Self::InvalidParameters {
      reason: reason.into(),
    }
  }

  pub(crate) fn malformed(reason: impl Into<String>) -> Self {
    Self::MalformedPrices {
      reason: reason.into(),
    }
  }

  pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
    Self::DegenerateCovariance {
      reason: reason.into(),
    }
  }

  /// Unconverged optimizer output, if this is a [`Error::SolverNonConvergent`].
  pub fn unconverged_result(&self) -> Option<&OptimizationResult> {
    match self {
      Self::SolverNonConvergent { result } => Some(result),
      _ => None,
    }
  }
}
