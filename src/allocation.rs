//! # Manual Allocations
//!
//! $$
//! w_i' = w_i \cdot \max\left(1 - \sum_{k\,\text{enabled}} \frac{p_k}{100},\ 0\right)
//! $$
//!
//! Fixed-percentage sleeves (cash, bonds, ...) carved out of the portfolio
//! before the risk-parity weights are applied to the remainder.

use impl_new_derive::ImplNew;

use crate::error::Error;
use crate::error::Result;
use crate::types::WeightVector;

/// A named sleeve holding a fixed share of the portfolio.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct ManualAllocation {
  pub name: String,
  /// Share of the portfolio in percent, `(0, 100]`.
  pub percentage: f64,
  pub enabled: bool,
}

impl ManualAllocation {
  fn validate(&self) -> Result<()> {
    if !(self.percentage > 0.0 && self.percentage <= 100.0) {
      return Err(Error::invalid(format!(
        "allocation '{}' has percentage {} outside (0, 100]",
        self.name, self.percentage
      )));
    }
    Ok(())
  }
}

/// Scale `weights` down by the share taken by enabled sleeves.
///
/// With no sleeves the weights come back unchanged. The result sums to the
/// remainder, not to 1. Sleeves summing past 100% zero every weight.
pub fn adjusted_weights(
  weights: &WeightVector,
  allocations: &[ManualAllocation],
) -> Result<WeightVector> {
  if allocations.is_empty() {
    return Ok(weights.clone());
  }
  for allocation in allocations {
    allocation.validate()?;
  }

  let reserved: f64 = allocations
    .iter()
    .filter(|a| a.enabled)
    .map(|a| a.percentage / 100.0)
    .sum();
  let factor = (1.0 - reserved).max(0.0);

  let mut out = weights.clone();
  for w in out.weights_mut() {
    *w *= factor;
  }
  Ok(out)
}
