//! # Cap & Redistribute
//!
//! $$
//! w_i' = \min(w_i, c) + \mathbb{1}[i \in \text{top}_N]\,\frac{1 - \sum_j \min(w_j, c)}{|\text{top}_N|}
//! $$
//!
//! Bounds the largest weight and hands the clipped surplus to the tickers with
//! the best trailing return, then renormalizes to a fully invested vector.

use std::collections::BTreeMap;

use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::types::WeightVector;

/// How often the surplus is handed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RedistributionMode {
  /// Clip once, redistribute once. A receiving ticker may end above the cap.
  #[default]
  SinglePass,
  /// Re-clip after each redistribution and pass the new surplus on to the
  /// best-ranked tickers still below the cap.
  UntilCapped,
}

/// Validated cap options.
#[derive(Clone, Debug, PartialEq)]
pub struct CapAndRedistribute {
  cap: f64,
  top_n: usize,
  mode: RedistributionMode,
}

impl CapAndRedistribute {
  /// `cap` must lie in `(0, 1]` and `top_n` must be non-negative.
  pub fn new(cap: f64, top_n: i64) -> Result<Self> {
    if !(cap > 0.0 && cap <= 1.0) {
      return Err(Error::invalid(format!("cap must be in (0, 1], got {cap}")));
    }
    let top_n = usize::try_from(top_n)
      .map_err(|_| Error::invalid(format!("top_n must be non-negative, got {top_n}")))?;

    Ok(Self {
      cap,
      top_n,
      mode: RedistributionMode::default(),
    })
  }

  /// Both options or neither; one without the other is rejected.
  pub fn from_options(cap: Option<f64>, top_n: Option<i64>) -> Result<Option<Self>> {
    match (cap, top_n) {
      (Some(cap), Some(top_n)) => Self::new(cap, top_n).map(Some),
      (None, None) => Ok(None),
      (Some(_), None) => Err(Error::invalid("cap was given without top_n")),
      (None, Some(_)) => Err(Error::invalid("top_n was given without cap")),
    }
  }

  pub fn with_mode(mut self, mode: RedistributionMode) -> Self {
    self.mode = mode;
    self
  }

  /// Largest weight any ticker keeps.
  pub fn cap(&self) -> f64 {
    self.cap
  }

  /// How many top performers receive the surplus.
  pub fn top_n(&self) -> usize {
    self.top_n
  }

  /// Single pass or repeated until capped.
  pub fn mode(&self) -> RedistributionMode {
    self.mode
  }

  /// Apply the cap to `weights`.
  ///
  /// `trailing` maps tickers to their trailing return; tickers absent from it
  /// never receive surplus.
  pub fn apply(
    &self,
    weights: &WeightVector,
    trailing: &BTreeMap<String, f64>,
  ) -> Result<WeightVector> {
    let mut out = weights.clone();
    let ranked = rank_by_return(out.tickers(), trailing);
    let cap = self.cap;

    clip(out.weights_mut(), cap);

    match self.mode {
      RedistributionMode::SinglePass => {
        let surplus = 1.0 - out.sum();
        let selected: Vec<usize> = ranked.iter().copied().take(self.top_n).collect();
        if surplus > 0.0 && !selected.is_empty() {
          let share = surplus / selected.len() as f64;
          for i in &selected {
            out.weights_mut()[*i] += share;
          }
          debug!(surplus, receivers = selected.len(), "redistributed capped surplus");
        }
      }
      RedistributionMode::UntilCapped => {
        for round in 0..=out.len() {
          let surplus = 1.0 - out.sum();
          let selected: Vec<usize> = ranked
            .iter()
            .copied()
            .filter(|&i| out.weights()[i] < cap)
            .take(self.top_n)
            .collect();
          if surplus <= 0.0 || selected.is_empty() {
            debug!(rounds = round, surplus, "redistribution settled");
            break;
          }

          let share = surplus / selected.len() as f64;
          for i in selected {
            out.weights_mut()[i] += share;
          }
          clip(out.weights_mut(), cap);
        }
      }
    }

    renormalize(&mut out)?;

    if out.max() > cap + 1e-12 {
      warn!(
        cap,
        max_weight = out.max(),
        mode = ?self.mode,
        "capped weights exceed the cap after renormalization"
      );
    }

    Ok(out)
  }
}

fn clip(weights: &mut [f64], cap: f64) {
  for w in weights.iter_mut() {
    *w = w.min(cap);
  }
}

/// Positions of tickers with a finite trailing return, best first. Ties keep
/// the input order.
fn rank_by_return(tickers: &[String], trailing: &BTreeMap<String, f64>) -> Vec<usize> {
  let mut valid: Vec<(usize, f64)> = tickers
    .iter()
    .enumerate()
    .filter_map(|(i, t)| trailing.get(t).filter(|r| r.is_finite()).map(|&r| (i, r)))
    .collect();
  valid.sort_by(|a, b| b.1.total_cmp(&a.1));
  valid.into_iter().map(|(i, _)| i).collect()
}

fn renormalize(weights: &mut WeightVector) -> Result<()> {
  let total = weights.sum();
  if !(total.is_finite() && total > 0.0) {
    return Err(Error::invalid(format!(
      "cannot renormalize weights summing to {total}"
    )));
  }
  for w in weights.weights_mut() {
    *w /= total;
  }
  Ok(())
}
