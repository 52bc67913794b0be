//! # Risk Contribution Objective
//!
//! $$
//! \mathcal{L}(\mathbf{w}) = \sum_{i=1}^n \left(\frac{w_i(\Sigma\mathbf{w})_i}{\mathbf{w}^\top\Sigma\mathbf{w}} - \frac1n\right)^2
//! $$
//!
//! Each asset's fractional contribution to portfolio variance and the squared
//! distance from the equal-contribution target.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use nalgebra::DMatrix;
use nalgebra::DVector;

/// Portfolio variance below which the objective is treated as undefined.
const MIN_VARIANCE: f64 = 1e-30;

/// Loss returned when the portfolio variance underflows.
const UNDEFINED_LOSS: f64 = 1e10;

/// Variance decomposition of a weight vector.
#[derive(Clone, Debug)]
pub struct RiskContributions {
  /// `wᵀΣw`.
  pub total_variance: f64,
  /// `Σw`.
  pub marginal: DVector<f64>,
  /// `w ⊙ Σw`.
  pub contributions: DVector<f64>,
}

impl RiskContributions {
  /// Contributions as a share of total variance. Sums to 1.
  pub fn fractions(&self) -> DVector<f64> {
    &self.contributions / self.total_variance
  }
}

/// Decompose the variance of `w` under `cov`.
pub fn risk_contributions(w: &[f64], cov: &DMatrix<f64>) -> RiskContributions {
  let w = DVector::from_column_slice(w);
  let marginal = cov * &w;
  let total_variance = w.dot(&marginal);
  let contributions = w.component_mul(&marginal);

  RiskContributions {
    total_variance,
    marginal,
    contributions,
  }
}

/// Equal risk contribution loss over a fixed covariance.
#[derive(Clone, Debug)]
pub struct RiskParityObjective {
  cov: DMatrix<f64>,
}

impl RiskParityObjective {
  pub fn new(cov: DMatrix<f64>) -> Self {
    Self { cov }
  }

  pub fn n(&self) -> usize {
    self.cov.nrows()
  }

  /// Covariance the loss is measured against.
  pub fn cov(&self) -> &DMatrix<f64> {
    &self.cov
  }

  /// Squared deviation of the fractional contributions from `1/n`.
  pub fn loss(&self, w: &[f64]) -> f64 {
    let rc = risk_contributions(w, &self.cov);
    if rc.total_variance < MIN_VARIANCE {
      return UNDEFINED_LOSS;
    }

    let target = 1.0 / self.n() as f64;
    rc.fractions().iter().map(|f| (f - target).powi(2)).sum()
  }

  /// Analytic gradient of [`Self::loss`].
  ///
  /// With `f = rc / V` and `d = f - 1/n`:
  /// `∂L/∂w_k = 2/V · (d_k m_k + (Σ(d ⊙ w))_k - 2 m_k Σ_i d_i f_i)`.
  pub fn gradient_at(&self, w: &[f64]) -> Vec<f64> {
    let n = self.n();
    let rc = risk_contributions(w, &self.cov);
    let v = rc.total_variance;
    if v < MIN_VARIANCE {
      return vec![0.0; n];
    }

    let w = DVector::from_column_slice(w);
    let f = rc.fractions();
    let d = f.add_scalar(-1.0 / n as f64);
    let spill = &self.cov * d.component_mul(&w);
    let df = d.dot(&f);

    (0..n)
      .map(|k| 2.0 / v * (d[k] * rc.marginal[k] + spill[k] - 2.0 * rc.marginal[k] * df))
      .collect()
  }
}

impl CostFunction for RiskParityObjective {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.loss(w))
  }
}

impl Gradient for RiskParityObjective {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    Ok(self.gradient_at(w))
  }
}
