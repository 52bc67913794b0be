//! # Covariance Estimation
//!
//! $$
//! \hat\Sigma_{ij} = \frac{1}{|T_{ij}|-1}\sum_{t\in T_{ij}} (r_{t,i}-\bar r_i)(r_{t,j}-\bar r_j) + \epsilon\,\delta_{ij}
//! $$
//!
//! Pairwise-complete sample covariance of daily returns with a ridge on the
//! diagonal. $T_{ij}$ are the dates on which both tickers have a return.

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;
use crate::prices::PriceMatrix;
use crate::prices::ReturnMatrix;

/// Diagonal regularization added to every estimate.
pub const DEFAULT_RIDGE: f64 = 1e-6;

/// Smallest eigenvalue still accepted as positive definite.
pub const DEFAULT_EIGENVALUE_FLOOR: f64 = 1e-12;

fn sample_covariance(pairs: &[(f64, f64)]) -> f64 {
  if pairs.len() < 2 {
    return f64::NAN;
  }

  let k = pairs.len() as f64;
  let mx = pairs.iter().map(|&(x, _)| x).sum::<f64>() / k;
  let my = pairs.iter().map(|&(_, y)| y).sum::<f64>() / k;
  let acc: f64 = pairs.iter().map(|&(x, y)| (x - mx) * (y - my)).sum();

  acc / (k - 1.0)
}

/// Sample covariance (ddof = 1) over the dates where both columns are observed.
///
/// Pairs with fewer than two common observations are `NaN`.
pub fn pairwise_covariance(returns: &ReturnMatrix) -> DMatrix<f64> {
  let x = returns.values();
  let n = returns.n_tickers();
  let mut cov = DMatrix::from_element(n, n, f64::NAN);

  for i in 0..n {
    for j in i..n {
      let pairs: Vec<(f64, f64)> = x
        .column(i)
        .iter()
        .zip(x.column(j).iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
      let c = sample_covariance(&pairs);
      cov[(i, j)] = c;
      cov[(j, i)] = c;
    }
  }

  cov
}

/// Symmetric covariance over a fixed, ordered ticker set.
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
  tickers: Vec<String>,
  matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
  /// Wrap a square, symmetric matrix whose rows follow `tickers`.
  pub fn new(tickers: Vec<String>, matrix: DMatrix<f64>) -> Result<Self> {
    let n = tickers.len();
    if matrix.shape() != (n, n) {
      return Err(Error::invalid(format!(
        "covariance is {:?} but there are {n} tickers",
        matrix.shape()
      )));
    }

    for i in 0..n {
      for j in (i + 1)..n {
        let (a, b) = (matrix[(i, j)], matrix[(j, i)]);
        let scale = a.abs().max(b.abs()).max(1.0);
        if (a - b).abs() > 1e-12 * scale {
          return Err(Error::degenerate(format!(
            "not symmetric at ({i}, {j}): {a} vs {b}"
          )));
        }
      }
    }

    Ok(Self { tickers, matrix })
  }

  /// Estimate from closing prices: daily returns, pairwise covariance, `+ ridge * I`.
  pub fn estimate(prices: &PriceMatrix, ridge: f64) -> Result<Self> {
    if !ridge.is_finite() || ridge < 0.0 {
      return Err(Error::invalid(format!(
        "ridge must be finite and non-negative, got {ridge}"
      )));
    }

    let returns = prices.pct_change();
    let mut matrix = pairwise_covariance(&returns);
    for i in 0..matrix.nrows() {
      matrix[(i, i)] += ridge;
    }

    debug!(
      tickers = returns.n_tickers(),
      return_days = returns.dates().len(),
      ridge,
      "estimated covariance"
    );

    Ok(Self {
      tickers: returns.tickers().to_vec(),
      matrix,
    })
  }

  /// Row and column labels.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Covariance entries, ridge included.
  pub fn matrix(&self) -> &DMatrix<f64> {
    &self.matrix
  }

  pub fn n(&self) -> usize {
    self.tickers.len()
  }

  /// Diagonal of the matrix.
  pub fn variances(&self) -> Vec<f64> {
    self.matrix.diagonal().iter().copied().collect()
  }

  /// Smallest eigenvalue, or `None` if an entry is not finite or the
  /// decomposition does not converge.
  pub fn min_eigenvalue(&self) -> Option<f64> {
    if self.n() == 0 || self.matrix.iter().any(|v| !v.is_finite()) {
      return None;
    }

    SymmetricEigen::try_new(self.matrix.clone(), f64::EPSILON, 10_000)
      .map(|eig| eig.eigenvalues.min())
  }

  /// Fail with [`Error::DegenerateCovariance`] unless every eigenvalue exceeds `floor`.
  ///
  /// Returns the smallest eigenvalue on success.
  pub fn ensure_positive_definite(&self, floor: f64) -> Result<f64> {
    if let Some((i, j)) = (0..self.n())
      .flat_map(|i| (0..self.n()).map(move |j| (i, j)))
      .find(|&(i, j)| !self.matrix[(i, j)].is_finite())
    {
      return Err(Error::degenerate(format!(
        "no overlapping returns for {} and {}",
        self.tickers[i], self.tickers[j]
      )));
    }

    let min_eig = self
      .min_eigenvalue()
      .ok_or_else(|| Error::degenerate("eigen decomposition did not converge"))?;
    debug!(min_eigenvalue = min_eig, floor, "covariance spectrum checked");

    if min_eig <= floor {
      return Err(Error::degenerate(format!(
        "smallest eigenvalue {min_eig:.3e} is not above {floor:.1e}"
      )));
    }

    Ok(min_eig)
  }
}
