//! # Price Matrices
//!
//! $$
//! r_{t,j} = \frac{p_{t,j}}{p_{t-1,j}} - 1
//! $$
//!
//! Pivots per-ticker closing prices into date-indexed matrices, splits them into
//! the prior-year and current-year reporting windows and derives daily returns
//! and trailing returns. Missing observations are stored as `NaN`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::Datelike;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::error::Error;
use crate::error::Result;

/// One daily close as yielded by a price source.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct PriceRow {
  pub ticker: String,
  pub date: NaiveDate,
  pub close: f64,
}

/// Daily closes of one ticker, strictly increasing in date.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
  ticker: String,
  points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
  /// Sort `points` by date and validate them.
  ///
  /// Duplicate dates and non-finite or non-positive closes are rejected.
  pub fn new(ticker: impl Into<String>, mut points: Vec<(NaiveDate, f64)>) -> Result<Self> {
    let ticker = ticker.into();
    points.sort_by_key(|&(date, _)| date);

    if let Some(pair) = points.windows(2).find(|pair| pair[0].0 == pair[1].0) {
      return Err(Error::malformed(format!(
        "{ticker} has more than one close on {}",
        pair[0].0
      )));
    }

    if let Some(&(date, close)) = points
      .iter()
      .find(|&&(_, close)| !close.is_finite() || close <= 0.0)
    {
      return Err(Error::malformed(format!(
        "{ticker} has invalid close {close} on {date}"
      )));
    }

    Ok(Self { ticker, points })
  }

  pub fn ticker(&self) -> &str {
    &self.ticker
  }

  /// `(date, close)` pairs in ascending date order.
  pub fn points(&self) -> &[(NaiveDate, f64)] {
    &self.points
  }

  /// Number of closes.
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Observations falling inside `window`.
  pub fn in_window<'a>(
    &'a self,
    window: &'a DateWindow,
  ) -> impl Iterator<Item = (NaiveDate, f64)> + 'a {
    self
      .points
      .iter()
      .copied()
      .filter(move |&(date, _)| window.contains(date))
  }
}

/// Group rows by ticker into validated series, ordered by ticker.
pub fn group_rows(rows: &[PriceRow]) -> Result<Vec<PriceSeries>> {
  let mut by_ticker: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
  for row in rows {
    by_ticker
      .entry(row.ticker.as_str())
      .or_default()
      .push((row.date, row.close));
  }

  by_ticker
    .into_iter()
    .map(|(ticker, points)| PriceSeries::new(ticker, points))
    .collect()
}

/// Inclusive calendar range. Empty when `end < start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DateWindow {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
    Self { start, end }
  }

  /// Both ends are inclusive.
  pub fn contains(&self, date: NaiveDate) -> bool {
    date >= self.start && date <= self.end
  }

  pub fn is_empty(&self) -> bool {
    self.end < self.start
  }
}

/// Prior calendar year (covariance estimation) and current year to date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportingWindows {
  /// Jan 1 to Dec 31 of the year before `as_of`.
  pub prior: DateWindow,
  /// Jan 1 of the `as_of` year up to the day before `as_of`.
  pub current: DateWindow,
}

impl ReportingWindows {
  pub fn for_date(as_of: NaiveDate) -> Result<Self> {
    let jan_first = |year: i32| {
      NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| Error::invalid(format!("year {year} is out of the supported calendar")))
    };

    let year = as_of.year();
    let prior_start = jan_first(year - 1)?;
    let current_start = jan_first(year)?;
    let prior_end = current_start
      .pred_opt()
      .ok_or_else(|| Error::invalid(format!("no day before {current_start}")))?;
    let yesterday = as_of
      .pred_opt()
      .ok_or_else(|| Error::invalid(format!("no day before {as_of}")))?;

    Ok(Self {
      prior: DateWindow::new(prior_start, prior_end),
      current: DateWindow::new(current_start, yesterday),
    })
  }

  /// Range a price source has to cover for both windows.
  pub fn span(&self) -> DateWindow {
    DateWindow::new(self.prior.start, self.current.end.max(self.prior.end))
  }
}

/// Date-indexed, ticker-columned closes. Rows ascend by date, columns by ticker.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl PriceMatrix {
  /// Wrap an existing table. `values` is `dates x tickers`, `NaN` for missing.
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if values.dim() != (dates.len(), tickers.len()) {
      return Err(Error::malformed(format!(
        "price table is {:?} but has {} dates and {} tickers",
        values.dim(),
        dates.len(),
        tickers.len()
      )));
    }
    if dates.windows(2).any(|pair| pair[0] >= pair[1]) {
      return Err(Error::malformed("dates must be strictly increasing"));
    }
    if values.iter().any(|&v| v.is_infinite() || v <= 0.0) {
      return Err(Error::malformed("closes must be positive and finite"));
    }

    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  /// Pivot `series` restricted to `tickers` and `window`.
  ///
  /// Tickers without any observation in the window get no column.
  pub fn from_series(
    series: &[PriceSeries],
    tickers: &BTreeSet<String>,
    window: &DateWindow,
  ) -> Result<Self> {
    let mut columns: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for s in series.iter().filter(|s| tickers.contains(s.ticker())) {
      let points: Vec<_> = s.in_window(window).collect();
      if points.is_empty() {
        continue;
      }
      if columns.insert(s.ticker(), points).is_some() {
        return Err(Error::malformed(format!(
          "{} appears in more than one series",
          s.ticker()
        )));
      }
    }

    let dates: Vec<NaiveDate> = columns
      .values()
      .flat_map(|points| points.iter().map(|&(date, _)| date))
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    let mut values = Array2::from_elem((dates.len(), columns.len()), f64::NAN);
    for (j, points) in columns.values().enumerate() {
      for &(date, close) in points {
        if let Ok(i) = dates.binary_search(&date) {
          values[[i, j]] = close;
        }
      }
    }

    Ok(Self {
      dates,
      tickers: columns.keys().map(|t| t.to_string()).collect(),
      values,
    })
  }

  /// Build prior-year and current-year matrices from raw rows.
  pub fn split_windows(
    rows: &[PriceRow],
    tickers: &BTreeSet<String>,
    windows: &ReportingWindows,
  ) -> Result<(Self, Self)> {
    let series = group_rows(rows)?;
    let prior = Self::from_series(&series, tickers, &windows.prior)?;
    let current = Self::from_series(&series, tickers, &windows.current)?;
    Ok((prior, current))
  }

  /// Row labels, ascending.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Column labels, ascending.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// `dates x tickers` closes, `NaN` where a ticker has no close.
  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  /// Number of rows.
  pub fn n_dates(&self) -> usize {
    self.dates.len()
  }

  /// Number of columns.
  pub fn n_tickers(&self) -> usize {
    self.tickers.len()
  }

  /// True when no ticker has a column.
  pub fn is_empty(&self) -> bool {
    self.tickers.is_empty()
  }

  /// Closes of `ticker`, if it has a column.
  pub fn column(&self, ticker: &str) -> Option<ArrayView1<'_, f64>> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|j| self.values.column(j))
  }

  fn select_columns(&self, keep: &[usize]) -> Self {
    Self {
      dates: self.dates.clone(),
      tickers: keep.iter().map(|&j| self.tickers[j].clone()).collect(),
      values: self.values.select(Axis(1), keep),
    }
  }

  /// Copy without the columns that have no observation at all.
  pub fn drop_empty_columns(&self) -> Self {
    let keep: Vec<usize> = (0..self.n_tickers())
      .filter(|&j| self.values.column(j).iter().any(|v| !v.is_nan()))
      .collect();
    self.select_columns(&keep)
  }

  /// Copy keeping only the tickers with at least `min_returns` daily returns.
  ///
  /// A return needs closes on two consecutive dates of the matrix, so a ticker
  /// with a single close has none.
  pub fn drop_short_histories(&self, min_returns: usize) -> Self {
    let counts = self.pct_change().observations();
    let keep: Vec<usize> = (0..self.n_tickers())
      .filter(|&j| counts[j] >= min_returns)
      .collect();
    self.select_columns(&keep)
  }

  /// Day-over-day percentage change. The first date has no return and is dropped.
  pub fn pct_change(&self) -> ReturnMatrix {
    let n_rows = self.n_dates().saturating_sub(1);
    let mut values = Array2::from_elem((n_rows, self.n_tickers()), f64::NAN);

    for t in 1..self.n_dates() {
      for j in 0..self.n_tickers() {
        let prev = self.values[[t - 1, j]];
        let cur = self.values[[t, j]];
        if prev.is_finite() && cur.is_finite() {
          values[[t - 1, j]] = cur / prev - 1.0;
        }
      }
    }

    ReturnMatrix {
      dates: self.dates.iter().skip(1).copied().collect(),
      tickers: self.tickers.clone(),
      values,
    }
  }

  /// `last / first - 1` over the whole window per ticker.
  ///
  /// Uses the first and last rows of the matrix, so a ticker that did not trade
  /// on either boundary date has no trailing return.
  pub fn trailing_returns(&self) -> BTreeMap<String, f64> {
    let (Some(first), Some(last)) = (
      self.values.outer_iter().next(),
      self.values.outer_iter().last(),
    ) else {
      return BTreeMap::new();
    };

    self
      .tickers
      .iter()
      .zip(first.iter().zip(last.iter()))
      .filter(|(_, (p0, p1))| p0.is_finite() && p1.is_finite())
      .map(|(ticker, (p0, p1))| (ticker.clone(), p1 / p0 - 1.0))
      .collect()
  }
}

/// Daily percentage returns, aligned with the originating [`PriceMatrix`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl ReturnMatrix {
  /// Dates the returns end on. The first price date has no return.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// `NaN` wherever either close of the pair is missing.
  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn n_tickers(&self) -> usize {
    self.tickers.len()
  }

  /// Number of non-missing returns per ticker.
  pub fn observations(&self) -> Vec<usize> {
    self
      .values
      .axis_iter(Axis(1))
      .map(|col| col.iter().filter(|v| v.is_finite()).count())
      .collect()
  }
}
