//! # Price Sources
//!
//! Contract of the external collaborator that yields daily closes. The solver
//! never fetches on its own; callers make sure the store covers the reporting
//! windows before invoking it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::prices::PriceRow;

/// Yields daily closes for a set of tickers over an inclusive date range.
pub trait PriceSource {
  /// Rows sorted by `(ticker, date)` ascending, at most one per `(ticker, date)`.
  fn get_prices(
    &self,
    tickers: &BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
  ) -> anyhow::Result<Vec<PriceRow>>;
}

impl<T: PriceSource + ?Sized> PriceSource for &T {
  fn get_prices(
    &self,
    tickers: &BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
  ) -> anyhow::Result<Vec<PriceRow>> {
    (**self).get_prices(tickers, start, end)
  }
}

/// Price store held in memory, keyed by `(ticker, date)`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPriceSource {
  closes: BTreeMap<(String, NaiveDate), f64>,
}

impl InMemoryPriceSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store a close, replacing any previous close for the same day.
  pub fn insert(&mut self, ticker: impl Into<String>, date: NaiveDate, close: f64) {
    self.closes.insert((ticker.into(), date), close);
  }

  pub fn extend<I: IntoIterator<Item = PriceRow>>(&mut self, rows: I) {
    for row in rows {
      self.insert(row.ticker, row.date, row.close);
    }
  }

  pub fn len(&self) -> usize {
    self.closes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.closes.is_empty()
  }

  /// Requested tickers with no stored close at all.
  pub fn missing_tickers<'a, I>(&self, tickers: I) -> Vec<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    tickers
      .into_iter()
      .filter(|&t| {
        self
          .closes
          .range((t.to_string(), NaiveDate::MIN)..=(t.to_string(), NaiveDate::MAX))
          .next()
          .is_none()
      })
      .map(str::to_string)
      .collect()
  }
}

impl FromIterator<PriceRow> for InMemoryPriceSource {
  fn from_iter<I: IntoIterator<Item = PriceRow>>(iter: I) -> Self {
    let mut source = Self::new();
    source.extend(iter);
    source
  }
}

impl PriceSource for InMemoryPriceSource {
  fn get_prices(
    &self,
    tickers: &BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
  ) -> anyhow::Result<Vec<PriceRow>> {
    if end < start {
      return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for ticker in tickers {
      let range = (ticker.clone(), start)..=(ticker.clone(), end);
      rows.extend(
        self
          .closes
          .range(range)
          .map(|((t, date), &close)| PriceRow::new(t.clone(), *date, close)),
      );
    }
    Ok(rows)
  }
}
