//! Time-series values: date windows, fetched series and stored observations.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

// ─── Date window ─────────────────────────────────────────────────────────────

/// An inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
  pub start: NaiveDate,
  pub end:   NaiveDate,
}

impl DateWindow {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Self { Self { start, end } }

  /// A window is empty when its start falls after its end.
  pub fn is_empty(&self) -> bool { self.start > self.end }

  /// Whole days from `start` to `end`; zero for empty windows.
  pub fn days(&self) -> i64 { (self.end - self.start).num_days().max(0) }

  /// The window starting the day after `last` and ending at `end`.
  pub fn after(last: NaiveDate, end: NaiveDate) -> Self {
    let start = last.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    Self { start, end }
  }
}

// ─── Series ──────────────────────────────────────────────────────────────────

/// One field's values as returned by the market-data client.
///
/// Dates are unique and ordered. A value of `None` (or NaN) marks a date the
/// vendor reported without a number; such points are never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
  points: BTreeMap<NaiveDate, Option<f64>>,
}

impl Series {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, date: NaiveDate, value: Option<f64>) {
    self.points.insert(date, value);
  }

  /// Total number of dates, including missing values.
  pub fn len(&self) -> usize { self.points.len() }

  pub fn is_empty(&self) -> bool { self.points.is_empty() }

  /// Iterate the non-missing `(date, value)` pairs in date order.
  pub fn present(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
    self
      .points
      .iter()
      .filter_map(|(date, value)| match value {
        Some(v) if !v.is_nan() => Some((*date, *v)),
        _ => None,
      })
  }

  pub fn present_count(&self) -> usize { self.present().count() }
}

impl FromIterator<(NaiveDate, Option<f64>)> for Series {
  fn from_iter<I: IntoIterator<Item = (NaiveDate, Option<f64>)>>(iter: I) -> Self {
    Self { points: iter.into_iter().collect() }
  }
}

/// The result of one fetch: field name to series. Fields the client could not
/// retrieve are simply absent.
pub type FetchedTable = BTreeMap<String, Series>;

// ─── Observation ─────────────────────────────────────────────────────────────

/// A stored `(code, field, date) -> value` fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
  pub code:  String,
  pub field: String,
  pub date:  NaiveDate,
  pub value: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(s: &str) -> NaiveDate { s.parse().unwrap() }

  #[test]
  fn window_after_same_day_is_empty() {
    let w = DateWindow::after(d("2024-06-01"), d("2024-06-01"));
    assert_eq!(w.start, d("2024-06-02"));
    assert!(w.is_empty());
    assert_eq!(w.days(), 0);
  }

  #[test]
  fn present_skips_missing_and_nan() {
    let series: Series = [
      (d("2024-01-02"), Some(1.5)),
      (d("2024-01-03"), None),
      (d("2024-01-04"), Some(f64::NAN)),
      (d("2024-01-05"), Some(2.0)),
    ]
    .into_iter()
    .collect();

    assert_eq!(series.len(), 4);
    let present: Vec<_> = series.present().collect();
    assert_eq!(present, vec![(d("2024-01-02"), 1.5), (d("2024-01-05"), 2.0)]);
  }
}
