//! Trailing three-year annualised return over a stored series.
//!
//! Two readings of "three years back" are offered:
//!
//! - `MonthEnd`: last value of the latest month against the last value of
//!   the month 36 months earlier, annualised over exactly 3 years.
//! - `Daily`: latest observation against the last observation on or before
//!   the same day 36 months earlier, annualised over `days / 365.25`.
//!
//! Both return `None` when the series is too short or the ratio is not
//! meaningful (zero or negative base).

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, series::Observation};

const LOOKBACK_MONTHS: u32 = 36;
const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
  /// Month-end resampling, exactly 36 months apart.
  MonthEnd,
  /// Nearest trading day 36 months back, annualised over the actual span.
  Daily,
}

impl ReturnMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      ReturnMethod::MonthEnd => "month_end",
      ReturnMethod::Daily => "daily",
    }
  }
}

impl fmt::Display for ReturnMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ReturnMethod {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    match s {
      "month_end" | "standard" => Ok(ReturnMethod::MonthEnd),
      "daily" => Ok(ReturnMethod::Daily),
      other => Err(Error::UnknownReturnMethod(other.to_owned())),
    }
  }
}

/// One computed trailing return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingReturn {
  pub method:        ReturnMethod,
  pub current_date:  NaiveDate,
  pub current_value: f64,
  pub base_date:     NaiveDate,
  pub base_value:    f64,
  /// Span used for annualising.
  pub years:         f64,
  /// Annualised return as a fraction (0.05 is 5%).
  pub annualized:    f64,
  /// Month buckets (`MonthEnd`) or dated points (`Daily`) considered.
  pub points_used:   usize,
}

impl RollingReturn {
  pub fn percent(&self) -> f64 { self.annualized * 100.0 }
}

/// Trailing three-year annualised return of `observations`.
///
/// The observations should belong to one field. Later entries for a repeated
/// date win and NaN values are dropped.
pub fn rolling_return(
  observations: &[Observation],
  method: ReturnMethod,
) -> Option<RollingReturn> {
  let points: BTreeMap<NaiveDate, f64> = observations
    .iter()
    .filter(|o| !o.value.is_nan())
    .map(|o| (o.date, o.value))
    .collect();

  match method {
    ReturnMethod::MonthEnd => month_end(&points),
    ReturnMethod::Daily => daily(&points),
  }
}

fn month_end(points: &BTreeMap<NaiveDate, f64>) -> Option<RollingReturn> {
  // Dates iterate in order, so the last insert per month is its month-end.
  let mut months: BTreeMap<i32, (NaiveDate, f64)> = BTreeMap::new();
  for (date, value) in points {
    months.insert(month_index(*date), (*date, *value));
  }

  let (&last, &(current_date, current_value)) = months.last_key_value()?;
  let &(base_date, base_value) = months.get(&(last - LOOKBACK_MONTHS as i32))?;
  let span = (last - months.first_key_value().map(|(k, _)| *k)?) as usize + 1;

  annualise(
    ReturnMethod::MonthEnd,
    (current_date, current_value),
    (base_date, base_value),
    3.0,
    span,
  )
}

fn daily(points: &BTreeMap<NaiveDate, f64>) -> Option<RollingReturn> {
  let (&current_date, &current_value) = points.last_key_value()?;
  let target = current_date.checked_sub_months(Months::new(LOOKBACK_MONTHS))?;
  let (&base_date, &base_value) = points.range(..=target).next_back()?;

  let days = (current_date - base_date).num_days();
  let years = days as f64 / DAYS_PER_YEAR;
  annualise(
    ReturnMethod::Daily,
    (current_date, current_value),
    (base_date, base_value),
    years,
    points.len(),
  )
}

fn annualise(
  method: ReturnMethod,
  (current_date, current_value): (NaiveDate, f64),
  (base_date, base_value): (NaiveDate, f64),
  years: f64,
  points_used: usize,
) -> Option<RollingReturn> {
  if base_value <= 0.0 || years <= 0.0 {
    return None;
  }
  let annualized = (current_value / base_value).powf(1.0 / years) - 1.0;
  annualized.is_finite().then_some(RollingReturn {
    method,
    current_date,
    current_value,
    base_date,
    base_value,
    years,
    annualized,
    points_used,
  })
}

fn month_index(date: NaiveDate) -> i32 { date.year() * 12 + date.month0() as i32 }
