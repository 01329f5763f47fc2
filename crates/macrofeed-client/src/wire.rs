//! Response shapes of the vendor gateway and their conversion into [`Series`].

use chrono::NaiveDate;
use macrofeed_core::series::Series;
use serde::Deserialize;

use crate::{Error, Result};

/// Values block of a vendor response: either one list per field or, for
/// single-series calls, a flat list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DataBlock {
  Nested(Vec<Vec<Option<f64>>>),
  Flat(Vec<Option<f64>>),
}

/// The common envelope of `wsd` and `edb` responses.
#[derive(Debug, Deserialize)]
pub struct VendorResponse {
  #[serde(rename = "ErrorCode")]
  pub error_code: i64,
  #[serde(rename = "Data", default)]
  pub data:       Option<DataBlock>,
  #[serde(rename = "Times", default)]
  pub times:      Vec<String>,
  #[serde(rename = "Error", default)]
  pub error:      Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
  #[serde(default)]
  pub connected: bool,
}

/// Vendor timestamps come as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or
/// `YYYYMMDD`.
fn parse_time(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  raw
    .get(..10)
    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    .or_else(|| NaiveDate::parse_from_str(raw, "%Y%m%d").ok())
}

impl VendorResponse {
  /// Turn the first values column into a series keyed by `Times`.
  pub fn into_series(self, target: &str) -> Result<Series> {
    if self.error_code != 0 {
      return Err(Error::Vendor {
        target:  target.to_owned(),
        code:    self.error_code,
        message: self.error.unwrap_or_default(),
      });
    }

    let values = match self.data {
      Some(DataBlock::Nested(mut columns)) if !columns.is_empty() => columns.swap_remove(0),
      Some(DataBlock::Flat(values)) => values,
      _ => Vec::new(),
    };

    if values.len() != self.times.len() {
      return Err(Error::Malformed {
        target: target.to_owned(),
        reason: format!("{} times but {} values", self.times.len(), values.len()),
      });
    }

    self
      .times
      .iter()
      .zip(values)
      .map(|(time, value)| {
        parse_time(time)
          .map(|date| (date, value))
          .ok_or_else(|| Error::Malformed {
            target: target.to_owned(),
            reason: format!("unparseable time {time:?}"),
          })
      })
      .collect()
  }
}
