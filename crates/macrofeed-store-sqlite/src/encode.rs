//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and calendar dates as
//! `YYYY-MM-DD`, so `MAX(date)` and range filters work on the raw text.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use macrofeed_core::{
  indicator::{DataSource, Field, Indicator},
  series::{DateWindow, Observation},
  store::Coverage,
  update::{Outcome, UpdateAttempt, UpdateMode},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width UTC form so that text comparison orders instants correctly.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `indicators` row.
pub struct RawIndicator {
  pub code:        String,
  pub category:    String,
  pub name:        String,
  pub data_source: String,
  pub created_at:  String,
  pub updated_at:  String,
}

/// Raw strings read directly from an `indicator_fields` row.
pub struct RawField {
  pub code:         String,
  pub name:         String,
  pub display_name: String,
}

impl RawIndicator {
  /// Decode the row, attaching the fields whose `code` matches.
  pub fn into_indicator(self, fields: &[RawField]) -> Result<Indicator> {
    let fields = fields
      .iter()
      .filter(|f| f.code == self.code)
      .map(|f| Field { name: f.name.clone(), display_name: f.display_name.clone() })
      .collect();

    Ok(Indicator {
      source:     self.data_source.parse::<DataSource>()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      code:       self.code,
      category:   self.category,
      name:       self.name,
      fields,
    })
  }
}

/// Raw values read directly from an `update_logs` row.
pub struct RawAttempt {
  pub id:            i64,
  pub code:          String,
  pub field_name:    Option<String>,
  pub update_type:   String,
  pub start_date:    String,
  pub end_date:      String,
  pub records_count: i64,
  pub status:        String,
  pub error_message: Option<String>,
  pub update_time:   String,
}

/// Column list matching the field order of [`RawAttempt::from_row`].
pub const ATTEMPT_COLUMNS: &str = "id, code, field_name, update_type, start_date, end_date,
   records_count, status, error_message, update_time";

impl RawAttempt {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      code:          row.get(1)?,
      field_name:    row.get(2)?,
      update_type:   row.get(3)?,
      start_date:    row.get(4)?,
      end_date:      row.get(5)?,
      records_count: row.get(6)?,
      status:        row.get(7)?,
      error_message: row.get(8)?,
      update_time:   row.get(9)?,
    })
  }

  pub fn into_attempt(self) -> Result<UpdateAttempt> {
    Ok(UpdateAttempt {
      id:           self.id,
      code:         self.code,
      field:        self.field_name,
      mode:         self.update_type.parse::<UpdateMode>()?,
      window:       DateWindow::new(
        decode_date(&self.start_date)?,
        decode_date(&self.end_date)?,
      ),
      records:      u64::try_from(self.records_count).unwrap_or(0),
      outcome:      self.status.parse::<Outcome>()?,
      error:        self.error_message,
      attempted_at: decode_dt(&self.update_time)?,
    })
  }
}

/// Raw values read directly from a `time_series_data` row.
pub struct RawObservation {
  pub code:  String,
  pub field: String,
  pub date:  String,
  pub value: f64,
}

impl RawObservation {
  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      date:  decode_date(&self.date)?,
      code:  self.code,
      field: self.field,
      value: self.value,
    })
  }
}

/// Raw values from the per-indicator coverage aggregate.
pub struct RawCoverage {
  pub code:         String,
  pub name:         String,
  pub category:     String,
  pub first_date:   Option<String>,
  pub last_date:    Option<String>,
  pub observations: i64,
}

impl RawCoverage {
  pub fn into_coverage(self) -> Result<Coverage> {
    Ok(Coverage {
      first_date:   self.first_date.as_deref().map(decode_date).transpose()?,
      last_date:    self.last_date.as_deref().map(decode_date).transpose()?,
      observations: u64::try_from(self.observations).unwrap_or(0),
      code:         self.code,
      name:         self.name,
      category:     self.category,
    })
  }
}
