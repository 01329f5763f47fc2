//! Update attempts: the append-only log of reconciliation passes.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, series::DateWindow};

/// Message recorded when a fetch succeeded but produced nothing to store.
pub const NO_DATA: &str = "no data returned";

/// Message recorded when an indicator has no field mappings to fetch.
pub const NO_FIELDS: &str = "no field mappings";

// ─── Mode ────────────────────────────────────────────────────────────────────

/// Which policy chose the date window of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
  Full,
  Incremental,
  Retry,
}

impl UpdateMode {
  pub fn as_str(self) -> &'static str {
    match self {
      UpdateMode::Full => "full",
      UpdateMode::Incremental => "incremental",
      UpdateMode::Retry => "retry",
    }
  }
}

impl fmt::Display for UpdateMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UpdateMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "full" => Ok(UpdateMode::Full),
      "incremental" => Ok(UpdateMode::Incremental),
      "retry" => Ok(UpdateMode::Retry),
      other => Err(Error::UnknownUpdateMode(other.to_owned())),
    }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Success,
  Failed,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Outcome::Success => "success",
      Outcome::Failed => "failed",
    }
  }
}

impl FromStr for Outcome {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "success" => Ok(Outcome::Success),
      "failed" => Ok(Outcome::Failed),
      other => Err(Error::UnknownOutcome(other.to_owned())),
    }
  }
}

// ─── Attempt records ─────────────────────────────────────────────────────────

/// Input to [`IndicatorStore::append_update_log`](crate::store::IndicatorStore::append_update_log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUpdateAttempt {
  pub code:    String,
  /// `None` for an indicator-level record covering all fields.
  pub field:   Option<String>,
  pub mode:    UpdateMode,
  pub window:  DateWindow,
  pub records: u64,
  pub outcome: Outcome,
  pub error:   Option<String>,
}

impl NewUpdateAttempt {
  pub fn success(
    code: &str,
    field: Option<&str>,
    mode: UpdateMode,
    window: DateWindow,
    records: u64,
  ) -> Self {
    Self {
      code: code.to_owned(),
      field: field.map(str::to_owned),
      mode,
      window,
      records,
      outcome: Outcome::Success,
      error: None,
    }
  }

  /// An indicator-level failure with no records written.
  pub fn failure(
    code: &str,
    mode: UpdateMode,
    window: DateWindow,
    error: impl Into<String>,
  ) -> Self {
    Self {
      code: code.to_owned(),
      field: None,
      mode,
      window,
      records: 0,
      outcome: Outcome::Failed,
      error: Some(error.into()),
    }
  }
}

/// A persisted update attempt. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAttempt {
  pub id:           i64,
  pub code:         String,
  pub field:        Option<String>,
  pub mode:         UpdateMode,
  pub window:       DateWindow,
  pub records:      u64,
  pub outcome:      Outcome,
  pub error:        Option<String>,
  pub attempted_at: DateTime<Utc>,
}

impl UpdateAttempt {
  pub fn is_failure(&self) -> bool { self.outcome == Outcome::Failed }
}
