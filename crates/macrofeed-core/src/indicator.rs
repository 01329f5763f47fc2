//! Indicator and field types.
//!
//! An indicator is identified by its vendor code and owns one or more fields.
//! The data-source kind is fixed when the catalog is loaded and never inferred
//! again afterwards.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Name of the single implicit field carried by sparse indicators.
pub const SPARSE_FIELD: &str = "value";

// ─── Data source ─────────────────────────────────────────────────────────────

/// How an indicator's data is served by the market-data vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
  /// Daily time series; every request names the field explicitly.
  Dense,
  /// Lower-frequency economic series with a single implicit field.
  Sparse,
}

impl DataSource {
  pub fn as_str(self) -> &'static str {
    match self {
      DataSource::Dense => "dense",
      DataSource::Sparse => "sparse",
    }
  }
}

impl fmt::Display for DataSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DataSource {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "dense" => Ok(DataSource::Dense),
      "sparse" => Ok(DataSource::Sparse),
      other => Err(Error::UnknownDataSource(other.to_owned())),
    }
  }
}

// ─── Field ───────────────────────────────────────────────────────────────────

/// A named sub-series of an indicator, unique per `(code, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
  pub name:         String,
  pub display_name: String,
}

impl Field {
  /// Build a field whose display name comes from [`field_label`].
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    let display_name = field_label(&name).to_owned();
    Self { name, display_name }
  }

  /// The implicit field of a sparse indicator.
  pub fn sparse() -> Self { Self::new(SPARSE_FIELD) }
}

/// Human-readable label for a vendor field name. Unknown names label
/// themselves.
pub fn field_label(name: &str) -> &str {
  match name {
    "close" => "Close",
    "open" => "Open",
    "high" => "High",
    "low" => "Low",
    "volume" => "Volume",
    "amt" => "Turnover",
    "pct_chg" => "Change (%)",
    "val_pe_nonnegative" => "P/E (TTM, non-negative)",
    "val_pb_lf" => "P/B (LF)",
    "val_ps_ttm" => "P/S (TTM)",
    "val_pcf_ocf_ttm" => "P/CF (OCF, TTM)",
    "ma5" => "5-day MA",
    "ma10" => "10-day MA",
    "ma20" => "20-day MA",
    "ma60" => "60-day MA",
    "roe_ttm" => "ROE (TTM)",
    "roa_ttm" => "ROA (TTM)",
    "grossprofitmargin_ttm" => "Gross margin (TTM)",
    "netprofitmargin_ttm" => "Net margin (TTM)",
    SPARSE_FIELD => "Value",
    other => other,
  }
}

// ─── Indicator ───────────────────────────────────────────────────────────────

/// A financial indicator as persisted in the store, with its field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
  pub code:       String,
  pub category:   String,
  pub name:       String,
  pub source:     DataSource,
  pub fields:     Vec<Field>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Indicator {
  pub fn field_names(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().map(|f| f.name.as_str())
  }

  pub fn is_multi_field(&self) -> bool { self.fields.len() > 1 }
}
