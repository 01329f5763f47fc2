//! Error type for `macrofeed-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] macrofeed_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An observation was written for a field the indicator does not map.
  #[error("no field mapping for {code}.{field}")]
  UnknownField { code: String, field: String },

  #[error("indicator not found: {0}")]
  IndicatorNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
