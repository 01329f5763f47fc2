//! Error types for `macrofeed-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("catalog io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("catalog parse error: {0}")]
  Csv(#[from] csv::Error),

  #[error("catalog row {row}: {reason}")]
  InvalidRow { row: usize, reason: String },

  #[error("indicator {0} mixes dense and sparse rows")]
  MixedDataSource(String),

  #[error("unknown data source: {0:?}")]
  UnknownDataSource(String),

  #[error("unknown update mode: {0:?}")]
  UnknownUpdateMode(String),

  #[error("unknown update outcome: {0:?}")]
  UnknownOutcome(String),

  #[error("unknown return method: {0:?}")]
  UnknownReturnMethod(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
