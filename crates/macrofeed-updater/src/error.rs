//! Error type for `macrofeed-updater`.

use macrofeed_core::update::{NO_DATA, NO_FIELDS};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(BoxError),

  #[error("market data error: {0}")]
  Client(BoxError),

  /// The fetch succeeded but nothing storable came back.
  #[error("{}", NO_DATA)]
  NoData,

  #[error("{}", NO_FIELDS)]
  NoFields,

  #[error("invalid historical start year: {0}")]
  InvalidStartYear(i32),

  #[error("unknown update type: {0:?}")]
  UnknownUpdateKind(String),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Store(Box::new(e))
  }

  pub(crate) fn client(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Client(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
