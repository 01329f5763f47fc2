//! Error type for `macrofeed-client`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("gateway returned {status} for {call}")]
  Status { call: &'static str, status: reqwest::StatusCode },

  /// The vendor answered with a non-zero error code.
  #[error("vendor error {code} for {target}: {message}")]
  Vendor { target: String, code: i64, message: String },

  #[error("malformed response for {target}: {reason}")]
  Malformed { target: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
