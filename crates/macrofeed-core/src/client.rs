//! The `MarketDataClient` trait.
//!
//! Implemented by `macrofeed-client` for the vendor gateway and by test fakes.

use std::future::Future;

use crate::{
  indicator::Indicator,
  series::{DateWindow, FetchedTable},
};

/// Fetches raw time series for an indicator from the external vendor.
pub trait MarketDataClient: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch every field of `indicator` over `window`.
  ///
  /// Dense indicators may come back with only some of their fields; sparse
  /// indicators carry their single implicit field. An empty table means the
  /// vendor answered without data.
  fn fetch<'a>(
    &'a self,
    indicator: &'a Indicator,
    window: DateWindow,
  ) -> impl Future<Output = Result<FetchedTable, Self::Error>> + Send + 'a;

  /// Whether the vendor gateway is currently reachable.
  fn check_connection(&self) -> impl Future<Output = bool> + Send + '_;
}
