//! Wiring for the `macrofeed` binary: settings, the HTTP application and
//! operator reports.

pub mod report;
pub mod settings;

use axum::Router;
use macrofeed_api::{ApiState, api_router};
use macrofeed_core::{client::MarketDataClient, store::IndicatorStore};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use settings::Settings;

// ─── Application ─────────────────────────────────────────────────────────────

/// The API router with request tracing and permissive CORS.
pub fn app<S, C>(state: ApiState<S, C>) -> Router
where
  S: IndicatorStore + 'static,
  C: MarketDataClient + 'static,
{
  api_router(state)
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use macrofeed_core::{
    indicator::Indicator,
    series::{DateWindow, FetchedTable},
  };
  use macrofeed_store_sqlite::SqliteStore;
  use macrofeed_updater::{Updater, UpdaterConfig};
  use tower::ServiceExt;

  use super::*;

  struct NullClient;

  impl MarketDataClient for NullClient {
    type Error = std::io::Error;

    async fn fetch(
      &self,
      _indicator: &Indicator,
      _window: DateWindow,
    ) -> Result<FetchedTable, std::io::Error> {
      Ok(FetchedTable::new())
    }

    async fn check_connection(&self) -> bool { true }
  }

  async fn make_state() -> ApiState<SqliteStore, NullClient> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let updater = Updater::new(Arc::new(store), Arc::new(NullClient), UpdaterConfig::default());
    ApiState::new(Arc::new(updater))
  }

  #[tokio::test]
  async fn index_lists_endpoints() {
    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let resp = app(make_state().await).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["service"], "macrofeed");
    assert!(body["endpoints"]["status"].is_string());
  }

  #[tokio::test]
  async fn cors_headers_are_present() {
    let req = Request::builder()
      .uri("/health")
      .header(header::ORIGIN, "http://example.com")
      .body(Body::empty())
      .unwrap();
    let resp = app(make_state().await).oneshot(req).await.unwrap();
    assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
  }
}
