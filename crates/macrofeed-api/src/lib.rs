//! JSON REST API for macrofeed.
//!
//! Exposes an axum [`Router`] over an [`Updater`] (and through it, the
//! store and market-data client). Reads go straight to the store; `POST
//! /update` hands a pass to a background task and returns immediately.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = macrofeed_api::api_router(ApiState::new(updater).with_scheduler(scheduler));
//! ```

pub mod data;
pub mod error;
pub mod indicators;
pub mod meta;
pub mod status;
pub mod update;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use macrofeed_core::{client::MarketDataClient, store::IndicatorStore};
use macrofeed_updater::{Scheduler, Updater};

pub use error::ApiError;

/// Shared handler state.
pub struct ApiState<S, C> {
  pub updater:   Arc<Updater<S, C>>,
  /// Reported by `/status` when the server runs a background scheduler.
  pub scheduler: Option<Arc<Scheduler<S, C>>>,
}

impl<S, C> Clone for ApiState<S, C> {
  fn clone(&self) -> Self {
    Self { updater: Arc::clone(&self.updater), scheduler: self.scheduler.clone() }
  }
}

impl<S, C> ApiState<S, C>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  pub fn new(updater: Arc<Updater<S, C>>) -> Self { Self { updater, scheduler: None } }

  pub fn with_scheduler(mut self, scheduler: Arc<Scheduler<S, C>>) -> Self {
    self.scheduler = Some(scheduler);
    self
  }

  pub fn store(&self) -> &S { self.updater.store() }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, C>(state: ApiState<S, C>) -> Router<()>
where
  S: IndicatorStore + 'static,
  C: MarketDataClient + 'static,
{
  Router::new()
    .route("/", get(meta::index))
    .route("/health", get(meta::health))
    // Catalog
    .route("/indicators", get(indicators::list::<S, C>))
    .route("/indicators/{code}", get(indicators::get_one::<S, C>))
    .route("/categories", get(indicators::categories::<S, C>))
    // Series
    .route("/data/{code}", get(data::series::<S, C>))
    .route("/batch-data", post(data::batch::<S, C>))
    // Operations
    .route("/update", post(update::trigger::<S, C>))
    .route("/status", get(status::report::<S, C>))
    .with_state(state)
}
