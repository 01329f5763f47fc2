//! `GET /status`: gateway connectivity, store counts, scheduler state and
//! the latest update attempts.

use axum::{Json, extract::State};
use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use macrofeed_core::{
  client::MarketDataClient,
  store::{IndicatorStore, StoreSummary, UpdateStats},
  update::UpdateAttempt,
};
use serde::Serialize;

use crate::{ApiState, error::ApiError};

const RECENT_ATTEMPTS: usize = 10;

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
  pub running:  bool,
  /// A stopped loop is still finishing its last pass.
  pub draining: bool,
  pub next_run: Option<NaiveDateTime>,
  pub next_job: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
  pub timestamp:          DateTime<Utc>,
  pub market_data:        bool,
  pub store:              StoreSummary,
  /// Attempts over the last 24 hours and codes that have ever failed.
  pub update_stats:       UpdateStats,
  pub update_in_progress: bool,
  pub scheduler:          SchedulerStatus,
  pub recent_updates:     Vec<UpdateAttempt>,
}

/// `GET /status`
pub async fn report<S, C>(State(state): State<ApiState<S, C>>) -> Result<Json<StatusReport>, ApiError>
where
  S: IndicatorStore + 'static,
  C: MarketDataClient + 'static,
{
  let store = state.store();
  let market_data = state.updater.client().check_connection().await;
  let summary = store.summary().await.map_err(ApiError::store)?;
  let update_stats = store
    .update_stats(Utc::now() - Duration::hours(24))
    .await
    .map_err(ApiError::store)?;
  let recent_updates = store
    .recent_attempts(RECENT_ATTEMPTS)
    .await
    .map_err(ApiError::store)?;

  let scheduler = match &state.scheduler {
    Some(scheduler) if scheduler.is_running() => {
      let (at, job) = scheduler.schedule().next_run_after(Local::now().naive_local());
      SchedulerStatus {
        running:  true,
        draining: false,
        next_run: Some(at),
        next_job: Some(job.kind().to_string()),
      }
    }
    other => SchedulerStatus {
      running:  false,
      draining: other.as_ref().is_some_and(|s| s.is_draining()),
      next_run: None,
      next_job: None,
    },
  };

  Ok(Json(StatusReport {
    timestamp: Utc::now(),
    market_data,
    store: summary,
    update_stats,
    update_in_progress: state.updater.is_busy(),
    scheduler,
    recent_updates,
  }))
}
