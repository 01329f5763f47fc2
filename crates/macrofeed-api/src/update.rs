//! `POST /update`: start an update pass in the background.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use macrofeed_core::{client::MarketDataClient, store::IndicatorStore};
use macrofeed_updater::UpdateKind;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
  #[serde(default = "default_update_type")]
  pub update_type: String,
}

fn default_update_type() -> String { UpdateKind::Incremental.as_str().to_owned() }

#[derive(Debug, Serialize)]
pub struct UpdateAccepted {
  pub message:     String,
  pub update_type: UpdateKind,
  /// Whether another pass was still running; the new one waits for it.
  pub queued:      bool,
  pub timestamp:   DateTime<Utc>,
}

/// `POST /update`, body: `{"update_type":"smart|incremental|full|retry"}`
pub async fn trigger<S, C>(
  State(state): State<ApiState<S, C>>,
  Json(body): Json<UpdateRequest>,
) -> Result<(StatusCode, Json<UpdateAccepted>), ApiError>
where
  S: IndicatorStore + 'static,
  C: MarketDataClient + 'static,
{
  let kind: UpdateKind = body
    .update_type
    .parse()
    .map_err(|e: macrofeed_updater::Error| ApiError::BadRequest(e.to_string()))?;

  let queued = state.updater.is_busy();
  let updater = Arc::clone(&state.updater);
  tokio::spawn(async move {
    match updater.run(kind).await {
      Ok(report) => info!(
        %kind,
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "requested update finished"
      ),
      Err(e) => error!(%kind, error = %e, "requested update failed"),
    }
  });

  Ok((
    StatusCode::ACCEPTED,
    Json(UpdateAccepted {
      message: format!("{kind} update started"),
      update_type: kind,
      queued,
      timestamp: Utc::now(),
    }),
  ))
}
