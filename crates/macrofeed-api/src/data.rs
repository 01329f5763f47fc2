//! Handlers for stored series.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/data/{code}` | Optional `?field=&start_date=&end_date=`; 404 when empty |
//! | `POST` | `/batch-data` | Body: `{"codes":[...],"start_date":..,"end_date":..}` |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use macrofeed_core::{
  client::MarketDataClient,
  series::Observation,
  store::{IndicatorStore, SeriesQuery},
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

/// One stored value as served over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
  pub date:  NaiveDate,
  pub field: String,
  pub value: f64,
}

impl From<Observation> for DataPoint {
  fn from(o: Observation) -> Self { Self { date: o.date, field: o.field, value: o.value } }
}

// ─── Single series ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
  pub field:      Option<String>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
  pub code:        String,
  pub data_points: usize,
  pub data:        Vec<DataPoint>,
}

/// `GET /data/{code}`
pub async fn series<S, C>(
  State(state): State<ApiState<S, C>>,
  Path(code): Path<String>,
  Query(params): Query<SeriesParams>,
) -> Result<Json<SeriesResponse>, ApiError>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  let query = SeriesQuery {
    code:  code.clone(),
    field: params.field,
    start: params.start_date,
    end:   params.end_date,
  };
  let data: Vec<DataPoint> = state
    .store()
    .observations(&query)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(DataPoint::from)
    .collect();

  if data.is_empty() {
    return Err(ApiError::NotFound(format!("no data for indicator {code}")));
  }
  Ok(Json(SeriesResponse { code, data_points: data.len(), data }))
}

// ─── Batch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
  pub codes:      Vec<String>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
  pub requested_codes: Vec<String>,
  /// Codes without stored data map to an empty list.
  pub data:            BTreeMap<String, Vec<DataPoint>>,
}

/// `POST /batch-data`
pub async fn batch<S, C>(
  State(state): State<ApiState<S, C>>,
  Json(body): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  let mut data = BTreeMap::new();
  for code in &body.codes {
    let query = SeriesQuery {
      code:  code.clone(),
      field: None,
      start: body.start_date,
      end:   body.end_date,
    };
    let points = state
      .store()
      .observations(&query)
      .await
      .map_err(ApiError::store)?
      .into_iter()
      .map(DataPoint::from)
      .collect();
    data.insert(code.clone(), points);
  }
  Ok(Json(BatchResponse { requested_codes: body.codes, data }))
}
