//! Handlers for the catalog endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/indicators` | Optional `?category=` |
//! | `GET`  | `/indicators/{code}` | 404 if not found |
//! | `GET`  | `/categories` | Sorted distinct categories |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use macrofeed_core::{client::MarketDataClient, indicator::Indicator, store::IndicatorStore};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndicatorList {
  pub total:      usize,
  pub indicators: Vec<Indicator>,
}

/// `GET /indicators[?category=<category>]`
pub async fn list<S, C>(
  State(state): State<ApiState<S, C>>,
  Query(params): Query<ListParams>,
) -> Result<Json<IndicatorList>, ApiError>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  let indicators = state
    .store()
    .list_indicators(params.category.as_deref())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(IndicatorList { total: indicators.len(), indicators }))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /indicators/{code}`
pub async fn get_one<S, C>(
  State(state): State<ApiState<S, C>>,
  Path(code): Path<String>,
) -> Result<Json<Indicator>, ApiError>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  state
    .store()
    .get_indicator(&code)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("indicator {code} not found")))
}

// ─── Categories ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CategoryList {
  pub categories: Vec<String>,
}

/// `GET /categories`
pub async fn categories<S, C>(
  State(state): State<ApiState<S, C>>,
) -> Result<Json<CategoryList>, ApiError>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  let categories = state.store().categories().await.map_err(ApiError::store)?;
  Ok(Json(CategoryList { categories }))
}
