//! Service metadata: `/` and `/health`.

use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};

/// `GET /`
pub async fn index() -> Json<Value> {
  Json(json!({
    "service": "macrofeed",
    "version": env!("CARGO_PKG_VERSION"),
    "endpoints": {
      "indicators": "/indicators - list indicators, optional ?category=",
      "categories": "/categories - distinct indicator categories",
      "data": "/data/{code} - one series, optional ?field=&start_date=&end_date=",
      "batch_data": "/batch-data - several series in one request",
      "update": "/update - trigger an update pass in the background",
      "status": "/status - gateway, store and scheduler status",
    }
  }))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
  Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}
