//! The `IndicatorStore` trait and supporting query/report types.
//!
//! The trait is implemented by storage backends (e.g. `macrofeed-store-sqlite`).
//! Higher layers (`macrofeed-updater`, `macrofeed-api`) depend on this
//! abstraction, not on any concrete backend.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  catalog::CatalogEntry,
  indicator::Indicator,
  series::{Observation, Series},
  update::{NewUpdateAttempt, UpdateAttempt},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`IndicatorStore::observations`].
#[derive(Debug, Clone, Default)]
pub struct SeriesQuery {
  pub code:  String,
  /// Restrict to one field; all fields when `None`.
  pub field: Option<String>,
  /// Inclusive lower bound.
  pub start: Option<NaiveDate>,
  /// Inclusive upper bound.
  pub end:   Option<NaiveDate>,
}

impl SeriesQuery {
  pub fn code(code: impl Into<String>) -> Self {
    Self { code: code.into(), ..Self::default() }
  }
}

// ─── Report types ────────────────────────────────────────────────────────────

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
  pub indicators:             u64,
  pub fields:                 u64,
  pub observations:           u64,
  /// Indicator count per category.
  pub categories:             BTreeMap<String, u64>,
  pub multi_field_indicators: u64,
}

/// Update-log statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
  /// Attempts recorded at or after the requested instant.
  pub recent_attempts:    u64,
  /// Distinct codes with at least one failed attempt.
  pub failed_indicators:  u64,
}

/// How many indicators use a given field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUsage {
  pub field:        String,
  pub display_name: String,
  pub indicators:   u64,
}

/// Stored date range and row count for one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
  pub code:         String,
  pub name:         String,
  pub category:     String,
  pub first_date:   Option<NaiveDate>,
  pub last_date:    Option<NaiveDate>,
  pub observations: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a macrofeed storage backend.
///
/// Observations are upserted on `(code, field, date)`; update attempts are
/// append-only. Each call is atomic on its own; there are no cross-call
/// transactions.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait IndicatorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Insert or refresh an indicator and its field mappings. An existing
  /// indicator keeps its `created_at`; `updated_at` is set to now.
  fn register_indicator<'a>(
    &'a self,
    entry: &'a CatalogEntry,
  ) -> impl Future<Output = Result<Indicator, Self::Error>> + Send + 'a;

  /// List indicators with their fields, optionally restricted to a category.
  /// Ordered by category, then name.
  fn list_indicators<'a>(
    &'a self,
    category: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<Indicator>, Self::Error>> + Send + 'a;

  /// Retrieve one indicator by code. Returns `None` if not found.
  fn get_indicator<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Indicator>, Self::Error>> + Send + 'a;

  /// Distinct categories, sorted.
  fn categories(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Observations ──────────────────────────────────────────────────────

  /// Write every non-missing point of `series`, replacing existing rows with
  /// the same `(code, field, date)`. Returns the number of rows written.
  fn upsert_observations<'a>(
    &'a self,
    code: &'a str,
    field: &'a str,
    series: &'a Series,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Latest stored date for `code`, across all fields or for one field.
  fn last_observation_date<'a>(
    &'a self,
    code: &'a str,
    field: Option<&'a str>,
  ) -> impl Future<Output = Result<Option<NaiveDate>, Self::Error>> + Send + 'a;

  /// Number of stored observations for `code` across all fields.
  fn observation_count<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Stored observations matching `query`, ordered by date then field.
  fn observations<'a>(
    &'a self,
    query: &'a SeriesQuery,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + 'a;

  // ── Update log ────────────────────────────────────────────────────────

  /// Append an update attempt. The store assigns `id` and `attempted_at`.
  fn append_update_log(
    &self,
    attempt: NewUpdateAttempt,
  ) -> impl Future<Output = Result<UpdateAttempt, Self::Error>> + Send + '_;

  /// The most recently appended attempt for `code`, if any.
  fn latest_attempt<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<UpdateAttempt>, Self::Error>> + Send + 'a;

  /// The newest `limit` attempts across all codes, newest first.
  fn recent_attempts(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<UpdateAttempt>, Self::Error>> + Send + '_;

  // ── Reports ───────────────────────────────────────────────────────────

  fn summary(
    &self,
  ) -> impl Future<Output = Result<StoreSummary, Self::Error>> + Send + '_;

  fn update_stats(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<UpdateStats, Self::Error>> + Send + '_;

  fn field_usage(
    &self,
  ) -> impl Future<Output = Result<Vec<FieldUsage>, Self::Error>> + Send + '_;

  fn coverage(
    &self,
  ) -> impl Future<Output = Result<Vec<Coverage>, Self::Error>> + Send + '_;
}
