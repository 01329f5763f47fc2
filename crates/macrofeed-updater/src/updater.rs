//! Per-indicator reconciliation.

use std::{sync::Arc, time::Duration};

use chrono::{Days, Local, NaiveDate};
use macrofeed_core::{
  client::MarketDataClient,
  indicator::Indicator,
  series::DateWindow,
  store::IndicatorStore,
  update::{NewUpdateAttempt, UpdateMode},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
  /// Full and retry passes fetch from January 1st of this year.
  pub historical_start_year:     i32,
  /// How far back an incremental pass reaches for an indicator with no data.
  pub incremental_lookback_days: u64,
  /// Pause after each full or retry fetch.
  #[serde(with = "millis", rename = "full_delay_ms")]
  pub full_delay:                Duration,
  /// Pause after each incremental fetch.
  #[serde(with = "millis", rename = "incremental_delay_ms")]
  pub incremental_delay:         Duration,
  /// Pin the calendar date used as the window end. `None` means the local
  /// date at the time of the call.
  #[serde(skip)]
  pub today:                     Option<NaiveDate>,
}

impl Default for UpdaterConfig {
  fn default() -> Self {
    Self {
      historical_start_year:     2000,
      incremental_lookback_days: 30,
      full_delay:                Duration::from_millis(1000),
      incremental_delay:         Duration::from_millis(500),
      today:                     None,
    }
  }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What happened to one indicator during a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
  /// Observations were written; `records` across all fields.
  Succeeded { records: u64 },
  /// A failed attempt was logged with `reason`.
  Failed { reason: String },
  /// The window was empty. Nothing was fetched or logged.
  Skipped,
}

impl ReconcileOutcome {
  pub fn is_success(&self) -> bool { matches!(self, ReconcileOutcome::Succeeded { .. }) }
}

// ─── Updater ─────────────────────────────────────────────────────────────────

/// Reconciles indicators against the market-data client and records every
/// attempt in the store's update log.
///
/// Batch passes (see the `batch` module) are serialised through an internal
/// lock; [`reconcile`](Self::reconcile) itself takes no lock.
pub struct Updater<S, C> {
  store:    Arc<S>,
  client:   Arc<C>,
  config:   UpdaterConfig,
  run_lock: Mutex<()>,
}

impl<S, C> Updater<S, C>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  pub fn new(store: Arc<S>, client: Arc<C>, config: UpdaterConfig) -> Self {
    Self { store, client, config, run_lock: Mutex::new(()) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn client(&self) -> &Arc<C> { &self.client }

  pub fn config(&self) -> &UpdaterConfig { &self.config }

  /// Whether a batch pass currently holds the run lock.
  pub fn is_busy(&self) -> bool { self.run_lock.try_lock().is_err() }

  pub(crate) async fn lock_runs(&self) -> MutexGuard<'_, ()> { self.run_lock.lock().await }

  pub fn today(&self) -> NaiveDate {
    self.config.today.unwrap_or_else(|| Local::now().date_naive())
  }

  /// Reconcile one indicator. Full and retry modes reach back to the
  /// configured historical start year.
  pub async fn reconcile(&self, indicator: &Indicator, mode: UpdateMode) -> ReconcileOutcome {
    self
      .reconcile_from(indicator, mode, self.config.historical_start_year)
      .await
  }

  /// Reconcile with an explicit start year for full and retry windows.
  ///
  /// Never returns an error: every failure is logged as a failed attempt and
  /// reported as [`ReconcileOutcome::Failed`].
  pub async fn reconcile_from(
    &self,
    indicator: &Indicator,
    mode: UpdateMode,
    start_year: i32,
  ) -> ReconcileOutcome {
    let today = self.today();
    let window = match self.window_for(indicator, mode, start_year, today).await {
      Ok(window) => window,
      Err(e) => {
        return self
          .record_failure(indicator, mode, DateWindow::new(today, today), e)
          .await;
      }
    };

    if window.is_empty() {
      debug!(code = %indicator.code, %mode, start = %window.start, "already up to date");
      return ReconcileOutcome::Skipped;
    }

    if indicator.fields.is_empty() {
      return self.record_failure(indicator, mode, window, Error::NoFields).await;
    }

    debug!(
      code = %indicator.code,
      %mode,
      start = %window.start,
      end = %window.end,
      "reconciling"
    );
    let result = self.fetch_and_store(indicator, mode, window).await;
    self.throttle(mode).await;

    match result {
      Ok(records) => {
        info!(code = %indicator.code, %mode, records, "indicator updated");
        ReconcileOutcome::Succeeded { records }
      }
      Err(e) => self.record_failure(indicator, mode, window, e).await,
    }
  }

  /// The date window `mode` asks for as of `today`.
  async fn window_for(
    &self,
    indicator: &Indicator,
    mode: UpdateMode,
    start_year: i32,
    today: NaiveDate,
  ) -> Result<DateWindow> {
    match mode {
      UpdateMode::Full | UpdateMode::Retry => {
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
          .ok_or(Error::InvalidStartYear(start_year))?;
        Ok(DateWindow::new(start, today))
      }
      UpdateMode::Incremental => {
        let last = self
          .store
          .last_observation_date(&indicator.code, None)
          .await
          .map_err(Error::store)?;
        Ok(match last {
          Some(last) => DateWindow::after(last, today),
          None => {
            let lookback = Days::new(self.config.incremental_lookback_days);
            DateWindow::new(today.checked_sub_days(lookback).unwrap_or(NaiveDate::MIN), today)
          }
        })
      }
    }
  }

  /// Fetch once, then upsert and log each expected field that came back
  /// with values. Returns the total number of rows written.
  async fn fetch_and_store(
    &self,
    indicator: &Indicator,
    mode: UpdateMode,
    window: DateWindow,
  ) -> Result<u64> {
    let table = self
      .client
      .fetch(indicator, window)
      .await
      .map_err(Error::client)?;

    for field in table.keys().map(String::as_str) {
      if !indicator.field_names().any(|f| f == field) {
        warn!(code = %indicator.code, field, "ignoring unexpected field in response");
      }
    }

    let mut total = 0u64;
    for field in indicator.field_names() {
      let Some(series) = table.get(field).filter(|s| s.present_count() > 0) else {
        warn!(code = %indicator.code, field, "no values returned for field");
        continue;
      };

      let written = self
        .store
        .upsert_observations(&indicator.code, field, series)
        .await
        .map_err(Error::store)? as u64;

      self
        .store
        .append_update_log(NewUpdateAttempt::success(
          &indicator.code,
          Some(field),
          mode,
          window,
          written,
        ))
        .await
        .map_err(Error::store)?;

      debug!(code = %indicator.code, field, written, "field stored");
      total += written;
    }

    if total == 0 {
      return Err(Error::NoData);
    }

    self
      .store
      .append_update_log(NewUpdateAttempt::success(&indicator.code, None, mode, window, total))
      .await
      .map_err(Error::store)?;
    Ok(total)
  }

  async fn record_failure(
    &self,
    indicator: &Indicator,
    mode: UpdateMode,
    window: DateWindow,
    cause: Error,
  ) -> ReconcileOutcome {
    let reason = cause.to_string();
    warn!(code = %indicator.code, %mode, %reason, "indicator update failed");

    let attempt = NewUpdateAttempt::failure(&indicator.code, mode, window, reason.as_str());
    if let Err(e) = self.store.append_update_log(attempt).await {
      error!(code = %indicator.code, error = %e, "could not record failed attempt");
    }
    ReconcileOutcome::Failed { reason }
  }

  async fn throttle(&self, mode: UpdateMode) {
    let delay = match mode {
      UpdateMode::Full | UpdateMode::Retry => self.config.full_delay,
      UpdateMode::Incremental => self.config.incremental_delay,
    };
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
  }
}
