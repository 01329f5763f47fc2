//! Batch passes over the catalog.
//!
//! | Pass                   | Selection                              | Mode          |
//! |------------------------|----------------------------------------|---------------|
//! | `full_update`          | every indicator                        | `full`        |
//! | `incremental_update`   | every indicator                        | `incremental` |
//! | `retry`                | indicators with no observations        | `retry`       |
//! | `smart_update`         | no observations / has observations     | `full` / `incremental` |
//!
//! Every pass takes the updater's run lock, processes indicators one at a
//! time and never stops on a single indicator's failure.

use std::{fmt, str::FromStr};

use macrofeed_core::{
  client::MarketDataClient,
  indicator::Indicator,
  store::IndicatorStore,
  update::UpdateMode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, ReconcileOutcome, Result, Updater};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The passes an operator or the scheduler can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
  Smart,
  Incremental,
  Full,
  Retry,
}

impl UpdateKind {
  pub fn as_str(self) -> &'static str {
    match self {
      UpdateKind::Smart => "smart",
      UpdateKind::Incremental => "incremental",
      UpdateKind::Full => "full",
      UpdateKind::Retry => "retry",
    }
  }
}

impl fmt::Display for UpdateKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UpdateKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "smart" => Ok(UpdateKind::Smart),
      "incremental" => Ok(UpdateKind::Incremental),
      "full" => Ok(UpdateKind::Full),
      "retry" => Ok(UpdateKind::Retry),
      other => Err(Error::UnknownUpdateKind(other.to_owned())),
    }
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Tally of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
  pub total:     usize,
  pub succeeded: usize,
  pub failed:    usize,
  pub skipped:   usize,
}

impl BatchReport {
  fn record(&mut self, outcome: &ReconcileOutcome) {
    match outcome {
      ReconcileOutcome::Succeeded { .. } => self.succeeded += 1,
      ReconcileOutcome::Failed { .. } => self.failed += 1,
      ReconcileOutcome::Skipped => self.skipped += 1,
    }
  }

  pub fn merge(self, other: BatchReport) -> BatchReport {
    BatchReport {
      total:     self.total + other.total,
      succeeded: self.succeeded + other.succeeded,
      failed:    self.failed + other.failed,
      skipped:   self.skipped + other.skipped,
    }
  }
}

/// Result of [`Updater::smart_update`], split by partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartReport {
  /// Indicators that had no observations and got a full backfill.
  pub new:      BatchReport,
  /// Indicators that already had data and got an incremental update.
  pub existing: BatchReport,
}

impl SmartReport {
  pub fn combined(&self) -> BatchReport { self.new.merge(self.existing) }
}

// ─── Passes ──────────────────────────────────────────────────────────────────

impl<S, C> Updater<S, C>
where
  S: IndicatorStore,
  C: MarketDataClient,
{
  /// Run the pass named by `kind` with the configured start year.
  pub async fn run(&self, kind: UpdateKind) -> Result<BatchReport> {
    let start_year = self.config().historical_start_year;
    match kind {
      UpdateKind::Smart => self.smart_update().await.map(|r| r.combined()),
      UpdateKind::Incremental => self.incremental_update().await,
      UpdateKind::Full => self.full_update(start_year).await,
      UpdateKind::Retry => self.retry(start_year).await,
    }
  }

  /// Full backfill from `start_year` for every indicator.
  pub async fn full_update(&self, start_year: i32) -> Result<BatchReport> {
    let _guard = self.lock_runs().await;
    let indicators = self.all_indicators().await?;
    Ok(self.pass("full", &indicators, UpdateMode::Full, start_year).await)
  }

  /// Incremental update for every indicator.
  pub async fn incremental_update(&self) -> Result<BatchReport> {
    let _guard = self.lock_runs().await;
    let indicators = self.all_indicators().await?;
    let start_year = self.config().historical_start_year;
    Ok(
      self
        .pass("incremental", &indicators, UpdateMode::Incremental, start_year)
        .await,
    )
  }

  /// Backfill indicators that still have no observations, those whose most
  /// recent attempt failed first, then those never attempted.
  pub async fn retry(&self, start_year: i32) -> Result<BatchReport> {
    let _guard = self.lock_runs().await;
    let (empty, _) = self.partition_by_data().await?;

    let mut failed = Vec::new();
    let mut missing = Vec::new();
    for indicator in empty {
      let latest = self
        .store()
        .latest_attempt(&indicator.code)
        .await
        .map_err(Error::store)?;
      match latest {
        Some(attempt) if attempt.is_failure() => failed.push(indicator),
        _ => missing.push(indicator),
      }
    }
    info!(failed = failed.len(), missing = missing.len(), "retrying indicators without data");

    failed.append(&mut missing);
    Ok(self.pass("retry", &failed, UpdateMode::Retry, start_year).await)
  }

  /// Full backfill for indicators without data, incremental for the rest.
  pub async fn smart_update(&self) -> Result<SmartReport> {
    let _guard = self.lock_runs().await;
    let (new, existing) = self.partition_by_data().await?;
    info!(new = new.len(), existing = existing.len(), "smart update");

    let start_year = self.config().historical_start_year;
    let new = self.pass("smart/new", &new, UpdateMode::Full, start_year).await;
    let existing = self
      .pass("smart/existing", &existing, UpdateMode::Incremental, start_year)
      .await;
    Ok(SmartReport { new, existing })
  }

  async fn all_indicators(&self) -> Result<Vec<Indicator>> {
    self.store().list_indicators(None).await.map_err(Error::store)
  }

  /// Split the catalog into indicators with zero and with some observations.
  async fn partition_by_data(&self) -> Result<(Vec<Indicator>, Vec<Indicator>)> {
    let mut empty = Vec::new();
    let mut populated = Vec::new();
    for indicator in self.all_indicators().await? {
      let count = self
        .store()
        .observation_count(&indicator.code)
        .await
        .map_err(Error::store)?;
      if count == 0 {
        empty.push(indicator);
      } else {
        populated.push(indicator);
      }
    }
    Ok((empty, populated))
  }

  pub(crate) async fn pass(
    &self,
    name: &str,
    indicators: &[Indicator],
    mode: UpdateMode,
    start_year: i32,
  ) -> BatchReport {
    let mut report = BatchReport { total: indicators.len(), ..BatchReport::default() };
    info!(pass = name, total = report.total, "pass started");

    for (i, indicator) in indicators.iter().enumerate() {
      debug!(pass = name, progress = i + 1, total = report.total, code = %indicator.code);
      let outcome = self.reconcile_from(indicator, mode, start_year).await;
      report.record(&outcome);
    }

    info!(
      pass = name,
      succeeded = report.succeeded,
      failed = report.failed,
      skipped = report.skipped,
      "pass finished"
    );
    report
  }
}
