//! Reconciler tests against an in-memory `SqliteStore` and a scripted client.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use chrono::NaiveDate;
use macrofeed_core::{
  catalog::CatalogEntry,
  client::MarketDataClient,
  indicator::{DataSource, Field, Indicator},
  series::{DateWindow, FetchedTable, Series},
  store::{IndicatorStore, SeriesQuery},
  update::{NO_DATA, NO_FIELDS, Outcome, UpdateMode},
};
use macrofeed_store_sqlite::SqliteStore;

use crate::{Error, ReconcileOutcome, UpdateKind, Updater, UpdaterConfig};

// ─── Scripted client ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeError(String);

/// Answers each code with a canned table or error and records every call.
#[derive(Default)]
struct FakeClient {
  responses: Mutex<HashMap<String, Result<FetchedTable, String>>>,
  calls:     Mutex<Vec<(String, DateWindow)>>,
}

impl FakeClient {
  fn respond(&self, code: &str, table: FetchedTable) {
    self.responses.lock().unwrap().insert(code.into(), Ok(table));
  }

  fn fail(&self, code: &str, message: &str) {
    self.responses.lock().unwrap().insert(code.into(), Err(message.into()));
  }

  fn calls(&self) -> Vec<(String, DateWindow)> { self.calls.lock().unwrap().clone() }
}

impl MarketDataClient for FakeClient {
  type Error = FakeError;

  async fn fetch(
    &self,
    indicator: &Indicator,
    window: DateWindow,
  ) -> Result<FetchedTable, FakeError> {
    self.calls.lock().unwrap().push((indicator.code.clone(), window));
    match self.responses.lock().unwrap().get(&indicator.code) {
      Some(Ok(table)) => Ok(table.clone()),
      Some(Err(message)) => Err(FakeError(message.clone())),
      None => Ok(FetchedTable::new()),
    }
  }

  async fn check_connection(&self) -> bool { true }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn d(s: &str) -> NaiveDate { s.parse().unwrap() }

fn series(points: &[(&str, Option<f64>)]) -> Series {
  points.iter().map(|(date, v)| (d(date), *v)).collect()
}

fn table(fields: &[(&str, Series)]) -> FetchedTable {
  fields.iter().map(|(f, s)| (f.to_string(), s.clone())).collect()
}

struct Harness {
  store:   Arc<SqliteStore>,
  client:  Arc<FakeClient>,
  updater: Updater<SqliteStore, FakeClient>,
}

async fn harness(today: &str) -> Harness {
  harness_with_delays(today, Duration::ZERO, Duration::ZERO).await
}

async fn harness_with_delays(today: &str, full: Duration, incremental: Duration) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let client = Arc::new(FakeClient::default());
  let config = UpdaterConfig {
    full_delay: full,
    incremental_delay: incremental,
    today: Some(d(today)),
    ..UpdaterConfig::default()
  };
  let updater = Updater::new(Arc::clone(&store), Arc::clone(&client), config);
  Harness { store, client, updater }
}

impl Harness {
  async fn dense(&self, code: &str, fields: &[&str]) -> Indicator {
    self
      .store
      .register_indicator(&CatalogEntry {
        code:     code.into(),
        category: "Equity".into(),
        name:     code.into(),
        source:   DataSource::Dense,
        fields:   fields.iter().map(|f| Field::new(*f)).collect(),
      })
      .await
      .unwrap()
  }

  async fn sparse(&self, code: &str) -> Indicator {
    self
      .store
      .register_indicator(&CatalogEntry {
        code:     code.into(),
        category: "Macro".into(),
        name:     code.into(),
        source:   DataSource::Sparse,
        fields:   vec![Field::sparse()],
      })
      .await
      .unwrap()
  }

  async fn seed(&self, code: &str, field: &str, points: &[(&str, Option<f64>)]) {
    self
      .store
      .upsert_observations(code, field, &series(points))
      .await
      .unwrap();
  }

  async fn attempts(&self) -> Vec<macrofeed_core::update::UpdateAttempt> {
    self.store.recent_attempts(100).await.unwrap()
  }
}

// ─── Windows ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn smart_update_backfills_indicators_without_data() {
  let h = harness("2024-06-10").await;
  h.sparse("M1").await;
  h.client.respond("M1", table(&[("value", series(&[("2024-05-31", Some(0.3))]))]));

  let report = h.updater.smart_update().await.unwrap();

  assert_eq!(report.new.succeeded, 1);
  assert_eq!(report.existing.total, 0);
  assert_eq!(h.client.calls(), [("M1".to_string(), DateWindow::new(d("2000-01-01"), d("2024-06-10")))]);
}

#[tokio::test]
async fn smart_update_resumes_the_day_after_the_last_observation() {
  let h = harness("2024-06-10").await;
  h.dense("Y", &["close"]).await;
  h.seed("Y", "close", &[("2024-06-05", Some(1.0))]).await;
  h.client.respond("Y", table(&[("close", series(&[("2024-06-07", Some(1.1))]))]));

  let report = h.updater.smart_update().await.unwrap();

  assert_eq!(report.existing.succeeded, 1);
  assert_eq!(h.client.calls()[0].1, DateWindow::new(d("2024-06-06"), d("2024-06-10")));
}

#[tokio::test]
async fn incremental_without_data_looks_back_thirty_days() {
  let h = harness("2024-06-10").await;
  let x = h.dense("X", &["close"]).await;

  h.updater.reconcile(&x, UpdateMode::Incremental).await;

  assert_eq!(h.client.calls()[0].1, DateWindow::new(d("2024-05-11"), d("2024-06-10")));
}

#[tokio::test]
async fn incremental_on_the_last_observed_day_is_skipped() {
  let h = harness("2024-06-01").await;
  let y = h.dense("Y", &["close"]).await;
  h.seed("Y", "close", &[("2024-06-01", Some(1.0))]).await;

  let outcome = h.updater.reconcile(&y, UpdateMode::Incremental).await;

  assert_eq!(outcome, ReconcileOutcome::Skipped);
  assert!(h.client.calls().is_empty());
  assert!(h.attempts().await.is_empty());
  assert_eq!(h.store.observation_count("Y").await.unwrap(), 1);
}

// ─── Writing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reconciling_twice_stores_the_same_observations() {
  let h = harness("2024-06-10").await;
  let x = h.dense("X", &["close"]).await;
  h.client.respond(
    "X",
    table(&[("close", series(&[("2024-06-03", Some(1.0)), ("2024-06-04", Some(2.0))]))]),
  );

  h.updater.reconcile(&x, UpdateMode::Full).await;
  let first = h.store.observations(&SeriesQuery::code("X")).await.unwrap();
  h.updater.reconcile(&x, UpdateMode::Full).await;
  let second = h.store.observations(&SeriesQuery::code("X")).await.unwrap();

  assert_eq!(first.len(), 2);
  assert_eq!(first, second);
}

#[tokio::test]
async fn partial_coverage_writes_available_fields_only() {
  let h = harness("2024-06-10").await;
  let x = h.dense("X", &["close", "val_pe_nonnegative"]).await;
  h.client.respond(
    "X",
    table(&[("close", series(&[("2024-06-03", Some(1.0)), ("2024-06-04", Some(2.0))]))]),
  );

  let outcome = h.updater.reconcile(&x, UpdateMode::Full).await;
  assert_eq!(outcome, ReconcileOutcome::Succeeded { records: 2 });

  let attempts = h.attempts().await;
  let close = attempts
    .iter()
    .find(|a| a.field.as_deref() == Some("close"))
    .unwrap();
  assert_eq!(close.outcome, Outcome::Success);
  assert_eq!(close.records, 2);
  assert!(
    !attempts
      .iter()
      .any(|a| a.field.as_deref() == Some("val_pe_nonnegative"))
  );

  let overall = attempts.iter().find(|a| a.field.is_none()).unwrap();
  assert_eq!(overall.outcome, Outcome::Success);
  assert_eq!(overall.records, 2);
}

#[tokio::test]
async fn empty_result_is_a_failure_with_no_data_message() {
  let h = harness("2024-06-10").await;
  let x = h.dense("X", &["close"]).await;

  let outcome = h.updater.reconcile(&x, UpdateMode::Full).await;

  assert_eq!(outcome, ReconcileOutcome::Failed { reason: NO_DATA.into() });
  let latest = h.store.latest_attempt("X").await.unwrap().unwrap();
  assert_eq!(latest.outcome, Outcome::Failed);
  assert_eq!(latest.error.as_deref(), Some(NO_DATA));
}

#[tokio::test]
async fn all_missing_values_count_as_no_data() {
  let h = harness("2024-06-10").await;
  let m = h.sparse("M1").await;
  h.client.respond("M1", table(&[("value", series(&[("2024-05-31", None)]))]));

  let outcome = h.updater.reconcile(&m, UpdateMode::Full).await;

  assert_eq!(outcome, ReconcileOutcome::Failed { reason: NO_DATA.into() });
  assert_eq!(h.store.observation_count("M1").await.unwrap(), 0);
}

#[tokio::test]
async fn indicator_without_fields_fails_without_fetching() {
  let h = harness("2024-06-10").await;
  let mut x = h.dense("X", &["close"]).await;
  x.fields.clear();

  let outcome = h.updater.reconcile(&x, UpdateMode::Full).await;

  assert_eq!(outcome, ReconcileOutcome::Failed { reason: NO_FIELDS.into() });
  assert!(h.client.calls().is_empty());
}

// ─── Failure isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn client_error_fails_one_indicator_and_the_pass_continues() {
  let h = harness("2024-06-10").await;
  h.dense("W", &["close"]).await;
  h.dense("Z", &["close"]).await;
  h.client.fail("Z", "gateway timeout");
  h.client.respond("W", table(&[("close", series(&[("2024-06-03", Some(1.0))]))]));

  let report = h.updater.full_update(2000).await.unwrap();

  assert_eq!(report.total, 2);
  assert_eq!(report.succeeded, 1);
  assert_eq!(report.failed, 1);

  let z = h.store.latest_attempt("Z").await.unwrap().unwrap();
  assert_eq!(z.outcome, Outcome::Failed);
  assert_eq!(z.field, None);
  assert!(z.error.unwrap().contains("gateway timeout"));
  let failures = h.attempts().await.into_iter().filter(|a| a.code == "Z").count();
  assert_eq!(failures, 1);
}

#[tokio::test]
async fn store_error_fails_one_indicator_and_the_pass_continues() {
  let h = harness("2024-06-10").await;
  // The store knows X only by `close`, so writing `ghost` has no mapping.
  let mut x = h.dense("X", &["close"]).await;
  x.fields = vec![Field::new("ghost")];
  let w = h.dense("W", &["close"]).await;
  h.client.respond("X", table(&[("ghost", series(&[("2024-06-03", Some(1.0))]))]));
  h.client.respond("W", table(&[("close", series(&[("2024-06-03", Some(1.0))]))]));

  let report = h.updater.pass("full", &[x, w], UpdateMode::Full, 2000).await;

  assert_eq!(report.total, 2);
  assert_eq!(report.failed, 1);
  assert_eq!(report.succeeded, 1);

  let attempts = h.attempts().await;
  let x_attempts: Vec<_> = attempts.iter().filter(|a| a.code == "X").collect();
  assert_eq!(x_attempts.len(), 1);
  assert_eq!(x_attempts[0].field, None);
  assert_eq!(x_attempts[0].outcome, Outcome::Failed);
  assert!(x_attempts[0].error.as_deref().unwrap().starts_with("store error"));
  assert!(x_attempts[0].error.as_deref().unwrap().contains("X.ghost"));
  assert_eq!(h.store.observation_count("W").await.unwrap(), 1);
}

#[tokio::test]
async fn store_error_is_reported_as_failed_outcome() {
  let h = harness("2024-06-10").await;
  let mut x = h.dense("X", &["close"]).await;
  x.fields = vec![Field::new("ghost")];
  h.client.respond("X", table(&[("ghost", series(&[("2024-06-03", Some(1.0))]))]));

  let outcome = h.updater.reconcile(&x, UpdateMode::Full).await;

  assert!(matches!(
    outcome,
    ReconcileOutcome::Failed { reason } if reason.contains("no field mapping for X.ghost")
  ));
}

#[tokio::test]
async fn unexpected_fields_in_a_response_are_ignored() {
  let h = harness("2024-06-10").await;
  let x = h.dense("X", &["close"]).await;
  h.client.respond(
    "X",
    table(&[
      ("close", series(&[("2024-06-03", Some(1.0))])),
      ("volume", series(&[("2024-06-03", Some(9.0))])),
    ]),
  );

  let outcome = h.updater.reconcile(&x, UpdateMode::Full).await;

  assert_eq!(outcome, ReconcileOutcome::Succeeded { records: 1 });
  let stored = h.store.observations(&SeriesQuery::code("X")).await.unwrap();
  assert!(stored.iter().all(|o| o.field == "close"));
}

// ─── Throttling ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_pass_waits_after_each_fetch() {
  let delay = Duration::from_millis(40);
  let h = harness_with_delays("2024-06-10", delay, Duration::ZERO).await;
  h.dense("A", &["close"]).await;
  h.dense("B", &["close"]).await;

  let started = Instant::now();
  let report = h.updater.full_update(2000).await.unwrap();

  assert_eq!(report.total, 2);
  assert!(started.elapsed() >= delay * 2);
}

#[tokio::test]
async fn incremental_pass_uses_its_own_delay() {
  let delay = Duration::from_millis(25);
  let h = harness_with_delays("2024-06-10", Duration::from_secs(60), delay).await;
  h.dense("A", &["close"]).await;
  h.dense("B", &["close"]).await;

  let started = Instant::now();
  let report = h.updater.incremental_update().await.unwrap();

  assert_eq!(report.total, 2);
  let elapsed = started.elapsed();
  assert!(elapsed >= delay * 2);
  assert!(elapsed < Duration::from_secs(60));
}

#[tokio::test]
async fn skipped_indicators_are_not_throttled() {
  let h = harness_with_delays("2024-06-01", Duration::ZERO, Duration::from_secs(60)).await;
  let y = h.dense("Y", &["close"]).await;
  h.seed("Y", "close", &[("2024-06-01", Some(1.0))]).await;

  let started = Instant::now();
  let outcome = h.updater.reconcile(&y, UpdateMode::Incremental).await;

  assert_eq!(outcome, ReconcileOutcome::Skipped);
  assert!(started.elapsed() < Duration::from_secs(60));
}

// ─── Retry ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_visits_failed_before_never_attempted() {
  let h = harness("2024-06-10").await;
  h.dense("A", &["close"]).await;
  h.dense("B", &["close"]).await;
  h.dense("C", &["close"]).await;
  h.seed("C", "close", &[("2024-06-03", Some(1.0))]).await;

  // B fails once so its latest attempt is a failure.
  let b = h.store.get_indicator("B").await.unwrap().unwrap();
  h.updater.reconcile(&b, UpdateMode::Full).await;
  let before = h.client.calls().len();

  let report = h.updater.retry(2010).await.unwrap();

  assert_eq!(report.total, 2);
  let codes: Vec<_> = h.client.calls()[before..].iter().map(|(c, _)| c.clone()).collect();
  assert_eq!(codes, ["B", "A"]);
  assert!(
    h.client.calls()[before..]
      .iter()
      .all(|(_, w)| w.start == d("2010-01-01"))
  );

  let latest = h.store.latest_attempt("A").await.unwrap().unwrap();
  assert_eq!(latest.mode, UpdateMode::Retry);
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_dispatches_by_kind() {
  let h = harness("2024-06-10").await;
  h.sparse("M1").await;
  h.client.respond("M1", table(&[("value", series(&[("2024-05-31", Some(0.3))]))]));

  let report = h.updater.run(UpdateKind::Smart).await.unwrap();
  assert_eq!(report.succeeded, 1);
  assert!(!h.updater.is_busy());

  let report = h.updater.run(UpdateKind::Incremental).await.unwrap();
  assert_eq!(report.total, 1);
  assert_eq!(h.client.calls()[1].1.start, d("2024-06-01"));
}

#[test]
fn update_kind_parses_known_names_only() {
  assert_eq!("retry".parse::<UpdateKind>().unwrap(), UpdateKind::Retry);
  assert!(matches!(
    "weekly".parse::<UpdateKind>(),
    Err(Error::UnknownUpdateKind(name)) if name == "weekly"
  ));
}
