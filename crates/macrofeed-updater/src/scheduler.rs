//! Timetable-driven update passes.
//!
//! Weekdays at the daily time run an incremental pass; Sundays at the weekly
//! time run a full pass. The loop wakes every `check_interval` and runs the
//! jobs whose time fell since the previous wake-up.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{Datelike, Days, Local, NaiveDateTime, NaiveTime, Weekday};
use macrofeed_core::{client::MarketDataClient, store::IndicatorStore};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{UpdateKind, Updater};

/// How long [`Scheduler::stop`] waits for the loop to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
  #[serde(with = "hhmm")]
  pub daily_update_time:  NaiveTime,
  #[serde(with = "hhmm")]
  pub weekly_update_time: NaiveTime,
  #[serde(with = "secs", rename = "check_interval_secs")]
  pub check_interval:     Duration,
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      daily_update_time:  NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
      weekly_update_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN),
      check_interval:     Duration::from_secs(60),
    }
  }
}

mod hhmm {
  use chrono::NaiveTime;
  use serde::{Deserialize, Deserializer, Serializer, de::Error};

  pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&t.format("%H:%M"))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    NaiveTime::parse_from_str(&raw, "%H:%M").map_err(D::Error::custom)
  }
}

mod secs {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
  }
}

// ─── Timetable ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
  /// Monday to Friday at the daily time.
  DailyIncremental,
  /// Sunday at the weekly time.
  WeeklyFull,
}

impl Job {
  pub fn kind(self) -> UpdateKind {
    match self {
      Job::DailyIncremental => UpdateKind::Incremental,
      Job::WeeklyFull => UpdateKind::Full,
    }
  }

  fn runs_on(self, day: Weekday) -> bool {
    match self {
      Job::DailyIncremental => !matches!(day, Weekday::Sat | Weekday::Sun),
      Job::WeeklyFull => day == Weekday::Sun,
    }
  }
}

/// The local wall-clock times at which jobs fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
  pub daily:  NaiveTime,
  pub weekly: NaiveTime,
}

impl Schedule {
  pub fn new(config: &ScheduleConfig) -> Self {
    Self { daily: config.daily_update_time, weekly: config.weekly_update_time }
  }

  fn time_of(&self, job: Job) -> NaiveTime {
    match job {
      Job::DailyIncremental => self.daily,
      Job::WeeklyFull => self.weekly,
    }
  }

  /// The first job strictly after `now`, and when it fires.
  pub fn next_run_after(&self, now: NaiveDateTime) -> (NaiveDateTime, Job) {
    // Every job fires at least once a week, so eight days always suffice.
    let mut best: Option<(NaiveDateTime, Job)> = None;
    for offset in 0..8 {
      let Some(day) = now.date().checked_add_days(Days::new(offset)) else {
        break;
      };
      for job in [Job::WeeklyFull, Job::DailyIncremental] {
        let at = day.and_time(self.time_of(job));
        if at > now && job.runs_on(day.weekday()) && best.is_none_or(|(b, _)| at < b) {
          best = Some((at, job));
        }
      }
      if best.is_some() {
        break;
      }
    }
    best.unwrap_or((NaiveDateTime::MAX, Job::WeeklyFull))
  }

  /// Jobs that fire in `(from, to]`, each listed once, in firing order.
  pub fn due_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Vec<Job> {
    let mut due = Vec::new();
    let mut cursor = from;
    loop {
      let (at, job) = self.next_run_after(cursor);
      if at > to {
        break;
      }
      if !due.contains(&job) {
        due.push(job);
      }
      cursor = at;
    }
    due
  }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

enum State {
  Stopped,
  Running { stop: watch::Sender<bool>, task: JoinHandle<()> },
  /// Told to stop, but a pass outlasted the stop timeout.
  Draining { task: JoinHandle<()> },
}

/// Owns the background loop that runs scheduled passes.
pub struct Scheduler<S, C> {
  updater:        Arc<Updater<S, C>>,
  schedule:       Schedule,
  check_interval: Duration,
  stop_timeout:   Duration,
  state:          Mutex<State>,
}

impl<S, C> Scheduler<S, C>
where
  S: IndicatorStore + 'static,
  C: MarketDataClient + 'static,
{
  pub fn new(updater: Arc<Updater<S, C>>, config: &ScheduleConfig) -> Self {
    Self {
      updater,
      schedule: Schedule::new(config),
      check_interval: config.check_interval,
      stop_timeout: STOP_TIMEOUT,
      state: Mutex::new(State::Stopped),
    }
  }

  pub fn schedule(&self) -> &Schedule { &self.schedule }

  /// Spawn the loop. Returns `false` if it was already running.
  ///
  /// A previous loop that is still draining is left to finish on its own;
  /// the updater's run lock keeps its pass apart from the new loop's.
  pub fn start(&self) -> bool {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if matches!(&*state, State::Running { task, .. } if !task.is_finished()) {
      warn!("scheduler already running");
      return false;
    }

    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_loop(
      Arc::clone(&self.updater),
      self.schedule,
      self.check_interval,
      stop_rx,
    ));
    *state = State::Running { stop, task };

    let (next, job) = self.schedule.next_run_after(Local::now().naive_local());
    info!(daily = %self.schedule.daily, weekly = %self.schedule.weekly, %next, ?job, "scheduler started");
    true
  }

  /// Signal the loop and wait up to five seconds for it to exit. A pass in
  /// progress is not interrupted; if it outlasts the wait the task keeps
  /// running and [`is_draining`](Self::is_draining) reports it until it ends.
  pub async fn stop(&self) {
    let previous = {
      let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
      match &*state {
        State::Running { .. } => std::mem::replace(&mut *state, State::Stopped),
        State::Stopped | State::Draining { .. } => return,
      }
    };
    let State::Running { stop, mut task } = previous else {
      return;
    };

    let _ = stop.send(true);
    match tokio::time::timeout(self.stop_timeout, &mut task).await {
      Ok(Ok(())) => info!("scheduler stopped"),
      Ok(Err(e)) => error!(error = %e, "scheduler task failed"),
      Err(_) => {
        warn!("scheduler pass still running after stop; detaching");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*state, State::Stopped) {
          *state = State::Draining { task };
        }
      }
    }
  }

  /// Whether the loop is live and will run further jobs.
  pub fn is_running(&self) -> bool {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    matches!(&*state, State::Running { task, .. } if !task.is_finished())
  }

  /// Whether a stopped loop is still finishing the pass it was running.
  pub fn is_draining(&self) -> bool {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    matches!(&*state, State::Draining { task } if !task.is_finished())
  }
}

async fn run_loop<S, C>(
  updater: Arc<Updater<S, C>>,
  schedule: Schedule,
  check_interval: Duration,
  mut stop: watch::Receiver<bool>,
) where
  S: IndicatorStore,
  C: MarketDataClient,
{
  let mut last_check = Local::now().naive_local();
  loop {
    tokio::select! {
      _ = tokio::time::sleep(check_interval) => {}
      _ = stop.changed() => break,
    }

    let now = Local::now().naive_local();
    for job in schedule.due_between(last_check, now) {
      info!(?job, "running scheduled update");
      match updater.run(job.kind()).await {
        Ok(report) => info!(
          ?job,
          succeeded = report.succeeded,
          failed = report.failed,
          skipped = report.skipped,
          "scheduled update finished"
        ),
        Err(e) => error!(?job, error = %e, "scheduled update failed"),
      }
    }
    last_check = now;
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use macrofeed_core::{
    indicator::Indicator,
    series::{DateWindow, FetchedTable},
  };
  use macrofeed_store_sqlite::SqliteStore;

  use super::*;
  use crate::UpdaterConfig;

  fn at(date: &str, time: &str) -> NaiveDateTime {
    let date: NaiveDate = date.parse().unwrap();
    date.and_time(NaiveTime::parse_from_str(time, "%H:%M").unwrap())
  }

  fn schedule() -> Schedule { Schedule::new(&ScheduleConfig::default()) }

  #[test]
  fn weekday_morning_runs_daily_in_the_evening() {
    // 2024-06-03 is a Monday.
    let (next, job) = schedule().next_run_after(at("2024-06-03", "09:00"));
    assert_eq!(next, at("2024-06-03", "18:00"));
    assert_eq!(job, Job::DailyIncremental);
  }

  #[test]
  fn friday_evening_runs_weekly_on_sunday() {
    let (next, job) = schedule().next_run_after(at("2024-06-07", "18:00"));
    assert_eq!(next, at("2024-06-09", "02:00"));
    assert_eq!(job, Job::WeeklyFull);
  }

  #[test]
  fn sunday_after_weekly_waits_for_monday() {
    let (next, job) = schedule().next_run_after(at("2024-06-09", "03:00"));
    assert_eq!(next, at("2024-06-10", "18:00"));
    assert_eq!(job, Job::DailyIncremental);
  }

  #[test]
  fn due_between_covers_one_tick() {
    let s = schedule();
    assert_eq!(
      s.due_between(at("2024-06-03", "17:59"), at("2024-06-03", "18:00")),
      [Job::DailyIncremental]
    );
    assert!(s.due_between(at("2024-06-03", "18:00"), at("2024-06-03", "18:01")).is_empty());
    assert!(s.due_between(at("2024-06-08", "17:59"), at("2024-06-08", "18:01")).is_empty());
  }

  #[test]
  fn due_between_lists_each_job_once() {
    let due = schedule().due_between(at("2024-06-06", "12:00"), at("2024-06-10", "19:00"));
    assert_eq!(due, [Job::DailyIncremental, Job::WeeklyFull]);
  }

  #[test]
  fn config_reads_clock_times() {
    let config: ScheduleConfig = serde_json::from_str(
      r#"{"daily_update_time":"17:30","weekly_update_time":"03:15","check_interval_secs":5}"#,
    )
    .unwrap();
    assert_eq!(config.daily_update_time, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
    assert_eq!(config.check_interval, Duration::from_secs(5));
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────

  struct IdleClient;

  impl MarketDataClient for IdleClient {
    type Error = std::io::Error;

    async fn fetch(&self, _: &Indicator, _: DateWindow) -> Result<FetchedTable, Self::Error> {
      Ok(FetchedTable::new())
    }

    async fn check_connection(&self) -> bool { true }
  }

  async fn scheduler() -> Scheduler<SqliteStore, IdleClient> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let updater = Updater::new(store, Arc::new(IdleClient), UpdaterConfig::default());
    Scheduler::new(Arc::new(updater), &ScheduleConfig::default())
  }

  #[tokio::test]
  async fn start_stop_and_restart() {
    let scheduler = scheduler().await;
    assert!(!scheduler.is_running());

    assert!(scheduler.start());
    assert!(!scheduler.start());
    assert!(scheduler.is_running());

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(!scheduler.is_draining());

    assert!(scheduler.start());
    assert!(scheduler.is_running());
    scheduler.stop().await;
  }

  #[tokio::test]
  async fn stop_without_start_is_a_no_op() {
    let scheduler = scheduler().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(!scheduler.is_draining());
  }

  #[tokio::test]
  async fn pass_outlasting_stop_is_reported_as_draining() {
    let mut scheduler = scheduler().await;
    scheduler.stop_timeout = Duration::from_millis(20);

    // A loop stuck in a pass: it never looks at the stop signal.
    let (stop, _stop_rx) = watch::channel(false);
    let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(30)));
    *scheduler.state.lock().unwrap() = State::Running { stop, task };

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.is_draining());

    // A second stop leaves the draining pass alone.
    scheduler.stop().await;
    assert!(scheduler.is_draining());
  }
}
