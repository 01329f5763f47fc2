//! Update reconciliation and scheduling for macrofeed.
//!
//! [`Updater`] decides, per indicator, which date window to fetch, merges the
//! result into an [`IndicatorStore`](macrofeed_core::store::IndicatorStore)
//! and records every attempt in the update log. [`Scheduler`] triggers
//! passes on a daily/weekly timetable.

mod batch;
mod scheduler;
mod updater;

pub mod error;

pub use batch::{BatchReport, SmartReport, UpdateKind};
pub use error::{Error, Result};
pub use scheduler::{Job, Schedule, ScheduleConfig, Scheduler};
pub use updater::{ReconcileOutcome, Updater, UpdaterConfig};

#[cfg(test)]
mod tests;
