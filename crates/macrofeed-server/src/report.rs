//! Plain-text operator reports printed by the CLI.

use std::fmt::Write as _;

use macrofeed_core::{
  returns::{ReturnMethod, RollingReturn},
  store::{Coverage, FieldUsage, StoreSummary, UpdateStats},
  update::{Outcome, UpdateAttempt},
};
use macrofeed_updater::{BatchReport, UpdateKind};

/// Store counts with the per-category breakdown.
pub fn summary(summary: &StoreSummary) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "indicators:        {}", summary.indicators);
  let _ = writeln!(out, "fields:            {}", summary.fields);
  let _ = writeln!(out, "observations:      {}", summary.observations);
  let _ = writeln!(out, "multi-field:       {}", summary.multi_field_indicators);
  if !summary.categories.is_empty() {
    let _ = writeln!(out, "categories:");
    for (category, count) in &summary.categories {
      let _ = writeln!(out, "  {category:<24} {count:>6}");
    }
  }
  out
}

pub fn status(
  connected: bool,
  store: &StoreSummary,
  stats: &UpdateStats,
  recent: &[UpdateAttempt],
) -> String {
  let mut out = String::new();
  let gateway = if connected { "connected" } else { "unreachable" };
  let _ = writeln!(out, "market data gateway: {gateway}");
  out.push_str(&summary(store));
  let _ = writeln!(out, "attempts (24h):    {}", stats.recent_attempts);
  let _ = writeln!(out, "ever failed:       {}", stats.failed_indicators);

  if !recent.is_empty() {
    let _ = writeln!(out, "recent updates:");
    for attempt in recent {
      let outcome = match attempt.outcome {
        Outcome::Success => "ok",
        Outcome::Failed => "FAILED",
      };
      let _ = write!(
        out,
        "  {} {:<14} {:<20} {:<11} {:<6} {:>7}",
        attempt.attempted_at.format("%Y-%m-%d %H:%M"),
        attempt.code,
        attempt.field.as_deref().unwrap_or("*"),
        attempt.mode.as_str(),
        outcome,
        attempt.records,
      );
      if let Some(error) = &attempt.error {
        let _ = write!(out, "  {error}");
      }
      out.push('\n');
    }
  }
  out
}

/// Field names by how many indicators use them.
pub fn field_usage(usage: &[FieldUsage]) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{:<28} {:<32} {:>10}", "field", "label", "indicators");
  for row in usage {
    let _ = writeln!(out, "{:<28} {:<32} {:>10}", row.field, row.display_name, row.indicators);
  }
  out
}

/// Stored range per indicator, grouped by category, with a tally of
/// indicators that have no data yet.
pub fn coverage(rows: &[Coverage]) -> String {
  let mut out = String::new();
  let mut category: Option<&str> = None;
  let mut empty = 0usize;

  for row in rows {
    if category != Some(row.category.as_str()) {
      let _ = writeln!(out, "[{}]", row.category);
      category = Some(row.category.as_str());
    }
    match (row.first_date, row.last_date) {
      (Some(first), Some(last)) => {
        let _ = writeln!(
          out,
          "  {:<14} {:<30} {first} .. {last} {:>8}",
          row.code, row.name, row.observations
        );
      }
      _ => {
        empty += 1;
        let _ = writeln!(out, "  {:<14} {:<30} no data", row.code, row.name);
      }
    }
  }
  let _ = writeln!(out, "{} indicators, {empty} without data", rows.len());
  out
}

pub fn batch(kind: UpdateKind, report: &BatchReport) -> String {
  format!(
    "{kind} update: {} indicators, {} succeeded, {} failed, {} skipped",
    report.total, report.succeeded, report.failed, report.skipped
  )
}

/// Both trailing three-year readings for one series, and their gap when
/// both could be computed.
pub fn returns(
  code: &str,
  field: &str,
  month_end: Option<&RollingReturn>,
  daily: Option<&RollingReturn>,
) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{code} {field}: rolling 3y annualised return");
  for (method, result) in [(ReturnMethod::MonthEnd, month_end), (ReturnMethod::Daily, daily)] {
    match result {
      Some(r) => {
        let _ = writeln!(
          out,
          "  {:<10} {:>9.4}%  {} {:.4} -> {} {:.4}  ({:.4} years)",
          method.as_str(),
          r.percent(),
          r.base_date,
          r.base_value,
          r.current_date,
          r.current_value,
          r.years,
        );
      }
      None => {
        let _ = writeln!(out, "  {:<10} not enough data", method.as_str());
      }
    }
  }
  if let (Some(m), Some(d)) = (month_end, daily) {
    let _ = writeln!(out, "  {:<10} {:>9.4}%", "difference", m.percent() - d.percent());
  }
  out
}
