//! [`SqliteStore`], the SQLite implementation of [`IndicatorStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension as _;

use macrofeed_core::{
  catalog::CatalogEntry,
  indicator::Indicator,
  series::{Observation, Series},
  store::{Coverage, FieldUsage, IndicatorStore, SeriesQuery, StoreSummary, UpdateStats},
  update::{NewUpdateAttempt, UpdateAttempt},
};

use crate::{
  encode::{
    ATTEMPT_COLUMNS, RawAttempt, RawCoverage, RawField, RawIndicator, RawObservation,
    decode_date, encode_date, encode_dt,
  },
  schema::SCHEMA,
  Error, Result,
};

const INDICATOR_COLUMNS: &str = "code, category, name, data_source, created_at, updated_at";

fn raw_indicator(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIndicator> {
  Ok(RawIndicator {
    code:        row.get(0)?,
    category:    row.get(1)?,
    name:        row.get(2)?,
    data_source: row.get(3)?,
    created_at:  row.get(4)?,
    updated_at:  row.get(5)?,
  })
}

fn raw_field(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawField> {
  Ok(RawField {
    code:         row.get(0)?,
    name:         row.get(1)?,
    display_name: row.get(2)?,
  })
}

fn count(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<u64> {
  let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
  Ok(u64::try_from(n).unwrap_or(0))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A macrofeed indicator store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every method
/// is a single call on the connection thread, so no lock is held between
/// calls and concurrent readers see per-row consistent state.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read indicators (optionally one code or one category) and their fields.
  async fn load_indicators(
    &self,
    code: Option<String>,
    category: Option<String>,
  ) -> Result<Vec<Indicator>> {
    let (raws, fields): (Vec<RawIndicator>, Vec<RawField>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INDICATOR_COLUMNS} FROM indicators
           WHERE (?1 IS NULL OR code = ?1)
             AND (?2 IS NULL OR category = ?2)
           ORDER BY category, name, code"
        ))?;
        let raws = stmt
          .query_map(rusqlite::params![code, category], raw_indicator)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT f.code, f.field_name, f.field_display_name
           FROM indicator_fields f
           JOIN indicators i ON i.code = f.code
           WHERE (?1 IS NULL OR i.code = ?1)
             AND (?2 IS NULL OR i.category = ?2)
           ORDER BY f.code, f.field_name",
        )?;
        let fields = stmt
          .query_map(rusqlite::params![code, category], raw_field)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((raws, fields))
      })
      .await?;

    raws.into_iter().map(|raw| raw.into_indicator(&fields)).collect()
  }
}

// ─── IndicatorStore impl ─────────────────────────────────────────────────────

impl IndicatorStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn register_indicator(&self, entry: &CatalogEntry) -> Result<Indicator> {
    let code     = entry.code.clone();
    let category = entry.category.clone();
    let name     = entry.name.clone();
    let source   = entry.source.as_str().to_owned();
    let now      = encode_dt(Utc::now());
    let fields: Vec<(String, String)> = entry
      .fields
      .iter()
      .map(|f| (f.name.clone(), f.display_name.clone()))
      .collect();

    let code_for_insert = code.clone();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO indicators (code, category, name, data_source, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)
           ON CONFLICT(code) DO UPDATE SET
             category    = excluded.category,
             name        = excluded.name,
             data_source = excluded.data_source,
             updated_at  = excluded.updated_at",
          rusqlite::params![code_for_insert, category, name, source, now],
        )?;
        for (field, display) in &fields {
          tx.execute(
            "INSERT INTO indicator_fields (code, field_name, field_display_name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code, field_name) DO UPDATE SET
               field_display_name = excluded.field_display_name",
            rusqlite::params![code_for_insert, field, display, now],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self
      .get_indicator(&code)
      .await?
      .ok_or(Error::IndicatorNotFound(code))
  }

  async fn list_indicators(&self, category: Option<&str>) -> Result<Vec<Indicator>> {
    self.load_indicators(None, category.map(str::to_owned)).await
  }

  async fn get_indicator(&self, code: &str) -> Result<Option<Indicator>> {
    let mut found = self.load_indicators(Some(code.to_owned()), None).await?;
    Ok(found.pop())
  }

  async fn categories(&self) -> Result<Vec<String>> {
    let categories = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT category FROM indicators ORDER BY category")?;
        let rows = stmt
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(categories)
  }

  // ── Observations ──────────────────────────────────────────────────────────

  async fn upsert_observations(
    &self,
    code:   &str,
    field:  &str,
    series: &Series,
  ) -> Result<usize> {
    let points: Vec<(String, f64)> = series
      .present()
      .map(|(date, value)| (encode_date(date), value))
      .collect();
    if points.is_empty() {
      return Ok(0);
    }

    let code_str  = code.to_owned();
    let field_str = field.to_owned();
    let now       = encode_dt(Utc::now());

    let written: Option<usize> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mapped = tx
          .query_row(
            "SELECT 1 FROM indicator_fields WHERE code = ?1 AND field_name = ?2",
            rusqlite::params![code_str, field_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !mapped {
          return Ok(None);
        }

        {
          let mut stmt = tx.prepare(
            "INSERT INTO time_series_data (code, field_name, date, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(code, field_name, date) DO UPDATE SET
               value      = excluded.value,
               updated_at = excluded.updated_at",
          )?;
          for (date, value) in &points {
            stmt.execute(rusqlite::params![code_str, field_str, date, value, now])?;
          }
        }
        tx.commit()?;
        Ok(Some(points.len()))
      })
      .await?;

    written.ok_or_else(|| Error::UnknownField {
      code:  code.to_owned(),
      field: field.to_owned(),
    })
  }

  async fn last_observation_date(
    &self,
    code:  &str,
    field: Option<&str>,
  ) -> Result<Option<NaiveDate>> {
    let code_str  = code.to_owned();
    let field_str = field.map(str::to_owned);

    let max: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MAX(date) FROM time_series_data
           WHERE code = ?1 AND (?2 IS NULL OR field_name = ?2)",
          rusqlite::params![code_str, field_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    max.as_deref().map(decode_date).transpose()
  }

  async fn observation_count(&self, code: &str) -> Result<u64> {
    let code_str = code.to_owned();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM time_series_data WHERE code = ?1",
          rusqlite::params![code_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or(0))
  }

  async fn observations(&self, query: &SeriesQuery) -> Result<Vec<Observation>> {
    let code  = query.code.clone();
    let field = query.field.clone();
    let start = query.start.map(encode_date);
    let end   = query.end.map(encode_date);

    let raws: Vec<RawObservation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT code, field_name, date, value FROM time_series_data
           WHERE code = ?1
             AND (?2 IS NULL OR field_name = ?2)
             AND (?3 IS NULL OR date >= ?3)
             AND (?4 IS NULL OR date <= ?4)
           ORDER BY date, field_name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![code, field, start, end], |row| {
            Ok(RawObservation {
              code:  row.get(0)?,
              field: row.get(1)?,
              date:  row.get(2)?,
              value: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawObservation::into_observation).collect()
  }

  // ── Update log ────────────────────────────────────────────────────────────

  async fn append_update_log(&self, attempt: NewUpdateAttempt) -> Result<UpdateAttempt> {
    let attempted_at = Utc::now();
    let at_str       = encode_dt(attempted_at);
    let start_str    = encode_date(attempt.window.start);
    let end_str      = encode_date(attempt.window.end);
    let mode_str     = attempt.mode.as_str();
    let outcome_str  = attempt.outcome.as_str();
    let records      = i64::try_from(attempt.records).unwrap_or(i64::MAX);
    let code         = attempt.code.clone();
    let field        = attempt.field.clone();
    let error        = attempt.error.clone();

    let id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO update_logs (
             code, field_name, update_type, start_date, end_date,
             records_count, status, error_message, update_time
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            code, field, mode_str, start_str, end_str, records, outcome_str, error, at_str,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(UpdateAttempt {
      id,
      code:    attempt.code,
      field:   attempt.field,
      mode:    attempt.mode,
      window:  attempt.window,
      records: attempt.records,
      outcome: attempt.outcome,
      error:   attempt.error,
      attempted_at,
    })
  }

  async fn latest_attempt(&self, code: &str) -> Result<Option<UpdateAttempt>> {
    let code_str = code.to_owned();
    let raw: Option<RawAttempt> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ATTEMPT_COLUMNS} FROM update_logs
               WHERE code = ?1 ORDER BY id DESC LIMIT 1"
            ),
            rusqlite::params![code_str],
            RawAttempt::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAttempt::into_attempt).transpose()
  }

  async fn recent_attempts(&self, limit: usize) -> Result<Vec<UpdateAttempt>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);
    let raws: Vec<RawAttempt> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTEMPT_COLUMNS} FROM update_logs ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawAttempt::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  async fn summary(&self) -> Result<StoreSummary> {
    let summary = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT category, COUNT(*) FROM indicators GROUP BY category ORDER BY category",
        )?;
        let categories: BTreeMap<String, u64> = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .map(|row| row.map(|(c, n)| (c, u64::try_from(n).unwrap_or(0))))
          .collect::<rusqlite::Result<_>>()?;

        Ok(StoreSummary {
          indicators: count(conn, "SELECT COUNT(*) FROM indicators")?,
          fields: count(conn, "SELECT COUNT(*) FROM indicator_fields")?,
          observations: count(conn, "SELECT COUNT(*) FROM time_series_data")?,
          categories,
          multi_field_indicators: count(
            conn,
            "SELECT COUNT(*) FROM (
               SELECT code FROM indicator_fields GROUP BY code HAVING COUNT(*) > 1
             )",
          )?,
        })
      })
      .await?;
    Ok(summary)
  }

  async fn update_stats(&self, since: DateTime<Utc>) -> Result<UpdateStats> {
    let since_str = encode_dt(since);
    let stats = self
      .conn
      .call(move |conn| {
        let recent: i64 = conn.query_row(
          "SELECT COUNT(*) FROM update_logs WHERE update_time >= ?1",
          rusqlite::params![since_str],
          |r| r.get(0),
        )?;
        Ok(UpdateStats {
          recent_attempts:   u64::try_from(recent).unwrap_or(0),
          failed_indicators: count(
            conn,
            "SELECT COUNT(DISTINCT code) FROM update_logs WHERE status = 'failed'",
          )?,
        })
      })
      .await?;
    Ok(stats)
  }

  async fn field_usage(&self) -> Result<Vec<FieldUsage>> {
    let usage = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT field_name, MIN(field_display_name), COUNT(*)
           FROM indicator_fields
           GROUP BY field_name
           ORDER BY COUNT(*) DESC, field_name",
        )?;
        let rows = stmt
          .query_map([], |r| {
            Ok(FieldUsage {
              field:        r.get(0)?,
              display_name: r.get(1)?,
              indicators:   u64::try_from(r.get::<_, i64>(2)?).unwrap_or(0),
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(usage)
  }

  async fn coverage(&self) -> Result<Vec<Coverage>> {
    let raws: Vec<RawCoverage> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT i.code, i.name, i.category, MIN(t.date), MAX(t.date), COUNT(t.date)
           FROM indicators i
           LEFT JOIN time_series_data t ON t.code = i.code
           GROUP BY i.code, i.name, i.category
           ORDER BY i.category, i.name, i.code",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawCoverage {
              code:         row.get(0)?,
              name:         row.get(1)?,
              category:     row.get(2)?,
              first_date:   row.get(3)?,
              last_date:    row.get(4)?,
              observations: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCoverage::into_coverage).collect()
  }
}
