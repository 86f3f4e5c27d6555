//! Persistent reading and prediction store
//!
//! Readings are append-only and de-duplicated against the latest stored
//! timestamp. Predictions are upserted: a conflicting write replaces only
//! the predicted value and leaves any computed error in place.

mod evaluation;

pub use evaluation::{Evaluation, EvaluationEngine, DEFAULT_EVALUATION_ROWS};

use crate::error::Result;
use crate::models::{format_timestamp, parse_timestamp, HistoryRow, Prediction, Reading};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS readings (
    timestamp TEXT PRIMARY KEY,
    value REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS predictions (
    timestamp TEXT PRIMARY KEY,
    predicted_value REAL NOT NULL,
    error REAL NULL
);
";

/// Counts from one append
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub inserted: usize,
    /// Readings at or before the latest stored timestamp
    pub skipped: usize,
}

/// Everything written by one inference cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleCommit {
    pub appended: AppendOutcome,
    pub evaluation: Option<Evaluation>,
    pub prediction: Option<Prediction>,
}

/// SQLite-backed store shared by the inference, training and read paths
pub struct ForecastStore {
    conn: Mutex<Connection>,
    evaluation: EvaluationEngine,
}

impl ForecastStore {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %path.display(), "Opened forecast store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            evaluation: EvaluationEngine::default(),
        })
    }

    pub fn with_evaluation(mut self, evaluation: EvaluationEngine) -> Self {
        self.evaluation = evaluation;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cheap liveness probe for health checks
    pub fn ping(&self) -> Result<()> {
        self.lock().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn latest_reading_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        latest_reading_in(&self.lock())
    }

    /// Insert readings newer than the latest stored one, then recompute the error
    pub fn append_new(&self, readings: &[Reading]) -> Result<(AppendOutcome, Option<Evaluation>)> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let appended = append_new_in(&tx, readings)?;
        let evaluation = recompute_in(&tx, &self.evaluation)?;
        tx.commit()?;
        Ok((appended, evaluation))
    }

    /// Insert a prediction with no error, or replace only its value
    pub fn upsert_prediction(&self, timestamp: DateTime<Utc>, predicted_value: f64) -> Result<()> {
        upsert_prediction_in(&self.lock(), timestamp, predicted_value)
    }

    /// Recompute the trailing error for the prediction at the latest reading
    pub fn recompute_error(&self) -> Result<Option<Evaluation>> {
        recompute_in(&self.lock(), &self.evaluation)
    }

    /// Append, evaluate and upsert as one transaction
    pub fn commit_cycle(
        &self,
        readings: &[Reading],
        prediction: Option<(DateTime<Utc>, f64)>,
    ) -> Result<CycleCommit> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let appended = append_new_in(&tx, readings)?;
        let evaluation = recompute_in(&tx, &self.evaluation)?;
        let prediction = match prediction {
            Some((timestamp, value)) => {
                upsert_prediction_in(&tx, timestamp, value)?;
                prediction_at(&tx, timestamp)?
            }
            None => None,
        };
        tx.commit()?;
        Ok(CycleCommit {
            appended,
            evaluation,
            prediction,
        })
    }

    /// All readings, oldest first
    pub fn readings(&self) -> Result<Vec<Reading>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT timestamp, value FROM readings ORDER BY timestamp")?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(ts, value)| Ok(Reading::new(parse_timestamp(&ts)?, value)))
            .collect()
    }

    /// All predictions, oldest first
    pub fn predictions(&self) -> Result<Vec<Prediction>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, predicted_value, error FROM predictions ORDER BY timestamp",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(ts, predicted_value, error)| {
                Ok(Prediction {
                    timestamp: parse_timestamp(&ts)?,
                    predicted_value,
                    error,
                })
            })
            .collect()
    }

    pub fn latest_prediction(&self) -> Result<Option<Prediction>> {
        let conn = self.lock();
        let latest: Option<String> =
            conn.query_row("SELECT MAX(timestamp) FROM predictions", [], |row| row.get(0))?;
        match latest {
            Some(ts) => prediction_at(&conn, parse_timestamp(&ts)?),
            None => Ok(None),
        }
    }

    /// Outer join of readings and predictions, oldest first.
    ///
    /// `limit` keeps only the most recent rows.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT r.timestamp, r.value, p.predicted_value, p.error
               FROM readings r LEFT JOIN predictions p ON p.timestamp = r.timestamp
             UNION ALL
             SELECT p.timestamp, NULL, p.predicted_value, p.error
               FROM predictions p
              WHERE NOT EXISTS (SELECT 1 FROM readings r WHERE r.timestamp = p.timestamp)
             ORDER BY 1",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let skip = limit.map_or(0, |n| raw.len().saturating_sub(n));
        raw.into_iter()
            .skip(skip)
            .map(|(ts, value, predicted_value, error)| {
                Ok(HistoryRow {
                    timestamp: parse_timestamp(&ts)?,
                    value,
                    predicted_value,
                    error,
                })
            })
            .collect()
    }
}

fn latest_reading_in(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> =
        conn.query_row("SELECT MAX(timestamp) FROM readings", [], |row| row.get(0))?;
    latest.map(|ts| parse_timestamp(&ts)).transpose()
}

fn append_new_in(conn: &Connection, readings: &[Reading]) -> Result<AppendOutcome> {
    let latest = latest_reading_in(conn)?;
    let mut outcome = AppendOutcome::default();
    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO readings (timestamp, value) VALUES (?1, ?2)")?;

    for reading in readings {
        if latest.is_some_and(|l| reading.timestamp <= l) {
            outcome.skipped += 1;
            continue;
        }
        let changed = stmt.execute(params![format_timestamp(&reading.timestamp), reading.value])?;
        if changed == 0 {
            outcome.skipped += 1;
        } else {
            outcome.inserted += changed;
        }
    }

    debug!(
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "Appended readings"
    );
    Ok(outcome)
}

fn upsert_prediction_in(conn: &Connection, timestamp: DateTime<Utc>, predicted_value: f64) -> Result<()> {
    conn.execute(
        "INSERT INTO predictions (timestamp, predicted_value, error) VALUES (?1, ?2, NULL)
         ON CONFLICT(timestamp) DO UPDATE SET predicted_value = excluded.predicted_value",
        params![format_timestamp(&timestamp), predicted_value],
    )?;
    Ok(())
}

fn prediction_at(conn: &Connection, timestamp: DateTime<Utc>) -> Result<Option<Prediction>> {
    let found = conn
        .query_row(
            "SELECT predicted_value, error FROM predictions WHERE timestamp = ?1",
            params![format_timestamp(&timestamp)],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, Option<f64>>(1)?)),
        )
        .optional()?;
    Ok(found.map(|(predicted_value, error)| Prediction {
        timestamp,
        predicted_value,
        error,
    }))
}

fn recompute_in(conn: &Connection, engine: &EvaluationEngine) -> Result<Option<Evaluation>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.timestamp, r.value, p.predicted_value
           FROM readings r LEFT JOIN predictions p ON p.timestamp = r.timestamp
          ORDER BY r.timestamp DESC
          LIMIT ?1",
    )?;
    let mut rows = stmt
        .query_map(params![engine.rows() as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.reverse();

    let Some((anchor, _, _)) = rows.last() else {
        return Ok(None);
    };
    let anchor = anchor.clone();
    let pairs: Vec<(f64, Option<f64>)> = rows.iter().map(|(_, v, p)| (*v, *p)).collect();
    let Some(mse) = engine.mean_squared_error(&pairs) else {
        return Ok(None);
    };

    let updated = conn.execute(
        "UPDATE predictions SET error = ?1 WHERE timestamp = ?2",
        params![mse, anchor],
    )?;
    if updated == 0 {
        debug!(timestamp = %anchor, "No prediction at latest reading, evaluation skipped");
        return Ok(None);
    }

    let evaluation = Evaluation {
        timestamp: parse_timestamp(&anchor)?,
        mse,
        rows: pairs.len(),
    };
    debug!(timestamp = %anchor, mse, rows = evaluation.rows, "Recomputed trailing error");
    Ok(Some(evaluation))
}
