//! Append-only SQLite store for persisted readings.
//!
//! The `PRIMARY KEY(ts_s_utc)` constraint makes `append` idempotent at the
//! storage layer: a redundant append attempt (scheduler firing twice, retry
//! after a partial failure) inserts nothing and is safe to repeat.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::info;

use crate::enrich::Reading;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct ReadingStore {
    conn: Connection,
}

impl ReadingStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS readings (
                ts_s_utc INTEGER NOT NULL,
                pm1 REAL NOT NULL,
                pm25 REAL NOT NULL,
                pm03 REAL NOT NULL,
                relative_humidity REAL NOT NULL,
                temperature REAL NOT NULL,
                PRIMARY KEY(ts_s_utc)
            ) WITHOUT ROWID;
            ",
        )?;

        Ok(Self { conn })
    }

    /// Appends a batch inside one transaction. Rows whose timestamp already
    /// exists are left untouched; returns the number of rows inserted.
    pub fn append(&mut self, readings: &[Reading]) -> Result<u64, StoreError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO readings (
                    ts_s_utc,
                    pm1,
                    pm25,
                    pm03,
                    relative_humidity,
                    temperature
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(ts_s_utc) DO NOTHING
                ",
            )?;

            for reading in readings {
                inserted += stmt.execute(params![
                    reading.ts_s_utc,
                    reading.pm1,
                    reading.pm25,
                    reading.pm03,
                    reading.relative_humidity,
                    reading.temperature,
                ])? as u64;
            }
        }
        tx.commit()?;

        info!(
            component = "store",
            event = "store.append.finish",
            batch_rows = readings.len(),
            inserted_rows = inserted
        );

        Ok(inserted)
    }

    /// Full history, oldest first.
    pub fn read_all(&self) -> Result<Vec<Reading>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT ts_s_utc, pm1, pm25, pm03, relative_humidity, temperature
            FROM readings
            ORDER BY ts_s_utc ASC
            ",
        )?;

        let rows = stmt
            .query_map([], row_to_reading)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent `n` readings, still returned oldest first.
    pub fn read_latest(&self, n: u64) -> Result<Vec<Reading>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT ts_s_utc, pm1, pm25, pm03, relative_humidity, temperature
            FROM (
                SELECT * FROM readings ORDER BY ts_s_utc DESC LIMIT ?1
            )
            ORDER BY ts_s_utc ASC
            ",
        )?;

        let rows = stmt
            .query_map(params![n], row_to_reading)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn latest_timestamp(&self) -> Result<Option<i64>, StoreError> {
        let ts = self
            .conn
            .query_row("SELECT MAX(ts_s_utc) FROM readings", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        Ok(ts)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_range(&self, start_ts: i64, end_ts_exclusive: i64) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "
            SELECT COUNT(*)
            FROM readings
            WHERE ts_s_utc >= ?1
              AND ts_s_utc < ?2
            ",
            params![start_ts, end_ts_exclusive],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_reading(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        ts_s_utc: row.get(0)?,
        pm1: row.get(1)?,
        pm25: row.get(2)?,
        pm03: row.get(3)?,
        relative_humidity: row.get(4)?,
        temperature: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reading(ts_s_utc: i64, pm25: f64) -> Reading {
        Reading {
            ts_s_utc,
            pm1: 1.0,
            pm25,
            pm03: 3.0,
            relative_humidity: 4.0,
            temperature: 5.0,
        }
    }

    #[test]
    fn append_is_idempotent_against_duplicate_timestamps() {
        let temp = tempdir().unwrap();
        let mut store = ReadingStore::open(&temp.path().join("readings.sqlite")).unwrap();

        let batch = vec![reading(3_600, 10.0), reading(7_200, 11.0)];
        assert_eq!(store.append(&batch).unwrap(), 2);
        assert_eq!(store.append(&batch).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn existing_row_is_not_overwritten_by_a_conflicting_append() {
        let temp = tempdir().unwrap();
        let mut store = ReadingStore::open(&temp.path().join("readings.sqlite")).unwrap();

        store.append(&[reading(3_600, 10.0)]).unwrap();
        store.append(&[reading(3_600, 99.0)]).unwrap();

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pm25, 10.0);
    }

    #[test]
    fn read_all_is_ordered_and_latest_timestamp_tracks_appends() {
        let temp = tempdir().unwrap();
        let mut store = ReadingStore::open(&temp.path().join("readings.sqlite")).unwrap();

        assert_eq!(store.latest_timestamp().unwrap(), None);

        store
            .append(&[reading(7_200, 2.0), reading(3_600, 1.0)])
            .unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows[0].ts_s_utc, 3_600);
        assert_eq!(rows[1].ts_s_utc, 7_200);
        assert_eq!(store.latest_timestamp().unwrap(), Some(7_200));
    }

    #[test]
    fn read_latest_returns_tail_oldest_first() {
        let temp = tempdir().unwrap();
        let mut store = ReadingStore::open(&temp.path().join("readings.sqlite")).unwrap();

        let batch: Vec<Reading> = (1..=5).map(|i| reading(i * 3_600, i as f64)).collect();
        store.append(&batch).unwrap();

        let tail = store.read_latest(2).unwrap();
        let timestamps: Vec<i64> = tail.iter().map(|r| r.ts_s_utc).collect();
        assert_eq!(timestamps, vec![14_400, 18_000]);
        assert_eq!(store.count_range(3_600, 10_800).unwrap(), 2);
    }
}
