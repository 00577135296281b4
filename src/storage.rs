//! Append-only run log.
//!
//! One row per completed run: local date and time, total vehicles and the
//! clearance ("signal time") estimate. Rows are hash-chained so edits and
//! deletions are detectable with `verify()`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::chain::{hash_entry, verify_chain, GENESIS_HASH};
use crate::RunSummary;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogRow {
    /// `YYYY-MM-DD`, local time.
    pub date: String,
    /// `HH:MM:SS`, local time.
    pub time: String,
    pub approach_id: String,
    pub source_id: Option<String>,
    pub total_vehicles: u64,
    pub signal_time_s: u64,
}

impl RunLogRow {
    pub fn from_summary<Tz: TimeZone>(summary: &RunSummary, at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S").to_string(),
            approach_id: summary.approach_id.clone(),
            source_id: summary.source_id.clone(),
            total_vehicles: summary.total_unique_vehicles,
            signal_time_s: summary.estimated_clearance_seconds,
        }
    }

    /// Row stamped with the current local time.
    pub fn now(summary: &RunSummary) -> Self {
        Self::from_summary(summary, &Local::now())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLogEntry {
    pub id: i64,
    pub row: RunLogRow,
    pub prev_hash: [u8; 32],
    pub entry_hash: [u8; 32],
}

pub trait RunLogStore {
    /// Append one row and return its chain hash.
    fn append(&mut self, row: &RunLogRow) -> Result<[u8; 32]>;

    /// Most recent `limit` entries, oldest first.
    fn entries(&self, limit: usize) -> Result<Vec<RunLogEntry>>;

    /// Verify the full chain. Returns the number of entries checked.
    fn verify(&self) -> Result<u64>;
}

pub struct SqliteRunLogStore {
    conn: Connection,
}

impl SqliteRunLogStore {
    /// Open (or create) the run log. Accepts plain paths and `file:` URIs.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = crate::open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS run_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              date TEXT NOT NULL,
              time TEXT NOT NULL,
              approach_id TEXT NOT NULL,
              source_id TEXT,
              total_vehicles INTEGER NOT NULL,
              signal_time_s INTEGER NOT NULL,
              payload_json TEXT NOT NULL,
              prev_hash BLOB NOT NULL,
              entry_hash BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_run_log_approach ON run_log(approach_id);
            "#,
        )?;
        Ok(())
    }

    fn last_entry_hash(&self) -> Result<[u8; 32]> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry_hash FROM run_log ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => to_hash(row.get(0)?, "entry_hash"),
            None => Ok(GENESIS_HASH),
        }
    }

    fn load(&self, sql: &str, limit: Option<usize>) -> Result<Vec<(i64, String, [u8; 32], [u8; 32])>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, String, Vec<u8>, Vec<u8>)> {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        };
        let raw = match limit {
            Some(limit) => {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                stmt.query_map(params![limit], map)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        raw.into_iter()
            .map(|(id, payload, prev, entry)| {
                Ok((id, payload, to_hash(prev, "prev_hash")?, to_hash(entry, "entry_hash")?))
            })
            .collect()
    }
}

impl RunLogStore for SqliteRunLogStore {
    fn append(&mut self, row: &RunLogRow) -> Result<[u8; 32]> {
        let total_vehicles = i64::try_from(row.total_vehicles)
            .map_err(|_| anyhow!("total_vehicles exceeds i64 range"))?;
        let signal_time_s = i64::try_from(row.signal_time_s)
            .map_err(|_| anyhow!("signal_time_s exceeds i64 range"))?;
        let prev_hash = self.last_entry_hash()?;
        let payload_json = serde_json::to_string(row)?;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());

        self.conn.execute(
            r#"
            INSERT INTO run_log(date, time, approach_id, source_id, total_vehicles,
                                signal_time_s, payload_json, prev_hash, entry_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                row.date,
                row.time,
                row.approach_id,
                row.source_id,
                total_vehicles,
                signal_time_s,
                payload_json,
                prev_hash.to_vec(),
                entry_hash.to_vec()
            ],
        )?;
        log::info!(
            "run log: appended {} vehicles / {}s for {}",
            row.total_vehicles,
            row.signal_time_s,
            row.approach_id
        );
        Ok(entry_hash)
    }

    fn entries(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let mut loaded = self.load(
            "SELECT id, payload_json, prev_hash, entry_hash FROM run_log ORDER BY id DESC LIMIT ?1",
            Some(limit),
        )?;
        loaded.reverse();
        loaded
            .into_iter()
            .map(|(id, payload, prev_hash, entry_hash)| {
                let row: RunLogRow = serde_json::from_str(&payload)
                    .map_err(|e| anyhow!("corrupt run log payload at id {}: {}", id, e))?;
                Ok(RunLogEntry {
                    id,
                    row,
                    prev_hash,
                    entry_hash,
                })
            })
            .collect()
    }

    fn verify(&self) -> Result<u64> {
        let loaded = self.load(
            "SELECT id, payload_json, prev_hash, entry_hash FROM run_log ORDER BY id ASC",
            None,
        )?;
        verify_chain(
            loaded
                .iter()
                .map(|(id, payload, prev, entry)| (*id, payload.as_bytes(), *prev, *entry)),
        )
    }
}

/// Run log held in memory, for hosts without a database and for tests.
#[derive(Default)]
pub struct InMemoryRunLogStore {
    entries: Vec<(RunLogEntry, String)>,
}

impl InMemoryRunLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RunLogStore for InMemoryRunLogStore {
    fn append(&mut self, row: &RunLogRow) -> Result<[u8; 32]> {
        let prev_hash = self
            .entries
            .last()
            .map_or(GENESIS_HASH, |(entry, _)| entry.entry_hash);
        let payload_json = serde_json::to_string(row)?;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());
        let id = self.entries.len() as i64 + 1;
        self.entries.push((
            RunLogEntry {
                id,
                row: row.clone(),
                prev_hash,
                entry_hash,
            },
            payload_json,
        ));
        Ok(entry_hash)
    }

    fn entries(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let skip = self.entries.len().saturating_sub(limit);
        Ok(self
            .entries
            .iter()
            .skip(skip)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    fn verify(&self) -> Result<u64> {
        verify_chain(self.entries.iter().map(|(entry, payload)| {
            (entry.id, payload.as_bytes(), entry.prev_hash, entry.entry_hash)
        }))
    }
}

fn to_hash(bytes: Vec<u8>, column: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| anyhow!("corrupt run log: {} size", column))
}
