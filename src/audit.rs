//! Durable, append-only log of completed jobs.
//!
//! Backed by a single SQLite table. Appends from concurrent workers are
//! serialized on one connection, so records never interleave and sequence
//! ids follow append order. Reads walk the log newest-first through an
//! [`AuditQuery`] cursor that pages lazily from a fixed snapshot.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;

use crate::error::AuditError;
use crate::job::{ClassificationResult, Label};

const DEFAULT_PAGE_SIZE: usize = 128;

/// A persisted copy of one completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub sequence_id: i64,
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_text: String,
    pub label: Label,
    pub confidence: f64,
    pub latency_seconds: f64,
}

/// Aggregate view over the whole log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditSummary {
    pub total_queries: u64,
    pub avg_processing_time_seconds: Option<f64>,
    pub ai_detections: u64,
    pub human_detections: u64,
}

pub struct AuditLog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Opens (or creates) the log at `path`, creating parent directories and
    /// the schema if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        let log = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        log.migrate()?;
        Ok(log)
    }

    /// Opens a log that must already exist, without creating anything.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(AuditError::Missing(path));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let log = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        log.migrate()?;
        Ok(log)
    }

    pub fn open_in_memory() -> Result<Self, AuditError> {
        let log = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        log.migrate()?;
        Ok(log)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<(), AuditError> {
        self.conn.lock().execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS queries (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              job_id TEXT NOT NULL UNIQUE,
              timestamp TEXT NOT NULL,
              text TEXT NOT NULL,
              prediction TEXT NOT NULL,
              confidence REAL NOT NULL,
              processing_time_seconds REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queries_timestamp ON queries(timestamp);
            "#,
        )?;
        Ok(())
    }

    /// Appends the record for a completed job and returns it with its
    /// assigned sequence id and timestamp. A second append for the same job
    /// id fails.
    pub fn append(
        &self,
        job_id: &str,
        input_text: &str,
        result: &ClassificationResult,
    ) -> Result<AuditRecord, AuditError> {
        let conn = self.conn.lock();
        // Stamped under the lock; a wall-clock step back can still reorder
        // timestamps against ids.
        let timestamp = Utc::now();
        conn.execute(
            r#"
            INSERT INTO queries (job_id, timestamp, text, prediction, confidence, processing_time_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                job_id,
                timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                input_text,
                result.label.as_str(),
                result.confidence,
                result.processing_time_seconds,
            ],
        )?;

        Ok(AuditRecord {
            sequence_id: conn.last_insert_rowid(),
            job_id: job_id.to_string(),
            timestamp,
            input_text: input_text.to_string(),
            label: result.label,
            confidence: result.confidence,
            latency_seconds: result.processing_time_seconds,
        })
    }

    /// Newest-first cursor over the records present right now.
    pub fn query(&self) -> Result<AuditQuery<'_>, AuditError> {
        AuditQuery::new(self, DEFAULT_PAGE_SIZE)
    }

    pub fn query_with_page_size(&self, page_size: usize) -> Result<AuditQuery<'_>, AuditError> {
        AuditQuery::new(self, page_size.max(1))
    }

    /// The `limit` newest records.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        self.query_with_page_size(limit.clamp(1, DEFAULT_PAGE_SIZE))?
            .take(limit)
            .collect()
    }

    pub fn find_by_job(&self, job_id: &str) -> Result<Option<AuditRecord>, AuditError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM queries WHERE job_id = ?1"),
                params![job_id],
                RawRow::read,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    pub fn count(&self) -> Result<u64, AuditError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM queries", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn summary(&self) -> Result<AuditSummary, AuditError> {
        let conn = self.conn.lock();
        let (total, avg, ai): (i64, Option<f64>, i64) = conn.query_row(
            r#"
            SELECT COUNT(*),
                   AVG(processing_time_seconds),
                   COALESCE(SUM(CASE WHEN prediction = ?1 THEN 1 ELSE 0 END), 0)
            FROM queries
            "#,
            params![Label::Ai.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(AuditSummary {
            total_queries: total as u64,
            avg_processing_time_seconds: avg,
            ai_detections: ai as u64,
            human_detections: (total - ai) as u64,
        })
    }

    fn max_sequence_id(&self) -> Result<i64, AuditError> {
        let conn = self.conn.lock();
        let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM queries", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// One page of rows in `(timestamp, id)` descending order, strictly
    /// after `after` and no newer than `snapshot`.
    fn page_before(
        &self,
        snapshot: i64,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, Option<PageCursor>), AuditError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {COLUMNS}
            FROM queries
            WHERE id <= ?1
              AND (?2 IS NULL OR timestamp < ?2 OR (timestamp = ?2 AND id < ?3))
            ORDER BY timestamp DESC, id DESC
            LIMIT ?4
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                snapshot,
                after.map(|c| c.timestamp.as_str()),
                after.map_or(i64::MAX, |c| c.id),
                limit as i64
            ],
            RawRow::read,
        )?;
        let mut records = Vec::new();
        let mut last = None;
        for raw in rows {
            let raw = raw?;
            last = Some(PageCursor {
                timestamp: raw.timestamp.clone(),
                id: raw.id,
            });
            records.push(raw.into_record()?);
        }
        Ok((records, last))
    }

    /// Makes every later append fail, for exercising the audit-failure path.
    #[cfg(test)]
    pub(crate) fn break_storage(&self) {
        let _ = self.conn.lock().execute_batch("DROP TABLE queries;");
    }
}

/// Position of the last row handed out, as stored.
struct PageCursor {
    timestamp: String,
    id: i64,
}

const COLUMNS: &str =
    "id, job_id, timestamp, text, prediction, confidence, processing_time_seconds";

struct RawRow {
    id: i64,
    job_id: String,
    timestamp: String,
    text: String,
    prediction: String,
    confidence: f64,
    processing_time_seconds: f64,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_id: row.get(1)?,
            timestamp: row.get(2)?,
            text: row.get(3)?,
            prediction: row.get(4)?,
            confidence: row.get(5)?,
            processing_time_seconds: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<AuditRecord, AuditError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| AuditError::Corrupt(format!("row {}: {e}", self.id)))?
            .with_timezone(&Utc);
        let label = self
            .prediction
            .parse::<Label>()
            .map_err(|e| AuditError::Corrupt(format!("row {}: {e}", self.id)))?;
        Ok(AuditRecord {
            sequence_id: self.id,
            job_id: self.job_id,
            timestamp,
            input_text: self.text,
            label,
            confidence: self.confidence,
            latency_seconds: self.processing_time_seconds,
        })
    }
}

/// Lazy newest-first iterator over a snapshot of the log.
///
/// Records appended after the cursor was created are not yielded, so the
/// sequence is stable for the lifetime of the cursor. Call
/// [`AuditQuery::restart`] to walk the same snapshot again.
pub struct AuditQuery<'a> {
    log: &'a AuditLog,
    snapshot: i64,
    cursor: Option<PageCursor>,
    page_size: usize,
    buffer: VecDeque<AuditRecord>,
    exhausted: bool,
}

impl<'a> AuditQuery<'a> {
    fn new(log: &'a AuditLog, page_size: usize) -> Result<Self, AuditError> {
        let snapshot = log.max_sequence_id()?;
        Ok(Self {
            log,
            snapshot,
            cursor: None,
            page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Highest sequence id visible to this cursor.
    pub fn snapshot(&self) -> i64 {
        self.snapshot
    }
}

impl Iterator for AuditQuery<'_> {
    type Item = Result<AuditRecord, AuditError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .log
                .page_before(self.snapshot, self.cursor.as_ref(), self.page_size)
            {
                Ok((page, last)) => {
                    self.exhausted = page.len() < self.page_size;
                    if last.is_some() {
                        self.cursor = last;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
