//! EchoText persistence store
//!
//! Single-table SQLite record of finished transcriptions.

pub mod migrations;

use chrono::{DateTime, NaiveDateTime, Utc};
use echotext_common::{EchoTextError, Result};
use echotext_stt::Segment;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Sorts lexicographically in the same order as SQLite's CURRENT_TIMESTAMP
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const SELECT_COLUMNS: &str =
    "SELECT id, filename, transcript, audio_path, segments, created_at FROM transcriptions";

/// Persisted transcription job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub id: i64,

    /// Original upload name, display only
    pub filename: String,

    pub transcript: String,

    /// URL of the permanent audio copy
    pub audio_path: Option<String>,

    pub segments: Option<Vec<Segment>>,

    pub created_at: DateTime<Utc>,
}

/// Store that owns the SQLite connection
pub struct TranscriptionStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl TranscriptionStore {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EchoTextError::storage(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(db_path).map_err(storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        store.initialize()?;

        info!("Database initialized at: {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Ensure the table exists and has every current column. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        migrations::run_migrations(&conn).map_err(storage_error)
    }

    /// Insert a finished transcription and return its id
    pub fn create(
        &self,
        filename: &str,
        transcript: &str,
        audio_path: Option<&str>,
        segments: Option<&[Segment]>,
    ) -> Result<i64> {
        let segments_json = segments.map(serde_json::to_string).transpose()?;
        let created_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transcriptions (filename, transcript, audio_path, segments, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![filename, transcript, audio_path, segments_json, created_at],
        )
        .map_err(storage_error)?;

        let id = conn.last_insert_rowid();
        debug!("Created transcription record {} for {}", id, filename);
        Ok(id)
    }

    /// All records, newest first
    pub fn list_all(&self) -> Result<Vec<TranscriptionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS))
            .map_err(storage_error)?;

        let rows = stmt
            .query_map([], RawRow::from_row)
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)?;

        rows.into_iter().map(RawRow::into_record).collect()
    }

    /// Single record by id
    pub fn get(&self, id: i64) -> Result<Option<TranscriptionRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                RawRow::from_row,
            )
            .optional()
            .map_err(storage_error)?;

        row.map(RawRow::into_record).transpose()
    }

    /// Remove a record; absent ids are not an error
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM transcriptions WHERE id = ?1", params![id])
            .map_err(storage_error)?;
        debug!("Delete transcription {}: {} row(s) removed", id, removed);
        Ok(())
    }

    /// Database file, if not in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EchoTextError::storage(format!("Failed to lock database connection: {}", e)))
    }
}

fn storage_error(e: rusqlite::Error) -> EchoTextError {
    EchoTextError::storage(e.to_string())
}

/// Row as stored, before decoding
struct RawRow {
    id: i64,
    filename: String,
    transcript: String,
    audio_path: Option<String>,
    segments: Option<String>,
    created_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            transcript: row.get(2)?,
            audio_path: row.get(3)?,
            segments: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<TranscriptionRecord> {
        let segments = match self.segments.as_deref() {
            None | Some("") => None,
            Some(json) => Some(serde_json::from_str::<Vec<Segment>>(json).map_err(|e| {
                EchoTextError::storage(format!("Corrupt segments for record {}: {}", self.id, e))
            })?),
        };

        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                EchoTextError::storage(format!(
                    "Corrupt created_at for record {}: {:?}",
                    self.id, self.created_at
                ))
            })?;

        Ok(TranscriptionRecord {
            id: self.id,
            filename: self.filename,
            transcript: self.transcript,
            audio_path: self.audio_path,
            segments,
            created_at,
        })
    }
}

/// Accepts both our own format and SQLite's CURRENT_TIMESTAMP
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}
