// ABOUTME: SQLite-backed durable store for pending artifact deliveries and persisted settings.
// ABOUTME: Provides append with path dedup, capture-ordered listing, and idempotent delete.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use parcel_core::{ArtifactId, ArtifactRecord, ArtifactType, NewArtifact};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Keys of the values kept in the settings table.
pub mod settings {
    pub const BOT_TOKEN: &str = "bot_token";
    pub const DEVICE_LABEL: &str = "device_label";
}

/// Errors that can occur during queue store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of an append: either a fresh row or the id of the pending row
/// that already holds the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Inserted(ArtifactId),
    Duplicate(ArtifactId),
}

impl Appended {
    pub fn id(&self) -> ArtifactId {
        match self {
            Appended::Inserted(id) | Appended::Duplicate(id) => *id,
        }
    }
}

/// Raw column values of one artifacts row, before conversion into a record.
struct ArtifactRow {
    id: i64,
    local_path: Option<Vec<u8>>,
    payload_text: Option<String>,
    destination: String,
    artifact_type: String,
    captured_at: i64,
    enqueued_at: i64,
}

impl ArtifactRow {
    fn into_record(self) -> Option<ArtifactRecord> {
        let artifact_type = match self.artifact_type.parse::<ArtifactType>() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(artifact_id = self.id, error = %e, "skipping row with unknown type");
                return None;
            }
        };
        let captured_at = DateTime::<Utc>::from_timestamp_millis(self.captured_at)?;
        let enqueued_at = DateTime::<Utc>::from_timestamp_millis(self.enqueued_at)?;
        let local_path = match self.local_path {
            None => None,
            Some(bytes) => match path_from_bytes(bytes) {
                Some(path) => Some(path),
                None => {
                    tracing::warn!(artifact_id = self.id, "skipping row with unreadable path");
                    return None;
                }
            },
        };

        Some(ArtifactRecord {
            id: ArtifactId(self.id),
            local_path,
            payload_text: self.payload_text,
            destination: self.destination,
            artifact_type,
            captured_at,
            enqueued_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, local_path, payload_text, destination, artifact_type, captured_at, enqueued_at FROM artifacts";

/// Paths are stored as their raw OS bytes so that names which are not
/// valid UTF-8 keep their identity.
fn path_bytes(path: &Path) -> Vec<u8> {
    path.as_os_str().as_encoded_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactRow> {
    let local_path = match row.get_ref(1)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(bytes.to_vec()),
        _ => None,
    };
    Ok(ArtifactRow {
        id: row.get(0)?,
        local_path,
        payload_text: row.get(2)?,
        destination: row.get(3)?,
        artifact_type: row.get(4)?,
        captured_at: row.get(5)?,
        enqueued_at: row.get(6)?,
    })
}

/// The durable queue of pending deliveries. Every row is a record that
/// has not been delivered yet; delivered or dropped records are deleted.
///
/// All access goes through one connection behind a mutex, so appends
/// and deletes from concurrent callers are serialised.
pub struct QueueStore {
    conn: Mutex<Connection>,
}

impl QueueStore {
    /// Open or create a queue database at the given path.
    /// Creates the parent directory and runs migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        Self::migrate(conn)
    }

    /// Open a throwaway in-memory store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::migrate(Connection::open_in_memory()?)
    }

    fn migrate(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                local_path BLOB UNIQUE,
                payload_text TEXT,
                destination TEXT NOT NULL,
                artifact_type TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                enqueued_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS artifacts_by_capture
                ON artifacts (captured_at, id);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic; a poisoned lock still guards a consistent connection.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Durably insert a new artifact. If another pending row already
    /// holds the same path, nothing is written and its id is returned.
    pub fn append(&self, artifact: &NewArtifact) -> Result<Appended, StoreError> {
        self.append_at(artifact, Utc::now())
    }

    /// Same as [`append`](Self::append) with an explicit enqueue time.
    pub fn append_at(
        &self,
        artifact: &NewArtifact,
        enqueued_at: DateTime<Utc>,
    ) -> Result<Appended, StoreError> {
        let conn = self.conn();
        let local_path = artifact.local_path.as_deref().map(path_bytes);

        let inserted = conn.execute(
            "INSERT INTO artifacts (local_path, payload_text, destination, artifact_type, captured_at, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(local_path) DO NOTHING",
            params![
                local_path,
                artifact.payload_text,
                artifact.destination,
                artifact.artifact_type.as_str(),
                artifact.captured_at.timestamp_millis(),
                enqueued_at.timestamp_millis(),
            ],
        )?;

        if inserted == 1 {
            return Ok(Appended::Inserted(ArtifactId(conn.last_insert_rowid())));
        }

        let existing: i64 = conn.query_row(
            "SELECT id FROM artifacts WHERE local_path = ?1",
            params![local_path],
            |row| row.get(0),
        )?;
        Ok(Appended::Duplicate(ArtifactId(existing)))
    }

    /// All pending records, oldest capture first. Ties keep insertion order.
    pub fn list_all(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY captured_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map([], read_row)?;

        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = row?.into_record() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete a record. Deleting an id that does not exist is a no-op;
    /// the return value says whether a row was actually removed.
    pub fn delete_by_id(&self, id: ArtifactId) -> Result<bool, StoreError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM artifacts WHERE id = ?1", params![id.0])?;
        Ok(deleted > 0)
    }

    /// Number of records still waiting for delivery.
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Read a persisted setting.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Persist a setting, replacing any previous value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
