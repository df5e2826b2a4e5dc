//! SQLite store. One connection per role: the gallery builder and the
//! recorder each open their own handle, and SQLite's writer lock plus
//! `busy_timeout` serializes concurrent writes to the attendance log.

use chrono::{DateTime, Utc};
use rollcall_core::gallery::{IdentityStore, LoadError};
use rollcall_core::recorder::{AttendanceEvent, AttendanceStore, RecordError};
use rollcall_core::types::{Identity, ImageData};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Enrollment sample extensions recognized by the directory scan.
const SAMPLE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    event_id    TEXT PRIMARY KEY,
    employee_id INTEGER NOT NULL REFERENCES employees(id),
    timestamp   TEXT NOT NULL,
    status      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_employee_time
    ON attendance(employee_id, timestamp);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt attendance row '{event_id}': {reason}")]
    Corrupt { event_id: String, reason: String },
}

/// Row counts and latest event, for the CLI status command.
#[derive(Debug, Clone)]
pub struct StoreCounts {
    pub employees: i64,
    pub events: i64,
    pub last_event: Option<DateTime<Utc>>,
}

/// SQLite-backed identity and attendance store.
///
/// The connection is scoped to this value: opened in `open`, released by
/// `Drop` on every exit path.
pub struct SqliteStore {
    conn: Connection,
    images_root: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and bind the
    /// enrollment image tree at `images_root`. `busy_timeout` bounds every
    /// write; a still-locked database after the timeout surfaces as
    /// [`RecordError::Timeout`] on the write path.
    pub fn open(
        db_path: &Path,
        images_root: &Path,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        tracing::info!(path = %db_path.display(), "attendance database opened");
        Self::init(conn, images_root, busy_timeout)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory(images_root: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, images_root, Duration::from_millis(100))
    }

    fn init(
        conn: Connection,
        images_root: &Path,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            images_root: images_root.to_path_buf(),
        })
    }

    pub fn add_employee(&self, name: &str) -> Result<Identity, StoreError> {
        self.conn
            .execute("INSERT INTO employees (name) VALUES (?1)", params![name])?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name, "employee enrolled");
        Ok(Identity {
            id,
            name: name.to_string(),
        })
    }

    /// Remove an employee and their attendance history. Returns false when
    /// no such employee exists.
    pub fn remove_employee(&self, id: i64) -> Result<bool, StoreError> {
        self.conn
            .execute("DELETE FROM attendance WHERE employee_id = ?1", params![id])?;
        let removed = self
            .conn
            .execute("DELETE FROM employees WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn list_employees(&self) -> Result<Vec<Identity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM employees ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Identity {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent events first, optionally filtered to one employee.
    pub fn recent_events(
        &self,
        limit: usize,
        employee: Option<i64>,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, employee_id, timestamp, status FROM attendance
             WHERE (?1 IS NULL OR employee_id = ?1)
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![employee, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (event_id, employee_id, timestamp, status) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| StoreError::Corrupt {
                    event_id: event_id.clone(),
                    reason: e.to_string(),
                })?
                .with_timezone(&Utc);
            events.push(AttendanceEvent {
                event_id,
                employee_id,
                timestamp,
                status,
            });
        }
        Ok(events)
    }

    pub fn counts(&self) -> Result<StoreCounts, StoreError> {
        let employees =
            self.conn
                .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
        let events =
            self.conn
                .query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        let last: Option<String> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM attendance", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        let last_event = last
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(StoreCounts {
            employees,
            events,
            last_event,
        })
    }

    /// Enrollment sample paths for one employee, sorted for a stable
    /// enrollment order. A missing directory is an empty sample set; the
    /// gallery excludes such identities and reports them.
    fn sample_paths(&self, employee_id: i64) -> Vec<PathBuf> {
        let dir = self.images_root.join(employee_id.to_string());
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SAMPLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        paths
    }
}

impl IdentityStore for SqliteStore {
    fn list_identities(&self) -> Result<Vec<(Identity, Vec<String>)>, LoadError> {
        let employees = self
            .list_employees()
            .map_err(|e| LoadError::Store(e.to_string()))?;

        Ok(employees
            .into_iter()
            .map(|identity| {
                let references = self
                    .sample_paths(identity.id)
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                (identity, references)
            })
            .collect())
    }

    fn load_image(&self, reference: &str) -> Result<ImageData, LoadError> {
        let decoded = image::open(reference)
            .map_err(|e| LoadError::Store(format!("image '{reference}': {e}")))?;
        let gray = decoded.to_luma8();
        Ok(ImageData {
            width: gray.width(),
            height: gray.height(),
            data: gray.into_raw(),
        })
    }
}

impl AttendanceStore for SqliteStore {
    fn insert(&self, event: &AttendanceEvent) -> Result<(), RecordError> {
        self.conn
            .execute(
                "INSERT INTO attendance (event_id, employee_id, timestamp, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.event_id,
                    event.employee_id,
                    event.timestamp.to_rfc3339(),
                    event.status
                ],
            )
            .map(|_| ())
            .map_err(record_error)
    }
}

/// Map SQLite failures onto the recorder's error taxonomy: a database that
/// stays locked past `busy_timeout` is a timeout, a constraint failure is
/// a rejection, anything else means the store is unavailable.
fn record_error(e: rusqlite::Error) -> RecordError {
    match &e {
        rusqlite::Error::SqliteFailure(err, message) => match err.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                RecordError::Timeout
            }
            rusqlite::ErrorCode::ConstraintViolation => {
                RecordError::Rejected(message.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => RecordError::Unavailable(e.to_string()),
        },
        _ => RecordError::Unavailable(e.to_string()),
    }
}
