//! Local storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::trace;

use super::traits::{Document, LocalRecord};
use crate::error::{Error, Result};

/// Trait for local storage backends.
///
/// Records are grouped by entity type and addressed either by local primary
/// key or by `cms_id`, which is unique within an entity type.
pub trait LocalStore: Send + Sync {
  /// Declare an entity type as a managed local schema.
  fn register(&self, entity_type: &str) -> Result<()>;

  fn is_registered(&self, entity_type: &str) -> Result<bool>;

  /// Get a record by local primary key.
  fn find(&self, entity_type: &str, id: i64) -> Result<Option<LocalRecord<Document>>>;

  /// Get the record reconciled from a given CMS id.
  fn find_by_cms_id(&self, entity_type: &str, cms_id: &str) -> Result<Option<LocalRecord<Document>>>;

  /// All records of an entity type, ordered by a data field when given and
  /// by primary key otherwise.
  fn list(&self, entity_type: &str, order_by: Option<&str>) -> Result<Vec<LocalRecord<Document>>>;

  /// Insert, or replace every field of the record with the same `cms_id`.
  fn upsert_by_cms_id(
    &self,
    entity_type: &str,
    cms_id: &str,
    data: &Document,
  ) -> Result<LocalRecord<Document>>;
}

/// SQLite-based local storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self.conn()?.execute_batch(SCHEMA)?;
    Ok(())
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Lock(e.to_string()))
  }
}

/// Schema for reconciled records.
const SCHEMA: &str = r#"
-- Entity types the host declared as local schemas
CREATE TABLE IF NOT EXISTS entity_types (
    entity_type TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL
);

-- One row per reconciled record, data stored as a JSON object
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    cms_id TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (entity_type, cms_id)
);

CREATE INDEX IF NOT EXISTS idx_records_entity_type ON records(entity_type, id);
"#;

const RECORD_COLUMNS: &str = "id, cms_id, data, created_at, updated_at";

impl LocalStore for SqliteStore {
  fn register(&self, entity_type: &str) -> Result<()> {
    self.conn()?.execute(
      "INSERT OR IGNORE INTO entity_types (entity_type, registered_at) VALUES (?, ?)",
      params![entity_type, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  fn is_registered(&self, entity_type: &str) -> Result<bool> {
    let found = self
      .conn()?
      .query_row(
        "SELECT 1 FROM entity_types WHERE entity_type = ?",
        params![entity_type],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn find(&self, entity_type: &str, id: i64) -> Result<Option<LocalRecord<Document>>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!(
          "SELECT {} FROM records WHERE entity_type = ? AND id = ?",
          RECORD_COLUMNS
        ),
        params![entity_type, id],
        RawRecord::from_row,
      )
      .optional()?;

    raw.map(RawRecord::into_record).transpose()
  }

  fn find_by_cms_id(&self, entity_type: &str, cms_id: &str) -> Result<Option<LocalRecord<Document>>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!(
          "SELECT {} FROM records WHERE entity_type = ? AND cms_id = ?",
          RECORD_COLUMNS
        ),
        params![entity_type, cms_id],
        RawRecord::from_row,
      )
      .optional()?;

    raw.map(RawRecord::into_record).transpose()
  }

  fn list(&self, entity_type: &str, order_by: Option<&str>) -> Result<Vec<LocalRecord<Document>>> {
    let conn = self.conn()?;

    let raws: Vec<RawRecord> = match order_by {
      Some(field) => {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM records WHERE entity_type = ?
           ORDER BY json_extract(data, ?), id",
          RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity_type, json_path(field)], RawRecord::from_row)?;
        let raws = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        raws
      }
      None => {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM records WHERE entity_type = ? ORDER BY id",
          RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity_type], RawRecord::from_row)?;
        let raws = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        raws
      }
    };

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  fn upsert_by_cms_id(
    &self,
    entity_type: &str,
    cms_id: &str,
    data: &Document,
  ) -> Result<LocalRecord<Document>> {
    let conn = self.conn()?;
    let json = serde_json::to_string(data)?;
    let now = Utc::now().to_rfc3339();

    let raw = conn.query_row(
      &format!(
        "INSERT INTO records (entity_type, cms_id, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (entity_type, cms_id)
         DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
         RETURNING {}",
        RECORD_COLUMNS
      ),
      params![entity_type, cms_id, json, now],
      RawRecord::from_row,
    )?;

    trace!(entity_type, cms_id, id = raw.id, "Upserted record");
    raw.into_record()
  }
}

/// SQLite JSON path for a top-level field.
fn json_path(field: &str) -> String {
  format!("$.\"{}\"", field.replace('"', "\\\""))
}

/// Row as stored, before JSON and timestamp decoding.
struct RawRecord {
  id: i64,
  cms_id: String,
  data: String,
  created_at: String,
  updated_at: String,
}

impl RawRecord {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get(0)?,
      cms_id: row.get(1)?,
      data: row.get(2)?,
      created_at: row.get(3)?,
      updated_at: row.get(4)?,
    })
  }

  fn into_record(self) -> Result<LocalRecord<Document>> {
    Ok(LocalRecord {
      id: self.id,
      cms_id: self.cms_id,
      data: serde_json::from_str(&self.data)?,
      created_at: parse_datetime(&self.created_at)?,
      updated_at: parse_datetime(&self.updated_at)?,
    })
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Corrupt(format!("Failed to parse datetime '{}': {}", s, e)))
}
