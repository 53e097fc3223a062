//! SQLite primary store
//!
//! One row per record. `position` preserves the aggregate's order within
//! each pin partition; rows are read back with
//! `ORDER BY pinned DESC, position ASC`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::HistoryStore;
use crate::clipboard_history::hashing::ContentDigest;
use crate::clipboard_history::types::{ClipboardRecord, RecordId};
use crate::error::StoreError;

const SELECT_COLUMNS: &str = "id, preview_text, full_text, rich_text_path, html_path, \
     image_path, image_hash, timestamp, pinned, sensitive";

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating its parent directory.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        // Wait on lock contention instead of failing immediately
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!(path = %path.display(), "Opened clipboard history database");

        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                preview_text TEXT NOT NULL,
                full_text TEXT,
                timestamp INTEGER NOT NULL,
                pinned INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        add_column_if_missing(&self.conn, "rich_text_path", "TEXT")?;
        add_column_if_missing(&self.conn, "html_path", "TEXT")?;
        add_column_if_missing(&self.conn, "image_path", "TEXT")?;
        add_column_if_missing(&self.conn, "image_hash", "TEXT")?;
        add_column_if_missing(&self.conn, "sensitive", "INTEGER NOT NULL DEFAULT 0")?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_order ON history(pinned DESC, position ASC)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_image_hash ON history(image_hash)",
            [],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

fn add_column_if_missing(conn: &Connection, column: &str, decl: &str) -> Result<(), StoreError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('history') WHERE name = ?1",
            params![column],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)?;

    if !exists {
        conn.execute(
            &format!("ALTER TABLE history ADD COLUMN {} {}", column, decl),
            [],
        )?;
        info!(column, "Migrated clipboard history: added column");
    }
    Ok(())
}

fn path_to_sql(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

fn insert_row(conn: &Connection, record: &ClipboardRecord, position: i64) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO history (id, preview_text, full_text, rich_text_path, html_path, image_path,
             image_hash, timestamp, pinned, sensitive, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id.to_string(),
            record.preview_text,
            record.full_text,
            path_to_sql(&record.rich_text_path),
            path_to_sql(&record.html_path),
            path_to_sql(&record.image_path),
            record.image_hash.as_ref().map(|h| h.as_str()),
            record.timestamp,
            record.is_pinned as i64,
            record.is_sensitive as i64,
            position,
        ],
    )?;
    Ok(())
}

/// Map a row to a record. Rows with an unparseable id are skipped.
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Option<ClipboardRecord>> {
    let id: String = row.get(0)?;
    let Some(id) = RecordId::parse(&id) else {
        warn!(id = %id, "Skipping history row with invalid id");
        return Ok(None);
    };
    let image_hash: Option<String> = row.get(6)?;

    Ok(Some(ClipboardRecord {
        id,
        preview_text: row.get(1)?,
        full_text: row.get(2)?,
        rich_text_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        html_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
        image_path: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
        image_hash: image_hash.as_deref().and_then(ContentDigest::from_hex),
        timestamp: row.get(7)?,
        is_pinned: row.get::<_, i64>(8)? != 0,
        is_sensitive: row.get::<_, i64>(9)? != 0,
    }))
}

impl HistoryStore for SqliteStore {
    fn persist_all(&mut self, records: &[ClipboardRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM history", [])?;
        for (position, record) in records.iter().enumerate() {
            insert_row(&tx, record, position as i64)?;
        }
        tx.commit()?;
        debug!(count = records.len(), "Persisted full clipboard history");
        Ok(())
    }

    fn persist_one(&mut self, record: &ClipboardRecord) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let id = record.id.to_string();
        let existing: Option<i64> = tx
            .query_row(
                "SELECT position FROM history WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(_) => {
                tx.execute(
                    "UPDATE history SET preview_text = ?2, full_text = ?3, rich_text_path = ?4,
                         html_path = ?5, image_path = ?6, image_hash = ?7, timestamp = ?8,
                         pinned = ?9, sensitive = ?10
                     WHERE id = ?1",
                    params![
                        id,
                        record.preview_text,
                        record.full_text,
                        path_to_sql(&record.rich_text_path),
                        path_to_sql(&record.html_path),
                        path_to_sql(&record.image_path),
                        record.image_hash.as_ref().map(|h| h.as_str()),
                        record.timestamp,
                        record.is_pinned as i64,
                        record.is_sensitive as i64,
                    ],
                )?;
            }
            None => {
                let front: i64 = tx.query_row(
                    "SELECT COALESCE(MIN(position), 0) FROM history WHERE pinned = ?1",
                    params![record.is_pinned as i64],
                    |row| row.get(0),
                )?;
                insert_row(&tx, record, front - 1)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<ClipboardRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM history ORDER BY pinned DESC, position ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = row? {
                records.push(record);
            }
        }
        debug!(count = records.len(), "Loaded clipboard history from database");
        Ok(records)
    }

    fn prune_oldest(&mut self, keep: usize) -> Result<(), StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM history WHERE pinned = 0 AND id NOT IN (
                SELECT id FROM history WHERE pinned = 0 ORDER BY position ASC LIMIT ?1
            )",
            params![keep as i64],
        )?;
        if removed > 0 {
            info!(removed, keep, "Pruned oldest clipboard history rows");
        }
        Ok(())
    }

    fn delete_records(&mut self, ids: &[RecordId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM history WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
