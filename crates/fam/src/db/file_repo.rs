//! File repository — the `files` table.
//!
//! A file's identity is its path: re-adding an existing path returns the
//! existing id and leaves the stored row untouched.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::status::Priority;

use super::{Database, DatabaseError};

/// A raw file row from the database.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub path: String,
    pub priority: Priority,
    pub page_count: i64,
    pub added_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            priority: row.get("priority")?,
            page_count: row.get("page_count")?,
            added_at: row.get("added_at")?,
        })
    }
}

/// Inserts the file if its path is unknown, otherwise returns the existing
/// row. The boolean reports whether a new row was created.
pub fn get_or_create(
    db: &Database,
    path: &str,
    priority: Priority,
    page_count: i64,
) -> Result<(FileRow, bool), DatabaseError> {
    db.with_txn(|tx| {
        let existing = tx
            .query_row(
                "SELECT id, path, priority, page_count, added_at FROM files WHERE path = ?1",
                params![path],
                FileRow::from_row,
            )
            .optional()?;
        if let Some(row) = existing {
            return Ok((row, false));
        }

        tx.execute(
            "INSERT INTO files (path, priority, page_count, added_at) VALUES (?1, ?2, ?3, ?4)",
            params![path, priority, page_count, Utc::now().to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        let row = tx.query_row(
            "SELECT id, path, priority, page_count, added_at FROM files WHERE id = ?1",
            params![id],
            FileRow::from_row,
        )?;
        Ok((row, true))
    })
}

/// Finds a file by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT id, path, priority, page_count, added_at FROM files WHERE id = ?1",
                params![id],
                FileRow::from_row,
            )
            .optional()?)
    })
}

/// Finds a file by its path.
pub fn find_by_path(db: &Database, path: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT id, path, priority, page_count, added_at FROM files WHERE path = ?1",
                params![path],
                FileRow::from_row,
            )
            .optional()?)
    })
}

/// Updates a file's claim priority.
pub fn set_priority(db: &Database, id: i64, priority: Priority) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE files SET priority = ?2 WHERE id = ?1",
            params![id, priority],
        )?;
        Ok(())
    })
}
