//! Action repository — the `actions` table.
//!
//! The same action *name* may exist as several distinct instances: one per
//! workflow that enables it, plus at most one global (workflow-less)
//! instance. Status rows are keyed by instance id, never by name, so each
//! workflow's tracking stays independent.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw action-instance row from the database.
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub id: i64,
    pub name: String,
    pub workflow_id: Option<i64>,
}

impl ActionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            workflow_id: row.get("workflow_id")?,
        })
    }
}

/// Finds the action instance for a name within a workflow (or the global
/// instance when `workflow_id` is `None`).
pub fn find(
    db: &Database,
    name: &str,
    workflow_id: Option<i64>,
) -> Result<Option<ActionRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT id, name, workflow_id FROM actions
                 WHERE name = ?1 AND workflow_id IS ?2",
                params![name, workflow_id],
                ActionRow::from_row,
            )
            .optional()?)
    })
}

/// Finds an action instance by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ActionRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT id, name, workflow_id FROM actions WHERE id = ?1",
                params![id],
                ActionRow::from_row,
            )
            .optional()?)
    })
}

/// Creates the instance if missing and returns its id. The unique index on
/// `(name, COALESCE(workflow_id, 0))` makes the insert race-free.
pub fn get_or_create(
    db: &Database,
    name: &str,
    workflow_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    db.with_txn(|tx| {
        tx.execute(
            "INSERT OR IGNORE INTO actions (name, workflow_id) VALUES (?1, ?2)",
            params![name, workflow_id],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM actions WHERE name = ?1 AND workflow_id IS ?2",
            params![name, workflow_id],
            |r| r.get(0),
        )?;
        Ok(id)
    })
}

/// All instances sharing an action name, global instance included, in
/// creation order.
pub fn instances_by_name(db: &Database, name: &str) -> Result<Vec<ActionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, name, workflow_id FROM actions WHERE name = ?1 ORDER BY id")?;
        let rows: Vec<ActionRow> = stmt
            .query_map(params![name], ActionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
