//! Session repository — the `fam_sessions` table.
//!
//! A session bounds one worker's activity against one action. Skip
//! retrieval compares session ids, and ending a session releases the
//! claims it still owns. `last_seen` is the session's liveness marker,
//! stamped at start and refreshed by every claim the session makes;
//! abandoned-session detection keys off it.

use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::status::WorkflowScope;

use super::{Database, DatabaseError};

/// A raw session row from the database.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub action_name: String,
    pub workflow_id: Option<i64>,
    pub all_workflows: bool,
    pub start_time: String,
    pub stop_time: Option<String>,
    pub last_seen: Option<String>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            action_name: row.get("action_name")?,
            workflow_id: row.get("workflow_id")?,
            all_workflows: row.get("all_workflows")?,
            start_time: row.get("start_time")?,
            stop_time: row.get("stop_time")?,
            last_seen: row.get("last_seen")?,
        })
    }

    /// A session is active until its stop time is stamped.
    pub fn is_active(&self) -> bool {
        self.stop_time.is_none()
    }

    /// The workflow scope this session registered against.
    pub fn scope(&self) -> WorkflowScope {
        match self.workflow_id {
            Some(id) if !self.all_workflows => WorkflowScope::Workflow(id),
            _ => WorkflowScope::All,
        }
    }
}

/// Opens a session for a worker registering against an action.
pub fn start(
    db: &Database,
    action_name: &str,
    scope: WorkflowScope,
) -> Result<i64, DatabaseError> {
    let (workflow_id, all_workflows) = match scope {
        WorkflowScope::All => (None, true),
        WorkflowScope::Workflow(id) => (Some(id), false),
    };
    db.with_conn(|conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO fam_sessions (action_name, workflow_id, all_workflows, start_time, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![action_name, workflow_id, all_workflows, now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Stamps the session's stop time, ending it.
pub fn stop(db: &Database, session_id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE fam_sessions SET stop_time = ?2 WHERE id = ?1 AND stop_time IS NULL",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}

/// Finds a session by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM fam_sessions WHERE id = ?1",
                params![id],
                SessionRow::from_row,
            )
            .optional()?)
    })
}

/// Ids of sessions that can be presumed dead: still marked active, not in
/// `exclude`, and with no liveness stamp newer than `idle_for` ago.
///
/// Claims refresh `last_seen`, so a worker that is still polling the queue
/// never qualifies, however long it has run. Timestamps are UTC RFC 3339
/// throughout, so plain string comparison orders them.
pub fn abandoned_ids(
    db: &Database,
    exclude: &[i64],
    idle_for: Duration,
) -> Result<Vec<i64>, DatabaseError> {
    let idle = match chrono::Duration::from_std(idle_for) {
        Ok(idle) => idle,
        Err(_) => return Ok(Vec::new()),
    };
    let Some(cutoff) = Utc::now().checked_sub_signed(idle) else {
        return Ok(Vec::new());
    };
    let cutoff = cutoff.to_rfc3339();

    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM fam_sessions
             WHERE stop_time IS NULL
               AND (last_seen IS NULL OR last_seen <= ?1)
             ORDER BY id",
        )?;
        let ids: Vec<i64> = stmt
            .query_map(params![cutoff], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().filter(|id| !exclude.contains(id)).collect())
    })
}
