//! Claim engine — atomically hands out batches of files to workers.
//!
//! A claim is the transition of a status row from Pending (or retrievable
//! Skipped) to Processing. The candidate scan and the grant run inside one
//! immediate transaction, so two concurrent claimants can never both grant
//! the same file: a file with *any* Processing row, in any workflow, is
//! excluded before ordering (the physical file is a shared resource even
//! though logical status is tracked per workflow-action independently).

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use crate::db::{Database, DatabaseError};
use crate::status::{Priority, QueueType, WorkflowScope};

/// A claimed file handed to a worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_id: i64,
    pub action_id: i64,
    pub path: String,
    pub priority: Priority,
    pub page_count: i64,
}

/// Queue discipline for a claim batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOrder {
    /// Priority descending, insertion order (file id) ascending within a
    /// priority.
    Priority,
    /// Uniform random over the eligible set, ignoring priority.
    Random,
}

/// Parameters of one claim batch.
#[derive(Debug)]
pub(crate) struct ClaimRequest<'a> {
    pub action_name: &'a str,
    pub max_files: usize,
    pub include_skipped: bool,
    pub scope: WorkflowScope,
    pub queue: &'a QueueType,
    pub order: ClaimOrder,
    /// The caller's active session: stamped onto granted rows and used to
    /// hide its own skips from skip retrieval.
    pub session_id: Option<i64>,
}

/// Claims up to `max_files` eligible files, transitioning them to
/// Processing, and returns them in grant order.
pub(crate) fn claim(
    db: &Database,
    request: &ClaimRequest<'_>,
) -> Result<Vec<FileRecord>, DatabaseError> {
    let mut conditions: Vec<String> = vec!["a.name = ?1".to_string()];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(request.action_name.to_string())];

    if let WorkflowScope::Workflow(workflow_id) = request.scope {
        conditions.push(format!("a.workflow_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(workflow_id));
    }

    // A skipped row is retrievable only by a session other than the one
    // that skipped it; administratively skipped rows (no session) are
    // always retrievable.
    let skip_visible = match request.session_id {
        Some(session_id) => {
            param_values.push(Box::new(session_id));
            format!(
                "(s.session_id IS NULL OR s.session_id <> ?{})",
                param_values.len()
            )
        }
        None => "1".to_string(),
    };

    match request.queue {
        QueueType::AnyUser => {
            if request.include_skipped {
                conditions.push(format!(
                    "(s.status = 'P' OR (s.status = 'S' AND {}))",
                    skip_visible
                ));
            } else {
                conditions.push("s.status = 'P'".to_string());
            }
        }
        QueueType::PendingForUser(user) => {
            conditions.push(format!("s.user_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(user.clone()));
            conditions.push("s.status = 'P'".to_string());
        }
        QueueType::SkippedForUser(user) => {
            conditions.push(format!("s.user_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(user.clone()));
            conditions.push(format!("(s.status = 'S' AND {})", skip_visible));
        }
        QueueType::PendingForUserOrUnassigned(user) => {
            conditions.push(format!(
                "(s.user_id = ?{} OR s.user_id IS NULL)",
                param_values.len() + 1
            ));
            param_values.push(Box::new(user.clone()));
            conditions.push("s.status = 'P'".to_string());
        }
    }

    // Cross-workflow mutual exclusion: no candidate whose file already has
    // a Processing row anywhere.
    conditions.push(
        "NOT EXISTS (SELECT 1 FROM file_action_status p
             WHERE p.file_id = s.file_id AND p.status = 'R')"
            .to_string(),
    );

    let order_clause = match request.order {
        ClaimOrder::Priority => "ORDER BY f.priority DESC, s.file_id ASC",
        ClaimOrder::Random => "ORDER BY RANDOM()",
    };

    // The same file may be queued under the action once per workflow
    // instance in scope; grouping collapses those rows to one candidate
    // (the lowest instance id), so the limit counts distinct files.
    param_values.push(Box::new(request.max_files as i64));
    let sql = format!(
        "SELECT s.file_id, MIN(s.action_id), f.path, f.priority, f.page_count
         FROM file_action_status s
         JOIN files f ON f.id = s.file_id
         JOIN actions a ON a.id = s.action_id
         WHERE {}
         GROUP BY s.file_id
         {} LIMIT ?{}",
        conditions.join(" AND "),
        order_clause,
        param_values.len()
    );

    db.with_txn(|tx| {
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = tx.prepare(&sql)?;
        let granted: Vec<FileRecord> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(FileRecord {
                    file_id: row.get(0)?,
                    action_id: row.get(1)?,
                    path: row.get(2)?,
                    priority: row.get(3)?,
                    page_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let now = Utc::now().to_rfc3339();
        if let Some(session_id) = request.session_id {
            // Liveness stamp: a claiming session is alive even when the
            // queue turns out to be empty.
            tx.execute(
                "UPDATE fam_sessions SET last_seen = ?2 WHERE id = ?1",
                params![session_id, now],
            )?;
        }

        for record in &granted {
            tx.execute(
                "UPDATE file_action_status
                 SET status = 'R', session_id = ?3, last_modified = ?4
                 WHERE file_id = ?1 AND action_id = ?2",
                params![record.file_id, record.action_id, request.session_id, now],
            )?;
        }

        if !granted.is_empty() {
            log::debug!(
                "Granted {} file(s) for action '{}'",
                granted.len(),
                request.action_name
            );
        }
        Ok(granted)
    })
}

/// Reverts claimed-but-unprocessed files back to Pending. Returns how many
/// rows were actually released (rows no longer Processing are untouched).
pub(crate) fn release(db: &Database, files: &[FileRecord]) -> Result<usize, DatabaseError> {
    if files.is_empty() {
        return Ok(0);
    }
    db.with_txn(|tx| {
        let now = Utc::now().to_rfc3339();
        let mut released = 0;
        for record in files {
            released += tx.execute(
                "UPDATE file_action_status
                 SET status = 'P', session_id = NULL, last_modified = ?3
                 WHERE file_id = ?1 AND action_id = ?2 AND status = 'R'",
                params![record.file_id, record.action_id, now],
            )?;
        }
        Ok(released)
    })
}
