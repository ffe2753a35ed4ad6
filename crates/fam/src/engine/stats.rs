//! Stats aggregator — per-action and cross-workflow counts from current
//! status rows.

use rusqlite::params;
use serde::Serialize;

use crate::db::{action_repo, Database, DatabaseError};
use crate::status::ActionStatus;

/// Document and page counts for one action instance.
///
/// `num_documents` counts status rows, so unattempted files (which have no
/// row) are excluded by convention. Page counts mirror the document counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStats {
    pub num_documents: i64,
    pub num_pending: i64,
    pub num_processing: i64,
    pub num_skipped: i64,
    pub num_completed: i64,
    pub num_failed: i64,
    pub num_pages: i64,
    pub num_pages_pending: i64,
    pub num_pages_processing: i64,
    pub num_pages_skipped: i64,
    pub num_pages_completed: i64,
    pub num_pages_failed: i64,
}

impl ActionStats {
    /// Element-wise sum, used when aggregating instances across workflows.
    pub fn add(&mut self, other: &ActionStats) {
        self.num_documents += other.num_documents;
        self.num_pending += other.num_pending;
        self.num_processing += other.num_processing;
        self.num_skipped += other.num_skipped;
        self.num_completed += other.num_completed;
        self.num_failed += other.num_failed;
        self.num_pages += other.num_pages;
        self.num_pages_pending += other.num_pages_pending;
        self.num_pages_processing += other.num_pages_processing;
        self.num_pages_skipped += other.num_pages_skipped;
        self.num_pages_completed += other.num_pages_completed;
        self.num_pages_failed += other.num_pages_failed;
    }
}

/// Counts status rows (and their files' pages) for a single action
/// instance.
pub fn get_stats(db: &Database, action_id: i64) -> Result<ActionStats, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT s.status, COUNT(*), COALESCE(SUM(f.page_count), 0)
             FROM file_action_status s
             JOIN files f ON f.id = s.file_id
             WHERE s.action_id = ?1
             GROUP BY s.status",
        )?;
        let rows = stmt.query_map(params![action_id], |row| {
            Ok((
                row.get::<_, ActionStatus>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut stats = ActionStats::default();
        for row in rows {
            let (status, documents, pages) = row?;
            stats.num_documents += documents;
            stats.num_pages += pages;
            match status {
                ActionStatus::Pending => {
                    stats.num_pending = documents;
                    stats.num_pages_pending = pages;
                }
                ActionStatus::Processing => {
                    stats.num_processing = documents;
                    stats.num_pages_processing = pages;
                }
                ActionStatus::Skipped => {
                    stats.num_skipped = documents;
                    stats.num_pages_skipped = pages;
                }
                ActionStatus::Completed => {
                    stats.num_completed = documents;
                    stats.num_pages_completed = pages;
                }
                ActionStatus::Failed => {
                    stats.num_failed = documents;
                    stats.num_pages_failed = pages;
                }
            }
        }
        Ok(stats)
    })
}

/// Sums [`get_stats`] over every instance sharing the action name, global
/// instance included.
///
/// A file queued under the same action name in two workflows is counted
/// once per instance — reported as two documents, not one. That
/// double-counting is intentional: each workflow's pipeline owes the file
/// a pass of its own.
pub fn get_stats_all_workflows(
    db: &Database,
    action_name: &str,
) -> Result<ActionStats, DatabaseError> {
    let mut total = ActionStats::default();
    for instance in action_repo::instances_by_name(db, action_name)? {
        total.add(&get_stats(db, instance.id)?);
    }
    Ok(total)
}

/// Counts distinct files visible in the given workflow context.
///
/// With a workflow selected, only files having at least one status row
/// under that workflow's actions count; with none selected, the union
/// across all workflows and the global scope (a file present in two
/// workflows counts once).
pub fn get_file_count(db: &Database, workflow_id: Option<i64>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let count = match workflow_id {
            Some(workflow) => conn.query_row(
                "SELECT COUNT(DISTINCT s.file_id)
                 FROM file_action_status s
                 JOIN actions a ON a.id = s.action_id
                 WHERE a.workflow_id = ?1",
                params![workflow],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(DISTINCT file_id) FROM file_action_status",
                [],
                |r| r.get(0),
            )?,
        };
        Ok(count)
    })
}
