//! Status repository — the `file_action_status` table.
//!
//! The sole unit of mutable pipeline state. At most one row exists per
//! `(file, action-instance)` pair; a missing row means unattempted.
//!
//! The `*_if_processing` functions are compare-and-swap primitives for the
//! worker-driven Notify transitions: they return the observed previous
//! status and only write when it was Processing, leaving validation (and
//! `InvalidTransition` surfacing) to the engine.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::status::ActionStatus;

use super::{Database, DatabaseError};

/// A raw status row from the database.
#[derive(Debug, Clone)]
pub struct StatusRow {
    pub file_id: i64,
    pub action_id: i64,
    pub status: ActionStatus,
    pub user_id: Option<String>,
    pub failure: Option<String>,
    pub session_id: Option<i64>,
    pub last_modified: String,
}

impl StatusRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            file_id: row.get("file_id")?,
            action_id: row.get("action_id")?,
            status: row.get("status")?,
            user_id: row.get("user_id")?,
            failure: row.get("failure")?,
            session_id: row.get("session_id")?,
            last_modified: row.get("last_modified")?,
        })
    }
}

/// Fetches the status row for a `(file, action)` pair.
pub fn get(
    db: &Database,
    file_id: i64,
    action_id: i64,
) -> Result<Option<StatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT file_id, action_id, status, user_id, failure, session_id, last_modified
                 FROM file_action_status WHERE file_id = ?1 AND action_id = ?2",
                params![file_id, action_id],
                StatusRow::from_row,
            )
            .optional()?)
    })
}

/// The current status only, usable inside a transaction.
pub(crate) fn current_status(
    tx: &Transaction,
    file_id: i64,
    action_id: i64,
) -> Result<Option<ActionStatus>, DatabaseError> {
    Ok(tx
        .query_row(
            "SELECT status FROM file_action_status WHERE file_id = ?1 AND action_id = ?2",
            params![file_id, action_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Sets the status unconditionally, returning the previous status.
///
/// Used by queue requests and administrative overrides: clears failure
/// detail and session ownership, preserves the assigned user.
pub fn set_status(
    db: &Database,
    file_id: i64,
    action_id: i64,
    status: ActionStatus,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        tx.execute(
            "INSERT INTO file_action_status (file_id, action_id, status, user_id, failure, session_id, last_modified)
             VALUES (?1, ?2, ?3, NULL, NULL, NULL, ?4)
             ON CONFLICT(file_id, action_id) DO UPDATE SET
               status = ?3, failure = NULL, session_id = NULL, last_modified = ?4",
            params![file_id, action_id, status, Utc::now().to_rfc3339()],
        )?;
        Ok(previous)
    })
}

/// Sets the status and the owning user, returning the previous status.
pub fn set_status_for_user(
    db: &Database,
    file_id: i64,
    action_id: i64,
    status: ActionStatus,
    user_id: Option<&str>,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        tx.execute(
            "INSERT INTO file_action_status (file_id, action_id, status, user_id, failure, session_id, last_modified)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5)
             ON CONFLICT(file_id, action_id) DO UPDATE SET
               status = ?3, user_id = ?4, failure = NULL, session_id = NULL, last_modified = ?5",
            params![file_id, action_id, status, user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(previous)
    })
}

/// Deletes the status row (a write of Unattempted), returning the previous
/// status. The file itself is never deleted.
pub fn clear_status(
    db: &Database,
    file_id: i64,
    action_id: i64,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        tx.execute(
            "DELETE FROM file_action_status WHERE file_id = ?1 AND action_id = ?2",
            params![file_id, action_id],
        )?;
        Ok(previous)
    })
}

/// Processing → Completed under the current user. Writes only when the
/// observed previous status (returned) was Processing.
pub fn complete_if_processing(
    db: &Database,
    file_id: i64,
    action_id: i64,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        if previous == Some(ActionStatus::Processing) {
            tx.execute(
                "UPDATE file_action_status
                 SET status = ?3, failure = NULL, session_id = NULL, last_modified = ?4
                 WHERE file_id = ?1 AND action_id = ?2",
                params![
                    file_id,
                    action_id,
                    ActionStatus::Completed,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(previous)
    })
}

/// Processing → Failed, recording the failure detail.
pub fn fail_if_processing(
    db: &Database,
    file_id: i64,
    action_id: i64,
    failure: &str,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        if previous == Some(ActionStatus::Processing) {
            tx.execute(
                "UPDATE file_action_status
                 SET status = ?3, failure = ?4, session_id = NULL, last_modified = ?5
                 WHERE file_id = ?1 AND action_id = ?2",
                params![
                    file_id,
                    action_id,
                    ActionStatus::Failed,
                    failure,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(previous)
    })
}

/// Processing → Skipped, stamped with the session that skipped it. Skip
/// retrieval excludes rows whose stamp matches the caller's own session.
pub fn skip_if_processing(
    db: &Database,
    file_id: i64,
    action_id: i64,
    session_id: Option<i64>,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        if previous == Some(ActionStatus::Processing) {
            tx.execute(
                "UPDATE file_action_status
                 SET status = ?3, failure = NULL, session_id = ?4, last_modified = ?5
                 WHERE file_id = ?1 AND action_id = ?2",
                params![
                    file_id,
                    action_id,
                    ActionStatus::Skipped,
                    session_id,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(previous)
    })
}

/// Processing → Pending under a new owner (a completion override).
pub fn requeue_if_processing(
    db: &Database,
    file_id: i64,
    action_id: i64,
    user_id: Option<&str>,
) -> Result<Option<ActionStatus>, DatabaseError> {
    db.with_txn(|tx| {
        let previous = current_status(tx, file_id, action_id)?;
        if previous == Some(ActionStatus::Processing) {
            tx.execute(
                "UPDATE file_action_status
                 SET status = ?3, user_id = ?4, failure = NULL, session_id = NULL,
                     last_modified = ?5
                 WHERE file_id = ?1 AND action_id = ?2",
                params![
                    file_id,
                    action_id,
                    ActionStatus::Pending,
                    user_id,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(previous)
    })
}

/// Reverts every Processing row claimed by a session back to Pending.
/// Returns the number of rows released.
pub fn release_processing_for_session(
    db: &Database,
    session_id: i64,
) -> Result<usize, DatabaseError> {
    db.with_txn(|tx| {
        let released = tx.execute(
            "UPDATE file_action_status
             SET status = ?2, session_id = NULL, last_modified = ?3
             WHERE session_id = ?1 AND status = ?4",
            params![
                session_id,
                ActionStatus::Pending,
                Utc::now().to_rfc3339(),
                ActionStatus::Processing
            ],
        )?;
        Ok(released)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{action_repo, file_repo};
    use crate::status::Priority;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn fixture(db: &Database) -> (i64, i64) {
        let (file, _) = file_repo::get_or_create(db, "/docs/a.tif", Priority::Normal, 1).unwrap();
        let action = action_repo::get_or_create(db, "Index", None).unwrap();
        (file.id, action)
    }

    #[test]
    fn test_set_status_reports_previous() {
        let db = test_db();
        let (file, action) = fixture(&db);

        let prev = set_status(&db, file, action, ActionStatus::Pending).unwrap();
        assert_eq!(prev, None);

        let prev = set_status(&db, file, action, ActionStatus::Completed).unwrap();
        assert_eq!(prev, Some(ActionStatus::Pending));

        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Completed);
    }

    #[test]
    fn test_set_status_preserves_user() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status_for_user(&db, file, action, ActionStatus::Pending, Some("alice")).unwrap();
        set_status(&db, file, action, ActionStatus::Completed).unwrap();

        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_clear_status_deletes_row() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status(&db, file, action, ActionStatus::Pending).unwrap();
        let prev = clear_status(&db, file, action).unwrap();
        assert_eq!(prev, Some(ActionStatus::Pending));
        assert!(get(&db, file, action).unwrap().is_none());

        // The file row survives.
        assert!(file_repo::find_by_id(&db, file).unwrap().is_some());
    }

    #[test]
    fn test_complete_requires_processing() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status(&db, file, action, ActionStatus::Pending).unwrap();
        let prev = complete_if_processing(&db, file, action).unwrap();
        assert_eq!(prev, Some(ActionStatus::Pending));
        // No write happened.
        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Pending);

        set_status(&db, file, action, ActionStatus::Processing).unwrap();
        let prev = complete_if_processing(&db, file, action).unwrap();
        assert_eq!(prev, Some(ActionStatus::Processing));
        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Completed);
    }

    #[test]
    fn test_fail_records_detail() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status(&db, file, action, ActionStatus::Processing).unwrap();
        fail_if_processing(&db, file, action, "{\"message\":\"boom\"}").unwrap();

        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Failed);
        assert!(row.failure.unwrap().contains("boom"));
    }

    #[test]
    fn test_skip_stamps_session() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status(&db, file, action, ActionStatus::Processing).unwrap();
        skip_if_processing(&db, file, action, Some(7)).unwrap();

        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Skipped);
        assert_eq!(row.session_id, Some(7));
    }

    #[test]
    fn test_requeue_changes_owner() {
        let db = test_db();
        let (file, action) = fixture(&db);

        set_status_for_user(&db, file, action, ActionStatus::Processing, Some("alice")).unwrap();
        requeue_if_processing(&db, file, action, Some("bob")).unwrap();

        let row = get(&db, file, action).unwrap().unwrap();
        assert_eq!(row.status, ActionStatus::Pending);
        assert_eq!(row.user_id.as_deref(), Some("bob"));
    }

    #[test]
    fn test_release_for_session() {
        let db = test_db();
        let (file_a, action) = fixture(&db);
        let (file_b, _) = file_repo::get_or_create(&db, "/docs/b.tif", Priority::Normal, 1)
            .map(|(f, c)| (f.id, c))
            .unwrap();

        // Two rows claimed under session 3, one under session 4.
        for file in [file_a, file_b] {
            set_status(&db, file, action, ActionStatus::Processing).unwrap();
        }
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE file_action_status SET session_id = 3 WHERE file_id = ?1",
                params![file_a],
            )?;
            conn.execute(
                "UPDATE file_action_status SET session_id = 4 WHERE file_id = ?1",
                params![file_b],
            )?;
            Ok(())
        })
        .unwrap();

        let released = release_processing_for_session(&db, 3).unwrap();
        assert_eq!(released, 1);

        assert_eq!(
            get(&db, file_a, action).unwrap().unwrap().status,
            ActionStatus::Pending
        );
        assert_eq!(
            get(&db, file_b, action).unwrap().unwrap().status,
            ActionStatus::Processing
        );
    }
}
