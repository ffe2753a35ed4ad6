//! Workflow repository — the `workflows` table and its enabled-action
//! whitelist.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A workflow definition to insert.
#[derive(Debug, Clone, Default)]
pub struct NewWorkflow {
    pub name: String,
    pub enabled_actions: Vec<String>,
    pub start_action: Option<String>,
    pub end_action: Option<String>,
    pub post_workflow_action: Option<String>,
    pub document_folder: Option<String>,
    pub output_attribute_set: Option<String>,
}

impl NewWorkflow {
    /// A workflow with just a name and action whitelist, which is all most
    /// callers need.
    pub fn named(name: &str, enabled_actions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            enabled_actions: enabled_actions.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// A raw workflow row from the database.
#[derive(Debug, Clone)]
pub struct WorkflowRow {
    pub id: i64,
    pub name: String,
    pub start_action: Option<String>,
    pub end_action: Option<String>,
    pub post_workflow_action: Option<String>,
    pub document_folder: Option<String>,
    pub output_attribute_set: Option<String>,
}

impl WorkflowRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            start_action: row.get("start_action")?,
            end_action: row.get("end_action")?,
            post_workflow_action: row.get("post_workflow_action")?,
            document_folder: row.get("document_folder")?,
            output_attribute_set: row.get("output_attribute_set")?,
        })
    }
}

/// Inserts a workflow and its enabled-action whitelist.
pub fn create(db: &Database, workflow: &NewWorkflow) -> Result<i64, DatabaseError> {
    db.with_txn(|tx| {
        tx.execute(
            "INSERT INTO workflows (name, start_action, end_action, post_workflow_action,
             document_folder, output_attribute_set)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                workflow.name,
                workflow.start_action,
                workflow.end_action,
                workflow.post_workflow_action,
                workflow.document_folder,
                workflow.output_attribute_set,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for action in &workflow.enabled_actions {
            tx.execute(
                "INSERT OR IGNORE INTO workflow_enabled_actions (workflow_id, action_name)
                 VALUES (?1, ?2)",
                params![id, action],
            )?;
        }
        Ok(id)
    })
}

/// Finds a workflow by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<WorkflowRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM workflows WHERE id = ?1",
                params![id],
                WorkflowRow::from_row,
            )
            .optional()?)
    })
}

/// Finds a workflow by its name.
pub fn find_by_name(db: &Database, name: &str) -> Result<Option<WorkflowRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM workflows WHERE name = ?1",
                params![name],
                WorkflowRow::from_row,
            )
            .optional()?)
    })
}

/// Whether the action name is on the workflow's whitelist.
pub fn is_action_enabled(
    db: &Database,
    workflow_id: i64,
    action_name: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM workflow_enabled_actions
             WHERE workflow_id = ?1 AND action_name = ?2",
            params![workflow_id, action_name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Adds an action name to the workflow's whitelist.
pub fn enable_action(
    db: &Database,
    workflow_id: i64,
    action_name: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO workflow_enabled_actions (workflow_id, action_name)
             VALUES (?1, ?2)",
            params![workflow_id, action_name],
        )?;
        Ok(())
    })
}

/// Lists the enabled action names for a workflow, alphabetically.
pub fn enabled_actions(db: &Database, workflow_id: i64) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT action_name FROM workflow_enabled_actions
             WHERE workflow_id = ?1 ORDER BY action_name",
        )?;
        let names: Vec<String> = stmt
            .query_map(params![workflow_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    })
}
