use thiserror::Error;

use crate::status::ActionStatus;

#[derive(Error, Debug)]
pub enum FamError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Action '{name}' not found{}", workflow_suffix(.workflow.as_deref()))]
    ActionNotFound {
        name: String,
        workflow: Option<String>,
    },

    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error(
        "Invalid transition for file {file_id}, action {action_id}: {} -> {to}",
        status_name(.from)
    )]
    InvalidTransition {
        file_id: i64,
        action_id: i64,
        from: Option<ActionStatus>,
        to: ActionStatus,
    },

    #[error("Failed to encode failure detail: {0}")]
    FailureEncoding(#[from] serde_json::Error),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

fn workflow_suffix(workflow: Option<&str>) -> String {
    match workflow {
        Some(name) => format!(" in workflow '{}'", name),
        None => String::new(),
    }
}

fn status_name(status: &Option<ActionStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "unattempted".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, FamError>;
