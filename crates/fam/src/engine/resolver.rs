//! Workflow resolver — maps an action name plus workflow context to a
//! concrete action-instance id.
//!
//! Each workflow that enables an action gets its own instance with
//! independent status tracking; the instance is created lazily the first
//! time it is resolved. A name outside the workflow's whitelist resolves
//! only when the `AutoCreateActions` setting is on, in which case the name
//! is also added to the whitelist so the definition reflects reality.

use crate::db::{action_repo, workflow_repo, Database};
use crate::error::{FamError, Result};

/// Resolves `(action_name, workflow)` to an action-instance id, creating
/// the instance if policy allows.
pub fn resolve(
    db: &Database,
    action_name: &str,
    workflow_id: Option<i64>,
    auto_create: bool,
) -> Result<i64> {
    if let Some(existing) = action_repo::find(db, action_name, workflow_id)? {
        return Ok(existing.id);
    }

    match workflow_id {
        Some(workflow) => {
            let enabled = workflow_repo::is_action_enabled(db, workflow, action_name)?;
            if !enabled && !auto_create {
                let workflow_name = workflow_repo::find_by_id(db, workflow)?.map(|w| w.name);
                return Err(FamError::ActionNotFound {
                    name: action_name.to_string(),
                    workflow: workflow_name,
                });
            }
            if !enabled {
                log::info!(
                    "Auto-creating action '{}' in workflow {}",
                    action_name,
                    workflow
                );
                workflow_repo::enable_action(db, workflow, action_name)?;
            }
            Ok(action_repo::get_or_create(db, action_name, Some(workflow))?)
        }
        None => {
            // No whitelist outside workflows; only the auto-create policy
            // gates creation of the global instance.
            if !auto_create {
                return Err(FamError::ActionNotFound {
                    name: action_name.to_string(),
                    workflow: None,
                });
            }
            Ok(action_repo::get_or_create(db, action_name, None)?)
        }
    }
}
