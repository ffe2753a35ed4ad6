//! The file action manager engine.
//!
//! [`FamEngine`] is the public face of the crate: it owns a database
//! handle, the loaded configuration, an optional workflow context that
//! scopes file and stats queries, and an optional active session that
//! brackets claim activity. Handles are cheap to clone; clones share the
//! database but carry their own context and session.

mod claim;
mod resolver;
mod selector;
mod stats;

pub use claim::{ClaimOrder, FileRecord};
pub use selector::{FileSelector, Subset, SubsetSize};
pub use stats::ActionStats;

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::FamConfig;
use crate::db::{
    action_repo, file_repo, session_repo, status_repo, workflow_repo, Database,
};
use crate::error::{FamError, Result};
use crate::status::{ActionStatus, CompletionOwner, Priority, QueueType, WorkflowScope};

pub use crate::db::workflow_repo::NewWorkflow;

/// Failure detail stored on a Failed status row, serialized as JSON in the
/// `failure` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub message: String,
    pub failed_at: String,
}

/// Orchestration engine over one queue database.
pub struct FamEngine {
    db: Database,
    config: FamConfig,
    workflow: Option<i64>,
    session: Option<i64>,
}

impl Clone for FamEngine {
    /// Clones share the database and keep the workflow context, but a
    /// session belongs to exactly one handle: the clone starts without one.
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            config: self.config.clone(),
            workflow: self.workflow,
            session: None,
        }
    }
}

impl FamEngine {
    /// Wraps an already-open database, loading configuration from its
    /// settings store and applying the configured busy-retry policy.
    pub fn new(db: Database) -> Result<Self> {
        let config = FamConfig::load(&db)?;
        let mut db = db;
        db.set_retry_policy(config.retry_policy());
        Ok(Self {
            db,
            config,
            workflow: None,
            session: None,
        })
    }

    /// Opens (or creates) the queue database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        Self::new(Database::open(path)?)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &FamConfig {
        &self.config
    }

    /// Re-reads configuration from the settings store. Settings written by
    /// another process are picked up here, not automatically.
    pub fn reload_config(&mut self) -> Result<()> {
        self.config = FamConfig::load(&self.db)?;
        self.db.set_retry_policy(self.config.retry_policy());
        Ok(())
    }

    // ----- workflows -------------------------------------------------------

    /// Creates a workflow definition with its enabled-action whitelist.
    pub fn create_workflow(&self, workflow: &NewWorkflow) -> Result<i64> {
        Ok(workflow_repo::create(&self.db, workflow)?)
    }

    /// Selects the workflow context by name, or clears it with `None`.
    /// Subsequent action resolution, file queries and stats are scoped to
    /// the selected workflow.
    pub fn set_workflow_context(&mut self, name: Option<&str>) -> Result<()> {
        self.workflow = match name {
            Some(name) => Some(
                workflow_repo::find_by_name(&self.db, name)?
                    .ok_or_else(|| FamError::WorkflowNotFound(name.to_string()))?
                    .id,
            ),
            None => None,
        };
        Ok(())
    }

    pub fn workflow_context(&self) -> Option<i64> {
        self.workflow
    }

    // ----- files and statuses ----------------------------------------------

    /// Adds a file and queues it Pending under the named action in the
    /// current context.
    ///
    /// Idempotent against re-adds: an existing status row for the action is
    /// left untouched and returned as the second element. `None` means the
    /// file was queued fresh.
    pub fn add_file(
        &self,
        path: &str,
        priority: Priority,
        page_count: i64,
        action_name: &str,
    ) -> Result<(i64, Option<ActionStatus>)> {
        let (file, created) = file_repo::get_or_create(&self.db, path, priority, page_count)?;
        if created {
            log::info!("Added file '{}' (id {})", path, file.id);
        }

        let action_id = self.resolve_action(action_name)?;
        if let Some(existing) = status_repo::get(&self.db, file.id, action_id)? {
            return Ok((file.id, Some(existing.status)));
        }
        status_repo::set_status(&self.db, file.id, action_id, ActionStatus::Pending)?;
        Ok((file.id, None))
    }

    /// Changes a file's claim-order priority. Takes effect on the next
    /// claim; outstanding claims are unaffected.
    pub fn set_file_priority(&self, file_id: i64, priority: Priority) -> Result<()> {
        file_repo::set_priority(&self.db, file_id, priority)?;
        Ok(())
    }

    /// Current status of a file under an action in the context; `None` is
    /// unattempted.
    pub fn get_status(&self, file_id: i64, action_name: &str) -> Result<Option<ActionStatus>> {
        let action_id = self.find_action(action_name)?;
        Ok(status_repo::get(&self.db, file_id, action_id)?.map(|row| row.status))
    }

    /// Administrative status override for one file. `None` writes
    /// Unattempted, deleting the row (the file itself survives). Returns
    /// the previous status.
    pub fn set_status_for_file(
        &self,
        file_id: i64,
        action_name: &str,
        status: Option<ActionStatus>,
    ) -> Result<Option<ActionStatus>> {
        let action_id = self.resolve_action(action_name)?;
        let previous = match status {
            Some(status) => status_repo::set_status(&self.db, file_id, action_id, status)?,
            None => status_repo::clear_status(&self.db, file_id, action_id)?,
        };
        Ok(previous)
    }

    /// Like [`set_status_for_file`](Self::set_status_for_file) but also
    /// assigns (or clears) the owning user.
    pub fn set_status_for_file_for_user(
        &self,
        file_id: i64,
        action_name: &str,
        status: Option<ActionStatus>,
        user_id: Option<&str>,
    ) -> Result<Option<ActionStatus>> {
        let action_id = self.resolve_action(action_name)?;
        let previous = match status {
            Some(status) => {
                status_repo::set_status_for_user(&self.db, file_id, action_id, status, user_id)?
            }
            None => status_repo::clear_status(&self.db, file_id, action_id)?,
        };
        Ok(previous)
    }

    /// Applies a status override to every file the selector matches in the
    /// current context. Returns the number of files written.
    pub fn set_status_for_selection(
        &self,
        selector: &FileSelector,
        action_name: &str,
        status: Option<ActionStatus>,
    ) -> Result<usize> {
        let action_id = self.resolve_action(action_name)?;
        let ids = selector.select_file_ids(&self.db, self.workflow)?;
        for &file_id in &ids {
            match status {
                Some(status) => {
                    status_repo::set_status(&self.db, file_id, action_id, status)?;
                }
                None => {
                    status_repo::clear_status(&self.db, file_id, action_id)?;
                }
            }
        }
        log::info!(
            "Set {} file(s) to {:?} for action '{}'",
            ids.len(),
            status,
            action_name
        );
        Ok(ids.len())
    }

    /// Applies a status override to every file visible in the current
    /// context.
    pub fn set_status_for_all_files(
        &self,
        action_name: &str,
        status: Option<ActionStatus>,
    ) -> Result<usize> {
        self.set_status_for_selection(&FileSelector::new(), action_name, status)
    }

    /// Materializes the file ids a selector matches in the current context.
    pub fn select_files(&self, selector: &FileSelector) -> Result<Vec<i64>> {
        Ok(selector.select_file_ids(&self.db, self.workflow)?)
    }

    /// The stored failure detail for a Failed row, if any.
    pub fn get_failure(&self, file_id: i64, action_name: &str) -> Result<Option<FailureRecord>> {
        let action_id = self.find_action(action_name)?;
        match status_repo::get(&self.db, file_id, action_id)? {
            Some(row) => match row.failure {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    // ----- sessions --------------------------------------------------------

    /// Opens a processing session against an action. Claims made under the
    /// session are stamped with its id; skips made under it stay invisible
    /// to its own retrievals.
    pub fn start_session(&mut self, action_name: &str, scope: WorkflowScope) -> Result<i64> {
        if let Some(active) = self.session {
            log::warn!("Replacing active session {}", active);
            self.stop_session()?;
        }
        let id = session_repo::start(&self.db, action_name, scope)?;
        log::info!("Started session {} for action '{}'", id, action_name);
        self.session = Some(id);
        Ok(id)
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session
    }

    /// Ends the active session: outstanding Processing claims it owns go
    /// back to Pending, then the stop time is stamped. Returns how many
    /// claims were released. A no-op without an active session.
    pub fn stop_session(&mut self) -> Result<usize> {
        let Some(session_id) = self.session.take() else {
            return Ok(0);
        };
        let released = status_repo::release_processing_for_session(&self.db, session_id)?;
        session_repo::stop(&self.db, session_id)?;
        log::info!(
            "Stopped session {}, released {} claim(s)",
            session_id,
            released
        );
        Ok(released)
    }

    /// Cleans up after crashed workers: active sessions whose liveness
    /// stamp is older than `idle_for` have their claims released and their
    /// stop time stamped. Every claim refreshes the stamp, so a worker
    /// still polling the queue is never recovered, however long it runs;
    /// this engine's own session is always excluded. Returns the number of
    /// sessions recovered.
    pub fn recover_abandoned_sessions(&self, idle_for: Duration) -> Result<usize> {
        let own: Vec<i64> = self.session.into_iter().collect();
        let abandoned = session_repo::abandoned_ids(&self.db, &own, idle_for)?;
        for &session_id in &abandoned {
            let released = status_repo::release_processing_for_session(&self.db, session_id)?;
            session_repo::stop(&self.db, session_id)?;
            log::warn!(
                "Recovered abandoned session {}, released {} claim(s)",
                session_id,
                released
            );
        }
        Ok(abandoned.len())
    }

    // ----- claims ----------------------------------------------------------

    /// Claims up to `max_files` eligible files for the named action,
    /// transitioning their rows to Processing. Ordering follows the
    /// `EnableLoadBalancing` setting: priority order normally, uniform
    /// random when load balancing is on.
    pub fn get_files_to_process(
        &self,
        action_name: &str,
        max_files: usize,
        include_skipped: bool,
    ) -> Result<Vec<FileRecord>> {
        let order = if self.config.use_random_queue {
            ClaimOrder::Random
        } else {
            ClaimOrder::Priority
        };
        self.claim_batch(action_name, max_files, include_skipped, &QueueType::AnyUser, order)
    }

    /// Claims in uniform random order regardless of the load-balancing
    /// setting.
    pub fn get_random_files_to_process(
        &self,
        action_name: &str,
        max_files: usize,
        include_skipped: bool,
    ) -> Result<Vec<FileRecord>> {
        self.claim_batch(
            action_name,
            max_files,
            include_skipped,
            &QueueType::AnyUser,
            ClaimOrder::Random,
        )
    }

    /// Claims from a user-filtered queue.
    pub fn get_files_to_process_for_queue(
        &self,
        action_name: &str,
        max_files: usize,
        include_skipped: bool,
        queue: &QueueType,
    ) -> Result<Vec<FileRecord>> {
        let order = if self.config.use_random_queue {
            ClaimOrder::Random
        } else {
            ClaimOrder::Priority
        };
        self.claim_batch(action_name, max_files, include_skipped, queue, order)
    }

    fn claim_batch(
        &self,
        action_name: &str,
        max_files: usize,
        include_skipped: bool,
        queue: &QueueType,
        order: ClaimOrder,
    ) -> Result<Vec<FileRecord>> {
        if max_files == 0 {
            return Ok(Vec::new());
        }
        let scope = self.claim_scope()?;
        let request = claim::ClaimRequest {
            action_name,
            max_files,
            include_skipped,
            scope,
            queue,
            order,
            session_id: self.session,
        };
        Ok(claim::claim(&self.db, &request)?)
    }

    /// Scope for claims: the active session's registration wins, otherwise
    /// the workflow context.
    fn claim_scope(&self) -> Result<WorkflowScope> {
        if let Some(session_id) = self.session {
            if let Some(session) = session_repo::find_by_id(&self.db, session_id)? {
                return Ok(session.scope());
            }
        }
        Ok(match self.workflow {
            Some(workflow) => WorkflowScope::Workflow(workflow),
            None => WorkflowScope::All,
        })
    }

    /// Hands claimed-but-unprocessed files back to the queue. Rows no
    /// longer Processing are untouched. Returns how many were released.
    pub fn release_files(&self, files: &[FileRecord]) -> Result<usize> {
        Ok(claim::release(&self.db, files)?)
    }

    // ----- worker notifications --------------------------------------------

    /// Records successful processing of a claimed file.
    ///
    /// With `CompletionOwner::Keep` the row becomes Completed; with
    /// `Reassign` it goes back to Pending under the new owner (an override
    /// never completes). `chain_to` then queues the file Pending under the
    /// named follow-up action, resolved in the claimed action's workflow.
    /// Fails with [`FamError::InvalidTransition`] when the row was not
    /// Processing anymore.
    pub fn notify_file_processed(
        &self,
        file: &FileRecord,
        chain_to: Option<&str>,
        owner: CompletionOwner,
    ) -> Result<()> {
        let previous = match &owner {
            CompletionOwner::Keep => {
                status_repo::complete_if_processing(&self.db, file.file_id, file.action_id)?
            }
            CompletionOwner::Reassign(user) => status_repo::requeue_if_processing(
                &self.db,
                file.file_id,
                file.action_id,
                user.as_deref(),
            )?,
        };
        if previous != Some(ActionStatus::Processing) {
            return Err(FamError::InvalidTransition {
                file_id: file.file_id,
                action_id: file.action_id,
                from: previous,
                to: match owner {
                    CompletionOwner::Keep => ActionStatus::Completed,
                    CompletionOwner::Reassign(_) => ActionStatus::Pending,
                },
            });
        }

        if let Some(next_action) = chain_to {
            let workflow = action_repo::find_by_id(&self.db, file.action_id)?
                .and_then(|action| action.workflow_id);
            let next_id = resolver::resolve(
                &self.db,
                next_action,
                workflow,
                self.config.auto_create_actions,
            )?;
            status_repo::set_status(&self.db, file.file_id, next_id, ActionStatus::Pending)?;
            log::debug!(
                "Chained file {} to action '{}'",
                file.file_id,
                next_action
            );
        }
        Ok(())
    }

    /// Records a processing failure, storing the message as a
    /// [`FailureRecord`] on the row.
    pub fn notify_file_failed(&self, file: &FileRecord, message: &str) -> Result<()> {
        let record = FailureRecord {
            message: message.to_string(),
            failed_at: Utc::now().to_rfc3339(),
        };
        let detail = serde_json::to_string(&record)?;
        let previous =
            status_repo::fail_if_processing(&self.db, file.file_id, file.action_id, &detail)?;
        if previous != Some(ActionStatus::Processing) {
            return Err(FamError::InvalidTransition {
                file_id: file.file_id,
                action_id: file.action_id,
                from: previous,
                to: ActionStatus::Failed,
            });
        }
        log::warn!("File {} failed: {}", file.file_id, message);
        Ok(())
    }

    /// Records that the worker declined a claimed file. The row becomes
    /// Skipped, stamped with the active session so the same session never
    /// retrieves it again.
    pub fn notify_file_skipped(&self, file: &FileRecord) -> Result<()> {
        let previous =
            status_repo::skip_if_processing(&self.db, file.file_id, file.action_id, self.session)?;
        if previous != Some(ActionStatus::Processing) {
            return Err(FamError::InvalidTransition {
                file_id: file.file_id,
                action_id: file.action_id,
                from: previous,
                to: ActionStatus::Skipped,
            });
        }
        Ok(())
    }

    // ----- stats -----------------------------------------------------------

    /// Status counts for the named action's instance in the current
    /// context.
    pub fn get_stats(&self, action_name: &str) -> Result<ActionStats> {
        let action_id = self.find_action(action_name)?;
        Ok(stats::get_stats(&self.db, action_id)?)
    }

    /// Status counts summed over every instance of the action name; a file
    /// queued in several workflows is counted once per instance.
    pub fn get_stats_all_workflows(&self, action_name: &str) -> Result<ActionStats> {
        Ok(stats::get_stats_all_workflows(&self.db, action_name)?)
    }

    /// Distinct files visible in the current context.
    pub fn get_file_count(&self) -> Result<i64> {
        Ok(stats::get_file_count(&self.db, self.workflow)?)
    }

    // ----- helpers ---------------------------------------------------------

    /// Resolves an action name in the current context, creating the
    /// instance when the auto-create policy allows.
    fn resolve_action(&self, action_name: &str) -> Result<i64> {
        resolver::resolve(
            &self.db,
            action_name,
            self.workflow,
            self.config.auto_create_actions,
        )
    }

    /// Looks up an existing action instance in the current context without
    /// ever creating one.
    fn find_action(&self, action_name: &str) -> Result<i64> {
        match action_repo::find(&self.db, action_name, self.workflow)? {
            Some(action) => Ok(action.id),
            None => {
                let workflow_name = match self.workflow {
                    Some(id) => workflow_repo::find_by_id(&self.db, id)?.map(|w| w.name),
                    None => None,
                };
                Err(FamError::ActionNotFound {
                    name: action_name.to_string(),
                    workflow: workflow_name,
                })
            }
        }
    }
}
