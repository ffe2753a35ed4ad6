//! Status and priority vocabulary shared across the engine.
//!
//! A file's progress is tracked per `(file, action-instance)` pair. The
//! absence of a status row means the pair is unattempted, so `ActionStatus`
//! only covers the five persisted states and `Option<ActionStatus>` appears
//! wherever a row may be missing.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing status of a file for one action instance.
///
/// Stored in the database as the single-letter codes `P`, `R`, `S`, `C`, `F`
/// (the external status-code vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Queued and eligible for claiming.
    Pending,
    /// Claimed by a worker; the file is being processed right now.
    Processing,
    /// A worker declined the file; retrievable by a later session.
    Skipped,
    /// Processing finished successfully.
    Completed,
    /// Processing failed; failure detail is recorded alongside.
    Failed,
}

impl ActionStatus {
    /// The single-letter status code used for storage and external reporting.
    pub fn code(self) -> char {
        match self {
            ActionStatus::Pending => 'P',
            ActionStatus::Processing => 'R',
            ActionStatus::Skipped => 'S',
            ActionStatus::Completed => 'C',
            ActionStatus::Failed => 'F',
        }
    }

    /// Parses a single-letter status code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'P' => Some(ActionStatus::Pending),
            'R' => Some(ActionStatus::Processing),
            'S' => Some(ActionStatus::Skipped),
            'C' => Some(ActionStatus::Completed),
            'F' => Some(ActionStatus::Failed),
            _ => None,
        }
    }

}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Processing => "processing",
            ActionStatus::Skipped => "skipped",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
#[error("Invalid status code '{0}'")]
struct InvalidStatusCode(String);

impl ToSql for ActionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code().to_string()))
    }
}

impl FromSql for ActionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => ActionStatus::from_code(c)
                .ok_or_else(|| FromSqlError::Other(Box::new(InvalidStatusCode(text.to_string())))),
            _ => Err(FromSqlError::Other(Box::new(InvalidStatusCode(
                text.to_string(),
            )))),
        }
    }
}

/// Claim-order priority of a file.
///
/// A property of the file itself, not of an individual status row: it
/// governs claim order uniformly across every action and workflow the file
/// participates in. Stored as the ordinal value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Low = 0,
    BelowNormal = 1,
    #[default]
    Normal = 2,
    AboveNormal = 3,
    High = 4,
}

impl Priority {
    /// The stored ordinal value.
    pub fn value(self) -> i64 {
        self as i64
    }

    /// Parses a stored ordinal value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Priority::Low),
            1 => Some(Priority::BelowNormal),
            2 => Some(Priority::Normal),
            3 => Some(Priority::AboveNormal),
            4 => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::BelowNormal => "below-normal",
            Priority::Normal => "normal",
            Priority::AboveNormal => "above-normal",
            Priority::High => "high",
        };
        write!(f, "{}", name)
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.value()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        Priority::from_value(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// Workflow scope of a claim or session.
///
/// `All` is the union across every workflow plus the global (workflow-less)
/// action instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowScope {
    All,
    Workflow(i64),
}

/// User-affinity filter applied to claim candidates.
///
/// Filtering happens before priority ordering; ordering still applies
/// within the matching set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueType {
    /// No user filtering; candidate statuses follow the claim parameters.
    AnyUser,
    /// Pending rows assigned to the given user.
    PendingForUser(String),
    /// Skipped rows assigned to the given user.
    SkippedForUser(String),
    /// Pending rows assigned to the given user or to nobody.
    PendingForUserOrUnassigned(String),
}

/// Ownership outcome of completing a claimed file.
///
/// Any reassignment, including to no user at all, re-queues the row as
/// Pending under the new owner instead of completing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOwner {
    /// Complete the row under whichever user currently owns it.
    Keep,
    /// Re-queue the row as Pending owned by the given user (or unassigned).
    Reassign(Option<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            ActionStatus::Pending,
            ActionStatus::Processing,
            ActionStatus::Skipped,
            ActionStatus::Completed,
            ActionStatus::Failed,
        ] {
            assert_eq!(ActionStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ActionStatus::from_code('X'), None);
    }

    #[test]
    fn test_status_code_letters() {
        assert_eq!(ActionStatus::Pending.code(), 'P');
        assert_eq!(ActionStatus::Processing.code(), 'R');
        assert_eq!(ActionStatus::Skipped.code(), 'S');
        assert_eq!(ActionStatus::Completed.code(), 'C');
        assert_eq!(ActionStatus::Failed.code(), 'F');
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::AboveNormal);
        assert!(Priority::AboveNormal > Priority::Normal);
        assert!(Priority::Normal > Priority::BelowNormal);
        assert!(Priority::BelowNormal > Priority::Low);
    }

    #[test]
    fn test_priority_values_round_trip() {
        for priority in [
            Priority::Low,
            Priority::BelowNormal,
            Priority::Normal,
            Priority::AboveNormal,
            Priority::High,
        ] {
            assert_eq!(Priority::from_value(priority.value()), Some(priority));
        }
        assert_eq!(Priority::from_value(5), None);
        assert_eq!(Priority::from_value(-1), None);
    }

    #[test]
    fn test_priority_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
