//! The unit of work a pool worker runs against each claimed file.

use crate::engine::FileRecord;

/// Outcome of running a task on one file, mapped onto the corresponding
/// engine notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The file was handled; its claim becomes Completed.
    Processed,
    /// The file could not be handled; the claim becomes Failed with this
    /// message as the stored detail.
    Failed(String),
    /// The worker declined the file; the claim becomes Skipped for the
    /// rest of the session.
    Skipped,
}

/// A processing task shared by every worker in a pool.
pub trait Task: Send + Sync {
    fn run(&self, file: &FileRecord) -> TaskOutcome;
}

impl<F> Task for F
where
    F: Fn(&FileRecord) -> TaskOutcome + Send + Sync,
{
    fn run(&self, file: &FileRecord) -> TaskOutcome {
        self(file)
    }
}
