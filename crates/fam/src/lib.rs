pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod status;
pub mod worker;

pub use config::FamConfig;
pub use db::{Database, DatabaseError, RetryPolicy};
pub use engine::{
    ActionStats, ClaimOrder, FailureRecord, FamEngine, FileRecord, FileSelector, NewWorkflow,
    Subset, SubsetSize,
};
pub use error::{FamError, Result, WorkerError};
pub use status::{ActionStatus, CompletionOwner, Priority, QueueType, WorkflowScope};
pub use worker::{PoolOptions, Task, TaskOutcome, WorkReport, WorkerPool};
