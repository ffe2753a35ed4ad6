pub mod pool;
pub mod task;

pub use pool::{PoolOptions, WorkReport, WorkerPool};
pub use task::{Task, TaskOutcome};

// Re-export crossbeam_channel for callers wiring their own result plumbing
pub use crossbeam_channel;
