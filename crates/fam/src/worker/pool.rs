use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::engine::{FamEngine, FileRecord};
use crate::error::{Result, WorkerError};
use crate::status::{CompletionOwner, WorkflowScope};
use crate::worker::task::{Task, TaskOutcome};

/// Report emitted on the results channel after each file a worker ran.
#[derive(Debug)]
pub struct WorkReport {
    pub worker_id: usize,
    pub file: FileRecord,
    pub outcome: TaskOutcome,
}

/// Tuning knobs for a worker pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of worker threads. Defaults to the logical CPU count.
    pub worker_count: usize,
    /// Files claimed per cycle. Claims not yet started when shutdown hits
    /// are released back to the queue.
    pub max_files_per_cycle: usize,
    /// Retrieve skipped files alongside pending ones.
    pub include_skipped: bool,
    /// Workflow scope each worker session registers against.
    pub scope: WorkflowScope,
    /// How long an idle worker sleeps before polling the queue again.
    pub idle_wait: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            max_files_per_cycle: 1,
            include_skipped: false,
            scope: WorkflowScope::All,
            idle_wait: Duration::from_millis(500),
        }
    }
}

/// Pool of worker threads that claim files for one action and run a shared
/// task against each.
///
/// Every worker holds its own engine clone with its own session, so its
/// claims are stamped and recoverable. Stopping a worker releases whatever
/// it still had claimed.
pub struct WorkerPool {
    result_receiver: Receiver<WorkReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn start(
        engine: &FamEngine,
        action_name: &str,
        task: Arc<dyn Task>,
        options: PoolOptions,
    ) -> Result<Self> {
        let (result_sender, result_receiver) = unbounded::<WorkReport>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(options.worker_count);
        for worker_id in 0..options.worker_count {
            let engine = engine.clone();
            let action = action_name.to_string();
            let task = Arc::clone(&task);
            let options = options.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(format!("fam-worker-{worker_id}"))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        engine,
                        &action,
                        task,
                        &options,
                        result_tx,
                        shutdown_flag,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!(
            "Started {} worker(s) for action '{}'",
            options.worker_count, action_name
        );

        Ok(Self {
            result_receiver,
            workers,
            shutdown,
        })
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn try_recv_result(&self) -> Option<WorkReport> {
        self.result_receiver.try_recv().ok()
    }

    /// Blocks until the next report, or `None` once every worker has
    /// stopped and the channel drained.
    pub fn recv_result(&self) -> Option<WorkReport> {
        self.result_receiver.recv().ok()
    }

    /// Joins every worker thread. Call [`shutdown`](Self::shutdown) first,
    /// otherwise this blocks until the workers stop on their own.
    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    mut engine: FamEngine,
    action_name: &str,
    task: Arc<dyn Task>,
    options: &PoolOptions,
    result_sender: Sender<WorkReport>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    if let Err(e) = engine.start_session(action_name, options.scope) {
        error!("Worker {} could not start a session: {}", worker_id, e);
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        let batch = match engine.get_files_to_process(
            action_name,
            options.max_files_per_cycle,
            options.include_skipped,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Worker {} claim failed: {}", worker_id, e);
                thread::sleep(options.idle_wait);
                continue;
            }
        };

        if batch.is_empty() {
            thread::sleep(options.idle_wait);
            continue;
        }

        let mut batch = batch.into_iter();
        while let Some(file) = batch.next() {
            if shutdown.load(Ordering::Relaxed) {
                // Hand back the claim we never started plus the rest of
                // the batch.
                let mut remainder: Vec<FileRecord> = vec![file];
                remainder.extend(batch);
                match engine.release_files(&remainder) {
                    Ok(released) => {
                        debug!("Worker {} released {} claim(s)", worker_id, released)
                    }
                    Err(e) => error!("Worker {} release failed: {}", worker_id, e),
                }
                break;
            }

            debug!("Worker {} processing file {}", worker_id, file.path);
            let outcome = task.run(&file);
            let notified = match &outcome {
                TaskOutcome::Processed => {
                    engine.notify_file_processed(&file, None, CompletionOwner::Keep)
                }
                TaskOutcome::Failed(message) => engine.notify_file_failed(&file, message),
                TaskOutcome::Skipped => engine.notify_file_skipped(&file),
            };
            if let Err(e) = notified {
                // The row changed under us, likely an administrative
                // override. The claim is already gone; keep going.
                warn!(
                    "Worker {} could not record outcome for file {}: {}",
                    worker_id, file.file_id, e
                );
            }

            if result_sender
                .send(WorkReport {
                    worker_id,
                    file,
                    outcome,
                })
                .is_err()
            {
                debug!("Worker {} result channel closed", worker_id);
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    match engine.stop_session() {
        Ok(released) if released > 0 => {
            debug!("Worker {} released {} claim(s) at stop", worker_id, released)
        }
        Ok(_) => {}
        Err(e) => error!("Worker {} failed to stop its session: {}", worker_id, e),
    }
    debug!("Worker {} stopped", worker_id);
}
