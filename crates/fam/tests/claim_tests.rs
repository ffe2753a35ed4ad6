//! Integration tests for the claim engine: exclusivity under concurrency,
//! queue ordering, and session-bounded claim lifecycles.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::TestHarness;
use fam::{ActionStatus, CompletionOwner, Priority, WorkflowScope};

#[test]
fn concurrent_claimants_never_share_a_file() {
    let harness = TestHarness::new();
    let queued = harness.queue_files("Index", 60);

    let granted: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = harness.engine.clone();
        let granted = Arc::clone(&granted);
        handles.push(thread::spawn(move || loop {
            let batch = engine
                .get_files_to_process("Index", 3, false)
                .expect("claim failed");
            if batch.is_empty() {
                break;
            }
            let mut granted = granted.lock().unwrap();
            granted.extend(batch.iter().map(|f| f.file_id));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let granted = granted.lock().unwrap();
    assert_eq!(granted.len(), queued.len());
    let unique: HashSet<i64> = granted.iter().copied().collect();
    assert_eq!(unique.len(), queued.len(), "a file was granted twice");
}

#[test]
fn priority_queue_orders_batches() {
    let harness = TestHarness::new();
    let (high, _) = harness
        .engine
        .add_file("/docs/rush.tif", Priority::High, 1, "Index")
        .unwrap();
    let (low, _) = harness
        .engine
        .add_file("/docs/later.tif", Priority::Low, 1, "Index")
        .unwrap();
    let (normal, _) = harness
        .engine
        .add_file("/docs/plain.tif", Priority::Normal, 1, "Index")
        .unwrap();

    let batch = harness.engine.get_files_to_process("Index", 3, false).unwrap();
    let order: Vec<i64> = batch.iter().map(|f| f.file_id).collect();
    assert_eq!(order, vec![high, normal, low]);
}

#[test]
fn released_over_claim_is_claimable_again() {
    let harness = TestHarness::new();
    harness.queue_files("Index", 5);

    // Claimed five, only processed two.
    let batch = harness.engine.get_files_to_process("Index", 5, false).unwrap();
    for file in &batch[..2] {
        harness
            .engine
            .notify_file_processed(file, None, CompletionOwner::Keep)
            .unwrap();
    }
    let released = harness.engine.release_files(&batch[2..]).unwrap();
    assert_eq!(released, 3);

    let again = harness.engine.get_files_to_process("Index", 10, false).unwrap();
    assert_eq!(again.len(), 3);
}

#[test]
fn skip_isolation_spans_engine_handles() {
    let mut harness = TestHarness::new();
    let ids = harness.queue_files("Index", 2);

    harness
        .engine
        .start_session("Index", WorkflowScope::All)
        .unwrap();
    let batch = harness.engine.get_files_to_process("Index", 2, false).unwrap();
    for file in &batch {
        harness.engine.notify_file_skipped(file).unwrap();
    }

    // The skipping session sees nothing, another handle's session sees both.
    assert!(harness
        .engine
        .get_files_to_process("Index", 10, true)
        .unwrap()
        .is_empty());

    let mut other = harness.engine.clone();
    other.start_session("Index", WorkflowScope::All).unwrap();
    let retrieved = other.get_files_to_process("Index", 10, true).unwrap();
    let retrieved_ids: HashSet<i64> = retrieved.iter().map(|f| f.file_id).collect();
    assert_eq!(retrieved_ids, ids.iter().copied().collect());
}

#[test]
fn crash_recovery_requeues_abandoned_claims() {
    let harness = TestHarness::new();
    let ids = harness.queue_files("Index", 3);

    {
        let mut crashed = harness.engine.clone();
        crashed.start_session("Index", WorkflowScope::All).unwrap();
        let batch = crashed.get_files_to_process("Index", 3, false).unwrap();
        assert_eq!(batch.len(), 3);
        // Dropped without stop_session, like a killed process.
    }

    assert!(harness
        .engine
        .get_files_to_process("Index", 10, false)
        .unwrap()
        .is_empty());

    let recovered = harness
        .engine
        .recover_abandoned_sessions(Duration::ZERO)
        .unwrap();
    assert_eq!(recovered, 1);
    for id in ids {
        assert_eq!(
            harness.engine.get_status(id, "Index").unwrap(),
            Some(ActionStatus::Pending)
        );
    }
}

#[test]
fn recovery_never_steals_from_a_live_worker() {
    let harness = TestHarness::new();
    let ids = harness.queue_files("Index", 1);

    // A worker on another handle is mid-task.
    let mut live = harness.engine.clone();
    live.start_session("Index", WorkflowScope::All).unwrap();
    let batch = live.get_files_to_process("Index", 1, false).unwrap();
    assert_eq!(batch.len(), 1);

    // Recovery with a sane threshold leaves the live claim alone, so no
    // second claimant can be granted the same file.
    let recovered = harness
        .engine
        .recover_abandoned_sessions(Duration::from_secs(300))
        .unwrap();
    assert_eq!(recovered, 0);
    assert!(harness
        .engine
        .get_files_to_process("Index", 10, false)
        .unwrap()
        .is_empty());

    live.notify_file_processed(&batch[0], None, CompletionOwner::Keep)
        .unwrap();
    live.stop_session().unwrap();
    assert_eq!(
        harness.engine.get_status(ids[0], "Index").unwrap(),
        Some(ActionStatus::Completed)
    );
}

#[test]
fn shared_files_fill_one_batch_slot_each() {
    let harness = TestHarness::new();

    let mut w1 = harness.engine.clone();
    w1.create_workflow(&fam::NewWorkflow::named("W1", &["Index"]))
        .unwrap();
    w1.create_workflow(&fam::NewWorkflow::named("W2", &["Index"]))
        .unwrap();
    w1.set_workflow_context(Some("W1")).unwrap();
    w1.add_file("/docs/shared.tif", Priority::Normal, 1, "Index")
        .unwrap();
    let mut w2 = harness.engine.clone();
    w2.set_workflow_context(Some("W2")).unwrap();
    w2.add_file("/docs/shared.tif", Priority::Normal, 1, "Index")
        .unwrap();
    w2.add_file("/docs/other.tif", Priority::Normal, 1, "Index")
        .unwrap();

    // Unscoped: the shared file holds two eligible rows but the batch
    // still fills with two distinct files.
    let batch = harness.engine.get_files_to_process("Index", 2, false).unwrap();
    assert_eq!(batch.len(), 2);
    let unique: HashSet<i64> = batch.iter().map(|f| f.file_id).collect();
    assert_eq!(unique.len(), 2);
}
