//! Integration tests for the file selector and bulk status overrides.

mod common;

use common::TestHarness;
use fam::{ActionStatus, CompletionOwner, FileSelector, Subset};

#[test]
fn requeue_failed_files_in_bulk() {
    let harness = TestHarness::new();
    harness.queue_files("Index", 6);

    // Fail half the queue.
    let batch = harness.engine.get_files_to_process("Index", 3, false).unwrap();
    for file in &batch {
        harness.engine.notify_file_failed(file, "torn page").unwrap();
    }
    let rest = harness.engine.get_files_to_process("Index", 10, false).unwrap();
    for file in &rest {
        harness
            .engine
            .notify_file_processed(file, None, CompletionOwner::Keep)
            .unwrap();
    }

    // The classic admin move: everything Failed goes back to Pending.
    let requeued = harness
        .engine
        .set_status_for_selection(
            &FileSelector::new().action_status("Index", Some(ActionStatus::Failed)),
            "Index",
            Some(ActionStatus::Pending),
        )
        .unwrap();
    assert_eq!(requeued, 3);

    let stats = harness.engine.get_stats("Index").unwrap();
    assert_eq!(stats.num_pending, 3);
    assert_eq!(stats.num_completed, 3);
    assert_eq!(stats.num_failed, 0);

    // Requeue cleared the stored failure detail.
    let failed_ids: Vec<i64> = batch.iter().map(|f| f.file_id).collect();
    for id in failed_ids {
        assert!(harness.engine.get_failure(id, "Index").unwrap().is_none());
    }
}

#[test]
fn unattempted_selection_backfills_a_new_action() {
    let harness = TestHarness::new();
    let ids = harness.queue_files("Scan", 4);

    // Two files already went through Index.
    for &id in &ids[..2] {
        harness
            .engine
            .set_status_for_file(id, "Index", Some(ActionStatus::Completed))
            .unwrap();
    }

    let backfilled = harness
        .engine
        .set_status_for_selection(
            &FileSelector::new().action_status("Index", None),
            "Index",
            Some(ActionStatus::Pending),
        )
        .unwrap();
    assert_eq!(backfilled, 2);

    let stats = harness.engine.get_stats("Index").unwrap();
    assert_eq!(stats.num_pending, 2);
    assert_eq!(stats.num_completed, 2);
}

#[test]
fn subset_limits_the_blast_radius() {
    let harness = TestHarness::new();
    let ids = harness.queue_files("Index", 10);

    // Reset only the first quarter of the matching files.
    let touched = harness
        .engine
        .set_status_for_selection(
            &FileSelector::new()
                .action_status("Index", Some(ActionStatus::Pending))
                .subset(Subset::percent(25)),
            "Index",
            None,
        )
        .unwrap();
    assert_eq!(touched, 2);

    assert_eq!(harness.engine.get_status(ids[0], "Index").unwrap(), None);
    assert_eq!(harness.engine.get_status(ids[1], "Index").unwrap(), None);
    assert_eq!(
        harness.engine.get_status(ids[2], "Index").unwrap(),
        Some(ActionStatus::Pending)
    );
}

#[test]
fn explicit_set_and_raw_condition_combine() {
    let harness = TestHarness::new();
    let ids = harness.queue_files("Index", 5);

    let selected = harness
        .engine
        .select_files(
            &FileSelector::new()
                .file_set(ids[..3].to_vec())
                .raw_condition("f.path LIKE '%002%'"),
        )
        .unwrap();
    assert_eq!(selected, vec![ids[2]]);
}
