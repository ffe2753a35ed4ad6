//! Shared test utilities for fam integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use fam::{Database, FamEngine, Priority};

/// Isolated engine over an on-disk database in a temp directory.
pub struct TestHarness {
    /// Kept alive so the directory survives the test.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub engine: FamEngine,
}

impl TestHarness {
    /// Opens a fresh database with action auto-creation turned on.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("fam.db");

        let db = Database::open(&db_path).expect("Failed to open database");
        fam::db::settings_repo::set(&db, fam::config::keys::AUTO_CREATE_ACTIONS, "1")
            .expect("Failed to write settings");

        let engine = FamEngine::new(db).expect("Failed to create engine");
        Self {
            temp_dir,
            db_path,
            engine,
        }
    }

    /// Queues `count` files Pending under the action, returning their ids
    /// in insertion order.
    pub fn queue_files(&self, action: &str, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| {
                let (id, _) = self
                    .engine
                    .add_file(&format!("/docs/file-{i:03}.tif"), Priority::Normal, 1, action)
                    .expect("Failed to add file");
                id
            })
            .collect()
    }
}
