//! Database module for persistent queue state.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod action_repo;
pub mod error;
pub mod file_repo;
pub mod migrations;
pub mod session_repo;
pub mod settings_repo;
pub mod status_repo;
pub mod workflow_repo;

pub use error::DatabaseError;

/// Retry policy for transient `SQLITE_BUSY`/`SQLITE_LOCKED` contention.
///
/// Configured through the `NumberOfConnectionRetries` and
/// `ConnectionRetryTimeout` settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// How many times a busy transaction is retried before giving up.
    pub retries: u32,
    /// How long to wait between retries.
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            wait: Duration::from_millis(100),
        }
    }
}

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). All access is serialized through
/// a `Mutex`, which is fine for SQLite (which serializes writes anyway).
/// WAL mode is enabled for concurrent read performance.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    retry: RetryPolicy,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry: RetryPolicy::default(),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the busy-retry policy. Applies to this handle and every
    /// handle cloned from it afterwards.
    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs the closure inside a `BEGIN IMMEDIATE` transaction, retrying
    /// busy/locked failures per the retry policy.
    ///
    /// The immediate behavior takes the SQLite write lock before the first
    /// read, so a check-then-update sequence (the claim engine's candidate
    /// scan plus grant) executes as a single critical section even against
    /// writers in other processes.
    pub fn with_txn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: Fn(&Transaction) -> Result<T, DatabaseError>,
    {
        let mut attempts: u32 = 0;
        loop {
            let result = (|| {
                let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })();

            match result {
                Err(DatabaseError::Sqlite(ref e)) if is_busy(e) => {
                    attempts += 1;
                    if attempts > self.retry.retries {
                        return Err(DatabaseError::Unavailable { attempts });
                    }
                    log::warn!(
                        "Database busy, retrying transaction (attempt {}/{})",
                        attempts,
                        self.retry.retries
                    );
                    std::thread::sleep(self.retry.wait);
                }
                other => return other,
            }
        }
    }
}

/// Whether a rusqlite error is transient lock contention.
fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Returns the canonical database path: `~/.fam/data/fam.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".fam").join("data").join("fam.db"))
}
