//! Typed view over the engine-wide key/value settings store.
//!
//! The settings table ("DBInfo") travels with the database, so every
//! worker process sharing a queue sees the same flags.

use std::time::Duration;

use crate::db::{settings_repo, Database, DatabaseError, RetryPolicy};

/// Setting keys consumed by the engine.
pub mod keys {
    /// Create unknown action instances lazily instead of failing resolution.
    pub const AUTO_CREATE_ACTIONS: &str = "AutoCreateActions";
    /// Claim in uniform random order instead of priority order.
    pub const ENABLE_LOAD_BALANCING: &str = "EnableLoadBalancing";
    /// How many times a busy transaction is retried.
    pub const NUMBER_OF_CONNECTION_RETRIES: &str = "NumberOfConnectionRetries";
    /// Milliseconds to wait between retries.
    pub const CONNECTION_RETRY_TIMEOUT: &str = "ConnectionRetryTimeout";
}

/// Engine configuration resolved from settings, with defaults for
/// anything unset.
#[derive(Debug, Clone)]
pub struct FamConfig {
    pub auto_create_actions: bool,
    pub use_random_queue: bool,
    pub connection_retries: u32,
    pub connection_retry_wait: Duration,
}

impl Default for FamConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            auto_create_actions: false,
            use_random_queue: false,
            connection_retries: retry.retries,
            connection_retry_wait: retry.wait,
        }
    }
}

impl FamConfig {
    /// Loads the configuration from the settings store.
    pub fn load(db: &Database) -> Result<Self, DatabaseError> {
        let defaults = FamConfig::default();
        Ok(Self {
            auto_create_actions: settings_repo::get_bool(
                db,
                keys::AUTO_CREATE_ACTIONS,
                defaults.auto_create_actions,
            )?,
            use_random_queue: settings_repo::get_bool(
                db,
                keys::ENABLE_LOAD_BALANCING,
                defaults.use_random_queue,
            )?,
            connection_retries: settings_repo::get_u64(
                db,
                keys::NUMBER_OF_CONNECTION_RETRIES,
                defaults.connection_retries as u64,
            )? as u32,
            connection_retry_wait: Duration::from_millis(settings_repo::get_u64(
                db,
                keys::CONNECTION_RETRY_TIMEOUT,
                defaults.connection_retry_wait.as_millis() as u64,
            )?),
        })
    }

    /// The busy-retry policy this configuration implies.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.connection_retries,
            wait: self.connection_retry_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_defaults_when_unset() {
        let db = test_db();
        let config = FamConfig::load(&db).unwrap();
        assert!(!config.auto_create_actions);
        assert!(!config.use_random_queue);
        assert_eq!(config.connection_retries, 10);
        assert_eq!(config.connection_retry_wait, Duration::from_millis(100));
    }

    #[test]
    fn test_load_from_settings() {
        let db = test_db();
        settings_repo::set(&db, keys::AUTO_CREATE_ACTIONS, "1").unwrap();
        settings_repo::set(&db, keys::ENABLE_LOAD_BALANCING, "true").unwrap();
        settings_repo::set(&db, keys::NUMBER_OF_CONNECTION_RETRIES, "3").unwrap();
        settings_repo::set(&db, keys::CONNECTION_RETRY_TIMEOUT, "250").unwrap();

        let config = FamConfig::load(&db).unwrap();
        assert!(config.auto_create_actions);
        assert!(config.use_random_queue);
        assert_eq!(config.connection_retries, 3);
        assert_eq!(config.connection_retry_wait, Duration::from_millis(250));

        let policy = config.retry_policy();
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.wait, Duration::from_millis(250));
    }
}
