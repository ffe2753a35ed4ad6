//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. ALTER TABLE ADD COLUMN migrations are handled
//! conditionally to support idempotent execution.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    /// Whether this migration needs conditional handling
    /// (e.g. ADD COLUMN that may already exist).
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN — skip if column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_files_table",
        sql: include_str!("sql/001_create_files.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_workflow_tables",
        sql: include_str!("sql/002_create_workflows.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_actions_table",
        sql: include_str!("sql/003_create_actions.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "create_file_action_status_table",
        sql: include_str!("sql/004_create_file_action_status.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "create_fam_sessions_table",
        sql: include_str!("sql/005_create_fam_sessions.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 6,
        description: "create_settings_table",
        sql: include_str!("sql/006_create_settings.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 7,
        description: "add_user_id_to_file_action_status",
        sql: include_str!("sql/007_add_user_id.sql"),
        kind: MigrationKind::AddColumn {
            table: "file_action_status",
            column: "user_id",
        },
    },
    Migration {
        version: 8,
        description: "add_last_seen_to_fam_sessions",
        sql: include_str!("sql/008_add_session_last_seen.sql"),
        kind: MigrationKind::AddColumn {
            table: "fam_sessions",
            column: "last_seen",
        },
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    // Create the migrations tracking table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!(
                "Skipping migration v{} (condition not met)",
                migration.version
            );
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Validate identifier — only alphanumeric and underscores allowed.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        // Running again should be a no-op.
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_column_exists_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE test_tbl (id TEXT, name TEXT);")
            .unwrap();

        assert!(column_exists(&conn, "test_tbl", "id").unwrap());
        assert!(column_exists(&conn, "test_tbl", "name").unwrap());
        assert!(!column_exists(&conn, "test_tbl", "missing").unwrap());
    }

    #[test]
    fn test_status_table_has_user_id() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        assert!(column_exists(&conn, "file_action_status", "user_id").unwrap());
    }

    #[test]
    fn test_global_action_instance_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO actions (name, workflow_id) VALUES ('Index', NULL)",
            [],
        )
        .unwrap();
        // A second workflow-less instance of the same name must be rejected.
        let duplicate = conn.execute(
            "INSERT INTO actions (name, workflow_id) VALUES ('Index', NULL)",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_status_table_rejects_unknown_codes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO files (path, priority, page_count, added_at) VALUES ('/a', 2, 1, '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO actions (name, workflow_id) VALUES ('Index', NULL)",
            [],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO file_action_status (file_id, action_id, status, last_modified)
             VALUES (1, 1, 'X', '2026-01-01')",
            [],
        );
        assert!(bad.is_err());
    }
}
