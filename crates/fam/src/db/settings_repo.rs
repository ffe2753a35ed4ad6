//! Settings repository — the engine-wide key/value store ("DBInfo").

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// Fetches a raw setting value.
pub fn get(db: &Database, key: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?)
    })
}

/// Stores a setting, replacing any existing value.
pub fn set(db: &Database, key: &str, value: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    })
}

/// Reads a boolean setting; `1` and `true` (any case) count as set.
pub fn get_bool(db: &Database, key: &str, default: bool) -> Result<bool, DatabaseError> {
    Ok(match get(db, key)? {
        Some(value) => value == "1" || value.eq_ignore_ascii_case("true"),
        None => default,
    })
}

/// Reads an integer setting, falling back to the default when missing or
/// unparsable.
pub fn get_u64(db: &Database, key: &str, default: u64) -> Result<u64, DatabaseError> {
    Ok(match get(db, key)? {
        Some(value) => value.trim().parse().unwrap_or(default),
        None => default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_get_missing() {
        let db = test_db();
        assert!(get(&db, "AutoCreateActions").unwrap().is_none());
    }

    #[test]
    fn test_set_and_overwrite() {
        let db = test_db();
        set(&db, "AutoCreateActions", "1").unwrap();
        assert_eq!(get(&db, "AutoCreateActions").unwrap().as_deref(), Some("1"));

        set(&db, "AutoCreateActions", "0").unwrap();
        assert_eq!(get(&db, "AutoCreateActions").unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn test_get_bool() {
        let db = test_db();
        assert!(!get_bool(&db, "EnableLoadBalancing", false).unwrap());
        assert!(get_bool(&db, "EnableLoadBalancing", true).unwrap());

        set(&db, "EnableLoadBalancing", "1").unwrap();
        assert!(get_bool(&db, "EnableLoadBalancing", false).unwrap());

        set(&db, "EnableLoadBalancing", "TRUE").unwrap();
        assert!(get_bool(&db, "EnableLoadBalancing", false).unwrap());

        set(&db, "EnableLoadBalancing", "0").unwrap();
        assert!(!get_bool(&db, "EnableLoadBalancing", true).unwrap());
    }

    #[test]
    fn test_get_u64() {
        let db = test_db();
        assert_eq!(get_u64(&db, "NumberOfConnectionRetries", 10).unwrap(), 10);

        set(&db, "NumberOfConnectionRetries", "25").unwrap();
        assert_eq!(get_u64(&db, "NumberOfConnectionRetries", 10).unwrap(), 25);

        set(&db, "NumberOfConnectionRetries", "garbage").unwrap();
        assert_eq!(get_u64(&db, "NumberOfConnectionRetries", 10).unwrap(), 10);
    }
}
