//! Database schema.
//!
//! Local and remote databases share one file layout; each opens only the
//! table it needs. The version lives in SQLite's `user_version` pragma.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: &str = r#"
    -- Device-local key-value storage (one key holds the whole day list)
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    -- Remote step documents keyed by "{user_uid}_{date}"
    CREATE TABLE IF NOT EXISTS step_docs (
        key TEXT PRIMARY KEY,
        user_uid TEXT NOT NULL,
        date TEXT NOT NULL,
        steps INTEGER NOT NULL CHECK (steps >= 0),
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_step_docs_user_date
        ON step_docs(user_uid, date);
"#;

/// Create the tables on a fresh database.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = schema_version(conn)?;

    if version == 0 {
        conn.execute_batch(TABLES)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!("Created schema v{}", SCHEMA_VERSION);
    } else if version > SCHEMA_VERSION {
        warn!(
            "Database schema v{} is newer than this build (v{})",
            version, SCHEMA_VERSION
        );
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_both_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();

        assert_eq!(table_names(&conn), vec!["kv", "step_docs"]);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_twice_keeps_data() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES ('k', 'v', 0)",
            [],
        )
        .unwrap();

        initialize(&conn).unwrap();

        let value: String = conn
            .query_row("SELECT value FROM kv WHERE key = 'k'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, "v");
    }

    #[test]
    fn test_negative_steps_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO step_docs (key, user_uid, date, steps, timestamp)
             VALUES ('u_2024-01-01', 'u', '2024-01-01', -1, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
