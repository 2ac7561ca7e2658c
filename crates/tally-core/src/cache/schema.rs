//! Local cache schema and its `PRAGMA user_version` migrations.

use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 3;

/// Collections as JSON arrays, one row per account and category.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS cache_entries (
    account    TEXT NOT NULL,
    category   TEXT NOT NULL CHECK (category IN ('customers', 'items', 'deleted_ids')),
    value      TEXT NOT NULL,
    written_at TEXT NOT NULL,
    PRIMARY KEY (account, category)
);

CREATE TABLE IF NOT EXISTS session (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    account TEXT
);

INSERT OR IGNORE INTO session (id, account) VALUES (1, NULL);
";

/// Per-account sync bookkeeping, so `status` in a later process sees it.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sync_meta (
    account        TEXT PRIMARY KEY,
    dirty          INTEGER NOT NULL DEFAULT 0,
    last_synced_at TEXT,
    suspended      INTEGER NOT NULL DEFAULT 0,
    last_error     TEXT
);
";

/// This device's identity and the timing of its current session.
pub const MIGRATION_V3_SQL: &str = r"
ALTER TABLE session ADD COLUMN device_id TEXT;
ALTER TABLE session ADD COLUMN started_at TEXT;
ALTER TABLE session ADD COLUMN last_ping_at TEXT;
";

const MIGRATIONS: &[(u32, &str)] = &[
    (1, MIGRATION_V1_SQL),
    (2, MIGRATION_V2_SQL),
    (3, MIGRATION_V3_SQL),
];

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if the query fails or the stored value is negative.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply pending migrations in ascending order, one transaction each.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2)",
            [table, column],
            |row| row.get(0),
        )
    }

    fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        for table in ["cache_entries", "session", "sync_meta"] {
            assert!(table_exists(&conn, table)?, "missing table {table}");
        }
        for column in ["device_id", "started_at", "last_ping_at"] {
            assert!(column_exists(&conn, "session", column)?, "missing column {column}");
        }
        Ok(())
    }

    #[test]
    fn v2_session_keeps_its_account() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATION_V1_SQL)?;
        conn.execute_batch(MIGRATION_V2_SQL)?;
        conn.pragma_update(None, "user_version", 2)?;
        conn.execute("UPDATE session SET account = 'shop' WHERE id = 1", [])?;

        assert_eq!(migrate(&mut conn)?, 3);
        let (account, device): (Option<String>, Option<String>) = conn.query_row(
            "SELECT account, device_id FROM session WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(account.as_deref(), Some("shop"));
        assert_eq!(device, None);
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        let sessions: i64 = conn.query_row("SELECT COUNT(*) FROM session", [], |row| row.get(0))?;
        assert_eq!(sessions, 1);
        Ok(())
    }

    #[test]
    fn v1_database_upgrades_in_place() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1)?;
        conn.execute(
            "INSERT INTO cache_entries VALUES ('a', 'items', '[]', '2024-01-01T00:00:00.000Z')",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert!(table_exists(&conn, "sync_meta")?);
        assert!(column_exists(&conn, "session", "device_id")?);
        let kept: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        assert_eq!(kept, 1);
        Ok(())
    }
}
