//! Database schema migrations for schedua.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version. Column additions are check-then-add against
//! `pragma_table_info`, so re-running against an already-migrated store is
//! harmless.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    // Ensure schema_version table exists
    create_schema_version_table(conn)?;

    // Get current version
    let current_version = get_schema_version(conn);

    // Apply migrations sequentially
    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            0
        } else {
            tracing::warn!("failed to read schema_version: {e}");
            0
        }
    })
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Add a column unless the table already has it.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    declaration: &str,
) -> SqliteResult<()> {
    let present: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get::<_, i32>(0),
        )
        .unwrap_or(0)
        > 0;

    if !present {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration};"))?;
    }
    Ok(())
}

/// Migration v1: baseline schema.
///
/// Series, exceptions, holiday calendars/entries and the two single-row
/// tables (general settings, runtime override), with indices for the
/// range queries the resolver issues.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schedules (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name            TEXT NOT NULL,
            endpoint             TEXT NOT NULL,
            node_id              TEXT NOT NULL,
            target_value         TEXT NOT NULL,
            rrule_str            TEXT NOT NULL,
            is_enabled           INTEGER NOT NULL DEFAULT 1,
            security_policy      TEXT NOT NULL DEFAULT 'None',
            security_mode        TEXT NOT NULL DEFAULT 'None',
            username             TEXT NOT NULL DEFAULT '',
            password             TEXT NOT NULL DEFAULT '',
            timeout_secs         INTEGER NOT NULL DEFAULT 10,
            write_timeout_secs   INTEGER NOT NULL DEFAULT 5,
            created_at           TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at           TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS schedule_exceptions (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id           INTEGER NOT NULL,
            occurrence_date       TEXT NOT NULL,
            action                TEXT NOT NULL,
            override_start        TEXT,
            override_end          TEXT,
            override_task_name    TEXT,
            override_target_value TEXT,
            note                  TEXT,
            UNIQUE (schedule_id, occurrence_date),
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS holiday_calendars (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            description TEXT,
            is_default  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS holiday_entries (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            calendar_id           INTEGER NOT NULL,
            holiday_date          TEXT NOT NULL,
            name                  TEXT NOT NULL,
            is_full_day           INTEGER NOT NULL DEFAULT 1,
            start_time            TEXT,
            end_time              TEXT,
            override_target_value TEXT,
            FOREIGN KEY (calendar_id) REFERENCES holiday_calendars(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS general_settings (
            id                INTEGER PRIMARY KEY CHECK (id = 1),
            profile_name      TEXT NOT NULL DEFAULT 'Default',
            description       TEXT,
            enable_schedule   INTEGER NOT NULL DEFAULT 1,
            scan_rate         INTEGER NOT NULL DEFAULT 30,
            refresh_rate      INTEGER NOT NULL DEFAULT 5,
            use_active_period INTEGER NOT NULL DEFAULT 0,
            active_from       TEXT,
            active_to         TEXT,
            output_type       TEXT NOT NULL DEFAULT 'opcua',
            refresh_output    INTEGER NOT NULL DEFAULT 1,
            generate_events   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS runtime_override (
            id             INTEGER PRIMARY KEY CHECK (id = 1),
            override_value TEXT NOT NULL,
            override_until TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_schedules_enabled ON schedules(is_enabled);
        CREATE INDEX IF NOT EXISTS idx_exceptions_date ON schedule_exceptions(occurrence_date);
        CREATE INDEX IF NOT EXISTS idx_holiday_entries_date ON holiday_entries(holiday_date);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: category system.
///
/// Adds the categories table and the category reference columns on
/// schedules, exceptions and holiday entries. Existing series land in
/// category 1.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL UNIQUE,
            bg_color   TEXT NOT NULL,
            fg_color   TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_system  INTEGER NOT NULL DEFAULT 0
        );",
    )?;

    add_column_if_missing(&tx, "schedules", "category_id", "INTEGER NOT NULL DEFAULT 1")?;
    add_column_if_missing(&tx, "schedule_exceptions", "override_category_id", "INTEGER")?;
    add_column_if_missing(&tx, "holiday_entries", "override_category_id", "INTEGER")?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: priority, typed values and write telemetry.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    add_column_if_missing(&tx, "schedules", "priority", "INTEGER NOT NULL DEFAULT 1")?;
    add_column_if_missing(&tx, "schedules", "data_type", "TEXT NOT NULL DEFAULT 'auto'")?;
    add_column_if_missing(&tx, "schedules", "last_execution_status", "TEXT")?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (3)", [])?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test migration from scratch (v0 -> v3)
    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let version = get_schema_version(&conn);
        assert_eq!(version, 3);

        // All late-added columns must exist.
        let mut stmt = conn
            .prepare("SELECT category_id, priority, data_type, last_execution_status FROM schedules")
            .unwrap();
        drop(stmt);
        stmt = conn
            .prepare("SELECT override_category_id, note FROM schedule_exceptions")
            .unwrap();
        drop(stmt);
    }

    /// Test that migrations are idempotent
    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let version = get_schema_version(&conn);
        assert_eq!(version, 3);
    }

    /// Test incremental migration (v1 -> v3) against a database created
    /// before the category system existed.
    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();

        // v1 baseline only.
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO schedules (task_name, endpoint, node_id, target_value, rrule_str)
             VALUES ('Morning start', 'opc.tcp://localhost:4840', 'ns=2;i=1001', '1',
                     'FREQ=DAILY;BYHOUR=8;BYMINUTE=0')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);

        // Pre-existing rows pick up the column defaults.
        let (category_id, priority, data_type): (i64, i64, String) = conn
            .query_row(
                "SELECT category_id, priority, data_type FROM schedules",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(category_id, 1);
        assert_eq!(priority, 1);
        assert_eq!(data_type, "auto");
    }

    /// Re-adding an existing column is a no-op.
    #[test]
    fn test_add_column_if_missing_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        add_column_if_missing(&conn, "schedules", "priority", "INTEGER NOT NULL DEFAULT 1")
            .unwrap();
    }
}
