//! Database schema definitions.
//!
//! The local store is a single `records` table keyed by local id. Compound
//! sub-objects (snooze state, alarm config, task spec) are stored as JSON
//! text and only ever parsed in the row-mapping code of
//! [`super::store`].

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Table definitions.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    remote_id TEXT,
    owner_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    pinned INTEGER NOT NULL DEFAULT 0,
    highlighted INTEGER NOT NULL DEFAULT 0,
    trigger_at INTEGER,
    trigger_end_at INTEGER,
    timezone TEXT,
    repeat_rule TEXT,
    snooze TEXT,
    alarm TEXT,
    task_spec TEXT,
    calendar_event_id TEXT,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    synced_at INTEGER,
    deleted_at INTEGER,
    CHECK (kind IN ('note', 'reminder', 'task')),
    CHECK (status IN ('open', 'done', 'archived')),
    CHECK (sync_status IN ('pending', 'synced', 'conflict'))
);
";

/// Secondary lookups. Applied after migrations so that every indexed column
/// exists on upgraded databases.
pub const INDEX_SQL: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_remote_id ON records(remote_id);
CREATE INDEX IF NOT EXISTS idx_records_owner_kind ON records(owner_id, kind);
CREATE INDEX IF NOT EXISTS idx_records_owner_status ON records(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_records_owner_sync ON records(owner_id, sync_status);
CREATE INDEX IF NOT EXISTS idx_records_owner_created ON records(owner_id, created_at DESC);
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS` and column additions go
/// through [`super::migrations::run_migrations`].
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Upgrade databases created by older builds
    super::migrations::run_migrations(conn)?;

    conn.execute_batch(INDEX_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

/// Check if a column exists in a table.
pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?1");
    conn.prepare(&sql)?.exists([column])
}
