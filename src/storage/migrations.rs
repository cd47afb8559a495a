//! Additive schema migrations.
//!
//! Every migration adds one column to an existing table. Migrations are
//! never destructive: each one checks whether the column already exists
//! (fresh databases get it from the base DDL) and only then issues
//! `ALTER TABLE ... ADD COLUMN`. Applied versions are tracked in the
//! `schema_migrations` table so the whole run is idempotent and safe on
//! every open.

use rusqlite::{Connection, Result};
use tracing::{debug, info};

use super::schema::column_exists;

/// A single additive column migration.
struct Migration {
    version: &'static str,
    table: &'static str,
    column: &'static str,
    definition: &'static str,
}

/// All migrations in order.
///
/// Columns present in the first shipped `records` table (id through
/// repeat_rule, sync bookkeeping and timestamps) are not listed here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_add_highlight_flag",
        table: "records",
        column: "highlighted",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    Migration {
        version: "002_add_snooze_state",
        table: "records",
        column: "snooze",
        definition: "TEXT",
    },
    Migration {
        version: "003_add_alarm_config",
        table: "records",
        column: "alarm",
        definition: "TEXT",
    },
    Migration {
        version: "004_add_task_spec",
        table: "records",
        column: "task_spec",
        definition: "TEXT",
    },
    Migration {
        version: "005_add_calendar_link",
        table: "records",
        column: "calendar_event_id",
        definition: "TEXT",
    },
];

/// Run all pending migrations on the database.
///
/// # Errors
///
/// Returns an error if a column cannot be added or the bookkeeping insert
/// fails.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        if column_exists(conn, migration.table, migration.column)? {
            debug!(
                version = migration.version,
                "Column already present, marking migration complete"
            );
        } else {
            info!(version = migration.version, "Applying migration");
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                migration.table, migration.column, migration.definition
            ))?;
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;
    }

    Ok(())
}
