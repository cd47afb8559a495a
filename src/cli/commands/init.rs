//! Create the local record database.
//!
//! The database lives at `~/.tack/data/tack.db` unless `--db`, `TACK_DB` or
//! `TACK_HOME` point elsewhere. Opening it applies the schema, so a fresh
//! file is ready to use as soon as this returns.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::RecordStore;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    schema_version: i32,
    reinitialized: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `Error::AlreadyInitialized` if the database exists and `force`
/// is not set, or an error if the directory or database cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the tack data directory".to_string())
    })?;

    let existed = db_path.exists();
    if existed && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if existed {
        remove_database(&db_path)?;
    }

    RecordStore::open(&db_path)?;

    if json {
        let output = InitOutput {
            database: db_path,
            schema_version: CURRENT_SCHEMA_VERSION,
            reinitialized: existed,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        if existed {
            println!("Reinitialized tack database");
        } else {
            println!("Initialized tack database");
        }
        println!("  Database: {}", db_path.display());
        println!();
        println!("Next: `tack config set endpoint <URL>` to enable sync.");
    }

    Ok(())
}

/// Remove the database file and its WAL side files.
fn remove_database(db_path: &Path) -> Result<()> {
    fs::remove_file(db_path)?;
    for suffix in ["-wal", "-shm"] {
        let mut side = db_path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            fs::remove_file(side)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordFields;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/tack.db");

        execute(Some(&db_path), false, true).unwrap();

        assert!(db_path.exists());
        let store = RecordStore::open(&db_path).unwrap();
        assert_eq!(store.count_pending("u1").unwrap(), 0);
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("tack.db");

        execute(Some(&db_path), false, true).unwrap();
        let result = execute(Some(&db_path), false, true);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_force_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("tack.db");

        execute(Some(&db_path), false, true).unwrap();
        {
            let mut store = RecordStore::open(&db_path).unwrap();
            store.create("u1", RecordFields::note("Keep me?")).unwrap();
        }

        execute(Some(&db_path), true, true).unwrap();
        let store = RecordStore::open(&db_path).unwrap();
        assert_eq!(store.count_pending("u1").unwrap(), 0);
    }
}
