use std::fs;
use std::path::Path;

use rusqlite::Connection;

use super::StorageError;

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_initial.sql"))];

/// Open the on-disk database at `path`, creating parent directories and
/// applying any pending migrations.
pub fn open_database(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
    }

    let mut conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&mut conn)?;
    tracing::debug!(path = %path.display(), "opened observation database");
    Ok(conn)
}

/// Open an in-memory database (for tests and benchmarks)
pub fn open_memory_database() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Apply every migration newer than the recorded schema version.
pub fn run_migrations(conn: &mut Connection) -> Result<(), StorageError> {
    apply_migrations(conn, MIGRATIONS)
}

/// Each migration runs in its own transaction; a failure leaves the schema
/// at the previous version.
fn apply_migrations(conn: &mut Connection, migrations: &[(i64, &str)]) -> Result<(), StorageError> {
    let current_version = current_version(conn)?;

    for &(version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            let failed = |e: rusqlite::Error| StorageError::MigrationFailed {
                version,
                reason: e.to_string(),
            };
            let tx = conn.transaction().map_err(failed)?;
            tx.execute_batch(sql).map_err(failed)?;
            tx.commit().map_err(failed)?;
        }
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, StorageError> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}
