//! SQLite store: connection handling and schema migrations.
//!
//! The store owns a single connection behind a mutex; every service clones the
//! `Store` handle. Serialising writes through one connection is the concurrency
//! model of this system (last-write-wins, see DESIGN.md) — the database's own
//! transactions are the only coordination.

use crate::{HmisError, HmisResult};
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the relational store.
///
/// Cheap to clone; all clones share one connection. Opening the store runs any
/// pending migrations — a migration failure is fatal to startup by design.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `HmisError::Sqlite` if the file cannot be opened and
    /// `HmisError::MigrationFailed` if a migration script fails.
    pub fn open(path: &Path) -> HmisResult<Self> {
        let conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (tests and ephemeral tooling).
    pub fn open_in_memory() -> HmisResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the underlying connection.
    ///
    /// A poisoned mutex yields the inner connection anyway: SQLite state is
    /// consistent even if another thread panicked mid-request.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of user tables, used by startup verification and tests.
    pub fn table_count(&self) -> HmisResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn configure_pragmas(conn: &Connection) -> HmisResult<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// Run all pending migrations in order.
pub fn run_migrations(conn: &Connection) -> HmisResult<()> {
    let current = current_version(conn);

    let migrations: &[(i64, &str)] = &[(1, include_str!("migrations/001_initial.sql"))];

    for (version, sql) in migrations {
        if *version > current {
            tracing::info!("applying schema migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| HmisError::MigrationFailed {
                    version: *version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version, 0 when the schema does not exist yet.
fn current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Current UTC instant as RFC 3339, the storage format for all timestamps.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_all_tables() {
        let store = Store::open_in_memory().unwrap();
        // 32 entity tables + schema_version + sequences
        assert!(store.table_count().unwrap() >= 30);
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = Store::open_in_memory().unwrap();
        assert!(run_migrations(&store.conn()).is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let store = Store::open_in_memory().unwrap();
        let fk: i64 = store
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn open_creates_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hmis.sqlite3");
        {
            let store = Store::open(&path).unwrap();
            assert!(store.table_count().unwrap() > 0);
        }
        let reopened = Store::open(&path).unwrap();
        let version: i64 = reopened
            .conn()
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }
}
