use chipi_common::{Error, Result};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::migrations::MIGRATIONS;

/// The single SQLite file behind every per-user table.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            std::fs::create_dir_all(dir)?;
            info!("created database directory {}", dir.display());
        }

        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        // Foreign keys stay declarative: child rows are never cascaded.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Location on disk, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

        let applied: u32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
            conn.execute_batch(migration.sql).map_err(|e| {
                Error::Database(format!("migration {} failed: {e}", migration.name))
            })?;
            conn.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                params![migration.version, migration.name],
            )
            .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
            info!(
                "applied migration {} ({})",
                migration.version, migration.name
            );
        }

        Ok(())
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::Database;
    use chipi_common::UserId;

    /// Fresh in-memory database with one registered user per phone.
    pub(crate) fn db_with_users(phones: &[&str]) -> (Database, Vec<UserId>) {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let ids = phones
            .iter()
            .map(|phone| {
                assert!(db.create_user(phone, "secreto").expect("insert user"));
                db.validate_user(phone, "secreto")
                    .expect("lookup user")
                    .expect("user should exist")
                    .id
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn in_memory_creates_all_tables() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let conn = db.connection().expect("lock should not be poisoned");

        for table in [
            "users",
            "conversations",
            "passwords",
            "reminders",
            "contacts",
            "user_preferences",
        ] {
            let exists: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("failed to query sqlite_master");
            assert_eq!(exists, 1, "missing table {table}");
        }
    }

    #[test]
    fn migrations_are_recorded_once() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        db.run_migrations().expect("rerun should be a no-op");

        let conn = db.connection().expect("lock should not be poisoned");
        let count: i64 = conn
            .query_row("SELECT count(*) FROM _migrations", [], |row| row.get(0))
            .expect("failed to count migrations");
        assert_eq!(count as usize, crate::migrations::MIGRATIONS.len());
    }

    #[test]
    fn open_creates_missing_parent_directory() {
        let dir = std::env::temp_dir().join(format!(
            "chipi-db-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock should be after unix epoch")
                .as_nanos()
        ));
        let path = dir.join("data").join("chipi.db");

        let db = Database::open(&path).expect("open should create the directory");
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());

        drop(db);
        let _ = std::fs::remove_dir_all(dir);
    }
}
