//! SQLite connection pool and schema bootstrap.
//!
//! Grounded on `DbManager`: a pooled connection manager that owns schema
//! migration and exposes a cheap health check, minus SQLCipher passphrase
//! handling, which this engine has no use for.

use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use relaybox_domain::{RelayError, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub type SqlitePool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct DbManager {
    pool: SqlitePool,
    path: PathBuf,
}

impl DbManager {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_pool_size(path, 8)
    }

    /// In-memory connections are each a distinct database, so callers that
    /// need a shared one (tests, single-process demos) must cap the pool
    /// at one connection.
    pub fn in_memory() -> Result<Self> {
        Self::with_pool_size(":memory:", 1)
    }

    fn with_pool_size(path: impl AsRef<Path>, max_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| RelayError::Database(format!("failed to build pool: {e}")))?;
        let manager = Self { pool, path };
        manager.run_migrations()?;
        Ok(manager)
    }

    pub fn get_connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| RelayError::Database(format!("failed to get connection: {e}")))
    }

    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| RelayError::Database(format!("migration failed: {e}")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| RelayError::Database(format!("health check failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_schema_and_reports_healthy() {
        let manager = DbManager::in_memory().unwrap();
        manager.health_check().unwrap();
        let conn = manager.get_connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM local_msgs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
