//! Database module for Memolane
//!
//! Provides SQLite storage for users and memories.

pub mod schema;

use crate::error::{CoreError, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Database manager wrapping a single mutex-guarded connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;

        // Enable foreign keys
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        // Initialize schema
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path,
        })
    }

    /// Create an in-memory database (tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_db(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    ///
    /// SQLite access is synchronous; handlers call this so query work never
    /// blocks the async runtime.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| CoreError::Api(format!("database task failed: {}", e)))?
        .map_err(CoreError::from)
    }

    /// Get the database file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

// Re-export schema for convenience
pub use schema::init_db;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("memolane.db");

        let db = Database::new(db_path);
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn test_with_conn() {
        let db = Database::in_memory().unwrap();
        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
