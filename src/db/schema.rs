//! SQLite schema for Memolane
//!
//! Manages users and their memory records.

use rusqlite::{Connection, Result};

/// Initialize the database with required tables
pub fn init_db(conn: &Connection) -> Result<()> {
    // Enable foreign key enforcement for CASCADE deletes
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Users table - accounts identified by a bearer token issued at registration
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Memories table - one photo with title, description, and calendar date
    conn.execute(
        "CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            image_path TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Timeline queries filter by owner and order by memory date
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memories_user_date
         ON memories(user_id, date DESC, created_at DESC)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_token ON users(token)",
        [],
    )?;

    Ok(())
}
