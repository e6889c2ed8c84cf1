//! SQLite schema for the post index.
//!
//! Defines the two post tables, the stream-cursor table, and migration
//! utilities. The serve crate reads the same schema; only this crate
//! writes it.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist and runs any pending migrations.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        migrate(conn, current_version, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Posts admitted by the keyword filter
        CREATE TABLE IF NOT EXISTS filtered_post (
            uri TEXT PRIMARY KEY,
            cid TEXT NOT NULL,
            indexed_at TEXT NOT NULL
        );

        -- Posts admitted by the personal-site classifier
        CREATE TABLE IF NOT EXISTS site_post (
            uri TEXT PRIMARY KEY,
            cid TEXT NOT NULL,
            handle TEXT NOT NULL,
            indexed_at TEXT NOT NULL
        );

        -- Stream resume position, one row per logical subscription
        CREATE TABLE IF NOT EXISTS stream_cursor (
            stream_id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Newest-first feed queries
        CREATE INDEX IF NOT EXISTS idx_filtered_post_indexed_at
            ON filtered_post(indexed_at DESC);
        CREATE INDEX IF NOT EXISTS idx_site_post_indexed_at
            ON site_post(indexed_at DESC);
        "#,
    )?;

    Ok(())
}

/// Run migrations from one version to another.
fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    // No migrations yet; schema version 1 is the initial layout.
    let _ = (conn, from);
    set_schema_version(conn, to)?;
    Ok(())
}
