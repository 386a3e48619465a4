//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Users, keyed by the identity provider subject
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            cognito_sub TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Playback devices bound to a single owner
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            device_code TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id);

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Streaming channels imported from playlists
        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            tvg_name TEXT NOT NULL DEFAULT '',
            tvg_logo TEXT NOT NULL DEFAULT '',
            group_title TEXT NOT NULL DEFAULT '',
            stream_url TEXT NOT NULL,
            source_url TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_channels_group ON channels(group_title);
        CREATE INDEX IF NOT EXISTS idx_channels_source ON channels(source_url);

        PRAGMA user_version = 2;
        ",
    )?;

    Ok(())
}
