//! Database schema migrations for dopamine.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: members, challenges, their links, and the kv store.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS members (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            nickname               TEXT NOT NULL UNIQUE,
            challenge_refreshed_at TEXT,
            created_at             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS challenges (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            title      TEXT NOT NULL,
            subtitle   TEXT NOT NULL DEFAULT '',
            guide      TEXT NOT NULL DEFAULT '',
            image      TEXT NOT NULL DEFAULT '',
            tier       TEXT NOT NULL CHECK (tier IN ('LOW', 'MID', 'HIGH')),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS challenge_members (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id    INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            challenge_id INTEGER NOT NULL REFERENCES challenges(id) ON DELETE CASCADE,
            position     INTEGER NOT NULL DEFAULT 0,
            issued_at    TEXT NOT NULL,
            UNIQUE (member_id, challenge_id)
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    debug!("applied schema migration v1");
    Ok(())
}

/// Migration v2: index for reading a member's batch in issuing order.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_challenge_members_member_position
            ON challenge_members(member_id, position);
         CREATE INDEX IF NOT EXISTS idx_challenges_tier ON challenges(tier);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    debug!("applied schema migration v2");
    Ok(())
}
