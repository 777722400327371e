//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: blocks and scans.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One block per delivery, hash-linked by block_number
        CREATE TABLE blocks (
            block_number INTEGER PRIMARY KEY,     -- 1-based, no gaps
            delivery_ref TEXT NOT NULL UNIQUE,
            payload TEXT NOT NULL,                -- canonical text of the snapshot
            created_at INTEGER NOT NULL,          -- Unix ms, part of the hash
            previous_hash TEXT NOT NULL,          -- 64 hex, zeros for genesis
            hash TEXT NOT NULL,                   -- 64 hex
            qr_token TEXT NOT NULL UNIQUE
        );

        -- Custody checks, append-only
        CREATE TABLE scans (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order, breaks ties
            scan_id TEXT NOT NULL UNIQUE,
            block_number INTEGER NOT NULL REFERENCES blocks(block_number),
            scanner_identity TEXT NOT NULL,
            location TEXT,
            scan_type TEXT NOT NULL,
            notes TEXT,
            latitude REAL,
            longitude REAL,
            scanned_at INTEGER NOT NULL           -- Unix ms
        );

        CREATE INDEX idx_scans_block ON scans(block_number, scanned_at, seq);
        "#,
    )?;

    Ok(())
}

/// Migration v2: verification stamp on blocks.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE blocks ADD COLUMN verified_at INTEGER;   -- Unix ms, not hashed
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
