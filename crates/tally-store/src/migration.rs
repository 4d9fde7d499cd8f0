//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Transactions table: stores all admitted transactions
        CREATE TABLE transactions (
            tx_id BLOB PRIMARY KEY,        -- 32 bytes, Blake3 hash of canonical bytes
            version INTEGER NOT NULL,      -- schema version of the transaction
            timestamp INTEGER NOT NULL,    -- originator-claimed timestamp (Unix ms)
            participants BLOB NOT NULL,    -- CBOR array of 32-byte peer ids
            inputs BLOB NOT NULL,          -- CBOR array of consumed entry refs
            outputs BLOB NOT NULL,         -- CBOR array of 32-byte entry ids
            memo_hash BLOB NOT NULL,       -- 32 bytes, Blake3 hash of memo
            memo BLOB NOT NULL,            -- raw memo bytes
            endorsements BLOB NOT NULL,    -- CBOR array of endorsements
            canonical_bytes BLOB NOT NULL, -- cached canonical encoding
            admitted_at INTEGER NOT NULL   -- local timestamp of admission
        );

        -- Entry records: current head and version history per entry
        CREATE TABLE entries (
            entry_id BLOB PRIMARY KEY,
            head_tx_id BLOB NOT NULL,
            history BLOB NOT NULL,         -- CBOR array of tx ids, oldest first
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Involvement index for the sync protocol
        CREATE TABLE tx_participants (
            peer_id BLOB NOT NULL,
            tx_id BLOB NOT NULL,
            PRIMARY KEY (peer_id, tx_id)
        );

        -- Indexes for common queries
        CREATE INDEX idx_tx_participants_tx ON tx_participants(tx_id);
        CREATE INDEX idx_transactions_timestamp ON transactions(timestamp);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
