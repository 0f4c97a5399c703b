//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
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
        -- Links: immutable policy plus current status
        CREATE TABLE links (
            link_id BLOB PRIMARY KEY,         -- 16 bytes
            file_ref BLOB NOT NULL REFERENCES content(file_ref), -- Blake3 of the encoded envelope
            policy BLOB NOT NULL,             -- CBOR LinkPolicy
            status BLOB NOT NULL,             -- CBOR LinkStatus
            created_at INTEGER NOT NULL       -- Unix ms
        );

        -- Access history, append-only per link
        CREATE TABLE access_records (
            link_id BLOB NOT NULL REFERENCES links(link_id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,             -- 1-based position in the history
            timestamp INTEGER NOT NULL,
            outcome INTEGER NOT NULL,         -- 0=denied, 1=granted
            detail TEXT NOT NULL,
            PRIMARY KEY (link_id, seq)
        );

        -- Encoded content envelopes
        CREATE TABLE content (
            file_ref BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            size INTEGER NOT NULL,            -- plaintext bytes
            mime TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            bytes BLOB NOT NULL
        );

        -- Audit log
        CREATE TABLE audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            link_id BLOB,                     -- null for uploads
            file_ref BLOB,
            timestamp INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            reason_detail TEXT
        );

        -- Indexes for common queries
        CREATE INDEX idx_links_file_ref ON links(file_ref);
        CREATE INDEX idx_content_uploaded ON content(uploaded_at);
        CREATE INDEX idx_audit_timestamp ON audit_events(timestamp);
        CREATE INDEX idx_audit_action ON audit_events(action);
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
