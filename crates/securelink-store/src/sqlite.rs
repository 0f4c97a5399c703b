//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for SecureLink. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::debug;

use securelink_core::{
    from_cbor, to_cbor, AccessOutcome, AccessRecord, AuditAction, AuditError, AuditEvent,
    AuditFilter, AuditOutcome, AuditSink, FileRef, LinkId, LinkPolicy, LinkState, LinkStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    AccessCommit, AuditLog, ContentMetadata, ContentStore, InsertResult, LinkStore,
};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. Link and content operations use
/// spawn_blocking to avoid blocking the async runtime; audit appends are
/// synchronous and hold the connection only for a single insert.
///
/// Several processes may open the same file. Every check-then-write runs
/// in an `IMMEDIATE` transaction, which takes the database write lock before
/// the first read, so the check still holds when the write commits.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Begin a transaction holding the write lock from its first statement.
fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn content_exists(conn: &Connection, file_ref: &FileRef) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM content WHERE file_ref = ?1)",
        params![file_ref.as_bytes().as_slice()],
        |row| row.get(0),
    )?)
}

fn fixed_bytes<const N: usize>(bytes: Vec<u8>, column: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|b: Vec<u8>| {
        StoreError::InvalidData(format!("{} has {} bytes, expected {}", column, b.len(), N))
    })
}

fn outcome_to_sql(outcome: AccessOutcome) -> i64 {
    match outcome {
        AccessOutcome::Denied => 0,
        AccessOutcome::Granted => 1,
    }
}

fn outcome_from_sql(value: i64) -> rusqlite::Result<AccessOutcome> {
    match value {
        0 => Ok(AccessOutcome::Denied),
        1 => Ok(AccessOutcome::Granted),
        other => Err(rusqlite::Error::IntegralValueOutOfRange(1, other)),
    }
}

fn audit_outcome_to_sql(outcome: AuditOutcome) -> &'static str {
    match outcome {
        AuditOutcome::Success => "success",
        AuditOutcome::Failure => "failure",
    }
}

fn text_conversion_error(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, msg.into())
}

fn row_to_audit_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let action: String = row.get("action")?;
    let action: AuditAction = action.parse().map_err(|e| text_conversion_error(0, e))?;

    let outcome = match row.get::<_, String>("outcome")?.as_str() {
        "success" => AuditOutcome::Success,
        "failure" => AuditOutcome::Failure,
        other => return Err(text_conversion_error(4, format!("unknown outcome {}", other))),
    };

    let link_id = row
        .get::<_, Option<Vec<u8>>>("link_id")?
        .map(|b| {
            <[u8; 16]>::try_from(b)
                .map(LinkId::from_bytes)
                .map_err(|_| text_conversion_error(1, "bad link_id length".into()))
        })
        .transpose()?;
    let file_ref = row
        .get::<_, Option<Vec<u8>>>("file_ref")?
        .map(|b| {
            <[u8; 32]>::try_from(b)
                .map(FileRef::from_bytes)
                .map_err(|_| text_conversion_error(2, "bad file_ref length".into()))
        })
        .transpose()?;

    Ok(AuditEvent {
        action,
        link_id,
        file_ref,
        timestamp: row.get("timestamp")?,
        outcome,
        reason_detail: row.get("reason_detail")?,
    })
}

fn row_to_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentMetadata> {
    let size: i64 = row.get("size")?;
    Ok(ContentMetadata {
        name: row.get("name")?,
        size: u64::try_from(size).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, size))?,
        mime: row.get("mime")?,
        uploaded_at: row.get("uploaded_at")?,
    })
}

fn load_history(conn: &Connection, id: &LinkId) -> Result<Vec<AccessRecord>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, outcome, detail FROM access_records
         WHERE link_id = ?1 ORDER BY seq",
    )?;

    let records = stmt
        .query_map(params![id.as_bytes().as_slice()], |row| {
            Ok(AccessRecord {
                timestamp: row.get(0)?,
                outcome: outcome_from_sql(row.get(1)?)?,
                detail: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

fn load_status(conn: &Connection, id: &LinkId) -> Result<Option<LinkStatus>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT status FROM links WHERE link_id = ?1",
            params![id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;

    blob.map(|b| from_cbor(&b).map_err(StoreError::from))
        .transpose()
}

fn load_link(conn: &Connection, id: &LinkId) -> Result<Option<LinkState>> {
    let row: Option<(Vec<u8>, Vec<u8>)> = conn
        .query_row(
            "SELECT policy, status FROM links WHERE link_id = ?1",
            params![id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((policy, status)) = row else {
        return Ok(None);
    };

    let policy: LinkPolicy = from_cbor(&policy)?;
    let status: LinkStatus = from_cbor(&status)?;
    let history = load_history(conn, id)?;

    Ok(Some(LinkState::from_parts(policy, status, history)))
}

// ─────────────────────────────────────────────────────────────────────────────
// LinkStore
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LinkStore for SqliteStore {
    async fn insert_link(&self, id: &LinkId, state: &LinkState) -> Result<InsertResult> {
        let id = *id;
        let policy = to_cbor(state.policy())?;
        let status = to_cbor(state.status())?;
        let file_ref = *state.policy().file_ref();
        let created_at = state.policy().created_at();
        let history = state.access_history().to_vec();

        self.run(move |conn| {
            let tx = write_tx(conn)?;

            if !content_exists(&tx, &file_ref)? {
                return Ok(InsertResult::MissingContent);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO links (link_id, file_ref, policy, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_bytes().as_slice(),
                    file_ref.as_bytes().as_slice(),
                    policy,
                    status,
                    created_at,
                ],
            )?;

            if inserted == 0 {
                return Ok(InsertResult::AlreadyExists);
            }

            for (i, record) in history.iter().enumerate() {
                tx.execute(
                    "INSERT INTO access_records (link_id, seq, timestamp, outcome, detail)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.as_bytes().as_slice(),
                        i as i64 + 1,
                        record.timestamp,
                        outcome_to_sql(record.outcome),
                        record.detail,
                    ],
                )?;
            }

            tx.commit()?;
            debug!(link_id = %id, "link inserted");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<LinkState>> {
        let id = *id;
        self.run(move |conn| {
            // One read transaction, so status and history come from the same snapshot.
            let tx = conn.transaction()?;
            let state = load_link(&tx, &id)?;
            Ok(state)
        })
        .await
    }

    async fn append_access(&self, id: &LinkId, record: &AccessRecord) -> Result<AccessCommit> {
        let id = *id;
        let record = record.clone();

        self.run(move |conn| {
            let tx = write_tx(conn)?;

            let mut state = load_link(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.to_hex()))?;
            let closed = state
                .record_access(record.clone())
                .map_err(|e| StoreError::transition(&id, e))?;
            let seq = state.access_history().len() as i64;

            tx.execute(
                "INSERT INTO access_records (link_id, seq, timestamp, outcome, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_bytes().as_slice(),
                    seq,
                    record.timestamp,
                    outcome_to_sql(record.outcome),
                    record.detail,
                ],
            )?;

            if closed {
                tx.execute(
                    "UPDATE links SET status = ?2 WHERE link_id = ?1",
                    params![id.as_bytes().as_slice(), to_cbor(state.status())?],
                )?;
            }

            tx.commit()?;
            debug!(link_id = %id, seq, closed, "access recorded");
            Ok(AccessCommit { state, closed })
        })
        .await
    }

    async fn set_status(&self, id: &LinkId, status: &LinkStatus) -> Result<()> {
        let id = *id;
        let next_status = to_cbor(status)?;
        let closes = !status.is_active();

        self.run(move |conn| {
            let tx = write_tx(conn)?;

            let current = load_status(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.to_hex()))?;

            // Deactivation is one-way and keeps its first reason.
            if current.is_active() && closes {
                tx.execute(
                    "UPDATE links SET status = ?2 WHERE link_id = ?1",
                    params![id.as_bytes().as_slice(), next_status],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_links(&self) -> Result<Vec<(LinkId, LinkState)>> {
        self.run(|conn| {
            let tx = conn.transaction()?;
            let ids: Vec<Vec<u8>> = tx
                .prepare("SELECT link_id FROM links ORDER BY link_id")?
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            let mut links = Vec::with_capacity(ids.len());
            for raw in ids {
                let id = LinkId::from_bytes(fixed_bytes(raw, "link_id")?);
                if let Some(state) = load_link(&tx, &id)? {
                    links.push((id, state));
                }
            }
            Ok(links)
        })
        .await
    }

    async fn remove_link(&self, id: &LinkId) -> Result<bool> {
        let id = *id;

        self.run(move |conn| {
            let tx = write_tx(conn)?;
            tx.execute(
                "DELETE FROM access_records WHERE link_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            let removed = tx.execute(
                "DELETE FROM links WHERE link_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ContentStore
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ContentStore for SqliteStore {
    async fn put_content(&self, bytes: Bytes, metadata: &ContentMetadata) -> Result<FileRef> {
        let metadata = metadata.clone();
        let size = i64::try_from(metadata.size)
            .map_err(|_| StoreError::InvalidData(format!("size {} out of range", metadata.size)))?;

        self.run(move |conn| {
            let file_ref = FileRef::for_content(&bytes);
            conn.execute(
                "INSERT OR IGNORE INTO content (file_ref, name, size, mime, uploaded_at, bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    file_ref.as_bytes().as_slice(),
                    metadata.name,
                    size,
                    metadata.mime,
                    metadata.uploaded_at,
                    bytes.as_ref(),
                ],
            )?;
            debug!(file_ref = %file_ref, bytes = bytes.len(), "content stored");
            Ok(file_ref)
        })
        .await
    }

    async fn get_content(&self, file_ref: &FileRef) -> Result<Option<Bytes>> {
        let file_ref = *file_ref;

        self.run(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT bytes FROM content WHERE file_ref = ?1",
                    params![file_ref.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes.map(Bytes::from))
        })
        .await
    }

    async fn get_metadata(&self, file_ref: &FileRef) -> Result<Option<ContentMetadata>> {
        let file_ref = *file_ref;

        self.run(move |conn| {
            conn.query_row(
                "SELECT name, size, mime, uploaded_at FROM content WHERE file_ref = ?1",
                params![file_ref.as_bytes().as_slice()],
                row_to_metadata,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_content(&self) -> Result<Vec<(FileRef, ContentMetadata)>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT file_ref, name, size, mime, uploaded_at FROM content
                 ORDER BY uploaded_at DESC, file_ref",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    let raw: Vec<u8> = row.get("file_ref")?;
                    Ok((raw, row_to_metadata(row)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(raw, meta)| -> Result<_> {
                    Ok((FileRef::from_bytes(fixed_bytes(raw, "file_ref")?), meta))
                })
                .collect()
        })
        .await
    }

    async fn delete_unreferenced_content(&self, file_ref: &FileRef) -> Result<bool> {
        let file_ref = *file_ref;

        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM content WHERE file_ref = ?1
                 AND NOT EXISTS (SELECT 1 FROM links WHERE file_ref = ?1)",
                params![file_ref.as_bytes().as_slice()],
            )?;
            debug!(file_ref = %file_ref, removed, "unreferenced content deleted");
            Ok(removed > 0)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit log
// ─────────────────────────────────────────────────────────────────────────────

impl AuditSink for SqliteStore {
    fn record(&self, event: &AuditEvent) -> std::result::Result<(), AuditError> {
        let conn = self.conn.lock().map_err(|e| AuditError::new(e.to_string()))?;

        conn.execute(
            "INSERT INTO audit_events (action, link_id, file_ref, timestamp, outcome, reason_detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.action.as_str(),
                event.link_id.map(|id| id.as_bytes().to_vec()),
                event.file_ref.map(|f| f.as_bytes().to_vec()),
                event.timestamp,
                audit_outcome_to_sql(event.outcome),
                event.reason_detail,
            ],
        )
        .map_err(|e| AuditError::new(e.to_string()))?;

        Ok(())
    }
}

impl AuditLog for SqliteStore {
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT action, link_id, file_ref, timestamp, outcome, reason_detail
             FROM audit_events
             WHERE ?1 IS NULL OR action = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;

        let events = stmt
            .query_map(params![filter.action.map(|a| a.as_str())], row_to_audit_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events.into_iter().filter(|e| filter.matches(e)).collect())
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock()?;
        Ok(conn.execute("DELETE FROM audit_events", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use securelink_core::{DeactivationReason, DenyReason, PolicyParams};

    fn meta(name: &str) -> ContentMetadata {
        ContentMetadata {
            name: name.into(),
            size: 5,
            mime: "text/plain".into(),
            uploaded_at: 42,
        }
    }

    async fn stored_file(store: &SqliteStore, bytes: &'static [u8]) -> FileRef {
        store
            .put_content(Bytes::from_static(bytes), &meta("f.txt"))
            .await
            .unwrap()
    }

    fn link_state(file: FileRef, params: PolicyParams) -> LinkState {
        let policy = LinkPolicy::new(file, params, 1_000).unwrap();
        LinkState::new(policy)
    }

    #[tokio::test]
    async fn test_insert_and_get_link() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"hello").await;
        let id = LinkId::from_bytes([1; 16]);
        let state = link_state(file, PolicyParams::by_time(3600).with_password("pw").with_otp());

        assert_eq!(store.insert_link(&id, &state).await.unwrap(), InsertResult::Inserted);

        let loaded = store.get_link(&id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.policy().password_verifier().unwrap().verify("pw"));
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"hello").await;
        let id = LinkId::from_bytes([1; 16]);

        store
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(2)))
            .await
            .unwrap();
        let result = store
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(5)))
            .await
            .unwrap();

        assert_eq!(result, InsertResult::AlreadyExists);
        let stored = store.get_link(&id).await.unwrap().unwrap();
        assert_eq!(stored.policy().download_limit(), Some(2));
    }

    #[tokio::test]
    async fn test_insert_requires_content() {
        let store = SqliteStore::open_memory().unwrap();
        let id = LinkId::from_bytes([1; 16]);
        let missing = FileRef::from_bytes([8; 32]);

        let result = store
            .insert_link(&id, &link_state(missing, PolicyParams::by_downloads(1)))
            .await
            .unwrap();
        assert_eq!(result, InsertResult::MissingContent);
        assert!(store.get_link(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_order_and_atomic_close() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"hello").await;
        let id = LinkId::from_bytes([1; 16]);
        store
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(2)))
            .await
            .unwrap();

        store
            .append_access(&id, &AccessRecord::denied(10, DenyReason::PasswordIncorrect))
            .await
            .unwrap();
        let first = store
            .append_access(&id, &AccessRecord::granted(20, "a"))
            .await
            .unwrap();
        assert!(!first.closed);
        let last = store
            .append_access(&id, &AccessRecord::granted(30, "b"))
            .await
            .unwrap();
        assert!(last.closed);

        let state = store.get_link(&id).await.unwrap().unwrap();
        assert_eq!(state, last.state);
        let stamps: Vec<_> = state.access_history().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
        assert_eq!(state.grants(), 2);
        assert_eq!(
            state.status(),
            &LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached)
        );

        let err = store
            .append_access(&id, &AccessRecord::granted(40, "c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LinkClosed(_)));
    }

    #[tokio::test]
    async fn test_set_status_keeps_first_reason() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"hello").await;
        let id = LinkId::from_bytes([1; 16]);
        store
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(1)))
            .await
            .unwrap();

        let first = LinkStatus::Deactivated(DeactivationReason::manual("first"));
        store.set_status(&id, &first).await.unwrap();
        store
            .set_status(&id, &LinkStatus::Deactivated(DeactivationReason::manual("second")))
            .await
            .unwrap();
        store.set_status(&id, &LinkStatus::Active).await.unwrap();

        assert_eq!(store.get_link(&id).await.unwrap().unwrap().status(), &first);
    }

    #[tokio::test]
    async fn test_missing_link_errors() {
        let store = SqliteStore::open_memory().unwrap();
        let id = LinkId::from_bytes([9; 16]);

        assert!(store.get_link(&id).await.unwrap().is_none());
        let err = store
            .append_access(&id, &AccessRecord::granted(1, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_and_remove_links() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"hello").await;
        let a = LinkId::from_bytes([1; 16]);
        let b = LinkId::from_bytes([2; 16]);
        store
            .insert_link(&b, &link_state(file, PolicyParams::by_downloads(1)))
            .await
            .unwrap();
        store
            .insert_link(&a, &link_state(file, PolicyParams::by_downloads(2)))
            .await
            .unwrap();
        store
            .append_access(&a, &AccessRecord::granted(1, ""))
            .await
            .unwrap();

        let ids: Vec<_> = store.list_links().await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);

        assert!(store.remove_link(&a).await.unwrap());
        assert!(!store.remove_link(&a).await.unwrap());
        assert!(store.get_link(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let meta = meta("notes.txt");

        let file_ref = store
            .put_content(Bytes::from_static(b"hello"), &meta)
            .await
            .unwrap();
        assert_eq!(file_ref, FileRef::for_content(b"hello"));

        // Same bytes, same address, no error.
        let again = store
            .put_content(Bytes::from_static(b"hello"), &meta)
            .await
            .unwrap();
        assert_eq!(again, file_ref);

        assert_eq!(
            store.get_content(&file_ref).await.unwrap().unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(store.get_metadata(&file_ref).await.unwrap().unwrap(), meta);
        assert_eq!(store.list_content().await.unwrap(), vec![(file_ref, meta)]);

        assert!(store.delete_unreferenced_content(&file_ref).await.unwrap());
        assert!(!store.has_content(&file_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_referenced_content_is_kept() {
        let store = SqliteStore::open_memory().unwrap();
        let file = stored_file(&store, b"shared").await;
        let a = LinkId::from_bytes([1; 16]);
        let b = LinkId::from_bytes([2; 16]);
        for id in [a, b] {
            store
                .insert_link(&id, &link_state(file, PolicyParams::by_downloads(1)))
                .await
                .unwrap();
        }

        store.remove_link(&a).await.unwrap();
        assert!(!store.delete_unreferenced_content(&file).await.unwrap());
        assert!(store.has_content(&file).await.unwrap());

        store.remove_link(&b).await.unwrap();
        assert!(store.delete_unreferenced_content(&file).await.unwrap());
        assert!(!store.has_content(&file).await.unwrap());
    }

    #[test]
    fn test_audit_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let id = LinkId::from_bytes([3; 16]);
        let file = FileRef::from_bytes([4; 32]);

        store.record(&AuditEvent::uploaded(file, 1, "a.txt")).unwrap();
        store
            .record(&AuditEvent::success(AuditAction::LinkGenerated, id, 2).with_file(file))
            .unwrap();
        store
            .record(
                &AuditEvent::failure(AuditAction::AccessDenied, id, 3, "password_incorrect")
                    .with_file(file),
            )
            .unwrap();

        let all = store.query(&AuditFilter::all()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, 3);
        assert_eq!(all[0].outcome, AuditOutcome::Failure);
        assert_eq!(all[2].link_id, None);

        let denied = store
            .query(&AuditFilter::all().action(AuditAction::AccessDenied))
            .unwrap();
        assert_eq!(denied.len(), 1);

        let searched = store.query(&AuditFilter::all().search("A.TXT")).unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].action, AuditAction::FileUploaded);

        assert_eq!(store.clear().unwrap(), 3);
        assert!(store.query(&AuditFilter::all()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let id = LinkId::from_bytes([5; 16]);

        {
            let store = SqliteStore::open(&path).unwrap();
            let file = stored_file(&store, b"hello").await;
            store
                .insert_link(&id, &link_state(file, PolicyParams::by_downloads(3)))
                .await
                .unwrap();
            store
                .append_access(&id, &AccessRecord::granted(1, ""))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let state = store.get_link(&id).await.unwrap().unwrap();
        assert_eq!(state.remaining_downloads(), Some(2));
    }

    #[tokio::test]
    async fn test_stale_reads_across_handles_cannot_overshoot_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        let file = stored_file(&first, b"contended").await;
        let id = LinkId::from_bytes([6; 16]);
        first
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(1)))
            .await
            .unwrap();

        // Both handles see one download left before either writes.
        assert_eq!(first.get_link(&id).await.unwrap().unwrap().remaining_downloads(), Some(1));
        assert_eq!(second.get_link(&id).await.unwrap().unwrap().remaining_downloads(), Some(1));

        let commit = first
            .append_access(&id, &AccessRecord::granted(1, "a"))
            .await
            .unwrap();
        assert!(commit.closed);

        let err = second
            .append_access(&id, &AccessRecord::granted(2, "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LinkClosed(_)));

        let state = second.get_link(&id).await.unwrap().unwrap();
        assert_eq!(state.grants(), 1);
        assert!(!state.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grants_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let handles: Vec<_> = (0..3).map(|_| SqliteStore::open(&path).unwrap()).collect();

        let file = stored_file(&handles[0], b"contended").await;
        let id = LinkId::from_bytes([7; 16]);
        handles[0]
            .insert_link(&id, &link_state(file, PolicyParams::by_downloads(2)))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..9)
            .map(|i| {
                let store = handles[i % handles.len()].clone();
                tokio::spawn(async move {
                    store
                        .append_access(&id, &AccessRecord::granted(i as i64, ""))
                        .await
                })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => granted += 1,
                Err(StoreError::LinkClosed(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(granted, 2);
        let state = handles[2].get_link(&id).await.unwrap().unwrap();
        assert_eq!(state.grants(), 2);
        assert_eq!(
            state.status(),
            &LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached)
        );
    }
}
