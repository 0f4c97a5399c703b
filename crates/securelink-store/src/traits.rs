//! Store traits: the abstract interfaces the registry persists through.
//!
//! Links, uploaded content and the audit log live behind separate traits so
//! that a deployment can mix backends. [`MemoryStore`](crate::MemoryStore)
//! and [`SqliteStore`](crate::SqliteStore) implement all three.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use securelink_core::{
    AccessRecord, AuditEvent, AuditFilter, AuditSink, FileRef, LinkId, LinkState, LinkStatus,
    Timestamp,
};

use crate::error::Result;

/// Result of inserting a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Link was inserted.
    Inserted,
    /// A link with this id already exists; nothing was written.
    AlreadyExists,
    /// The link's file is not in the store; nothing was written.
    MissingContent,
}

/// What [`LinkStore::append_access`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCommit {
    /// The link as stored after the append.
    pub state: LinkState,
    /// Whether this record used up the download limit and closed the link.
    pub closed: bool,
}

/// Presentation metadata kept next to stored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// File name as uploaded.
    pub name: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// MIME type as uploaded.
    pub mime: String,
    /// Upload time (Unix ms).
    pub uploaded_at: Timestamp,
}

/// Async interface for link persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` keeps the runtime free.
///
/// # Design Notes
///
/// - **No read-modify-write**: history grows through [`LinkStore::append_access`],
///   which checks the record against the stored state and commits it together
///   with the resulting status. Callers never write a status they computed
///   from an earlier read.
/// - **No policy updates**: a stored policy is never rewritten.
/// - **Shared files**: a store may be opened by several processes at once
///   (one per CLI command). Every check-then-write runs inside one store
///   transaction.
#[async_trait]
pub trait LinkStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Link Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new link.
    ///
    /// # Returns
    /// - `Inserted` if the id was free.
    /// - `AlreadyExists` if the id is taken; the existing link is untouched.
    /// - `MissingContent` if the link's file is not stored. The content check
    ///   and the insert are atomic with respect to
    ///   [`ContentStore::delete_unreferenced_content`].
    async fn insert_link(&self, id: &LinkId, state: &LinkState) -> Result<InsertResult>;

    /// Load a link with its full access history.
    async fn get_link(&self, id: &LinkId) -> Result<Option<LinkState>>;

    /// Append one access record to the stored history.
    ///
    /// The record is checked against the state as stored at commit time, via
    /// [`LinkState::record_access`]. A grant that uses up the download limit
    /// closes the link in the same commit.
    ///
    /// # Errors
    /// - `NotFound` if the link does not exist.
    /// - `LinkClosed` if the link is deactivated.
    /// - `LimitReached` if the record is a grant and the limit is already used.
    async fn append_access(&self, id: &LinkId, record: &AccessRecord) -> Result<AccessCommit>;

    /// Replace the status of a link. A deactivated link keeps its first
    /// reason and never becomes active again.
    ///
    /// Fails with `NotFound` if the link does not exist.
    async fn set_status(&self, id: &LinkId, status: &LinkStatus) -> Result<()>;

    /// All links, oldest id first.
    async fn list_links(&self) -> Result<Vec<(LinkId, LinkState)>>;

    /// Delete a link and its history. Returns whether it existed.
    async fn remove_link(&self, id: &LinkId) -> Result<bool>;
}

/// Async interface for uploaded content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store an encoded envelope. Its [`FileRef`] is the BLAKE3 hash of
    /// `bytes`; storing identical bytes twice is a no-op.
    async fn put_content(&self, bytes: Bytes, metadata: &ContentMetadata) -> Result<FileRef>;

    /// Fetch stored bytes.
    async fn get_content(&self, file_ref: &FileRef) -> Result<Option<Bytes>>;

    /// Fetch metadata without the bytes.
    async fn get_metadata(&self, file_ref: &FileRef) -> Result<Option<ContentMetadata>>;

    /// Check whether content exists.
    async fn has_content(&self, file_ref: &FileRef) -> Result<bool> {
        Ok(self.get_metadata(file_ref).await?.is_some())
    }

    /// All uploads, newest first.
    async fn list_content(&self) -> Result<Vec<(FileRef, ContentMetadata)>>;

    /// Delete content unless a stored link still references it.
    ///
    /// Returns whether anything was deleted. The reference check and the
    /// delete are one atomic step.
    async fn delete_unreferenced_content(&self, file_ref: &FileRef) -> Result<bool>;
}

/// A queryable, append-only audit log.
///
/// Appending goes through [`AuditSink::record`], which is synchronous so the
/// registry can emit events right after a commit.
pub trait AuditLog: AuditSink {
    /// Events matching `filter`, newest first.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;

    /// Drop every stored event. Returns how many were removed.
    fn clear(&self) -> Result<usize>;
}
