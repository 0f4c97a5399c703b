//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use securelink_core::{
    AccessRecord, AuditError, AuditEvent, AuditFilter, AuditSink, FileRef, LinkId, LinkState,
    LinkStatus,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    AccessCommit, AuditLog, ContentMetadata, ContentStore, InsertResult, LinkStore,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Links indexed by id.
    links: BTreeMap<LinkId, LinkState>,

    /// Encoded envelopes with their metadata.
    content: HashMap<FileRef, StoredContent>,

    /// Audit events in insertion order.
    audit: Vec<AuditEvent>,
}

struct StoredContent {
    bytes: Bytes,
    metadata: ContentMetadata,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Move `state` to `status`. Deactivation is one-way, so an `Active` status
/// never reopens a closed link.
fn apply_status(state: &mut LinkState, status: &LinkStatus) {
    if let LinkStatus::Deactivated(reason) = status {
        state.deactivate(reason.clone());
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn insert_link(&self, id: &LinkId, state: &LinkState) -> Result<InsertResult> {
        let mut inner = self.inner.write()?;

        if inner.links.contains_key(id) {
            return Ok(InsertResult::AlreadyExists);
        }
        if !inner.content.contains_key(state.policy().file_ref()) {
            return Ok(InsertResult::MissingContent);
        }
        inner.links.insert(*id, state.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<LinkState>> {
        let inner = self.inner.read()?;
        Ok(inner.links.get(id).cloned())
    }

    async fn append_access(&self, id: &LinkId, record: &AccessRecord) -> Result<AccessCommit> {
        let mut inner = self.inner.write()?;
        let state = inner
            .links
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;

        let closed = state
            .record_access(record.clone())
            .map_err(|e| StoreError::transition(id, e))?;
        Ok(AccessCommit {
            state: state.clone(),
            closed,
        })
    }

    async fn set_status(&self, id: &LinkId, status: &LinkStatus) -> Result<()> {
        let mut inner = self.inner.write()?;
        let state = inner
            .links
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;

        apply_status(state, status);
        Ok(())
    }

    async fn list_links(&self) -> Result<Vec<(LinkId, LinkState)>> {
        let inner = self.inner.read()?;
        Ok(inner
            .links
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect())
    }

    async fn remove_link(&self, id: &LinkId) -> Result<bool> {
        let mut inner = self.inner.write()?;
        Ok(inner.links.remove(id).is_some())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put_content(&self, bytes: Bytes, metadata: &ContentMetadata) -> Result<FileRef> {
        let file_ref = FileRef::for_content(&bytes);
        let mut inner = self.inner.write()?;

        inner
            .content
            .entry(file_ref)
            .or_insert_with(|| StoredContent {
                bytes,
                metadata: metadata.clone(),
            });
        Ok(file_ref)
    }

    async fn get_content(&self, file_ref: &FileRef) -> Result<Option<Bytes>> {
        let inner = self.inner.read()?;
        Ok(inner.content.get(file_ref).map(|c| c.bytes.clone()))
    }

    async fn get_metadata(&self, file_ref: &FileRef) -> Result<Option<ContentMetadata>> {
        let inner = self.inner.read()?;
        Ok(inner.content.get(file_ref).map(|c| c.metadata.clone()))
    }

    async fn list_content(&self) -> Result<Vec<(FileRef, ContentMetadata)>> {
        let inner = self.inner.read()?;
        let mut files: Vec<_> = inner
            .content
            .iter()
            .map(|(file_ref, c)| (*file_ref, c.metadata.clone()))
            .collect();
        files.sort_by(|a, b| b.1.uploaded_at.cmp(&a.1.uploaded_at).then(a.0.cmp(&b.0)));
        Ok(files)
    }

    async fn delete_unreferenced_content(&self, file_ref: &FileRef) -> Result<bool> {
        let mut inner = self.inner.write()?;
        let referenced = inner
            .links
            .values()
            .any(|state| state.policy().file_ref() == file_ref);
        if referenced {
            return Ok(false);
        }
        Ok(inner.content.remove(file_ref).is_some())
    }
}

impl AuditSink for MemoryStore {
    fn record(&self, event: &AuditEvent) -> std::result::Result<(), AuditError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| AuditError::new(e.to_string()))?;
        inner.audit.push(event.clone());
        Ok(())
    }
}

impl AuditLog for MemoryStore {
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let inner = self.inner.read()?;
        Ok(filter.apply(&inner.audit))
    }

    fn clear(&self) -> Result<usize> {
        let mut inner = self.inner.write()?;
        let removed = inner.audit.len();
        inner.audit.clear();
        Ok(removed)
    }
}
