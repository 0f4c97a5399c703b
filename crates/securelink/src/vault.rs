//! The Vault: unified API for SecureLink.
//!
//! The Vault brings together the envelope codec, storage and the link
//! registry. Uploads go in as envelopes, links are minted against them, and
//! redemptions come back out as decrypted files.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use securelink_core::{
    AuditEvent, AuditExport, AuditFilter, AuditSink, AuditStats, Clock, FileRef, IdGenerator,
    LinkId, LinkPolicy, LinkState, LinkStatus, PolicyParams, RedemptionAttempt, SystemClock,
    Timestamp, TimestampRandomIds,
};
use securelink_envelope::{EnvelopeCodec, MasterKey};
use securelink_store::{AuditLog, ContentMetadata, ContentStore, LinkStore};

use crate::audit::{FanoutAuditSink, TracingAuditSink};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::registry::{LinkRegistry, RedemptionResult};

/// An upload as stored in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_ref: FileRef,
    pub metadata: ContentMetadata,
}

/// One row of the link dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    pub link_id: LinkId,
    pub file_ref: FileRef,
    pub status: LinkStatus,
    pub grants: u64,
    pub remaining_downloads: Option<u64>,
    pub expires_at: Option<Timestamp>,
}

impl LinkSummary {
    fn from_state(link_id: LinkId, state: &LinkState) -> Self {
        Self {
            link_id,
            file_ref: *state.policy().file_ref(),
            status: state.status().clone(),
            grants: state.grants(),
            remaining_downloads: state.remaining_downloads(),
            expires_at: state.policy().expires_at(),
        }
    }
}

/// Result of permanently discarding a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discarded {
    /// The link's state at the moment it was removed.
    pub last_state: LinkState,
    /// Whether the envelope went with it because no other link used it.
    pub content_deleted: bool,
}

/// Assembles a [`Vault`] with optional test doubles.
pub struct VaultBuilder<S> {
    store: S,
    master: MasterKey,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    extra_sinks: Vec<Arc<dyn AuditSink>>,
}

impl<S> VaultBuilder<S>
where
    S: LinkStore + ContentStore + AuditLog + 'static,
{
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Deliver audit events to `sink` as well as the store and tracing.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    pub fn build(self) -> Vault<S> {
        let store = Arc::new(self.store);
        let codec = EnvelopeCodec::new(self.master);

        let mut fanout = FanoutAuditSink::new()
            .with(store.clone())
            .with(Arc::new(TracingAuditSink));
        for sink in self.extra_sinks {
            fanout = fanout.with(sink);
        }

        let registry = LinkRegistry::new(
            store.clone(),
            codec.clone(),
            self.clock,
            self.ids,
            Arc::new(fanout),
            self.config,
        );

        Vault {
            store,
            codec,
            registry,
        }
    }
}

/// The main Vault struct.
///
/// Provides a unified API for:
/// - Uploading files as encrypted envelopes
/// - Creating, redeeming and deactivating share links
/// - Listing links and uploads
/// - Querying the audit log
pub struct Vault<S> {
    store: Arc<S>,
    codec: EnvelopeCodec,
    registry: LinkRegistry<S>,
}

impl<S> Vault<S>
where
    S: LinkStore + ContentStore + AuditLog + 'static,
{
    /// Create a vault with the system clock and the default id generator.
    pub fn new(store: S, master: MasterKey, config: VaultConfig) -> Self {
        Self::builder(store, master).config(config).build()
    }

    pub fn builder(store: S, master: MasterKey) -> VaultBuilder<S> {
        VaultBuilder {
            store,
            master,
            config: VaultConfig::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(TimestampRandomIds::new()),
            extra_sinks: Vec::new(),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The registry behind this vault.
    pub fn registry(&self) -> &LinkRegistry<S> {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Content Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt and store a file.
    pub async fn upload(&self, bytes: Vec<u8>, name: &str, mime: &str) -> Result<UploadedFile> {
        let size = bytes.len() as u64;
        let max = self.registry.config().max_upload_bytes;
        if size > max {
            return Err(VaultError::FileTooLarge { size, max });
        }

        let codec = self.codec.clone();
        let (name_owned, mime_owned) = (name.to_string(), mime.to_string());
        let encoded = tokio::task::spawn_blocking(move || {
            codec
                .encrypt(&bytes, &name_owned, &mime_owned)
                .and_then(|envelope| envelope.to_bytes())
        })
        .await
        .map_err(|e| VaultError::TaskFailed(e.to_string()))??;

        let now = self.registry.now();
        let metadata = ContentMetadata {
            name: name.to_string(),
            size,
            mime: mime.to_string(),
            uploaded_at: now,
        };
        let file_ref = self
            .registry
            .bounded("put_content", self.store.put_content(Bytes::from(encoded), &metadata))
            .await?;

        info!(file_ref = %file_ref, size, "file uploaded");
        self.registry.emit(AuditEvent::uploaded(file_ref, now, name));
        Ok(UploadedFile { file_ref, metadata })
    }

    /// All uploads, newest first.
    pub async fn list_files(&self) -> Result<Vec<UploadedFile>> {
        let files = self
            .registry
            .bounded("list_content", self.store.list_content())
            .await?;
        Ok(files
            .into_iter()
            .map(|(file_ref, metadata)| UploadedFile { file_ref, metadata })
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Link Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Mint a share link for an uploaded file.
    ///
    /// Policy validation, including password hashing, happens before anything
    /// is written. Fails with [`VaultError::FileNotFound`] if the upload does
    /// not exist.
    pub async fn create_link(&self, file_ref: &FileRef, params: PolicyParams) -> Result<LinkId> {
        let (target, now) = (*file_ref, self.registry.now());
        let policy = tokio::task::spawn_blocking(move || LinkPolicy::new(target, params, now))
            .await
            .map_err(|e| VaultError::TaskFailed(e.to_string()))??;

        self.registry.create(policy).await
    }

    /// Attempt to redeem a link.
    pub async fn redeem_link(
        &self,
        link_id: &LinkId,
        attempt: &RedemptionAttempt,
    ) -> Result<RedemptionResult> {
        self.registry.redeem(link_id, attempt).await
    }

    /// Manually deactivate a link. Returns `false` if it was already inactive.
    pub async fn deactivate_link(&self, link_id: &LinkId, reason: &str) -> Result<bool> {
        self.registry.deactivate(link_id, reason).await
    }

    /// Current state of a link.
    pub async fn get_link_status(&self, link_id: &LinkId) -> Result<LinkState> {
        self.registry.get(link_id).await
    }

    /// Dashboard view of every link.
    pub async fn list_links(&self) -> Result<Vec<LinkSummary>> {
        let links = self.registry.list().await?;
        Ok(links
            .iter()
            .map(|(id, state)| LinkSummary::from_state(*id, state))
            .collect())
    }

    /// Permanently remove a link.
    ///
    /// The envelope is deleted too once no remaining link references it. The
    /// store makes that check and the delete in one step, so a link created
    /// concurrently either keeps the envelope alive or fails with
    /// [`VaultError::FileNotFound`].
    pub async fn discard_link(&self, link_id: &LinkId) -> Result<Discarded> {
        let last_state = self.registry.remove(link_id).await?;
        let file_ref = *last_state.policy().file_ref();

        let content_deleted = self
            .registry
            .bounded(
                "delete_unreferenced_content",
                self.store.delete_unreferenced_content(&file_ref),
            )
            .await?;

        if content_deleted {
            info!(file_ref = %file_ref, "envelope destroyed");
        } else {
            debug!(file_ref = %file_ref, "envelope still referenced");
        }
        Ok(Discarded {
            last_state,
            content_deleted,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Stored audit events matching `filter`, newest first.
    pub fn audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        Ok(self.store.query(filter)?)
    }

    /// Counters over the whole audit log.
    pub fn audit_stats(&self) -> Result<AuditStats> {
        let events = self.store.query(&AuditFilter::all())?;
        Ok(AuditStats::from_events(&events))
    }

    /// Snapshot of the audit log for export.
    pub fn export_audit(&self) -> Result<AuditExport> {
        let events = self.store.query(&AuditFilter::all())?;
        Ok(AuditExport::new(self.registry.now(), events))
    }

    /// The export as pretty-printed JSON.
    pub fn export_audit_json(&self) -> Result<String> {
        let export = self.export_audit()?;
        serde_json::to_string_pretty(&export)
            .map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Delete every stored audit event, returning how many there were.
    pub fn clear_audit(&self) -> Result<usize> {
        let removed = self.store.clear()?;
        info!(removed, "audit log cleared");
        Ok(removed)
    }
}
