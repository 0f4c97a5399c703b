//! The link registry: sole owner of link lifecycle state.
//!
//! Every mutation of a link goes through here. `redeem`, `deactivate` and
//! `remove` hold an exclusive per-link lock across load, evaluate and
//! persist, so two redemptions of the same link never interleave while
//! different links proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use securelink_core::{
    evaluate, AccessRecord, AuditAction, AuditEvent, AuditSink, Clock, DeactivationReason,
    Decision, DenyReason, FileRef, IdGenerator, LinkId, LinkPolicy, LinkState, LinkStatus,
    RedemptionAttempt,
};
use securelink_envelope::{ContentEnvelope, EnvelopeCodec, EnvelopeError};
use securelink_store::{ContentStore, InsertResult, LinkStore, StoreError};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

/// A successfully redeemed file.
#[derive(Clone, PartialEq, Eq)]
pub struct GrantedFile {
    pub bytes: Vec<u8>,
    pub name: String,
    pub mime: String,
    pub size: u64,
    /// Downloads left after this one, for count-limited links.
    pub remaining_downloads: Option<u64>,
}

impl std::fmt::Debug for GrantedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantedFile")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.size)
            .field("remaining_downloads", &self.remaining_downloads)
            .finish()
    }
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionResult {
    Granted(GrantedFile),
    Denied(DenyReason),
}

impl RedemptionResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, RedemptionResult::Granted(_))
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            RedemptionResult::Denied(reason) => Some(*reason),
            RedemptionResult::Granted(_) => None,
        }
    }
}

/// Per-link async locks.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Default)]
struct LinkLocks {
    inner: Mutex<HashMap<LinkId, Arc<AsyncMutex<()>>>>,
}

impl LinkLocks {
    async fn acquire(&self, id: &LinkId) -> OwnedMutexGuard<()> {
        let lock = {
            // The map holds no invariant a panicking holder could break.
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(*id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The Link Registry.
pub struct LinkRegistry<S> {
    store: Arc<S>,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    audit: Arc<dyn AuditSink>,
    config: VaultConfig,
    locks: LinkLocks,
}

impl<S> LinkRegistry<S>
where
    S: LinkStore + ContentStore + 'static,
{
    /// Create a registry over `store`.
    pub fn new(
        store: Arc<S>,
        codec: EnvelopeCodec,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        audit: Arc<dyn AuditSink>,
        config: VaultConfig,
    ) -> Self {
        Self {
            store,
            codec,
            clock,
            ids,
            audit,
            config,
            locks: LinkLocks::default(),
        }
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// The configuration in use.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new active link for `policy` under a fresh id.
    ///
    /// Fails with [`VaultError::FileNotFound`] when the policy's file is not
    /// stored; the store checks this in the same step as the insert, so a
    /// concurrent discard of the file's last link cannot leave a dangling
    /// link behind.
    pub async fn create(&self, policy: LinkPolicy) -> Result<LinkId> {
        let file_ref = *policy.file_ref();
        let mode = policy.expiry_mode();
        let state = LinkState::new(policy);

        let mut last = None;
        for _ in 0..self.config.id_attempts.max(1) {
            let id = self.ids.next_id();
            match self.bounded("insert_link", self.store.insert_link(&id, &state)).await? {
                InsertResult::Inserted => {
                    info!(link_id = %id, file_ref = %file_ref, mode = %mode, "link created");
                    self.emit(
                        AuditEvent::success(AuditAction::LinkGenerated, id, self.clock.now())
                            .with_file(file_ref)
                            .with_detail(mode.as_str()),
                    );
                    return Ok(id);
                }
                InsertResult::AlreadyExists => {
                    warn!(link_id = %id, "generated link id already in use");
                    last = Some(id);
                }
                InsertResult::MissingContent => return Err(VaultError::FileNotFound(file_ref)),
            }
        }

        Err(VaultError::LinkIdCollision(
            last.unwrap_or_else(|| LinkId::from_bytes([0; 16])),
        ))
    }

    /// Load a link with its history.
    pub async fn get(&self, id: &LinkId) -> Result<LinkState> {
        self.bounded("get_link", self.store.get_link(id))
            .await?
            .ok_or(VaultError::NotFound(*id))
    }

    /// All links, oldest first.
    pub async fn list(&self) -> Result<Vec<(LinkId, LinkState)>> {
        self.bounded("list_links", self.store.list_links()).await
    }

    /// Attempt to redeem a link.
    ///
    /// A denial on an active link is appended to its history before it is
    /// returned. A deactivated link's history is closed, so denials there are
    /// only audited.
    ///
    /// The per-link lock serializes redemptions within this process. The
    /// download limit itself is enforced by the store when the grant is
    /// committed, so another process sharing the store cannot push a link
    /// past its limit; a grant the store refuses becomes a denial.
    pub async fn redeem(
        &self,
        id: &LinkId,
        attempt: &RedemptionAttempt,
    ) -> Result<RedemptionResult> {
        let _guard = self.locks.acquire(id).await;

        let now = self.clock.now();
        let state = self.get(id).await?;

        match decide(&state, attempt, now) {
            Decision::Deny(reason) => self.deny(id, &state, reason, now).await,
            Decision::Allow => self.grant(id, &state, attempt, now).await,
        }
    }

    async fn deny(
        &self,
        id: &LinkId,
        state: &LinkState,
        reason: DenyReason,
        now: i64,
    ) -> Result<RedemptionResult> {
        if state.is_active() {
            let record = AccessRecord::denied(now, reason);
            match self
                .timed("append_access", self.store.append_access(id, &record))
                .await?
            {
                Ok(_) => {}
                Err(StoreError::LinkClosed(_)) => {
                    debug!(link_id = %id, "link closed before denial was recorded");
                }
                Err(e) => return Err(storage_error("append_access", e)),
            }
        }

        warn!(link_id = %id, reason = %reason, "redemption denied");
        self.emit(
            AuditEvent::failure(AuditAction::AccessDenied, *id, now, reason.as_str())
                .with_file(*state.policy().file_ref()),
        );
        Ok(RedemptionResult::Denied(reason))
    }

    async fn grant(
        &self,
        id: &LinkId,
        state: &LinkState,
        attempt: &RedemptionAttempt,
        now: i64,
    ) -> Result<RedemptionResult> {
        let file_ref = *state.policy().file_ref();
        let (envelope, bytes) = match self.open_envelope(&file_ref).await {
            Ok(opened) => opened,
            Err(VaultError::CorruptEnvelope(msg)) => {
                warn!(link_id = %id, file_ref = %file_ref, error = %msg, "envelope failed to open");
                self.emit(
                    AuditEvent::failure(
                        AuditAction::AccessDenied,
                        *id,
                        now,
                        format!("corrupt_envelope: {}", msg),
                    )
                    .with_file(file_ref),
                );
                return Err(VaultError::CorruptEnvelope(msg));
            }
            Err(other) => return Err(other),
        };

        let record = AccessRecord::granted(now, envelope.original_name.as_str());
        let commit = match self
            .timed("append_access", self.store.append_access(id, &record))
            .await?
        {
            Ok(commit) => commit,
            Err(StoreError::LinkClosed(_)) | Err(StoreError::LimitReached(_)) => {
                // Another writer used up or closed the link after our read.
                let current = self.get(id).await?;
                let reason = match decide(&current, attempt, now) {
                    Decision::Deny(reason) => reason,
                    Decision::Allow => DenyReason::DownloadLimitReached,
                };
                return self.deny(id, &current, reason, now).await;
            }
            Err(e) => return Err(storage_error("append_access", e)),
        };

        info!(
            link_id = %id,
            file_ref = %file_ref,
            grants = commit.state.grants(),
            "redemption granted"
        );
        self.emit(AuditEvent::success(AuditAction::AccessGranted, *id, now).with_file(file_ref));
        if commit.closed {
            info!(link_id = %id, "link deactivated: download limit reached");
            self.emit(
                AuditEvent::success(AuditAction::LinkDeactivated, *id, now)
                    .with_file(file_ref)
                    .with_detail(DeactivationReason::DownloadLimitReached.to_string()),
            );
        }

        Ok(RedemptionResult::Granted(GrantedFile {
            bytes,
            name: envelope.original_name,
            mime: envelope.mime_type,
            size: envelope.original_size,
            remaining_downloads: commit.state.remaining_downloads(),
        }))
    }

    /// Manually deactivate a link.
    ///
    /// Idempotent: returns `false` and changes nothing when the link was
    /// already deactivated, keeping the original reason.
    pub async fn deactivate(&self, id: &LinkId, reason: &str) -> Result<bool> {
        let _guard = self.locks.acquire(id).await;

        let state = self.get(id).await?;
        if !state.is_active() {
            debug!(link_id = %id, "deactivate on inactive link ignored");
            return Ok(false);
        }

        let status = LinkStatus::Deactivated(DeactivationReason::manual(reason));
        self.bounded("set_status", self.store.set_status(id, &status))
            .await?;

        info!(link_id = %id, reason, "link deactivated");
        self.emit(
            AuditEvent::success(AuditAction::LinkDeactivated, *id, self.clock.now())
                .with_file(*state.policy().file_ref())
                .with_detail(reason),
        );
        Ok(true)
    }

    /// Permanently delete a link and its history, returning its last state.
    pub async fn remove(&self, id: &LinkId) -> Result<LinkState> {
        let _guard = self.locks.acquire(id).await;

        let state = self.get(id).await?;
        if !self.bounded("remove_link", self.store.remove_link(id)).await? {
            return Err(VaultError::NotFound(*id));
        }

        info!(link_id = %id, "link discarded");
        self.emit(
            AuditEvent::success(AuditAction::LinkDiscarded, *id, self.clock.now())
                .with_file(*state.policy().file_ref()),
        );
        Ok(state)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn open_envelope(&self, file_ref: &FileRef) -> Result<(ContentEnvelope, Vec<u8>)> {
        let raw = self
            .bounded("get_content", self.store.get_content(file_ref))
            .await?
            .ok_or_else(|| {
                VaultError::CorruptEnvelope(format!("envelope {} is missing", file_ref))
            })?;

        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || -> std::result::Result<_, EnvelopeError> {
            let envelope = ContentEnvelope::from_bytes(&raw)?;
            let bytes = codec.decrypt(&envelope)?;
            Ok((envelope, bytes))
        })
        .await
        .map_err(|e| VaultError::TaskFailed(e.to_string()))?
        .map_err(VaultError::from)
    }

    /// Run a storage call under the configured timeout, handing the store's
    /// own result back untouched.
    ///
    /// A timed-out call is abandoned, not cancelled: a write may still commit
    /// afterwards, so the error says the outcome is unknown.
    async fn timed<T, F>(&self, op: &'static str, fut: F) -> Result<securelink_store::Result<T>>
    where
        F: Future<Output = securelink_store::Result<T>>,
    {
        let timeout = self.config.storage_timeout;
        tokio::time::timeout(timeout, fut).await.map_err(|_| {
            warn!(op, ?timeout, "storage operation timed out");
            VaultError::StorageUnavailable(format!(
                "{} timed out after {:?}; it may still have been applied",
                op, timeout
            ))
        })
    }

    /// Run a storage call under the configured timeout.
    pub(crate) async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = securelink_store::Result<T>>,
    {
        self.timed(op, fut)
            .await?
            .map_err(|e| storage_error(op, e))
    }

    /// Hand an event to the audit sink. Failures are logged, never raised.
    pub(crate) fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            warn!(action = %event.action, error = %e, "audit sink rejected event");
        }
    }
}

fn decide(state: &LinkState, attempt: &RedemptionAttempt, now: i64) -> Decision {
    evaluate(
        state.policy(),
        state.access_history(),
        state.status(),
        attempt,
        now,
    )
}

fn storage_error(op: &'static str, err: StoreError) -> VaultError {
    warn!(op, error = %err, "storage operation failed");
    VaultError::from(err)
}
