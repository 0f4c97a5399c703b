//! Error types for the vault.

use securelink_core::{CoreError, FileRef, LinkId, PolicyError};
use securelink_envelope::EnvelopeError;
use securelink_store::StoreError;
use thiserror::Error;

/// Errors that can occur during vault operations.
///
/// Denied redemptions are not errors; they come back as
/// [`RedemptionResult::Denied`](crate::RedemptionResult::Denied).
#[derive(Debug, Error)]
pub enum VaultError {
    /// Policy parameters were rejected. Nothing was written.
    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    /// Link not found.
    #[error("link not found: {0}")]
    NotFound(LinkId),

    /// The referenced upload does not exist.
    #[error("file not found: {0}")]
    FileNotFound(FileRef),

    /// The backing store failed or did not answer in time.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored envelope could not be opened.
    #[error("corrupt envelope: {0}")]
    CorruptEnvelope(String),

    /// Upload rejected for size.
    #[error("file too large: {size} bytes exceeds limit of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    /// Freshly generated link ids kept colliding with stored ones.
    #[error("could not allocate an unused link id (last tried {0})")]
    LinkIdCollision(LinkId),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serializing an export failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A core invariant was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl VaultError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::StorageUnavailable(_))
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        VaultError::StorageUnavailable(err.to_string())
    }
}

impl From<EnvelopeError> for VaultError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Corrupt(msg) => VaultError::CorruptEnvelope(msg),
            other => VaultError::Encryption(other.to_string()),
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
