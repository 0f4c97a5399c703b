//! Error types for the envelope codec.

use thiserror::Error;

/// Errors that can occur while sealing or opening content envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope does not decrypt, or its metadata disagrees with its
    /// ciphertext.
    #[error("corrupt envelope: {0}")]
    Corrupt(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// A key could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] securelink_core::CoreError),
}

impl EnvelopeError {
    /// Whether this error means the stored envelope itself is unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, EnvelopeError::Corrupt(_))
    }
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
