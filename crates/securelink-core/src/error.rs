//! Error types for SecureLink core.

use thiserror::Error;

/// Reasons a [`LinkPolicy`](crate::LinkPolicy) cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("download limit must be positive, got {0}")]
    NonPositiveDownloadLimit(i64),

    #[error("time limit must be positive, got {0} seconds")]
    NonPositiveTimeLimit(i64),

    #[error("time limit of {0} seconds is out of range")]
    TimeLimitOutOfRange(i64),

    #[error("password required but no password material supplied")]
    MissingPassword,

    #[error("password supplied but the policy does not require one")]
    UnexpectedPassword,

    #[error("expiry mode {mode} requires {expected} and forbids {forbidden}")]
    ExpiryMismatch {
        mode: &'static str,
        expected: &'static str,
        forbidden: &'static str,
    },

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Errors raised by state transitions on a [`LinkState`](crate::LinkState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("link is deactivated; access history is closed")]
    LinkDeactivated,

    #[error("download limit of {0} already used")]
    DownloadLimitExhausted(u64),

    #[error("invalid password verifier: {0}")]
    InvalidVerifier(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// An audit sink could not accept an event.
#[derive(Debug, Error)]
#[error("audit sink failure: {0}")]
pub struct AuditError(pub String);

impl AuditError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
