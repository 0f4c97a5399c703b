//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Value encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The link no longer accepts access records.
    #[error("link is closed: {0}")]
    LinkClosed(String),

    /// A grant was refused because the download limit is already used.
    #[error("download limit reached: {0}")]
    LimitReached(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking storage task could not be joined.
    #[error("storage task failed: {0}")]
    TaskFailed(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<securelink_core::CoreError> for StoreError {
    fn from(err: securelink_core::CoreError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned(err.to_string())
    }
}

impl StoreError {
    /// Map a refused [`LinkState`](securelink_core::LinkState) transition on
    /// link `id` to the matching store error.
    pub fn transition(id: &securelink_core::LinkId, err: securelink_core::CoreError) -> Self {
        use securelink_core::CoreError;

        match err {
            CoreError::LinkDeactivated => StoreError::LinkClosed(id.to_hex()),
            CoreError::DownloadLimitExhausted(_) => StoreError::LimitReached(id.to_hex()),
            other => StoreError::from(other),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
