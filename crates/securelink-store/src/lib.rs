//! # SecureLink Store
//!
//! Storage abstraction for SecureLink. Links, uploaded content and the audit
//! log sit behind traits, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`LinkStore`] - Async persistence for link policies, status and history
//! - [`ContentStore`] - Async persistence for encoded envelopes
//! - [`AuditLog`] - Queryable audit events
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use securelink_store::{LinkStore, SqliteStore};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("vault.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let links = store.list_links().await.unwrap();
//!     println!("{} links", links.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting an existing link id returns `AlreadyExists`
//! - **Append-only history**: Access records are appended together with the
//!   status they produce, in one transaction
//! - **One-way status**: Neither backend will move a deactivated link back to
//!   active
//! - **Store-side limits**: The download limit is enforced when the grant is
//!   committed, so separate processes sharing one database cannot overshoot it
//! - **Content addressing**: Stored envelopes are keyed by their BLAKE3 hash

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AccessCommit, AuditLog, ContentMetadata, ContentStore, InsertResult, LinkStore,
};
