//! # SecureLink
//!
//! The unified API for SecureLink: encrypted uploads shared through
//! time- or count-limited links.
//!
//! ## Overview
//!
//! SecureLink provides a small, embeddable library for:
//!
//! - **Envelopes**: Files encrypted under a fresh per-file key
//! - **Links**: Share tokens governed by an immutable policy
//! - **Redemption**: A per-link serialized decision, record and transition
//! - **Audit**: Every committed change reported to a sink
//!
//! ## Key Concepts
//!
//! - **Policy**: Immutable. An edit is a new link.
//! - **History**: Append-only. Only grants count toward a download limit.
//! - **Deactivation**: One-way. A deactivated link never comes back.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use securelink::{PolicyParams, RedemptionAttempt, Vault, VaultConfig};
//! use securelink::envelope::MasterKey;
//! use securelink::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("vault.db").unwrap();
//!     let vault = Vault::new(store, MasterKey::generate(), VaultConfig::default());
//!
//!     // Upload a file
//!     let upload = vault
//!         .upload(b"quarterly numbers".to_vec(), "q3.csv", "text/csv")
//!         .await
//!         .unwrap();
//!
//!     // Share it for three downloads behind a password
//!     let link = vault
//!         .create_link(&upload.file_ref, PolicyParams::by_downloads(3).with_password("hunter2"))
//!         .await
//!         .unwrap();
//!
//!     // Redeem it
//!     let result = vault
//!         .redeem_link(&link, &RedemptionAttempt::anonymous().with_password("hunter2"))
//!         .await
//!         .unwrap();
//!     assert!(result.is_granted());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `securelink::core` - Policies, link state, the evaluator and audit model
//! - `securelink::envelope` - Content envelope codec
//! - `securelink::store` - Storage abstraction, SQLite and in-memory backends

pub mod audit;
pub mod config;
pub mod error;
pub mod registry;
pub mod vault;

// Re-export component crates
pub use securelink_core as core;
pub use securelink_envelope as envelope;
pub use securelink_store as store;

// Re-export main types for convenience
pub use audit::{FanoutAuditSink, TracingAuditSink};
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use registry::{GrantedFile, LinkRegistry, RedemptionResult};
pub use vault::{Discarded, LinkSummary, UploadedFile, Vault, VaultBuilder};

// Re-export commonly used core types
pub use securelink_core::{
    AuditAction, AuditEvent, AuditFilter, AuditOutcome, AuditSink, AuditStats, DeactivationReason,
    DenyReason, FileRef, LinkId, LinkPolicy, LinkState, LinkStatus, PolicyError, PolicyParams,
    RedemptionAttempt,
};
