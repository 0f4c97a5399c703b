//! # SecureLink Core
//!
//! Pure types for share-link lifecycles: link policies, link state, the
//! access evaluator and the audit event model.
//!
//! This crate contains no I/O and no storage. Time and identifiers come in
//! through the [`Clock`] and [`IdGenerator`] traits.
//!
//! ## Key Types
//!
//! - [`LinkPolicy`] - Validated, immutable rules for one link
//! - [`LinkState`] - Status plus append-only access history
//! - [`evaluate`] - The pure Allow/Deny decision for one attempt
//! - [`AuditEvent`] - What gets reported after every committed change

pub mod audit;
pub mod cbor;
pub mod clock;
pub mod error;
pub mod evaluate;
pub mod policy;
pub mod state;
pub mod types;
pub mod verifier;

pub use audit::{
    AuditAction, AuditEvent, AuditExport, AuditFilter, AuditOutcome, AuditSink, AuditStats,
    NullAuditSink,
};
pub use cbor::{from_cbor, to_cbor};
pub use clock::{Clock, SystemClock};
pub use error::{AuditError, CoreError, PolicyError};
pub use evaluate::{evaluate, Decision, DenyReason, RedemptionAttempt};
pub use policy::{Expiry, ExpiryMode, LinkPolicy, PolicyParams};
pub use state::{AccessOutcome, AccessRecord, DeactivationReason, LinkState, LinkStatus};
pub use types::{FileRef, IdGenerator, LinkId, TimestampRandomIds, Timestamp};
pub use verifier::{is_valid_otp_format, PasswordVerifier, OTP_DIGITS};
