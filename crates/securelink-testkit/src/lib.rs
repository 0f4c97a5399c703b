//! # SecureLink Testkit
//!
//! Testing utilities for SecureLink.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed-material envelopes and the RFC 8439 AEAD vector
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A vault wired to a manual clock and sequential ids
//!
//! ## Golden Vectors
//!
//! ```rust
//! use securelink_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, actual) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, actual);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use securelink_testkit::generators::RawPolicy;
//!
//! proptest! {
//!     #[test]
//!     fn validation_is_total(raw: RawPolicy) {
//!         let _ = LinkPolicy::new(FileRef::from_bytes([0; 32]), raw.to_params(), 0);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use securelink::PolicyParams;
//! use securelink_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let link = fixture.shared("hello", PolicyParams::by_downloads(2)).await.unwrap();
//!     fixture.clock.advance_secs(30);
//! }
//! ```

pub mod clock;
pub mod fixtures;
pub mod generators;
pub mod ids;
pub mod vectors;

pub use clock::ManualClock;
pub use fixtures::{TestFixture, FIXTURE_START};
pub use generators::{shared_verifier, RawPolicy, KNOWN_PASSWORD};
pub use ids::{ScriptedIds, SequentialIds};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
