//! # SecureLink Envelope
//!
//! Encryption of uploaded files at rest.
//!
//! ## Encryption Model
//!
//! Every file gets its own envelope, sealed with a two-layer key model:
//!
//! 1. **Content Key**: A random ChaCha20-Poly1305 key that encrypts the file
//! 2. **Master Key**: A vault-wide key that seals each content key
//!
//! The sealed content key travels inside the envelope, so opening a file
//! needs only the envelope and the codec. File name, size and MIME type are
//! authenticated together with the content.
//!
//! ## Usage
//!
//! ```rust
//! use securelink_envelope::{EnvelopeCodec, MasterKey};
//!
//! let codec = EnvelopeCodec::new(MasterKey::generate());
//! let envelope = codec.encrypt(b"hello", "hello.txt", "text/plain").unwrap();
//! assert_eq!(codec.decrypt(&envelope).unwrap(), b"hello");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;

pub use crypto::{EncryptionKey, EncryptionNonce, MasterKey, TAG_LEN};
pub use envelope::{CipherTag, ContentEnvelope, EnvelopeCodec, SealingMaterial};
pub use error::{EnvelopeError, Result};
