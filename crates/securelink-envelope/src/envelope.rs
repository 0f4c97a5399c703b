//! Content envelopes.
//!
//! An uploaded file is stored as a [`ContentEnvelope`]: the ciphertext plus
//! the metadata needed to present it again (name, size, MIME type) and the
//! per-file key sealed under the vault master key. The metadata is bound to
//! the ciphertext as associated data, so editing any of it breaks decryption.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use securelink_core::{from_cbor, to_cbor, FileRef};

use crate::crypto::{EncryptionKey, EncryptionNonce, MasterKey, TAG_LEN};
use crate::error::{EnvelopeError, Result};

/// Cipher used for the content of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherTag {
    /// ChaCha20-Poly1305, per-file key wrapped under a BLAKE3-derived key.
    #[serde(rename = "chacha20poly1305-v1")]
    ChaCha20Poly1305V1,
    /// A tag this build does not understand.
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl CipherTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherTag::ChaCha20Poly1305V1 => "chacha20poly1305-v1",
            CipherTag::Unknown => "unknown",
        }
    }
}

/// An encrypted file with its presentation metadata.
///
/// Produced once at upload and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    /// Cipher used for `ciphertext`.
    pub cipher_tag: CipherTag,

    /// File name as uploaded.
    pub original_name: String,

    /// Plaintext length in bytes.
    pub original_size: u64,

    /// MIME type as uploaded.
    pub mime_type: String,

    /// Nonce used to seal the per-file key.
    pub key_nonce: EncryptionNonce,

    /// Per-file key sealed under the master key.
    pub wrapped_key: Bytes,

    /// Nonce used to seal the content.
    pub nonce: EncryptionNonce,

    /// The encrypted content (includes authentication tag).
    pub ciphertext: Bytes,
}

impl ContentEnvelope {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(|e| EnvelopeError::Corrupt(e.to_string()))
    }

    /// Content address of the encoded envelope.
    pub fn file_ref(&self) -> Result<FileRef> {
        Ok(FileRef::for_content(&self.to_bytes()?))
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Check that the tag is known and the sizes agree.
    pub fn check_consistency(&self) -> Result<()> {
        if self.cipher_tag == CipherTag::Unknown {
            return Err(EnvelopeError::Corrupt("unsupported cipher tag".into()));
        }

        let expected = self
            .original_size
            .checked_add(TAG_LEN as u64)
            .ok_or_else(|| EnvelopeError::Corrupt("original size out of range".into()))?;
        if self.ciphertext.len() as u64 != expected {
            return Err(EnvelopeError::Corrupt(format!(
                "ciphertext is {} bytes but metadata says {} plaintext bytes",
                self.ciphertext.len(),
                self.original_size
            )));
        }
        Ok(())
    }

    fn associated_data(&self) -> Vec<u8> {
        associated_data(
            self.cipher_tag,
            &self.original_name,
            self.original_size,
            &self.mime_type,
        )
    }
}

fn associated_data(tag: CipherTag, name: &str, size: u64, mime: &str) -> Vec<u8> {
    let tag = tag.as_str().as_bytes();
    let mut aad = Vec::with_capacity(tag.len() + name.len() + mime.len() + 24);
    for field in [tag, name.as_bytes(), mime.as_bytes()] {
        aad.extend_from_slice(&(field.len() as u64).to_be_bytes());
        aad.extend_from_slice(field);
    }
    aad.extend_from_slice(&size.to_be_bytes());
    aad
}

/// Fresh secrets for one envelope.
///
/// [`SealingMaterial::generate`] is what uploads use. Fixing the material
/// makes sealing deterministic, which golden vectors rely on.
#[derive(Debug, Clone)]
pub struct SealingMaterial {
    pub content_key: EncryptionKey,
    pub nonce: EncryptionNonce,
    pub key_nonce: EncryptionNonce,
}

impl SealingMaterial {
    /// Random key and nonces.
    pub fn generate() -> Self {
        Self {
            content_key: EncryptionKey::generate(),
            nonce: EncryptionNonce::generate(),
            key_nonce: EncryptionNonce::generate(),
        }
    }
}

/// Seals files into envelopes and opens them again.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    master: MasterKey,
}

impl EnvelopeCodec {
    /// Create a codec for the given master key.
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Encrypt `bytes` under a fresh random key.
    pub fn encrypt(&self, bytes: &[u8], name: &str, mime: &str) -> Result<ContentEnvelope> {
        self.seal_with(bytes, name, mime, &SealingMaterial::generate())
    }

    /// Encrypt `bytes` with caller-provided key material.
    pub fn seal_with(
        &self,
        bytes: &[u8],
        name: &str,
        mime: &str,
        material: &SealingMaterial,
    ) -> Result<ContentEnvelope> {
        let tag = CipherTag::ChaCha20Poly1305V1;
        let size = bytes.len() as u64;
        let aad = associated_data(tag, name, size, mime);

        let ciphertext = material.content_key.seal(&material.nonce, bytes, &aad)?;
        let wrapped_key = self
            .master
            .wrap_key(&material.content_key, &material.key_nonce)?;

        Ok(ContentEnvelope {
            cipher_tag: tag,
            original_name: name.to_string(),
            original_size: size,
            mime_type: mime.to_string(),
            key_nonce: material.key_nonce,
            wrapped_key: Bytes::from(wrapped_key),
            nonce: material.nonce,
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// Decrypt an envelope back to the original bytes.
    ///
    /// Every failure, whether inconsistent metadata, a key that will not
    /// unwrap or a failed authentication check, is [`EnvelopeError::Corrupt`].
    pub fn decrypt(&self, envelope: &ContentEnvelope) -> Result<Vec<u8>> {
        envelope.check_consistency()?;

        let content_key = self
            .master
            .unwrap_key(&envelope.wrapped_key, &envelope.key_nonce)?;
        let plaintext =
            content_key.open(&envelope.nonce, &envelope.ciphertext, &envelope.associated_data())?;

        if plaintext.len() as u64 != envelope.original_size {
            return Err(EnvelopeError::Corrupt("decrypted size mismatch".into()));
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(MasterKey::from_bytes([0x11; 32]))
    }

    fn fixed_material() -> SealingMaterial {
        SealingMaterial {
            content_key: EncryptionKey::from_bytes([0x22; 32]),
            nonce: EncryptionNonce::from_bytes([0x33; 12]),
            key_nonce: EncryptionNonce::from_bytes([0x44; 12]),
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = codec();
        let envelope = codec.encrypt(b"quarterly numbers", "q3.csv", "text/csv").unwrap();

        assert_eq!(envelope.original_name, "q3.csv");
        assert_eq!(envelope.original_size, 17);
        assert_eq!(envelope.mime_type, "text/csv");
        assert_eq!(codec.decrypt(&envelope).unwrap(), b"quarterly numbers");
    }

    #[test]
    fn test_fresh_key_per_file() {
        let codec = codec();
        let a = codec.encrypt(b"same", "a", "text/plain").unwrap();
        let b = codec.encrypt(b"same", "a", "text/plain").unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.wrapped_key, b.wrapped_key);
        assert_ne!(a.file_ref().unwrap(), b.file_ref().unwrap());
    }

    #[test]
    fn test_fixed_material_is_deterministic() {
        let codec = codec();
        let a = codec.seal_with(b"payload", "p.bin", "application/octet-stream", &fixed_material());
        let b = codec.seal_with(b"payload", "p.bin", "application/octet-stream", &fixed_material());

        assert_eq!(a.unwrap().to_bytes().unwrap(), b.unwrap().to_bytes().unwrap());
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = codec().encrypt(b"test", "t.txt", "text/plain").unwrap();

        let bytes = envelope.to_bytes().unwrap();
        let recovered = ContentEnvelope::from_bytes(&bytes).unwrap();

        assert_eq!(envelope, recovered);
        assert_eq!(envelope.file_ref().unwrap(), FileRef::for_content(&bytes));
    }

    #[test]
    fn test_size_mismatch_is_corrupt() {
        let codec = codec();
        let mut envelope = codec.encrypt(b"twelve bytes", "f", "text/plain").unwrap();
        envelope.original_size = 11;

        assert!(codec.decrypt(&envelope).unwrap_err().is_corrupt());

        envelope.original_size = u64::MAX;
        assert!(codec.decrypt(&envelope).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_unknown_tag_is_corrupt() {
        let codec = codec();
        let mut envelope = codec.encrypt(b"data", "f", "text/plain").unwrap();
        envelope.cipher_tag = CipherTag::Unknown;

        assert!(codec.decrypt(&envelope).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_metadata_is_authenticated() {
        let codec = codec();
        let mut envelope = codec.encrypt(b"data", "invoice.pdf", "application/pdf").unwrap();
        envelope.original_name = "invoice.exe".into();

        assert!(codec.decrypt(&envelope).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_tampered_ciphertext_is_corrupt() {
        let codec = codec();
        let envelope = codec.encrypt(b"data", "f", "text/plain").unwrap();

        let mut flipped = envelope.ciphertext.to_vec();
        flipped[0] ^= 0x01;
        let tampered = ContentEnvelope {
            ciphertext: Bytes::from(flipped),
            ..envelope
        };

        assert!(codec.decrypt(&tampered).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_wrong_master_key_is_corrupt() {
        let envelope = codec().encrypt(b"data", "f", "text/plain").unwrap();
        let other = EnvelopeCodec::new(MasterKey::from_bytes([0x99; 32]));

        assert!(other.decrypt(&envelope).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_garbage_bytes_are_corrupt() {
        let err = ContentEnvelope::from_bytes(b"definitely not cbor").unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_unrecognised_tag_decodes_as_unknown() {
        #[derive(Deserialize)]
        struct TagOnly {
            tag: CipherTag,
        }

        let mut buf = Vec::new();
        ciborium::into_writer(
            &ciborium::value::Value::Map(vec![(
                ciborium::value::Value::Text("tag".into()),
                ciborium::value::Value::Text("aes-256-gcm".into()),
            )]),
            &mut buf,
        )
        .unwrap();

        let decoded: TagOnly = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(decoded.tag, CipherTag::Unknown);
    }
}
