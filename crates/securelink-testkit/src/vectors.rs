//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the content cipher and the associated-data layout, so a
//! change to either shows up as a mismatch instead of as unreadable uploads.

use securelink_envelope::{
    EncryptionKey, EncryptionNonce, EnvelopeCodec, MasterKey, SealingMaterial,
};

/// RFC 8439 §2.8.2 AEAD test vector.
pub struct AeadVector {
    pub key: [u8; 32],
    pub nonce: &'static str,
    pub aad: &'static str,
    pub plaintext: &'static [u8],
    /// Ciphertext followed by the 16-byte tag (hex).
    pub sealed: &'static str,
}

pub fn rfc8439_vector() -> AeadVector {
    let mut key = [0u8; 32];
    for (i, b) in key.iter_mut().enumerate() {
        *b = 0x80 + i as u8;
    }
    AeadVector {
        key,
        nonce: "070000004041424344454647",
        aad: "50515253c0c1c2c3c4c5c6c7",
        plaintext: b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.",
        sealed: "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d63dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b3692ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831d7bc3ff4def08e4b7a9de576d26586cec64b61161ae10b594f09e26a7e902ecbd0600691",
    }
}

/// A golden envelope vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Uploaded file name.
    pub file_name: &'static str,
    /// Uploaded MIME type.
    pub mime: &'static str,
    /// Plaintext bytes.
    pub payload: &'static [u8],
    /// Expected content ciphertext with tag (hex).
    pub expected_ciphertext: &'static str,
}

/// Master key shared by every golden vector.
pub const VECTOR_MASTER_KEY: [u8; 32] = [0x11; 32];

/// Sealing material shared by every golden vector.
pub fn vector_material() -> SealingMaterial {
    SealingMaterial {
        content_key: EncryptionKey::from_bytes([0x22; 32]),
        nonce: EncryptionNonce::from_bytes([0x33; 12]),
        key_nonce: EncryptionNonce::from_bytes([0x44; 12]),
    }
}

/// Get all golden envelope vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "short text file",
            file_name: "hello.txt",
            mime: "text/plain",
            payload: b"hello",
            expected_ciphertext: "e72d36f6bf2b0a43ab0bdb61875902eb999b643484",
        },
        GoldenVector {
            name: "empty file",
            file_name: "empty.bin",
            mime: "application/octet-stream",
            payload: b"",
            expected_ciphertext: "3a01dba3ef893295089b770ac0546b13",
        },
        GoldenVector {
            name: "csv with newlines",
            file_name: "report.csv",
            mime: "text/csv",
            payload: b"id,amount\n1,42\n",
            expected_ciphertext: "e62c76fbbd7ef6b1aa91760063f6bbbde711bf197cb349867b6542bf8cf9ed",
        },
    ]
}

/// Seal a vector's payload with the fixed material.
pub fn seal_vector(vector: &GoldenVector) -> securelink_envelope::Result<Vec<u8>> {
    let codec = EnvelopeCodec::new(MasterKey::from_bytes(VECTOR_MASTER_KEY));
    let envelope =
        codec.seal_with(vector.payload, vector.file_name, vector.mime, &vector_material())?;
    Ok(envelope.ciphertext.to_vec())
}

/// Check every vector, returning `(name, matches, actual_hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let actual = seal_vector(v).map(hex::encode).unwrap_or_default();
            (v.name.to_string(), actual == v.expected_ciphertext, actual)
        })
        .collect()
}
