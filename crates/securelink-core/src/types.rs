//! Strong type definitions for SecureLink.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unix time in milliseconds.
pub type Timestamp = i64;

/// A 16-byte link identifier.
///
/// The first 8 bytes are a big-endian millisecond component that never goes
/// backwards within one generator; the last 8 bytes are random. Hex-encoded,
/// this is the token that appears in a share URL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub [u8; 16]);

impl LinkId {
    /// Create a new LinkId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// The millisecond component embedded in the identifier.
    pub fn time_component(&self) -> u64 {
        let mut ms = [0u8; 8];
        ms.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(ms)
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({})", self.to_hex())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for LinkId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A 32-byte content reference: BLAKE3 of the encoded envelope.
///
/// Two uploads never share a FileRef in practice because every envelope is
/// sealed under a fresh key and nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileRef(pub [u8; 32]);

impl FileRef {
    /// Create a new FileRef from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Content-address the given bytes.
    pub fn for_content(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRef({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for FileRef {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Identifiers travel as hex strings in every serialized form.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(LinkId);
hex_serde!(FileRef);

/// Source of link identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce an identifier no previous call has returned.
    fn next_id(&self) -> LinkId;
}

/// Default generator: monotonic millisecond prefix plus 64 random bits.
#[derive(Debug, Default)]
pub struct TimestampRandomIds {
    last: AtomicU64,
}

impl TimestampRandomIds {
    /// Create a new generator.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_component(&self, now: u64) -> u64 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

impl IdGenerator for TimestampRandomIds {
    fn next_id(&self) -> LinkId {
        let now = u64::try_from(crate::clock::system_now_millis()).unwrap_or(0);
        let component = self.next_component(now);

        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&component.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[8..]);
        LinkId(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_link_id_hex_roundtrip() {
        let id = LinkId::from_bytes([0x42; 16]);
        let recovered: LinkId = id.to_hex().parse().unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_link_id_rejects_wrong_length() {
        assert!(LinkId::from_hex("abcd").is_err());
        assert!(LinkId::from_hex(&"ab".repeat(32)).is_err());
    }

    #[test]
    fn test_file_ref_debug_is_truncated() {
        let file = FileRef::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", file), "FileRef(cdcdcdcdcdcdcdcd)");
        assert_eq!(file.to_string().len(), 64);
    }

    #[test]
    fn test_file_ref_content_addressed() {
        assert_eq!(FileRef::for_content(b"abc"), FileRef::for_content(b"abc"));
        assert_ne!(FileRef::for_content(b"abc"), FileRef::for_content(b"abd"));
    }

    #[test]
    fn test_ids_serialize_as_hex() {
        let id = LinkId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));

        let back: LinkId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<FileRef>("\"zz\"").is_err());
    }

    #[test]
    fn test_generated_ids_unique_and_monotonic() {
        let ids = TimestampRandomIds::new();
        let generated: Vec<LinkId> = (0..1000).map(|_| ids.next_id()).collect();

        let unique: HashSet<_> = generated.iter().collect();
        assert_eq!(unique.len(), generated.len());

        for pair in generated.windows(2) {
            assert!(pair[1].time_component() > pair[0].time_component());
        }
    }
}
