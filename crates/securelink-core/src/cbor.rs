//! CBOR helpers shared by the envelope codec and the stores.
//!
//! Values are encoded with `ciborium`; decoding failures are mapped to
//! [`CoreError::DecodingError`] so callers never see the ciborium error types.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;

/// Encode a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{LinkPolicy, PolicyParams};
    use crate::state::{AccessRecord, DeactivationReason, LinkState, LinkStatus};
    use crate::types::FileRef;

    #[test]
    fn test_link_state_survives_cbor() {
        let policy = LinkPolicy::new(
            FileRef::from_bytes([3u8; 32]),
            PolicyParams::by_downloads(2).with_password("pw").with_otp(),
            1_700_000_000_000,
        )
        .unwrap();
        let mut state = LinkState::new(policy);
        state.record_access(AccessRecord::granted(1, "ok")).unwrap();
        state.deactivate(DeactivationReason::manual("done"));

        let bytes = to_cbor(&state).unwrap();
        let back: LinkState = from_cbor(&bytes).unwrap();

        assert_eq!(back, state);
        assert!(back.policy().password_verifier().unwrap().verify("pw"));
        assert_eq!(
            back.status(),
            &LinkStatus::Deactivated(DeactivationReason::manual("done"))
        );
    }

    #[test]
    fn test_garbage_is_decoding_error() {
        let err = from_cbor::<LinkStatus>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CoreError::DecodingError(_)));
    }
}
