//! Proptest generators for property-based testing.

use std::sync::OnceLock;

use proptest::prelude::*;

use securelink_core::{
    AccessRecord, DeactivationReason, DenyReason, ExpiryMode, FileRef, LinkId, LinkStatus,
    PasswordVerifier, PolicyParams, RedemptionAttempt, Timestamp,
};

/// Password behind [`shared_verifier`].
pub const KNOWN_PASSWORD: &str = "correct horse battery staple";

/// A verifier for [`KNOWN_PASSWORD`], hashed once per process.
///
/// Argon2 is deliberately slow; hashing per case would dominate runtime.
pub fn shared_verifier() -> PasswordVerifier {
    static VERIFIER: OnceLock<PasswordVerifier> = OnceLock::new();
    VERIFIER
        .get_or_init(|| PasswordVerifier::hash(KNOWN_PASSWORD).expect("hash known password"))
        .clone()
}

/// Generate a random LinkId.
pub fn link_id() -> impl Strategy<Value = LinkId> {
    any::<[u8; 16]>().prop_map(LinkId::from_bytes)
}

/// Generate a random FileRef.
pub fn file_ref() -> impl Strategy<Value = FileRef> {
    any::<[u8; 32]>().prop_map(FileRef::from_bytes)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    0i64..=4_000_000_000_000i64
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a file name.
pub fn file_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _-]{1,24}\\.[a-z]{1,4}".prop_map(String::from)
}

/// Generate an OTP candidate, well-formed or not.
pub fn otp_candidate() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        "[0-9]{6}".prop_map(Some),
        "[0-9]{0,5}".prop_map(Some),
        "[0-9]{7,9}".prop_map(Some),
        "[a-z0-9]{6}".prop_map(Some),
    ]
}

/// Generate any status.
pub fn status() -> impl Strategy<Value = LinkStatus> {
    prop_oneof![
        Just(LinkStatus::Active),
        Just(LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached)),
        "[a-z ]{0,16}".prop_map(|r| LinkStatus::Deactivated(DeactivationReason::manual(r))),
    ]
}

/// Generate an access history with `grants` grants mixed among denials.
pub fn history(max_grants: usize) -> impl Strategy<Value = Vec<AccessRecord>> {
    prop::collection::vec(any::<bool>(), 0..=max_grants * 2).prop_map(|outcomes| {
        outcomes
            .into_iter()
            .enumerate()
            .map(|(i, grant)| {
                if grant {
                    AccessRecord::granted(i as i64, "file")
                } else {
                    AccessRecord::denied(i as i64, DenyReason::PasswordIncorrect)
                }
            })
            .collect()
    })
}

/// Raw policy parameters, including invalid ones.
#[derive(Debug, Clone)]
pub struct RawPolicy {
    pub mode: ExpiryMode,
    pub time_limit_seconds: Option<i64>,
    pub download_limit: Option<i64>,
    pub password: bool,
    pub otp: bool,
}

impl RawPolicy {
    /// Whether construction should succeed.
    pub fn is_valid(&self) -> bool {
        match self.mode {
            ExpiryMode::ByTime => {
                self.download_limit.is_none()
                    && self.time_limit_seconds.is_some_and(|s| s > 0)
            }
            ExpiryMode::ByDownloadCount => {
                self.time_limit_seconds.is_none() && self.download_limit.is_some_and(|n| n > 0)
            }
        }
    }

    pub fn to_params(&self) -> PolicyParams {
        let mut params = match self.mode {
            ExpiryMode::ByTime => PolicyParams::by_time(0),
            ExpiryMode::ByDownloadCount => PolicyParams::by_downloads(0),
        };
        params.time_limit_seconds = self.time_limit_seconds;
        params.download_limit = self.download_limit;
        if self.password {
            params = params.with_verifier(shared_verifier());
        }
        if self.otp {
            params = params.with_otp();
        }
        params
    }
}

impl Arbitrary for RawPolicy {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let limit = prop_oneof![
            3 => Just(None),
            1 => (-5i64..=0).prop_map(Some),
            4 => (1i64..=10_000).prop_map(Some),
        ];
        (
            prop_oneof![Just(ExpiryMode::ByTime), Just(ExpiryMode::ByDownloadCount)],
            limit.clone(),
            limit,
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(mode, time, downloads, password, otp)| RawPolicy {
                mode,
                time_limit_seconds: time,
                download_limit: downloads,
                password,
                otp,
            })
            .boxed()
    }
}

/// A redemption attempt that may or may not carry the right secrets.
pub fn attempt() -> impl Strategy<Value = RedemptionAttempt> {
    (
        prop_oneof![
            Just(None),
            Just(Some(KNOWN_PASSWORD.to_string())),
            "[a-z]{1,12}".prop_map(Some),
        ],
        otp_candidate(),
    )
        .prop_map(|(password, otp)| RedemptionAttempt { password, otp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use securelink_core::{evaluate, is_valid_otp_format, Decision, LinkPolicy};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn test_policy_validation_matches_params(
            raw in any::<RawPolicy>(),
            file in file_ref(),
            at in timestamp(),
        ) {
            let result = LinkPolicy::new(file, raw.to_params(), at);
            prop_assert_eq!(result.is_ok(), raw.is_valid(), "{:?} -> {:?}", raw, result);

            if let Ok(policy) = result {
                prop_assert_eq!(policy.expiry_mode(), raw.mode);
                prop_assert_eq!(policy.requires_password(), raw.password);
                prop_assert_eq!(policy.requires_otp(), raw.otp);
                prop_assert_eq!(policy.created_at(), at);
            }
        }

        #[test]
        fn test_deactivation_always_wins(
            raw in any::<RawPolicy>(),
            history in history(4),
            attempt in attempt(),
            offset in 0i64..=1_000_000_000,
        ) {
            prop_assume!(raw.is_valid());
            let policy = LinkPolicy::new(FileRef::from_bytes([1; 32]), raw.to_params(), 0).unwrap();

            let manual = LinkStatus::Deactivated(DeactivationReason::manual("revoked"));
            prop_assert_eq!(
                evaluate(&policy, &history, &manual, &attempt, offset),
                Decision::Deny(DenyReason::LinkDeactivated)
            );

            let spent = LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached);
            prop_assert_eq!(
                evaluate(&policy, &history, &spent, &attempt, offset),
                Decision::Deny(DenyReason::DownloadLimitReached)
            );
        }

        #[test]
        fn test_only_grants_count_toward_limit(
            limit in 1i64..=5,
            history in history(6),
        ) {
            let policy = LinkPolicy::new(
                FileRef::from_bytes([2; 32]),
                PolicyParams::by_downloads(limit),
                0,
            ).unwrap();
            let grants = history.iter().filter(|r| r.is_grant()).count() as i64;

            let anonymous = RedemptionAttempt::anonymous();
            let decision = evaluate(&policy, &history, &LinkStatus::Active, &anonymous, 0);
            if grants >= limit {
                prop_assert_eq!(decision, Decision::Deny(DenyReason::DownloadLimitReached));
            } else {
                prop_assert_eq!(decision, Decision::Allow);
            }
        }

        #[test]
        fn test_expiry_precedes_secret_checks(
            secs in 1i64..=86_400,
            late_by in 1i64..=1_000_000,
            attempt in attempt(),
        ) {
            let params = PolicyParams::by_time(secs).with_verifier(shared_verifier()).with_otp();
            let policy = LinkPolicy::new(FileRef::from_bytes([3; 32]), params, 0).unwrap();

            let now = secs * 1000 + late_by;
            prop_assert_eq!(
                evaluate(&policy, &[], &LinkStatus::Active, &attempt, now),
                Decision::Deny(DenyReason::LinkExpired)
            );
        }

        #[test]
        fn test_otp_format_decides_last(otp in otp_candidate()) {
            let params = PolicyParams::by_downloads(1).with_otp();
            let policy = LinkPolicy::new(FileRef::from_bytes([4; 32]), params, 0).unwrap();
            let attempt = RedemptionAttempt { password: None, otp: otp.clone() };

            let expected = if otp.as_deref().is_some_and(is_valid_otp_format) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::OtpInvalidFormat)
            };
            prop_assert_eq!(evaluate(&policy, &[], &LinkStatus::Active, &attempt, 0), expected);
        }

        #[test]
        fn test_small_envelope_roundtrip(bytes in payload(4096), name in file_name()) {
            use securelink_envelope::{EnvelopeCodec, MasterKey};

            let codec = EnvelopeCodec::new(MasterKey::from_bytes([7; 32]));
            let envelope = codec.encrypt(&bytes, &name, "application/octet-stream").unwrap();
            prop_assert_eq!(envelope.original_size, bytes.len() as u64);
            prop_assert_eq!(codec.decrypt(&envelope).unwrap(), bytes);
        }
    }
}
