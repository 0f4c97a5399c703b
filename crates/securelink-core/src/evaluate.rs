//! Access evaluation: the pure decision behind every redemption.
//!
//! [`evaluate`] reads a policy, the access history and the current status and
//! decides whether one attempt may proceed. It never mutates anything; the
//! registry applies the consequences.
//!
//! Checks run in a fixed order and the first failing check decides:
//!
//! 1. deactivated link
//! 2. download limit used up
//! 3. time limit passed
//! 4. password missing or wrong
//! 5. OTP code absent or malformed
//!
//! so a consumed link reports the count reason even when it is also past its
//! deadline, and a deactivated link reports deactivation before anything else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::LinkPolicy;
use crate::state::{AccessRecord, DeactivationReason, LinkStatus};
use crate::types::Timestamp;
use crate::verifier::is_valid_otp_format;

/// Secrets a recipient submits with one redemption attempt.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RedemptionAttempt {
    pub password: Option<String>,
    pub otp: Option<String>,
}

impl RedemptionAttempt {
    /// An attempt carrying no secrets.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }
}

impl fmt::Debug for RedemptionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedemptionAttempt")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why an attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    LinkDeactivated,
    DownloadLimitReached,
    LinkExpired,
    PasswordRequired,
    PasswordIncorrect,
    /// Never produced by [`evaluate`]: a missing code fails the format check
    /// and is reported as [`DenyReason::OtpInvalidFormat`].
    OtpRequired,
    OtpInvalidFormat,
}

impl DenyReason {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::LinkDeactivated => "link_deactivated",
            DenyReason::DownloadLimitReached => "download_limit_reached",
            DenyReason::LinkExpired => "link_expired",
            DenyReason::PasswordRequired => "password_required",
            DenyReason::PasswordIncorrect => "password_incorrect",
            DenyReason::OtpRequired => "otp_required",
            DenyReason::OtpInvalidFormat => "otp_invalid_format",
        }
    }

    /// Message suitable for showing to the recipient.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::LinkDeactivated => "This link has been deactivated.",
            DenyReason::DownloadLimitReached => "This link has reached its download limit.",
            DenyReason::LinkExpired => "This link has expired.",
            DenyReason::PasswordRequired => "Password is required.",
            DenyReason::PasswordIncorrect => "Invalid password.",
            DenyReason::OtpRequired => "A one-time code is required.",
            DenyReason::OtpInvalidFormat => "Please enter a valid 6-digit OTP.",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `attempt` may redeem a link at `now`.
///
/// A link that was deactivated because its quota ran out keeps reporting
/// [`DenyReason::DownloadLimitReached`]; any other deactivation reports
/// [`DenyReason::LinkDeactivated`].
pub fn evaluate(
    policy: &LinkPolicy,
    history: &[AccessRecord],
    status: &LinkStatus,
    attempt: &RedemptionAttempt,
    now: Timestamp,
) -> Decision {
    if let LinkStatus::Deactivated(reason) = status {
        return Decision::Deny(match reason {
            DeactivationReason::DownloadLimitReached => DenyReason::DownloadLimitReached,
            DeactivationReason::Manual { .. } => DenyReason::LinkDeactivated,
        });
    }

    if let Some(limit) = policy.download_limit() {
        let granted = history.iter().filter(|r| r.is_grant()).count() as u64;
        if granted >= limit {
            return Decision::Deny(DenyReason::DownloadLimitReached);
        }
    }

    if policy.is_expired_at(now) {
        return Decision::Deny(DenyReason::LinkExpired);
    }

    if let Some(verifier) = policy.password_verifier() {
        match attempt.password.as_deref() {
            None | Some("") => return Decision::Deny(DenyReason::PasswordRequired),
            Some(password) if !verifier.verify(password) => {
                return Decision::Deny(DenyReason::PasswordIncorrect)
            }
            Some(_) => {}
        }
    }

    if policy.requires_otp() {
        let well_formed = attempt.otp.as_deref().is_some_and(is_valid_otp_format);
        if !well_formed {
            return Decision::Deny(DenyReason::OtpInvalidFormat);
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyParams;
    use crate::types::FileRef;

    fn policy(params: PolicyParams) -> LinkPolicy {
        LinkPolicy::new(FileRef::from_bytes([9u8; 32]), params, 0).unwrap()
    }

    fn grants(n: usize) -> Vec<AccessRecord> {
        (0..n).map(|i| AccessRecord::granted(i as i64, "")).collect()
    }

    #[test]
    fn test_allow_without_requirements() {
        let p = policy(PolicyParams::by_downloads(1));
        let decision = evaluate(&p, &[], &LinkStatus::Active, &RedemptionAttempt::anonymous(), 0);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_manual_deactivation_wins() {
        let p = policy(PolicyParams::by_time(10));
        let status = LinkStatus::Deactivated(DeactivationReason::manual("revoked"));

        let decision = evaluate(&p, &[], &status, &RedemptionAttempt::anonymous(), 1_000_000);
        assert_eq!(decision, Decision::Deny(DenyReason::LinkDeactivated));
    }

    #[test]
    fn test_quota_deactivation_reports_limit() {
        let p = policy(PolicyParams::by_downloads(1));
        let status = LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached);

        let decision = evaluate(&p, &grants(1), &status, &RedemptionAttempt::anonymous(), 0);
        assert_eq!(decision, Decision::Deny(DenyReason::DownloadLimitReached));
    }

    #[test]
    fn test_limit_counts_only_grants() {
        let p = policy(PolicyParams::by_downloads(2));
        let mut history = grants(1);
        history.push(AccessRecord::denied(5, DenyReason::PasswordIncorrect));
        history.push(AccessRecord::denied(6, DenyReason::PasswordIncorrect));

        let attempt = RedemptionAttempt::anonymous();
        assert_eq!(evaluate(&p, &history, &LinkStatus::Active, &attempt, 0), Decision::Allow);

        history.push(AccessRecord::granted(7, ""));
        assert_eq!(
            evaluate(&p, &history, &LinkStatus::Active, &attempt, 0),
            Decision::Deny(DenyReason::DownloadLimitReached)
        );
    }

    #[test]
    fn test_time_boundary() {
        let p = policy(PolicyParams::by_time(60));
        let attempt = RedemptionAttempt::anonymous();

        assert_eq!(evaluate(&p, &[], &LinkStatus::Active, &attempt, 59_000), Decision::Allow);
        assert_eq!(evaluate(&p, &[], &LinkStatus::Active, &attempt, 60_000), Decision::Allow);
        assert_eq!(
            evaluate(&p, &[], &LinkStatus::Active, &attempt, 61_000),
            Decision::Deny(DenyReason::LinkExpired)
        );
    }

    #[test]
    fn test_expiry_checked_before_password() {
        let p = policy(PolicyParams::by_time(1).with_password("pw"));
        let decision = evaluate(&p, &[], &LinkStatus::Active, &RedemptionAttempt::anonymous(), 5_000);
        assert_eq!(decision, Decision::Deny(DenyReason::LinkExpired));
    }

    #[test]
    fn test_password_checks() {
        let p = policy(PolicyParams::by_downloads(3).with_password("open sesame"));
        let status = LinkStatus::Active;

        let missing = RedemptionAttempt::anonymous();
        assert_eq!(
            evaluate(&p, &[], &status, &missing, 0),
            Decision::Deny(DenyReason::PasswordRequired)
        );

        let empty = RedemptionAttempt::anonymous().with_password("");
        assert_eq!(
            evaluate(&p, &[], &status, &empty, 0),
            Decision::Deny(DenyReason::PasswordRequired)
        );

        let wrong = RedemptionAttempt::anonymous().with_password("open says me");
        assert_eq!(
            evaluate(&p, &[], &status, &wrong, 0),
            Decision::Deny(DenyReason::PasswordIncorrect)
        );

        let right = RedemptionAttempt::anonymous().with_password("open sesame");
        assert_eq!(evaluate(&p, &[], &status, &right, 0), Decision::Allow);
    }

    #[test]
    fn test_password_checked_before_otp() {
        let p = policy(PolicyParams::by_downloads(1).with_password("pw").with_otp());
        let attempt = RedemptionAttempt::anonymous().with_password("nope").with_otp("12");

        assert_eq!(
            evaluate(&p, &[], &LinkStatus::Active, &attempt, 0),
            Decision::Deny(DenyReason::PasswordIncorrect)
        );
    }

    #[test]
    fn test_otp_format_only() {
        let p = policy(PolicyParams::by_downloads(1).with_otp());
        let status = LinkStatus::Active;

        for bad in [None, Some("12345"), Some("abcdef"), Some("1234567")] {
            let attempt = RedemptionAttempt {
                password: None,
                otp: bad.map(String::from),
            };
            assert_eq!(
                evaluate(&p, &[], &status, &attempt, 0),
                Decision::Deny(DenyReason::OtpInvalidFormat)
            );
        }

        let good = RedemptionAttempt::anonymous().with_otp("493021");
        assert_eq!(evaluate(&p, &[], &status, &good, 0), Decision::Allow);
    }

    #[test]
    fn test_attempt_debug_redacts_secrets() {
        let attempt = RedemptionAttempt::anonymous()
            .with_password("hunter2")
            .with_otp("123456");
        let debug = format!("{:?}", attempt);

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("123456"));
    }
}
