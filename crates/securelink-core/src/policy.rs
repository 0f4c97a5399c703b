//! Link access policy.
//!
//! A [`LinkPolicy`] is built once from caller-supplied [`PolicyParams`] and
//! never changes afterwards. Changing how a file is shared means minting a new
//! policy under a new link id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::{FileRef, Timestamp};
use crate::verifier::PasswordVerifier;

/// How a link runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryMode {
    /// Expires a fixed duration after creation.
    ByTime,
    /// Expires after a number of successful downloads.
    ByDownloadCount,
}

impl ExpiryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryMode::ByTime => "by_time",
            ExpiryMode::ByDownloadCount => "by_download_count",
        }
    }
}

impl fmt::Display for ExpiryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated expiry. Exactly one limit exists, and it matches the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    ByTime { time_limit_seconds: u64 },
    ByDownloadCount { download_limit: u64 },
}

/// Raw parameters for a new link, as a caller supplies them.
///
/// Limits are signed so that zero and negative inputs reach validation
/// instead of being silently clamped by a conversion.
#[derive(Clone)]
pub struct PolicyParams {
    pub expiry_mode: ExpiryMode,
    pub time_limit_seconds: Option<i64>,
    pub download_limit: Option<i64>,
    pub requires_password: bool,
    /// Plaintext password, hashed during policy construction.
    pub password: Option<String>,
    /// Pre-computed verifier, used instead of `password` when present.
    pub password_verifier: Option<PasswordVerifier>,
    pub requires_otp: bool,
}

impl PolicyParams {
    /// Parameters for a link that expires `seconds` after creation.
    pub fn by_time(seconds: i64) -> Self {
        Self {
            expiry_mode: ExpiryMode::ByTime,
            time_limit_seconds: Some(seconds),
            download_limit: None,
            requires_password: false,
            password: None,
            password_verifier: None,
            requires_otp: false,
        }
    }

    /// Parameters for a link that allows `limit` downloads.
    pub fn by_downloads(limit: i64) -> Self {
        Self {
            expiry_mode: ExpiryMode::ByDownloadCount,
            time_limit_seconds: None,
            download_limit: Some(limit),
            requires_password: false,
            password: None,
            password_verifier: None,
            requires_otp: false,
        }
    }

    /// Require a password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.requires_password = true;
        self.password = Some(password.into());
        self
    }

    /// Require a password checked by an existing verifier.
    pub fn with_verifier(mut self, verifier: PasswordVerifier) -> Self {
        self.requires_password = true;
        self.password_verifier = Some(verifier);
        self
    }

    /// Require an OTP code.
    pub fn with_otp(mut self) -> Self {
        self.requires_otp = true;
        self
    }
}

impl fmt::Debug for PolicyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyParams")
            .field("expiry_mode", &self.expiry_mode)
            .field("time_limit_seconds", &self.time_limit_seconds)
            .field("download_limit", &self.download_limit)
            .field("requires_password", &self.requires_password)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_verifier", &self.password_verifier)
            .field("requires_otp", &self.requires_otp)
            .finish()
    }
}

/// How a link may be redeemed. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPolicy {
    file_ref: FileRef,
    expiry: Expiry,
    password_verifier: Option<PasswordVerifier>,
    requires_otp: bool,
    created_at: Timestamp,
}

impl LinkPolicy {
    /// Validate `params` and build a policy for `file_ref`.
    pub fn new(
        file_ref: FileRef,
        params: PolicyParams,
        created_at: Timestamp,
    ) -> Result<Self, PolicyError> {
        let expiry = validate_expiry(&params, created_at)?;
        let password_verifier = validate_password(
            params.requires_password,
            params.password,
            params.password_verifier,
        )?;

        Ok(Self {
            file_ref,
            expiry,
            password_verifier,
            requires_otp: params.requires_otp,
            created_at,
        })
    }

    pub fn file_ref(&self) -> &FileRef {
        &self.file_ref
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn expiry_mode(&self) -> ExpiryMode {
        match self.expiry {
            Expiry::ByTime { .. } => ExpiryMode::ByTime,
            Expiry::ByDownloadCount { .. } => ExpiryMode::ByDownloadCount,
        }
    }

    /// Present iff the mode is [`ExpiryMode::ByTime`].
    pub fn time_limit_seconds(&self) -> Option<u64> {
        match self.expiry {
            Expiry::ByTime { time_limit_seconds } => Some(time_limit_seconds),
            Expiry::ByDownloadCount { .. } => None,
        }
    }

    /// Present iff the mode is [`ExpiryMode::ByDownloadCount`].
    pub fn download_limit(&self) -> Option<u64> {
        match self.expiry {
            Expiry::ByDownloadCount { download_limit } => Some(download_limit),
            Expiry::ByTime { .. } => None,
        }
    }

    pub fn requires_password(&self) -> bool {
        self.password_verifier.is_some()
    }

    pub fn password_verifier(&self) -> Option<&PasswordVerifier> {
        self.password_verifier.as_ref()
    }

    pub fn requires_otp(&self) -> bool {
        self.requires_otp
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last instant at which a time-limited link is still redeemable.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.time_limit_seconds()
            .map(|secs| self.created_at.saturating_add(secs as i64 * 1000))
    }

    /// Whether a time-limited link is past its deadline at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }
}

fn validate_expiry(params: &PolicyParams, created_at: Timestamp) -> Result<Expiry, PolicyError> {
    match params.expiry_mode {
        ExpiryMode::ByTime => {
            let (Some(seconds), None) = (params.time_limit_seconds, params.download_limit) else {
                return Err(PolicyError::ExpiryMismatch {
                    mode: ExpiryMode::ByTime.as_str(),
                    expected: "time_limit_seconds",
                    forbidden: "download_limit",
                });
            };
            if seconds <= 0 {
                return Err(PolicyError::NonPositiveTimeLimit(seconds));
            }
            seconds
                .checked_mul(1000)
                .and_then(|ms| created_at.checked_add(ms))
                .ok_or(PolicyError::TimeLimitOutOfRange(seconds))?;

            Ok(Expiry::ByTime {
                time_limit_seconds: seconds as u64,
            })
        }
        ExpiryMode::ByDownloadCount => {
            let (Some(limit), None) = (params.download_limit, params.time_limit_seconds) else {
                return Err(PolicyError::ExpiryMismatch {
                    mode: ExpiryMode::ByDownloadCount.as_str(),
                    expected: "download_limit",
                    forbidden: "time_limit_seconds",
                });
            };
            if limit <= 0 {
                return Err(PolicyError::NonPositiveDownloadLimit(limit));
            }

            Ok(Expiry::ByDownloadCount {
                download_limit: limit as u64,
            })
        }
    }
}

fn validate_password(
    requires_password: bool,
    password: Option<String>,
    verifier: Option<PasswordVerifier>,
) -> Result<Option<PasswordVerifier>, PolicyError> {
    if !requires_password {
        if password.is_some() || verifier.is_some() {
            return Err(PolicyError::UnexpectedPassword);
        }
        return Ok(None);
    }

    if let Some(verifier) = verifier {
        return Ok(Some(verifier));
    }

    match password {
        Some(pw) if !pw.is_empty() => PasswordVerifier::hash(&pw).map(Some),
        _ => Err(PolicyError::MissingPassword),
    }
}
