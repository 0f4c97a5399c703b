//! Link lifecycle state: status plus an append-only access history.
//!
//! Status only moves forward. Once a link is deactivated its history is
//! closed and it never becomes active again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::evaluate::DenyReason;
use crate::policy::LinkPolicy;
use crate::types::Timestamp;

/// Why a link stopped accepting redemptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// The last permitted download was granted.
    DownloadLimitReached,
    /// An operator deactivated the link.
    Manual { reason: String },
}

impl DeactivationReason {
    pub fn manual(reason: impl Into<String>) -> Self {
        Self::Manual {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeactivationReason::DownloadLimitReached => f.write_str("download_limit_reached"),
            DeactivationReason::Manual { reason } => write!(f, "manual: {}", reason),
        }
    }
}

/// Lifecycle status of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Active,
    Deactivated(DeactivationReason),
}

impl LinkStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, LinkStatus::Active)
    }
}

/// Outcome of one redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    Denied,
}

/// One entry in a link's access history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub timestamp: Timestamp,
    pub outcome: AccessOutcome,
    pub detail: String,
}

impl AccessRecord {
    pub fn granted(timestamp: Timestamp, detail: impl Into<String>) -> Self {
        Self {
            timestamp,
            outcome: AccessOutcome::Granted,
            detail: detail.into(),
        }
    }

    pub fn denied(timestamp: Timestamp, reason: DenyReason) -> Self {
        Self {
            timestamp,
            outcome: AccessOutcome::Denied,
            detail: reason.as_str().to_string(),
        }
    }

    pub fn is_grant(&self) -> bool {
        self.outcome == AccessOutcome::Granted
    }
}

/// The mutable side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkState {
    policy: LinkPolicy,
    status: LinkStatus,
    access_history: Vec<AccessRecord>,
}

impl LinkState {
    /// A freshly created, active link with no history.
    pub fn new(policy: LinkPolicy) -> Self {
        Self {
            policy,
            status: LinkStatus::Active,
            access_history: Vec::new(),
        }
    }

    /// Reassemble a state loaded from storage.
    pub fn from_parts(
        policy: LinkPolicy,
        status: LinkStatus,
        access_history: Vec<AccessRecord>,
    ) -> Self {
        Self {
            policy,
            status,
            access_history,
        }
    }

    pub fn policy(&self) -> &LinkPolicy {
        &self.policy
    }

    pub fn status(&self) -> &LinkStatus {
        &self.status
    }

    pub fn access_history(&self) -> &[AccessRecord] {
        &self.access_history
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Number of granted redemptions so far.
    pub fn grants(&self) -> u64 {
        self.access_history.iter().filter(|r| r.is_grant()).count() as u64
    }

    /// Downloads left on a count-limited link.
    pub fn remaining_downloads(&self) -> Option<u64> {
        self.policy
            .download_limit()
            .map(|limit| limit.saturating_sub(self.grants()))
    }

    /// Milliseconds until a time-limited link expires; zero once expired.
    pub fn time_remaining(&self, now: Timestamp) -> Option<i64> {
        self.policy
            .expires_at()
            .map(|deadline| deadline.saturating_sub(now).max(0))
    }

    /// Append a record.
    ///
    /// Fails once the link is deactivated, and refuses a grant beyond the
    /// download limit. The grant that uses up the limit deactivates the link
    /// with [`DeactivationReason::DownloadLimitReached`]; the return value
    /// says whether that happened.
    pub fn record_access(&mut self, record: AccessRecord) -> Result<bool, CoreError> {
        if !self.status.is_active() {
            return Err(CoreError::LinkDeactivated);
        }
        let is_grant = record.is_grant();
        if is_grant {
            if let Some(limit) = self.policy.download_limit() {
                if self.grants() >= limit {
                    return Err(CoreError::DownloadLimitExhausted(limit));
                }
            }
        }

        self.access_history.push(record);
        if is_grant && self.download_limit_reached() {
            self.status = LinkStatus::Deactivated(DeactivationReason::DownloadLimitReached);
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the grants so far have used up a download limit.
    pub fn download_limit_reached(&self) -> bool {
        self.policy
            .download_limit()
            .is_some_and(|limit| self.grants() >= limit)
    }

    /// Move to Deactivated.
    ///
    /// Returns false, leaving the original reason in place, when the link was
    /// already deactivated.
    pub fn deactivate(&mut self, reason: DeactivationReason) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = LinkStatus::Deactivated(reason);
        true
    }
}
