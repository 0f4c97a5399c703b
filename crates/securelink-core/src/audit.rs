//! Audit event model.
//!
//! Every committed change to a link (and every upload) produces one
//! [`AuditEvent`]. Events are handed to an [`AuditSink`] after the change is
//! durable; a failing sink is reported but never undoes the change.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::types::{FileRef, LinkId, Timestamp};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    FileUploaded,
    LinkGenerated,
    AccessGranted,
    AccessDenied,
    LinkDeactivated,
    LinkDiscarded,
}

impl AuditAction {
    pub const ALL: [AuditAction; 6] = [
        AuditAction::FileUploaded,
        AuditAction::LinkGenerated,
        AuditAction::AccessGranted,
        AuditAction::AccessDenied,
        AuditAction::LinkDeactivated,
        AuditAction::LinkDiscarded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::FileUploaded => "file_uploaded",
            AuditAction::LinkGenerated => "link_generated",
            AuditAction::AccessGranted => "access_granted",
            AuditAction::AccessDenied => "access_denied",
            AuditAction::LinkDeactivated => "link_deactivated",
            AuditAction::LinkDiscarded => "link_discarded",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action: {}", s))
    }
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit entry.
///
/// `link_id` is absent only for uploads, which happen before any link exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub link_id: Option<LinkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<FileRef>,
    pub timestamp: Timestamp,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_detail: Option<String>,
}

impl AuditEvent {
    /// A successful event for a link.
    pub fn success(action: AuditAction, link_id: LinkId, timestamp: Timestamp) -> Self {
        Self {
            action,
            link_id: Some(link_id),
            file_ref: None,
            timestamp,
            outcome: AuditOutcome::Success,
            reason_detail: None,
        }
    }

    /// A failed event for a link.
    pub fn failure(
        action: AuditAction,
        link_id: LinkId,
        timestamp: Timestamp,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action,
            link_id: Some(link_id),
            file_ref: None,
            timestamp,
            outcome: AuditOutcome::Failure,
            reason_detail: Some(detail.into()),
        }
    }

    /// An upload, which has no link yet.
    pub fn uploaded(file_ref: FileRef, timestamp: Timestamp, name: impl Into<String>) -> Self {
        Self {
            action: AuditAction::FileUploaded,
            link_id: None,
            file_ref: Some(file_ref),
            timestamp,
            outcome: AuditOutcome::Success,
            reason_detail: Some(name.into()),
        }
    }

    pub fn with_file(mut self, file_ref: FileRef) -> Self {
        self.file_ref = Some(file_ref);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.reason_detail = Some(detail.into());
        self
    }
}

/// Receiver of audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// A sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Selection over stored audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Only events with this action.
    pub action: Option<AuditAction>,
    /// Case-insensitive substring of the link id, file ref, action or detail.
    pub search: Option<String>,
}

impl AuditFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        if self.action.is_some_and(|a| a != event.action) {
            return false;
        }

        let term = match self.search.as_deref() {
            None | Some("") => return true,
            Some(term) => term.to_lowercase(),
        };

        let haystacks = [
            event.link_id.map(|id| id.to_hex()),
            event.file_ref.map(|f| f.to_hex()),
            Some(event.action.as_str().to_string()),
            event.reason_detail.as_ref().map(|d| d.to_lowercase()),
        ];
        haystacks
            .iter()
            .flatten()
            .any(|hay| hay.contains(&term))
    }

    /// Apply the filter, newest first.
    pub fn apply(&self, events: &[AuditEvent]) -> Vec<AuditEvent> {
        let mut selected: Vec<AuditEvent> =
            events.iter().filter(|e| self.matches(e)).cloned().collect();
        // Stable sort keeps insertion order among equal timestamps, reversed.
        selected.reverse();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected
    }
}

/// Summary counters over the audit log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub unique_files: usize,
    pub unique_links: usize,
    pub downloads: usize,
}

impl AuditStats {
    pub fn from_events(events: &[AuditEvent]) -> Self {
        let files: HashSet<FileRef> = events.iter().filter_map(|e| e.file_ref).collect();
        let links: HashSet<LinkId> = events.iter().filter_map(|e| e.link_id).collect();
        let downloads = events
            .iter()
            .filter(|e| e.action == AuditAction::AccessGranted)
            .count();

        Self {
            total: events.len(),
            unique_files: files.len(),
            unique_links: links.len(),
            downloads,
        }
    }
}

/// Exported form of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditExport {
    pub export_date: Timestamp,
    pub total_logs: usize,
    pub logs: Vec<AuditEvent>,
}

impl AuditExport {
    pub fn new(export_date: Timestamp, logs: Vec<AuditEvent>) -> Self {
        Self {
            export_date,
            total_logs: logs.len(),
            logs,
        }
    }
}
