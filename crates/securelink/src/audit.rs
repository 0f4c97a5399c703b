//! Audit sinks provided by the vault.

use std::sync::Arc;

use tracing::{info, warn};

use securelink_core::{AuditError, AuditEvent, AuditOutcome, AuditSink};

/// Mirrors audit events into the `tracing` stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let link_id = event.link_id.map(|id| id.to_hex()).unwrap_or_default();
        let file_ref = event.file_ref.map(|f| f.to_hex()).unwrap_or_default();
        let detail = event.reason_detail.as_deref().unwrap_or("");

        match event.outcome {
            AuditOutcome::Success => info!(
                target: "securelink::audit",
                action = %event.action,
                link_id = %link_id,
                file_ref = %file_ref,
                timestamp = event.timestamp,
                detail,
                "audit"
            ),
            AuditOutcome::Failure => warn!(
                target: "securelink::audit",
                action = %event.action,
                link_id = %link_id,
                file_ref = %file_ref,
                timestamp = event.timestamp,
                detail,
                "audit"
            ),
        }
        Ok(())
    }
}

/// Delivers every event to each inner sink.
///
/// All sinks see the event even when an earlier one fails; the first failure
/// is returned.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
