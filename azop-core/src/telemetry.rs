//! Observability sink called by the engine at lifecycle transitions.
//!
//! Never called on soft-waits: waiting for a parent is steady state, not an
//! event worth recording.

use std::time::Duration;

use crate::error::ErrorKind;
use crate::model::Identity;

pub trait ObservabilitySink: Send + Sync {
    /// A manager call is about to be made for `identity`.
    fn record_start(&self, identity: &Identity);

    /// `identity` reached its end state (provisioned or deleted).
    fn record_success(&self, identity: &Identity, elapsed: Duration);

    /// An attempt for `identity` failed with a recorded error.
    fn record_failure(&self, identity: &Identity, kind: ErrorKind);
}

/// Sink that emits structured audit events through `tracing`.
pub struct AuditSink {
    component: String,
}

impl AuditSink {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl ObservabilitySink for AuditSink {
    fn record_start(&self, identity: &Identity) {
        tracing::debug!(target: "audit", component = %self.component, identity = %identity, "reconcile started");
    }

    fn record_success(&self, identity: &Identity, elapsed: Duration) {
        tracing::info!(
            target: "audit",
            component = %self.component,
            identity = %identity,
            elapsed_ms = elapsed.as_millis() as u64,
            "reconcile succeeded"
        );
    }

    fn record_failure(&self, identity: &Identity, kind: ErrorKind) {
        if kind.is_terminal() {
            tracing::error!(target: "audit", component = %self.component, identity = %identity, %kind, "reconcile failed");
        } else {
            tracing::warn!(target: "audit", component = %self.component, identity = %identity, %kind, "reconcile failed");
        }
    }
}

/// Sink that drops everything (for testing).
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn record_start(&self, _identity: &Identity) {}
    fn record_success(&self, _identity: &Identity, _elapsed: Duration) {}
    fn record_failure(&self, _identity: &Identity, _kind: ErrorKind) {}
}
