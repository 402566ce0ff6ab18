//! Audit trail
//!
//! Consensus, recovery and fault-injection results expose a structured
//! [`AuditEvent`]; the core itself never writes it anywhere. Sinks decide
//! what happens next:
//!
//! - [`TracingAuditSink`] emits each event on the `smartlog::audit` target
//! - [`AuditLog`] keeps an in-memory trail, dropping consecutive duplicates

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smartlog_ledger::FaultReport;
use std::fmt;
use uuid::Uuid;

/// Audit action tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A proposal reached quorum and was appended
    ConsensusCommitted,
    /// A proposal missed its quorum
    ConsensusRejected,
    /// A replica was tampered with on purpose
    FaultInjected,
    /// Replicas disagree on their tip
    DivergenceDetected,
    /// Divergent replicas were overwritten from the majority
    ReplicasRecovered,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::ConsensusCommitted => "consensus_committed",
            AuditAction::ConsensusRejected => "consensus_rejected",
            AuditAction::FaultInjected => "fault_injected",
            AuditAction::DivergenceDetected => "divergence_detected",
            AuditAction::ReplicasRecovered => "replicas_recovered",
        };
        write!(f, "{s}")
    }
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Who triggered the action
    pub actor: String,

    /// Action tag
    pub action: AuditAction,

    /// Free-text detail
    pub detail: String,
}

impl AuditEvent {
    /// Create a new event stamped now
    pub fn new(actor: impl Into<String>, action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            detail: detail.into(),
        }
    }

    /// Event describing an injected fault
    pub fn fault_injected(actor: impl Into<String>, report: &FaultReport) -> Self {
        Self::new(
            actor,
            AuditAction::FaultInjected,
            format!(
                "{} fault on {} at block {}: {} -> {}",
                report.kind,
                report.replica,
                report.sequence,
                report.before.short(),
                report.after.short()
            ),
        )
    }

    /// Same action and detail, ignoring identity and time
    pub fn repeats(&self, other: &AuditEvent) -> bool {
        self.action == other.action && self.detail == other.detail
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    /// Record one event
    fn record(&self, event: AuditEvent);
}

/// Sink writing events as structured tracing records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "smartlog::audit",
            event_id = %event.event_id,
            actor = %event.actor,
            action = %event.action,
            detail = %event.detail,
            "Audit event"
        );
    }
}

/// In-memory audit trail
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<AuditEvent> {
        self.entries.lock().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: AuditEvent) {
        let mut entries = self.entries.lock();
        if entries.last().is_some_and(|last| last.repeats(&event)) {
            tracing::debug!(action = %event.action, "Consecutive duplicate audit event ignored");
            return;
        }
        entries.push(event);
    }
}
