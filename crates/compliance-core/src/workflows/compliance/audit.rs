//! Audit write contract: every rule-match decision and obligation state
//! transition is handed to an [`AuditSink`]. The engine never reads the trail back.

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::domain::{OrgId, RecordId, Scope};

/// `tracing` target [`TracingAuditSink`] writes to.
pub const AUDIT_TARGET: &str = "compliance::audit";

/// Who caused an audited change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(String),
    /// Automatic transitions such as the overdue sweep.
    System,
}

impl Actor {
    pub fn label(&self) -> &str {
        match self {
            Actor::User(name) => name,
            Actor::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: Actor,
    pub org_id: OrgId,
    pub scope: Scope,
    pub record_id: RecordId,
    pub action: String,
    pub diff: Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events, written verbatim.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Bounded in-memory trail with FIFO eviction.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .expect("audit sink lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().expect("audit sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut guard = self.events.write().expect("audit sink lock poisoned");
        guard.push_back(event);
        while guard.len() > self.max_events {
            guard.pop_front();
        }
        Ok(())
    }
}

/// Emits each event as a structured `tracing` event on [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            target: AUDIT_TARGET,
            actor = event.actor.label(),
            org = %event.org_id,
            scope = %event.scope,
            record = %event.record_id,
            action = %event.action,
            at = %event.at,
            diff = %event.diff,
            "audit"
        );
        Ok(())
    }
}
