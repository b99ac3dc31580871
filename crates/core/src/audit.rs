use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_STARTED: &str = "clarifier.session_started";
pub const SESSION_RESUMED: &str = "clarifier.session_resumed";
pub const SLOT_COMMITTED: &str = "clarifier.slot_committed";
pub const SLOT_REJECTED: &str = "clarifier.slot_rejected";
pub const TURN_REDIRECTED: &str = "clarifier.turn_redirected";
pub const VALIDATION_REJECTED: &str = "clarifier.validation_rejected";
pub const SESSION_COMPLETED: &str = "clarifier.session_completed";
pub const SESSION_GAVE_UP: &str = "clarifier.session_gave_up";
pub const FINALIZE_FAILED: &str = "clarifier.finalize_failed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Session,
    Slot,
    Validation,
    Finalize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub session_id: String,
    pub flow_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        session_id: impl Into<String>,
        flow_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            flow_id: flow_id.into(),
            event_type: event_type.into(),
            category,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards every event to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                session_id = %event.session_id,
                flow_id = %event.flow_id,
                category = ?event.category,
                metadata = %metadata,
                "clarifier audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => tracing::warn!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                session_id = %event.session_id,
                flow_id = %event.flow_id,
                category = ?event.category,
                outcome = ?event.outcome,
                metadata = %metadata,
                "clarifier audit event"
            ),
        }
    }
}
