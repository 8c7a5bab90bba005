use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::overtime::RequestId;
use crate::domain::user::{UserId, UserRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Lifecycle,
    Approval,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
}

pub const REQUEST_CREATED: &str = "request.created";
pub const REQUEST_APPROVED: &str = "request.approved";
pub const REQUEST_REJECTED: &str = "request.rejected";
pub const REQUEST_EDITED: &str = "request.edited";
pub const REQUEST_CANCELLED: &str = "request.cancelled";

/// One entry in the request audit trail. `request_id` is unset for creations
/// that failed before the store assigned an id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: Option<RequestId>,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor_id: UserId,
    pub actor_role: UserRole,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: Option<RequestId>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor_id: UserId,
        actor_role: UserRole,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            event_type: event_type.into(),
            category,
            actor_id,
            actor_role,
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

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
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

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_type == event_type).collect()
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

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink,
        REQUEST_APPROVED, REQUEST_CANCELLED,
    };
    use crate::domain::overtime::RequestId;
    use crate::domain::user::{UserId, UserRole};

    #[test]
    fn in_memory_sink_records_events_with_request_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some(RequestId::new("OT-000042")),
                REQUEST_APPROVED,
                AuditCategory::Approval,
                UserId::new("sup-1"),
                UserRole::Supervisor,
                AuditOutcome::Success,
            )
            .with_metadata("from", "PENDING_SUPERVISOR")
            .with_metadata("to", "PENDING_MANAGER"),
        );
        sink.emit(AuditEvent::new(
            Some(RequestId::new("OT-000042")),
            REQUEST_CANCELLED,
            AuditCategory::Lifecycle,
            UserId::new("w-1"),
            UserRole::Worker,
            AuditOutcome::Rejected,
        ));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].request_id.as_ref().map(|id| id.0.as_str()), Some("OT-000042"));
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("PENDING_MANAGER"));
        assert_eq!(sink.events_of_type(REQUEST_CANCELLED).len(), 1);
        assert_eq!(sink.events_of_type(REQUEST_CANCELLED)[0].outcome, AuditOutcome::Rejected);
    }

    #[test]
    fn noop_sink_accepts_events() {
        NoopAuditSink.emit(AuditEvent::new(
            None,
            "request.created",
            AuditCategory::Lifecycle,
            UserId::new("w-1"),
            UserRole::Worker,
            AuditOutcome::Success,
        ));
    }
}
