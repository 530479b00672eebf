use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_name: String,
    pub request_id: String,
    pub user_id: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl AuditEvent {
    pub fn new(event_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            request_id: request_id.into(),
            user_id: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "roundtable.audit",
            event = %event.event_name,
            request_id = %event.request_id,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            attributes = ?event.attributes,
            "audit",
        );
    }
}

/// Test sink: keeps every event so assertions can inspect what was emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Clone)]
pub struct Observability {
    sink: Arc<dyn AuditSink>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl Default for Observability {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl Observability {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn audit(&self, event: AuditEvent) {
        self.sink.record(event);
    }

    pub fn increment_counter(&self, name: &str, request_id: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += 1;
        }
        tracing::debug!(
            target: "roundtable.metrics",
            counter = name,
            request_id = request_id,
            "counter incremented",
        );
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .ok()
            .and_then(|counters| counters.get(name).copied())
            .unwrap_or(0)
    }
}
