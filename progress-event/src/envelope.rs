//! Envelope (workflow_id, event_id, timestamp) applied to each progress event.
//!
//! [`EnvelopeState`] tracks the per-run sequence number and stamps each event;
//! [`ProgressEnvelope`] is the enveloped event as loom hands it to subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::ProgressEvent;

/// Envelope fields attached to each event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Workflow run id; constant within a run.
    pub workflow_id: Option<String>,
    /// Per-event sequence number; monotonically increasing within a run.
    pub event_id: Option<u64>,
    /// ISO-8601 timestamp assigned at emission.
    pub timestamp: Option<String>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.workflow_id {
            obj.entry("workflow_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
        if let Some(ref ts) = self.timestamp {
            obj.entry("timestamp")
                .or_insert_with(|| Value::String(ts.clone()));
        }
    }
}

/// A progress event together with its envelope, as delivered to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEnvelope {
    pub workflow_id: String,
    pub event_id: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Envelope state for one run: workflow id and next event_id.
pub struct EnvelopeState {
    pub workflow_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(workflow_id: String) -> Self {
        Self {
            workflow_id,
            next_event_id: 1,
        }
    }

    /// Wraps an event with the current envelope and advances the sequence.
    pub fn wrap(&mut self, event: ProgressEvent, timestamp: impl Into<String>) -> ProgressEnvelope {
        let enveloped = ProgressEnvelope {
            workflow_id: self.workflow_id.clone(),
            event_id: self.next_event_id,
            timestamp: timestamp.into(),
            event,
        };
        self.next_event_id += 1;
        enveloped
    }
}

/// Converts a progress event to JSON and injects envelope fields using the given state.
/// Returns the final value (type + payload + workflow_id, event_id).
pub fn to_json(
    event: &ProgressEvent,
    state: &mut EnvelopeState,
    timestamp: &str,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    let env = Envelope::new()
        .with_workflow_id(&state.workflow_id)
        .with_event_id(state.next_event_id)
        .with_timestamp(timestamp);
    state.next_event_id += 1;
    env.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_inject_does_not_overwrite() {
        let mut obj = serde_json::json!({"type":"stage_started","workflow_id":"keep"});
        let env = Envelope::new().with_workflow_id("wf-1").with_event_id(7);
        env.inject_into(&mut obj);
        assert_eq!(obj["workflow_id"], "keep");
        assert_eq!(obj["event_id"], 7);
    }

    #[test]
    fn wrap_advances_event_id() {
        let mut state = EnvelopeState::new("wf-9".to_string());
        let a = state.wrap(
            ProgressEvent::WorkflowCompleted {
                output: "done".to_string(),
            },
            "2026-01-01T00:00:00Z",
        );
        let b = state.wrap(
            ProgressEvent::WorkflowCompleted {
                output: "done".to_string(),
            },
            "2026-01-01T00:00:01Z",
        );
        assert_eq!(a.event_id, 1);
        assert_eq!(b.event_id, 2);
        assert_eq!(a.workflow_id, "wf-9");
    }

    #[test]
    fn to_json_injects_envelope() {
        let ev = ProgressEvent::AgentResponse {
            agent: "critic".to_string(),
            content: "looks fine".to_string(),
        };
        let mut state = EnvelopeState::new("wf-123".to_string());
        let value = to_json(&ev, &mut state, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(value["type"], "agent_response");
        assert_eq!(value["workflow_id"], "wf-123");
        assert_eq!(value["event_id"], 1);
    }
}
