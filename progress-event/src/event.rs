//! Progress event types (type + payload).
//!
//! One variant per lifecycle point of a workflow run. Stage-level variants carry
//! the stage name so consumers can correlate `stage_started`/`stage_completed`
//! pairs without tracking order themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress event: wire shape for one event (type + payload).
/// Envelope (workflow_id, event_id, timestamp) is applied separately.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: String,
        agent: String,
    },
    StageCompleted {
        stage: String,
        agent: String,
        /// Stage output, truncated by the emitter if large payloads were
        /// routed through the reference store.
        output: String,
    },
    AgentResponse {
        agent: String,
        content: String,
    },
    WorkflowCompleted {
        output: String,
    },
    WorkflowFailed {
        kind: String,
        message: String,
    },
}

impl ProgressEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// The `type` tag of this event as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProgressEvent::StageStarted { .. } => "stage_started",
            ProgressEvent::StageCompleted { .. } => "stage_completed",
            ProgressEvent::AgentResponse { .. } => "agent_response",
            ProgressEvent::WorkflowCompleted { .. } => "workflow_completed",
            ProgressEvent::WorkflowFailed { .. } => "workflow_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tag() {
        let ev = ProgressEvent::StageStarted {
            stage: "draft".to_string(),
            agent: "writer".to_string(),
        };
        let value = ev.to_value().unwrap();
        assert_eq!(value["type"], "stage_started");
        assert_eq!(value["stage"], "draft");
        assert_eq!(value["agent"], "writer");
    }

    #[test]
    fn type_name_matches_serde_tag() {
        let ev = ProgressEvent::WorkflowFailed {
            kind: "validation".to_string(),
            message: "bad spec".to_string(),
        };
        assert_eq!(ev.type_name(), ev.to_value().unwrap()["type"]);
    }
}
