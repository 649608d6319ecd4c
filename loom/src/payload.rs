//! Message payloads: inline value vs content-addressed reference.
//!
//! Exactly one variant per payload. The fabric decides which side a payload
//! lands on by consulting the [`PolicyManager`](crate::policy::PolicyManager)
//! and stores reference payloads in the
//! [`ReferenceStore`](crate::reference::ReferenceStore).

use serde::{Deserialize, Serialize};

/// Well-known message types with default routing rules.
pub const MSG_SESSION_STATE: &str = "session_state";
pub const MSG_WORKFLOW_CONTEXT: &str = "workflow_context";
pub const MSG_TOOL_RESULT: &str = "tool_result";
pub const MSG_GENERAL: &str = "general";
pub const MSG_CONTROL: &str = "control";
pub const MSG_ACK: &str = "ack";
pub const MSG_STATUS: &str = "status";

/// Tagged union: inline bytes XOR a reference id. Invariant: exactly one variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Value {
        bytes: Vec<u8>,
        content_type: String,
    },
    Reference {
        ref_id: String,
    },
}

impl MessagePayload {
    /// Inline UTF-8 text payload.
    pub fn text(s: impl Into<String>) -> Self {
        MessagePayload::Value {
            bytes: s.into().into_bytes(),
            content_type: "text/plain".to_string(),
        }
    }

    /// Inline JSON payload.
    pub fn json(value: &serde_json::Value) -> Self {
        MessagePayload::Value {
            bytes: value.to_string().into_bytes(),
            content_type: "application/json".to_string(),
        }
    }

    pub fn reference(ref_id: impl Into<String>) -> Self {
        MessagePayload::Reference {
            ref_id: ref_id.into(),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, MessagePayload::Reference { .. })
    }

    /// Inline size in bytes; zero for references (the blob lives out of band).
    pub fn inline_size(&self) -> usize {
        match self {
            MessagePayload::Value { bytes, .. } => bytes.len(),
            MessagePayload::Reference { .. } => 0,
        }
    }

    /// Inline bytes, if this is a value payload.
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            MessagePayload::Value { bytes, .. } => Some(bytes),
            MessagePayload::Reference { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_is_inline() {
        let p = MessagePayload::text("hello");
        assert!(!p.is_reference());
        assert_eq!(p.inline_size(), 5);
        assert_eq!(p.as_value(), Some(b"hello".as_slice()));
    }

    #[test]
    fn serde_keeps_exactly_one_variant() {
        let p = MessagePayload::reference("ref_abc");
        let text = serde_json::to_string(&p).unwrap();
        assert!(text.contains("\"kind\":\"reference\""));
        assert!(!text.contains("bytes"));
        let back: MessagePayload = serde_json::from_str(&text).unwrap();
        assert_eq!(p, back);
    }
}
