//! Conversation message types shared by the LLM client, tool executor, and
//! segmented memory.
//!
//! A [`Message`] is one entry in an agent's conversation: system frame, user
//! input, assistant reply (optionally carrying tool calls), or a tool result.
//! [`ToolCall`] is the LLM's request to invoke one tool.

use serde::{Deserialize, Serialize};

/// A single tool invocation requested by the LLM.
///
/// **Interaction**: Produced by `LlmClient::complete`; consumed by the tool
/// executor, which matches results back by `call_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id; echoed back on the matching tool result.
    pub call_id: String,
    /// Registered tool name.
    pub name: String,
    /// JSON arguments as produced by the model.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One conversation message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error,
        }
    }

    /// The message role as a wire string.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::ToolResult { .. } => "tool_result",
        }
    }

    /// Text content of the message regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::ToolResult { content, .. } => content,
        }
    }

    /// Tool calls attached to this message, if any.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Rough token estimate used for context budgeting (chars / 4, minimum 1).
    /// Good enough for budget enforcement; exact counts are provider-specific.
    pub fn approx_tokens(&self) -> usize {
        let mut chars = self.content().chars().count();
        for call in self.tool_calls() {
            chars += call.name.len() + call.arguments.to_string().chars().count();
        }
        chars / 4 + 1
    }
}
