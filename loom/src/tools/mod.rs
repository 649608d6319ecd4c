//! Tool system: registry, schema validation, and the parallel executor.
//!
//! A tool is a value with a name, a natural-language description, a JSON
//! input schema, and an execute capability. No inheritance; polymorphism is
//! the capability set {validate, execute}. JSON schemas act as runtime types
//! for tool inputs.

mod builtin;
mod executor;
mod fabric_tools;
mod registry;
mod schema;

pub use builtin::{GetErrorDetailTool, GetToolResultTool, TOOL_GET_ERROR_DETAIL, TOOL_GET_TOOL_RESULT};
pub use executor::{ExecutorConfig, ToolExecutor};
pub use fabric_tools::{
    PublishMessageTool, SendMessageTool, TOOL_PUBLISH_MESSAGE, TOOL_SEND_MESSAGE,
};
pub use registry::ToolRegistry;
pub use schema::validate_args;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Declares a tool to the LLM: name, description, JSON input schema.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{message}")]
    Execution {
        message: String,
        /// Structured failure payload, stored verbatim in the error channel.
        details: Option<serde_json::Value>,
    },
    #[error("tool timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution {
            message: message.into(),
            details: None,
        }
    }

    pub fn execution_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        ToolError::Execution {
            message: message.into(),
            details: Some(details),
        }
    }

    /// The structured blob handed to the error submission channel.
    pub fn raw_payload(&self) -> serde_json::Value {
        match self {
            ToolError::Execution {
                message,
                details: Some(details),
            } => serde_json::json!({ "message": message, "details": details }),
            other => serde_json::json!(other.to_string()),
        }
    }
}

/// Per-call context available to tools during execution.
///
/// **Interaction**: Built by the agent runtime before dispatching a turn's
/// tool calls; builtins use `session_id` for session-scoped storage and the
/// token to observe cancellation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub agent_id: String,
    pub session_id: String,
    pub workflow_id: Option<String>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(agent_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            workflow_id: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A callable tool. Schema validation runs before `call` is ever invoked.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Executes the tool; the returned string is what the LLM sees (or a
    /// reference handle when the result is routed out of band).
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError>;
}
