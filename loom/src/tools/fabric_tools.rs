//! Fabric messaging tools: how agents publish to topics and address peers.
//!
//! Registered by the orchestrator; event-driven workflows append them to
//! every agent's tool set so coordination graphs emerge from who subscribes
//! where and who addresses whom.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::fabric::Fabric;
use crate::payload::MSG_GENERAL;

use super::{Tool, ToolContext, ToolError, ToolSpec};

pub const TOOL_PUBLISH_MESSAGE: &str = "publish_message";
pub const TOOL_SEND_MESSAGE: &str = "send_message";

/// Publishes a message on a bus topic; delivery fans out to subscribers.
pub struct PublishMessageTool {
    fabric: Arc<Fabric>,
}

impl PublishMessageTool {
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self { fabric }
    }
}

#[async_trait]
impl Tool for PublishMessageTool {
    fn name(&self) -> &str {
        TOOL_PUBLISH_MESSAGE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_PUBLISH_MESSAGE.to_string(),
            description: Some(
                "Broadcast a message on a topic. Every agent subscribed to a matching pattern \
                 receives it."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "required": ["topic", "message"],
                "properties": {
                    "topic": { "type": "string", "description": "Dotted topic, e.g. workflow.step.1" },
                    "message": { "type": "string" }
                }
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let topic = args
            .get("topic")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("topic must be a string".to_string()))?;
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("message must be a string".to_string()))?;
        self.fabric
            .publish(
                topic,
                &ctx.agent_id,
                MSG_GENERAL,
                message.as_bytes(),
                HashMap::new(),
            )
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;
        Ok(format!("published to {}", topic))
    }
}

/// Sends a durable point-to-point message to another agent by id.
pub struct SendMessageTool {
    fabric: Arc<Fabric>,
}

impl SendMessageTool {
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self { fabric }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        TOOL_SEND_MESSAGE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SEND_MESSAGE.to_string(),
            description: Some(
                "Send a direct message to another agent. Delivery is durable and at-least-once."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "required": ["to", "message"],
                "properties": {
                    "to": { "type": "string", "description": "Recipient agent id" },
                    "message": { "type": "string" }
                }
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let to = args
            .get("to")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("to must be a string".to_string()))?;
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("message must be a string".to_string()))?;
        let id = self
            .fabric
            .send_to(&ctx.agent_id, to, MSG_GENERAL, message.as_bytes())
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;
        Ok(format!("sent to {} ({})", to, id))
    }
}
