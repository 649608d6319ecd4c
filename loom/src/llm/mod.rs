//! LLM client abstraction for the agent conversation loop.
//!
//! The runtime depends on a callable that, given the rendered conversation
//! and the agent's tool schemas, returns assistant text and optional tool
//! calls; this module defines the trait and the deterministic in-tree
//! implementations. Real providers live outside this crate.

mod mock;

pub use mock::{MockLlm, ScriptedLlm, SequenceLlm};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Message, ToolCall};
use crate::tools::ToolSpec;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Rate limit or other transient provider condition; retried with backoff.
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("llm call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider error: {0}")]
    Provider(String),
}

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from one completion: assistant text and optional tool calls.
///
/// **Interaction**: Returned by `LlmClient::complete`; the runtime appends
/// `content` as an assistant message and dispatches `tool_calls` through the
/// tool executor.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    /// Empty means no tools requested; the turn loop ends.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
        }
    }
}

/// LLM client: given messages and tool schemas, returns assistant text and
/// optional tool calls.
///
/// Implementations: [`MockLlm`] (fixed response), [`ScriptedLlm`]
/// (programmable, drives deterministic workflow tests).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError>;
}
