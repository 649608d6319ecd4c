//! Deterministic LLM clients for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::Message;
use crate::tools::ToolSpec;

use super::{LlmClient, LlmError, LlmResponse, LlmUsage};

/// Fixed-response client. Every call returns the same content with no tool calls.
pub struct MockLlm {
    content: String,
}

impl MockLlm {
    pub fn with_no_tool_calls(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        let prompt_tokens: usize = messages.iter().map(Message::approx_tokens).sum();
        Ok(LlmResponse {
            content: self.content.clone(),
            tool_calls: Vec::new(),
            usage: Some(LlmUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: self.content.len() as u32 / 4,
                total_tokens: (prompt_tokens + self.content.len() / 4) as u32,
            }),
        })
    }
}

type ScriptFn = dyn Fn(&[Message], &[ToolSpec]) -> Result<LlmResponse, LlmError> + Send + Sync;

/// Programmable client: a closure computes each response from the rendered
/// messages. This is the deterministic engine behind the pattern tests
/// (uppercase stage, reverse stage, fixed votes, and so on).
#[derive(Clone)]
pub struct ScriptedLlm {
    script: Arc<ScriptFn>,
}

impl ScriptedLlm {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&[Message], &[ToolSpec]) -> Result<LlmResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
        }
    }

    /// Client that replays a fixed sequence of responses, then repeats the
    /// last one.
    pub fn sequence(responses: Vec<LlmResponse>) -> SequenceLlm {
        SequenceLlm {
            responses: Mutex::new(responses.into_iter().collect()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        (self.script)(messages, tools)
    }
}

/// Replays queued responses in order; repeats the final response when drained.
pub struct SequenceLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
    last: Mutex<Option<LlmResponse>>,
}

#[async_trait]
impl LlmClient for SequenceLlm {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        let mut queue = self.responses.lock().await;
        if let Some(next) = queue.pop_front() {
            *self.last.lock().await = Some(next.clone());
            return Ok(next);
        }
        let last = self.last.lock().await;
        match last.as_ref() {
            Some(resp) => Ok(resp.clone()),
            None => Ok(LlmResponse::text("")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_fixed_content() {
        let llm = MockLlm::with_no_tool_calls("always this");
        let resp = llm.complete(&[Message::user("x")], &[]).await.unwrap();
        assert_eq!(resp.content, "always this");
        assert!(resp.usage.is_some());
    }

    #[tokio::test]
    async fn scripted_sees_messages() {
        let llm = ScriptedLlm::new(|messages, _tools| {
            let last = messages.last().map(|m| m.content().to_string()).unwrap_or_default();
            Ok(LlmResponse::text(last.to_uppercase()))
        });
        let resp = llm.complete(&[Message::user("hello")], &[]).await.unwrap();
        assert_eq!(resp.content, "HELLO");
    }

    #[tokio::test]
    async fn sequence_replays_then_repeats_last() {
        let llm = ScriptedLlm::sequence(vec![
            LlmResponse::text("one"),
            LlmResponse::text("two"),
        ]);
        assert_eq!(llm.complete(&[], &[]).await.unwrap().content, "one");
        assert_eq!(llm.complete(&[], &[]).await.unwrap().content, "two");
        assert_eq!(llm.complete(&[], &[]).await.unwrap().content, "two");
    }
}
