//! LLM-driven summarization of evicted conversation turns.

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::message::Message;

use super::MemoryError;

const SUMMARY_SYSTEM_PROMPT: &str = "You compress conversation history. Summarize the \
following turns into a short paragraph preserving decisions, facts, tool outcomes, and \
open questions. Reply with the summary only.";

/// Summarizes batches of turns evicted from L1 (and re-summarizes L2 when it
/// outgrows its budget).
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Summarizes one eviction batch.
    pub async fn summarize(&self, turns: &[Message]) -> Result<String, MemoryError> {
        let transcript = turns
            .iter()
            .map(|m| format!("{}: {}", m.role(), m.content()))
            .collect::<Vec<_>>()
            .join("\n");
        self.summarize_text(&transcript).await
    }

    /// Summarizes already-summarized blocks (L2 re-compaction).
    pub async fn summarize_text(&self, text: &str) -> Result<String, MemoryError> {
        let messages = vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(text)];
        let response = self
            .llm
            .complete(&messages, &[])
            .await
            .map_err(|e| MemoryError::Summarize(e.to_string()))?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn summarize_formats_transcript() {
        let summarizer = Summarizer::new(Arc::new(MockLlm::with_no_tool_calls("a summary")));
        let out = summarizer
            .summarize(&[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        assert_eq!(out, "a summary");
    }
}
