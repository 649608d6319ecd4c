//! Error submission channel: durable storage for verbose tool errors.
//!
//! Full stack traces and structured payloads go into the store; the LLM sees
//! a short replacement message carrying the error id, and can pull the full
//! record on demand through the `get_error_detail` tool (auto-registered when
//! a store is configured).

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryErrorStore;
pub use sqlite::SqliteErrorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErrorStoreError {
    #[error("error record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// One stored error record. Ids are timestamp-prefixed for lexical time
/// ordering: `err_YYYYMMDD_HHMMSS_<6 hex>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub tool_name: String,
    /// Arbitrary structured blob: traceback, provider response, anything.
    pub raw_error: serde_json::Value,
    /// First line of the error, clamped to 100 characters.
    pub short_summary: String,
}

/// Filter for `list`.
#[derive(Clone, Debug, Default)]
pub struct ErrorFilter {
    pub session_id: Option<String>,
    pub tool_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Durable store of verbose errors.
#[async_trait]
pub trait ErrorStore: Send + Sync {
    /// Stores a record built from the raw error; returns its id.
    async fn store(
        &self,
        session_id: &str,
        tool_name: &str,
        raw_error: serde_json::Value,
    ) -> Result<String, ErrorStoreError>;

    async fn get(&self, id: &str) -> Result<StoredError, ErrorStoreError>;

    /// Ids matching the filter, in lexical (= chronological) order.
    async fn list(&self, filter: ErrorFilter) -> Result<Vec<String>, ErrorStoreError>;
}

/// Maximum length of the short summary recorded with each error.
pub const SUMMARY_MAX_CHARS: usize = 100;
/// Upper bound on the LLM-facing replacement message.
pub const LLM_MESSAGE_MAX_CHARS: usize = 200;
/// Fallback truncation length when the store itself fails.
pub const FALLBACK_TRUNCATE_CHARS: usize = 500;

/// Generates `err_YYYYMMDD_HHMMSS_<6 hex>` with a cryptographic RNG suffix.
/// At same-second granularity the collision probability is 1 in 16.7M.
pub fn generate_error_id(timestamp: DateTime<Utc>) -> String {
    let mut suffix = [0u8; 3];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!(
        "err_{}_{}",
        timestamp.format("%Y%m%d_%H%M%S"),
        hex::encode(suffix)
    )
}

/// Clamps a string to `max` characters on a char boundary.
pub(crate) fn clamp_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

/// First line of the raw error, clamped to [`SUMMARY_MAX_CHARS`].
pub fn summarize(raw_error: &serde_json::Value) -> String {
    let text = match raw_error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| other.to_string()),
    };
    let first_line = text.lines().next().unwrap_or("").to_string();
    clamp_chars(&first_line, SUMMARY_MAX_CHARS)
}

/// The replacement message delivered to the LLM in place of the raw error.
/// The summary is clamped so the whole message fits [`LLM_MESSAGE_MAX_CHARS`].
pub fn format_for_llm(tool_name: &str, summary: &str, error_id: &str) -> String {
    let render = |s: &str| {
        format!(
            "Tool '{}' failed: {}. [Error ID: {}] Use get_error_detail(\"{}\") for full details.",
            tool_name, s, error_id, error_id
        )
    };
    let full = render(summary);
    if full.chars().count() <= LLM_MESSAGE_MAX_CHARS {
        return full;
    }
    let fixed = render("").chars().count();
    let budget = LLM_MESSAGE_MAX_CHARS.saturating_sub(fixed);
    render(&clamp_chars(summary, budget))
}

/// Fallback when the store is unavailable: plain truncation at a safe length.
pub fn format_fallback(tool_name: &str, raw_error: &serde_json::Value) -> String {
    let text = match raw_error {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "Tool '{}' failed: {}",
        tool_name,
        clamp_chars(&text, FALLBACK_TRUNCATE_CHARS)
    )
}
