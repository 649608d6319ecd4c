//! In-memory error store. Not persistent.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{generate_error_id, summarize, ErrorFilter, ErrorStore, ErrorStoreError, StoredError};

/// In-memory error store keyed by id. BTreeMap keeps lexical (= time) order.
pub struct InMemoryErrorStore {
    inner: Arc<RwLock<BTreeMap<String, StoredError>>>,
}

impl InMemoryErrorStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryErrorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ErrorStore for InMemoryErrorStore {
    async fn store(
        &self,
        session_id: &str,
        tool_name: &str,
        raw_error: serde_json::Value,
    ) -> Result<String, ErrorStoreError> {
        let timestamp = Utc::now();
        let id = generate_error_id(timestamp);
        let record = StoredError {
            id: id.clone(),
            timestamp,
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            short_summary: summarize(&raw_error),
            raw_error,
        };
        self.inner.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<StoredError, ErrorStoreError> {
        self.inner
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ErrorStoreError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: ErrorFilter) -> Result<Vec<String>, ErrorStoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .filter(|e| {
                filter
                    .session_id
                    .as_ref()
                    .map_or(true, |s| &e.session_id == s)
                    && filter.tool_name.as_ref().map_or(true, |t| &e.tool_name == t)
                    && filter.since.map_or(true, |since| e.timestamp >= since)
            })
            .map(|e| e.id.clone())
            .collect())
    }
}
