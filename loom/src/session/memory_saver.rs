//! In-memory session saver. For dev and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Session, SessionError, SessionSaver};

/// Keeps sessions in a map. Not persistent.
pub struct MemorySaver {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemorySaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionSaver for MemorySaver {
    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.inner.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    /// **Scenario**: save, load, delete lifecycle.
    #[tokio::test]
    async fn lifecycle() {
        let saver = MemorySaver::new();
        let mut session = Session::new("agent-1");
        session.messages.push(Message::user("hello"));
        saver.save(&session).await.unwrap();

        let loaded = saver.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.agent_id, "agent-1");

        saver.delete(&session.id).await.unwrap();
        assert!(saver.load(&session.id).await.unwrap().is_none());
    }
}
