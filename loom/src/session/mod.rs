//! Session model and persistence.
//!
//! A session is created on an agent's first turn, mutated exclusively by its
//! owning runtime, persisted after every turn, and destroyed only by explicit
//! purge. Replaying a session's messages against a fresh runtime reproduces
//! the original render at the same turn index.

mod memory_saver;
mod sqlite_saver;

pub use memory_saver::MemorySaver;
pub use sqlite_saver::SqliteSaver;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// One agent conversation's durable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    /// Full turn-by-turn message log (the replay source).
    pub messages: Vec<Message>,
    /// Small string context attached to the session.
    #[serde(default)]
    pub context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            messages: Vec::new(),
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable session storage. Saved after every turn.
#[async_trait]
pub trait SessionSaver: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), SessionError>;
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;
    /// Explicit purge; the only way a session is destroyed.
    async fn delete(&self, id: &str) -> Result<(), SessionError>;
    async fn list(&self) -> Result<Vec<String>, SessionError>;
}
