//! Namespaces and entry metadata for the shared memory store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scoping domain for shared memory keys.
///
/// `Agent` is the privacy boundary: the agent id is part of the storage
/// prefix, so two agents writing the same raw key never collide and never
/// see each other's entries. `Session` is a shared session-scoped namespace
/// with no isolation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SharedNamespace {
    Global,
    Workflow(String),
    Swarm(String),
    Debate(String),
    Session(String),
    Agent(String),
}

impl SharedNamespace {
    /// Storage prefix for this namespace. For `Agent`, the writer's agent id
    /// is the prefix, which is what auto-prefixes every key written under it.
    pub fn storage_prefix(&self) -> String {
        match self {
            SharedNamespace::Global => "global".to_string(),
            SharedNamespace::Workflow(id) => format!("workflow/{}", id),
            SharedNamespace::Swarm(id) => format!("swarm/{}", id),
            SharedNamespace::Debate(id) => format!("debate/{}", id),
            SharedNamespace::Session(id) => format!("session/{}", id),
            SharedNamespace::Agent(agent_id) => format!("agent/{}", agent_id),
        }
    }

    /// Full storage key for a raw key under this namespace.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}\0{}", self.storage_prefix(), key)
    }
}

/// Metadata recorded with every entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub namespace: SharedNamespace,
    /// Uncompressed size in bytes.
    pub size: u64,
    pub compressed: bool,
    /// Lowercase hex SHA-256 of the uncompressed bytes.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// Updated on every read; governs LRU eviction.
    pub last_accessed_at: DateTime<Utc>,
    /// Entries with a non-zero refcount are never evicted.
    pub ref_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}
