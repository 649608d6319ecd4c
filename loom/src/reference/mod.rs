//! Content-addressed blob store backing reference payloads.
//!
//! A [`Reference`] owns its underlying bytes; content is immutable once stored
//! and updates require a new id. Ids are derived from the content checksum, so
//! storing identical bytes twice yields the same reference.
//!
//! Two backends:
//! - [`InMemoryReferenceStore`]: mapping keyed by ref id, TTL-sweep GC.
//! - [`SqliteReferenceStore`]: rows in the process's transactional store,
//!   refcount-based GC with a manual sweep.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryReferenceStore;
pub use sqlite::SqliteReferenceStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec;

/// Where a reference's bytes live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefLocation {
    Memory,
    Disk,
    Database,
}

/// Handle to bytes stored out of band. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    pub location: RefLocation,
    /// Lowercase hex SHA-256 of the uncompressed bytes.
    pub checksum: String,
    pub compressed: bool,
    pub content_type: String,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

/// Options for one `store` call.
#[derive(Clone, Debug, Default)]
pub struct StoreOpts {
    pub content_type: Option<String>,
    pub ttl: Option<Duration>,
}

impl StoreOpts {
    pub fn with_content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Store-level counters reported by `stats`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RefStats {
    pub count: usize,
    /// Sum of uncompressed sizes.
    pub total_bytes: u64,
    /// Bytes actually held after compression.
    pub stored_bytes: u64,
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference not found: {0}")]
    NotFound(String),
    #[error("integrity check failed for {id}: stored {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Blobs strictly larger than this are compressed before storage.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 4096;

/// Content-addressed blob store.
///
/// `resolve` must return bytes whose checksum matches the stored value or
/// fail with [`ReferenceError::Integrity`].
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn store(&self, bytes: &[u8], opts: StoreOpts) -> Result<Reference, ReferenceError>;
    async fn resolve(&self, ref_id: &str) -> Result<Vec<u8>, ReferenceError>;
    async fn delete(&self, ref_id: &str) -> Result<(), ReferenceError>;
    async fn list(&self) -> Result<Vec<Reference>, ReferenceError>;
    async fn stats(&self) -> Result<RefStats, ReferenceError>;
    /// Removes garbage (TTL-expired, or unreferenced for refcounted backends).
    /// Returns the number of blobs collected.
    async fn sweep(&self) -> Result<usize, ReferenceError>;
}

/// Derives a reference id from the content checksum (first 32 hex chars).
pub(crate) fn ref_id_for(checksum: &str) -> String {
    format!("ref_{}", &checksum[..32.min(checksum.len())])
}

/// Verifies resolved bytes against the recorded checksum.
pub(crate) fn verify(id: &str, expected: &str, bytes: &[u8]) -> Result<(), ReferenceError> {
    let actual = codec::checksum_hex(bytes);
    if actual != expected {
        return Err(ReferenceError::Integrity {
            id: id.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_id_is_checksum_prefixed() {
        let checksum = codec::checksum_hex(b"hello");
        let id = ref_id_for(&checksum);
        assert!(id.starts_with("ref_"));
        assert_eq!(id.len(), 4 + 32);
    }

    #[test]
    fn verify_detects_mismatch() {
        let checksum = codec::checksum_hex(b"hello");
        assert!(verify("ref_x", &checksum, b"hello").is_ok());
        let err = verify("ref_x", &checksum, b"tampered").unwrap_err();
        assert!(matches!(err, ReferenceError::Integrity { .. }));
    }
}
