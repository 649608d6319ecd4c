//! In-memory reference store. Not persistent; GC by TTL sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::codec;

use super::{
    ref_id_for, verify, RefLocation, RefStats, Reference, ReferenceError, ReferenceStore,
    StoreOpts, DEFAULT_COMPRESS_THRESHOLD,
};

struct StoredBlob {
    reference: Reference,
    /// Compressed when `reference.compressed` is set.
    bytes: Vec<u8>,
    stored_at: Instant,
}

impl StoredBlob {
    fn expired(&self, now: Instant) -> bool {
        match self.reference.ttl {
            Some(ttl) => now.duration_since(self.stored_at) > ttl,
            None => false,
        }
    }
}

/// In-memory reference store keyed by ref id.
///
/// **Interaction**: Used as `Arc<dyn ReferenceStore>` by the fabric in tests
/// and single-process deployments; `SqliteReferenceStore` is the durable
/// counterpart.
pub struct InMemoryReferenceStore {
    inner: Arc<RwLock<HashMap<String, StoredBlob>>>,
    compress_threshold: usize,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::with_compress_threshold(DEFAULT_COMPRESS_THRESHOLD)
    }

    pub fn with_compress_threshold(compress_threshold: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            compress_threshold,
        }
    }
}

impl Default for InMemoryReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn store(&self, bytes: &[u8], opts: StoreOpts) -> Result<Reference, ReferenceError> {
        let checksum = codec::checksum_hex(bytes);
        let id = ref_id_for(&checksum);

        let compressed = bytes.len() > self.compress_threshold;
        let stored = if compressed {
            codec::compress(bytes).map_err(|e| ReferenceError::Storage(e.to_string()))?
        } else {
            bytes.to_vec()
        };

        let reference = Reference {
            id: id.clone(),
            size: bytes.len() as u64,
            location: RefLocation::Memory,
            checksum,
            compressed,
            content_type: opts
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            stored_at: Utc::now(),
            ttl: opts.ttl,
        };

        let mut guard = self.inner.write().await;
        // Same content, same id: refresh the entry rather than duplicate it.
        guard.insert(
            id,
            StoredBlob {
                reference: reference.clone(),
                bytes: stored,
                stored_at: Instant::now(),
            },
        );
        Ok(reference)
    }

    async fn resolve(&self, ref_id: &str) -> Result<Vec<u8>, ReferenceError> {
        let guard = self.inner.read().await;
        let blob = guard
            .get(ref_id)
            .filter(|b| !b.expired(Instant::now()))
            .ok_or_else(|| ReferenceError::NotFound(ref_id.to_string()))?;

        let bytes = if blob.reference.compressed {
            codec::decompress(&blob.bytes).map_err(|e| ReferenceError::Storage(e.to_string()))?
        } else {
            blob.bytes.clone()
        };
        verify(ref_id, &blob.reference.checksum, &bytes)?;
        Ok(bytes)
    }

    async fn delete(&self, ref_id: &str) -> Result<(), ReferenceError> {
        let mut guard = self.inner.write().await;
        guard
            .remove(ref_id)
            .map(|_| ())
            .ok_or_else(|| ReferenceError::NotFound(ref_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Reference>, ReferenceError> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        let mut refs: Vec<Reference> = guard
            .values()
            .filter(|b| !b.expired(now))
            .map(|b| b.reference.clone())
            .collect();
        refs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(refs)
    }

    async fn stats(&self) -> Result<RefStats, ReferenceError> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        let mut stats = RefStats::default();
        for blob in guard.values().filter(|b| !b.expired(now)) {
            stats.count += 1;
            stats.total_bytes += blob.reference.size;
            stats.stored_bytes += blob.bytes.len() as u64;
        }
        Ok(stats)
    }

    async fn sweep(&self) -> Result<usize, ReferenceError> {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, blob| !blob.expired(now));
        Ok(before - guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: resolve(store(bytes)) = bytes for any payload size.
    #[tokio::test]
    async fn store_resolve_round_trip() {
        let store = InMemoryReferenceStore::new();
        let small = b"tiny".to_vec();
        let large = vec![7u8; 64 * 1024];

        let r1 = store.store(&small, StoreOpts::default()).await.unwrap();
        let r2 = store.store(&large, StoreOpts::default()).await.unwrap();

        assert!(!r1.compressed);
        assert!(r2.compressed);
        assert_eq!(store.resolve(&r1.id).await.unwrap(), small);
        assert_eq!(store.resolve(&r2.id).await.unwrap(), large);
    }

    /// **Scenario**: checksum recorded on the reference matches the resolved bytes.
    #[tokio::test]
    async fn checksum_covers_uncompressed_bytes() {
        let store = InMemoryReferenceStore::new();
        let data = vec![1u8; 32 * 1024];
        let reference = store.store(&data, StoreOpts::default()).await.unwrap();
        let resolved = store.resolve(&reference.id).await.unwrap();
        assert_eq!(codec::checksum_hex(&resolved), reference.checksum);
    }

    /// **Scenario**: same bytes stored twice yield the same id (content addressing).
    #[tokio::test]
    async fn identical_content_shares_id() {
        let store = InMemoryReferenceStore::new();
        let a = store.store(b"same", StoreOpts::default()).await.unwrap();
        let b = store.store(b"same", StoreOpts::default()).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.stats().await.unwrap().count, 1);
    }

    /// **Scenario**: unknown id fails with NotFound.
    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let store = InMemoryReferenceStore::new();
        let err = store.resolve("ref_missing").await.unwrap_err();
        assert!(matches!(err, ReferenceError::NotFound(_)));
    }

    /// **Scenario**: TTL-expired blobs are invisible and collected by sweep.
    #[tokio::test]
    async fn ttl_expiry_and_sweep() {
        let store = InMemoryReferenceStore::new();
        let opts = StoreOpts::default().with_ttl(Duration::from_millis(10));
        let r = store.store(b"short-lived", opts).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(
            store.resolve(&r.id).await,
            Err(ReferenceError::NotFound(_))
        ));
        assert_eq!(store.sweep().await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().count, 0);
    }

    /// **Scenario**: delete removes the blob; second delete reports NotFound.
    #[tokio::test]
    async fn delete_then_not_found() {
        let store = InMemoryReferenceStore::new();
        let r = store.store(b"x", StoreOpts::default()).await.unwrap();
        store.delete(&r.id).await.unwrap();
        assert!(matches!(
            store.delete(&r.id).await,
            Err(ReferenceError::NotFound(_))
        ));
    }
}
