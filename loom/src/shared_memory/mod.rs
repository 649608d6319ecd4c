//! Namespaced key-value store with a bounded memory tier backed by a disk tier.
//!
//! Entries above the compression threshold are compressed before storage;
//! checksums always cover the uncompressed bytes. When the memory tier
//! exceeds its budget, the least-recently-accessed unpinned entries are
//! spilled to the disk tier (uncompressed, written atomically via
//! temp + rename). A background sweeper removes TTL-expired entries.
//!
//! Failure model: a disk IO error during eviction leaves the entry in
//! memory and logs a warning; eviction is retried on the next write.

mod entry;

pub use entry::{EntryMeta, SharedNamespace};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::codec;

#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("integrity check failed for {key}: stored {expected}, got {actual}")]
    Integrity {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Tier budgets and thresholds.
#[derive(Clone, Debug)]
pub struct SharedMemoryConfig {
    /// Memory tier budget in bytes (default 1 GiB).
    pub memory_budget: u64,
    /// Disk tier budget in bytes (default 10 GiB).
    pub disk_budget: u64,
    /// Entries strictly larger than this are compressed (default 1 MiB).
    pub compress_threshold: usize,
    /// Spill directory for the disk tier.
    pub spill_dir: PathBuf,
}

impl SharedMemoryConfig {
    pub fn with_spill_dir(spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_budget: 1 << 30,
            disk_budget: 10 << 30,
            compress_threshold: 1 << 20,
            spill_dir: spill_dir.into(),
        }
    }
}

/// Options for one `put` call.
#[derive(Clone, Debug, Default)]
pub struct PutOpts {
    pub ttl: Option<Duration>,
}

impl PutOpts {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Per-namespace counters reported by `stats`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NamespaceStats {
    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub disk_entries: usize,
    pub disk_bytes: u64,
}

struct MemEntry {
    meta: EntryMeta,
    /// Compressed when `meta.compressed` is set.
    bytes: Vec<u8>,
    stored: Instant,
    touch: u64,
}

struct DiskEntry {
    meta: EntryMeta,
    path: PathBuf,
    size_on_disk: u64,
    stored: Instant,
    touch: u64,
}

fn expired(ttl: Option<Duration>, stored: Instant, now: Instant) -> bool {
    match ttl {
        Some(ttl) => now.duration_since(stored) > ttl,
        None => false,
    }
}

#[derive(Default)]
struct Tiers {
    memory: HashMap<String, MemEntry>,
    memory_bytes: u64,
    disk: HashMap<String, DiskEntry>,
    disk_bytes: u64,
    touch_counter: u64,
}

impl Tiers {
    fn next_touch(&mut self) -> u64 {
        self.touch_counter += 1;
        self.touch_counter
    }
}

/// Handle to the background TTL sweeper; `stop` cancels the task.
pub struct SweeperHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

/// Namespaced tiered KV store, shared across the process.
///
/// **Interaction**: Used as `Arc<SharedMemory>` by the fabric and the tool
/// executor (large tool results). The memory tier sits behind a
/// reader-writer lock; disk writes are atomic temp + rename.
pub struct SharedMemory {
    inner: Arc<RwLock<Tiers>>,
    config: SharedMemoryConfig,
}

impl SharedMemory {
    pub fn new(config: SharedMemoryConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tiers::default())),
            config,
        }
    }

    /// Store bound to a temp-style spill dir; budgets at defaults.
    pub fn with_spill_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(SharedMemoryConfig::with_spill_dir(dir))
    }

    pub fn config(&self) -> &SharedMemoryConfig {
        &self.config
    }

    pub async fn put(
        &self,
        ns: &SharedNamespace,
        key: &str,
        bytes: &[u8],
        opts: PutOpts,
    ) -> Result<(), SharedMemoryError> {
        let storage_key = ns.storage_key(key);
        let checksum = codec::checksum_hex(bytes);
        let compressed = bytes.len() > self.config.compress_threshold;
        let stored_bytes = if compressed {
            codec::compress(bytes).map_err(|e| SharedMemoryError::Storage(e.to_string()))?
        } else {
            bytes.to_vec()
        };

        let now = Utc::now();
        let meta = EntryMeta {
            key: key.to_string(),
            namespace: ns.clone(),
            size: bytes.len() as u64,
            compressed,
            checksum,
            created_at: now,
            last_accessed_at: now,
            ref_count: 0,
            ttl: opts.ttl,
        };

        let mut tiers = self.inner.write().await;
        let touch = tiers.next_touch();
        // Replacing an entry under the same key keeps its refcount.
        let ref_count = tiers
            .memory
            .get(&storage_key)
            .map(|e| e.meta.ref_count)
            .unwrap_or(0);
        if let Some(old) = tiers.memory.remove(&storage_key) {
            tiers.memory_bytes -= old.bytes.len() as u64;
        }
        if let Some(old) = tiers.disk.remove(&storage_key) {
            tiers.disk_bytes -= old.size_on_disk;
            let _ = tokio::fs::remove_file(&old.path).await;
        }
        let mut meta = meta;
        meta.ref_count = ref_count;
        tiers.memory_bytes += stored_bytes.len() as u64;
        tiers.memory.insert(
            storage_key,
            MemEntry {
                meta,
                bytes: stored_bytes,
                stored: Instant::now(),
                touch,
            },
        );

        self.evict_if_needed(&mut tiers).await;
        Ok(())
    }

    pub async fn get(
        &self,
        ns: &SharedNamespace,
        key: &str,
    ) -> Result<Vec<u8>, SharedMemoryError> {
        let storage_key = ns.storage_key(key);
        let now = Instant::now();
        let mut tiers = self.inner.write().await;
        let touch = tiers.next_touch();

        if let Some(entry) = tiers.memory.get_mut(&storage_key) {
            if expired(entry.meta.ttl, entry.stored, now) {
                if let Some(dead) = tiers.memory.remove(&storage_key) {
                    tiers.memory_bytes -= dead.bytes.len() as u64;
                }
                return Err(SharedMemoryError::NotFound(key.to_string()));
            }
            entry.touch = touch;
            entry.meta.last_accessed_at = Utc::now();
            let bytes = if entry.meta.compressed {
                codec::decompress(&entry.bytes)
                    .map_err(|e| SharedMemoryError::Storage(e.to_string()))?
            } else {
                entry.bytes.clone()
            };
            return verify_entry(key, &entry.meta.checksum, bytes);
        }

        // Memory miss: check the disk tier, promote on hit if space permits.
        if let Some(entry) = tiers.disk.get_mut(&storage_key) {
            if expired(entry.meta.ttl, entry.stored, now) {
                if let Some(dead) = tiers.disk.remove(&storage_key) {
                    tiers.disk_bytes -= dead.size_on_disk;
                    let _ = tokio::fs::remove_file(&dead.path).await;
                }
                return Err(SharedMemoryError::NotFound(key.to_string()));
            }
            entry.touch = touch;
            entry.meta.last_accessed_at = Utc::now();
            let path = entry.path.clone();
            let mut meta = entry.meta.clone();
            let stored = entry.stored;
            let size_on_disk = entry.size_on_disk;

            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| SharedMemoryError::Storage(e.to_string()))?;
            let checksum = meta.checksum.clone();

            if tiers.memory_bytes + bytes.len() as u64 <= self.config.memory_budget {
                tiers.disk.remove(&storage_key);
                tiers.disk_bytes -= size_on_disk;
                let _ = tokio::fs::remove_file(&path).await;
                meta.compressed = false;
                tiers.memory_bytes += bytes.len() as u64;
                tiers.memory.insert(
                    storage_key,
                    MemEntry {
                        meta,
                        bytes: bytes.clone(),
                        stored,
                        touch,
                    },
                );
            }
            return verify_entry(key, &checksum, bytes);
        }

        Err(SharedMemoryError::NotFound(key.to_string()))
    }

    pub async fn delete(
        &self,
        ns: &SharedNamespace,
        key: &str,
    ) -> Result<(), SharedMemoryError> {
        let storage_key = ns.storage_key(key);
        let mut tiers = self.inner.write().await;
        let mut found = false;
        if let Some(old) = tiers.memory.remove(&storage_key) {
            tiers.memory_bytes -= old.bytes.len() as u64;
            found = true;
        }
        if let Some(old) = tiers.disk.remove(&storage_key) {
            tiers.disk_bytes -= old.size_on_disk;
            let _ = tokio::fs::remove_file(&old.path).await;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(SharedMemoryError::NotFound(key.to_string()))
        }
    }

    /// Lists raw keys in a namespace, optionally filtered by key prefix.
    /// For the `Agent` namespace only the calling agent's keys are visible,
    /// since the agent id is part of the storage prefix.
    pub async fn list(
        &self,
        ns: &SharedNamespace,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, SharedMemoryError> {
        let ns_prefix = format!("{}\0", ns.storage_prefix());
        let tiers = self.inner.read().await;
        let mut keys: Vec<String> = tiers
            .memory
            .keys()
            .chain(tiers.disk.keys())
            .filter_map(|k| k.strip_prefix(&ns_prefix))
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .map(|k| k.to_string())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub async fn stats(&self, ns: &SharedNamespace) -> NamespaceStats {
        let ns_prefix = format!("{}\0", ns.storage_prefix());
        let tiers = self.inner.read().await;
        let mut stats = NamespaceStats::default();
        for (k, e) in tiers.memory.iter() {
            if k.starts_with(&ns_prefix) {
                stats.memory_entries += 1;
                stats.memory_bytes += e.bytes.len() as u64;
            }
        }
        for (k, e) in tiers.disk.iter() {
            if k.starts_with(&ns_prefix) {
                stats.disk_entries += 1;
                stats.disk_bytes += e.size_on_disk;
            }
        }
        stats
    }

    /// Pins an entry; pinned entries are never evicted from the memory tier.
    pub async fn retain(
        &self,
        ns: &SharedNamespace,
        key: &str,
    ) -> Result<(), SharedMemoryError> {
        self.adjust_refcount(ns, key, 1).await
    }

    /// Unpins an entry (refcount floored at zero).
    pub async fn release(
        &self,
        ns: &SharedNamespace,
        key: &str,
    ) -> Result<(), SharedMemoryError> {
        self.adjust_refcount(ns, key, -1).await
    }

    async fn adjust_refcount(
        &self,
        ns: &SharedNamespace,
        key: &str,
        delta: i64,
    ) -> Result<(), SharedMemoryError> {
        let storage_key = ns.storage_key(key);
        let mut tiers = self.inner.write().await;
        if let Some(e) = tiers.memory.get_mut(&storage_key) {
            e.meta.ref_count = (e.meta.ref_count as i64 + delta).max(0) as u32;
            return Ok(());
        }
        if let Some(e) = tiers.disk.get_mut(&storage_key) {
            e.meta.ref_count = (e.meta.ref_count as i64 + delta).max(0) as u32;
            return Ok(());
        }
        Err(SharedMemoryError::NotFound(key.to_string()))
    }

    /// Removes TTL-expired entries from both tiers. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut tiers = self.inner.write().await;
        let mut removed = 0;

        let dead_mem: Vec<String> = tiers
            .memory
            .iter()
            .filter(|(_, e)| expired(e.meta.ttl, e.stored, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in dead_mem {
            if let Some(e) = tiers.memory.remove(&k) {
                tiers.memory_bytes -= e.bytes.len() as u64;
                removed += 1;
            }
        }

        let dead_disk: Vec<String> = tiers
            .disk
            .iter()
            .filter(|(_, e)| expired(e.meta.ttl, e.stored, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in dead_disk {
            if let Some(e) = tiers.disk.remove(&k) {
                tiers.disk_bytes -= e.size_on_disk;
                let _ = tokio::fs::remove_file(&e.path).await;
                removed += 1;
            }
        }
        removed
    }

    /// Spawns the periodic TTL sweeper.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let token = CancellationToken::new();
        let child = token.child_token();
        let store = Arc::clone(self);
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = store.sweep().await;
                        if removed > 0 {
                            tracing::debug!(removed, "shared memory sweep removed expired entries");
                        }
                    }
                }
            }
        });
        SweeperHandle { token, join }
    }

    /// Evicts least-recently-accessed unpinned entries until the memory tier
    /// fits its budget. Spilled bytes are written uncompressed, atomically.
    async fn evict_if_needed(&self, tiers: &mut Tiers) {
        while tiers.memory_bytes > self.config.memory_budget {
            let candidate = tiers
                .memory
                .iter()
                .filter(|(_, e)| e.meta.ref_count == 0)
                .min_by_key(|(_, e)| e.touch)
                .map(|(k, _)| k.clone());
            let Some(storage_key) = candidate else {
                // Everything is pinned; nothing to evict.
                break;
            };

            let entry = match tiers.memory.get(&storage_key) {
                Some(e) => e,
                None => break,
            };
            let bytes = if entry.meta.compressed {
                match codec::decompress(&entry.bytes) {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::warn!(key = %entry.meta.key, error = %e,
                            "eviction decompress failed; entry stays in memory");
                        break;
                    }
                }
            } else {
                entry.bytes.clone()
            };

            match self.spill_to_disk(&storage_key, &bytes).await {
                Ok(path) => {
                    let Some(e) = tiers.memory.remove(&storage_key) else {
                        break;
                    };
                    tiers.memory_bytes -= e.bytes.len() as u64;
                    let mut meta = e.meta;
                    meta.compressed = false;
                    tiers.disk_bytes += bytes.len() as u64;
                    tiers.disk.insert(
                        storage_key,
                        DiskEntry {
                            meta,
                            path,
                            size_on_disk: bytes.len() as u64,
                            stored: e.stored,
                            touch: e.touch,
                        },
                    );
                }
                Err(e) => {
                    // Entry stays in memory; eviction retried on next write.
                    tracing::warn!(error = %e, "disk spill failed during eviction");
                    break;
                }
            }
        }

        self.shrink_disk_if_needed(tiers).await;
    }

    async fn spill_to_disk(
        &self,
        storage_key: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, SharedMemoryError> {
        tokio::fs::create_dir_all(&self.config.spill_dir)
            .await
            .map_err(|e| SharedMemoryError::Storage(e.to_string()))?;
        let name = codec::checksum_hex(storage_key.as_bytes());
        let path = self.config.spill_dir.join(format!("{}.blob", &name[..32]));
        let tmp = self.config.spill_dir.join(format!("{}.tmp", &name[..32]));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SharedMemoryError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SharedMemoryError::Storage(e.to_string()))?;
        Ok(path)
    }

    /// Disk budget overflow: drop TTL-expired entries first, then LRU.
    async fn shrink_disk_if_needed(&self, tiers: &mut Tiers) {
        if tiers.disk_bytes <= self.config.disk_budget {
            return;
        }
        let now = Instant::now();
        let dead: Vec<String> = tiers
            .disk
            .iter()
            .filter(|(_, e)| expired(e.meta.ttl, e.stored, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in dead {
            if let Some(e) = tiers.disk.remove(&k) {
                tiers.disk_bytes -= e.size_on_disk;
                let _ = tokio::fs::remove_file(&e.path).await;
            }
        }
        while tiers.disk_bytes > self.config.disk_budget {
            let candidate = tiers
                .disk
                .iter()
                .filter(|(_, e)| e.meta.ref_count == 0)
                .min_by_key(|(_, e)| e.touch)
                .map(|(k, _)| k.clone());
            let Some(k) = candidate else { break };
            if let Some(e) = tiers.disk.remove(&k) {
                tiers.disk_bytes -= e.size_on_disk;
                let _ = tokio::fs::remove_file(&e.path).await;
            }
        }
    }
}

fn verify_entry(
    key: &str,
    expected: &str,
    bytes: Vec<u8>,
) -> Result<Vec<u8>, SharedMemoryError> {
    let actual = codec::checksum_hex(&bytes);
    if actual != expected {
        return Err(SharedMemoryError::Integrity {
            key: key.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(bytes)
}
