//! SQLite-backed reference store. Persistent across process restarts.
//!
//! Rows live in the same transactional store used for sessions. GC is
//! refcount-based: `retain`/`release` adjust the count, `sweep` collects
//! unreferenced rows whose TTL has expired. Uses spawn_blocking for async.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;

use crate::codec;

use super::{
    ref_id_for, verify, RefLocation, RefStats, Reference, ReferenceError, ReferenceStore,
    StoreOpts, DEFAULT_COMPRESS_THRESHOLD,
};

/// Durable reference store. Key: ref id; blob stored compressed when large.
pub struct SqliteReferenceStore {
    db_path: std::path::PathBuf,
    compress_threshold: usize,
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn row_to_reference(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reference> {
    let ttl_ms: Option<i64> = row.get("ttl_ms")?;
    Ok(Reference {
        id: row.get("id")?,
        size: row.get::<_, i64>("size")? as u64,
        location: RefLocation::Database,
        checksum: row.get("checksum")?,
        compressed: row.get::<_, i64>("compressed")? != 0,
        content_type: row.get("content_type")?,
        stored_at: millis_to_utc(row.get("stored_at")?),
        ttl: ttl_ms.map(|ms| std::time::Duration::from_millis(ms.max(0) as u64)),
    })
}

impl SqliteReferenceStore {
    /// Opens (and creates if needed) the reference table at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| ReferenceError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS reference_blobs (
                id TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0,
                content_type TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                ttl_ms INTEGER,
                ref_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )
        .map_err(|e| ReferenceError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        })
    }

    fn open(&self) -> Result<rusqlite::Connection, ReferenceError> {
        rusqlite::Connection::open(&self.db_path)
            .map_err(|e| ReferenceError::Storage(e.to_string()))
    }

    /// Increments the refcount; a retained blob survives `sweep`.
    pub async fn retain(&self, ref_id: &str) -> Result<(), ReferenceError> {
        self.bump_refcount(ref_id, 1).await
    }

    /// Decrements the refcount (floored at zero).
    pub async fn release(&self, ref_id: &str) -> Result<(), ReferenceError> {
        self.bump_refcount(ref_id, -1).await
    }

    async fn bump_refcount(&self, ref_id: &str, delta: i64) -> Result<(), ReferenceError> {
        let db_path = self.db_path.clone();
        let id = ref_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            let changed = conn
                .execute(
                    "UPDATE reference_blobs SET ref_count = MAX(0, ref_count + ?1) WHERE id = ?2",
                    params![delta, id],
                )
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(ReferenceError::NotFound(id));
            }
            Ok(())
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
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
            location: RefLocation::Database,
            checksum: checksum.clone(),
            compressed,
            content_type: opts
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            stored_at: Utc::now(),
            ttl: opts.ttl,
        };

        let db_path = self.db_path.clone();
        let row = reference.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO reference_blobs
                    (id, content, size, checksum, compressed, content_type, stored_at, ttl_ms,
                     ref_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                        COALESCE((SELECT ref_count FROM reference_blobs WHERE id = ?1), 0))
                "#,
                params![
                    row.id,
                    stored,
                    row.size as i64,
                    row.checksum,
                    row.compressed as i64,
                    row.content_type,
                    row.stored_at.timestamp_millis(),
                    row.ttl.map(|t| t.as_millis() as i64),
                ],
            )
            .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            Ok::<(), ReferenceError>(())
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))??;

        Ok(reference)
    }

    async fn resolve(&self, ref_id: &str) -> Result<Vec<u8>, ReferenceError> {
        let db_path = self.db_path.clone();
        let id = ref_id.to_string();
        let (content, checksum, compressed): (Vec<u8>, String, bool) =
            tokio::task::spawn_blocking(move || {
                let conn = rusqlite::Connection::open(&db_path)
                    .map_err(|e| ReferenceError::Storage(e.to_string()))?;
                let mut stmt = conn
                    .prepare(
                        "SELECT content, checksum, compressed FROM reference_blobs WHERE id = ?1",
                    )
                    .map_err(|e| ReferenceError::Storage(e.to_string()))?;
                stmt.query_row(params![id], |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)? != 0,
                    ))
                })
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => ReferenceError::NotFound(id.clone()),
                    other => ReferenceError::Storage(other.to_string()),
                })
            })
            .await
            .map_err(|e| ReferenceError::Storage(e.to_string()))??;

        let bytes = if compressed {
            codec::decompress(&content).map_err(|e| ReferenceError::Storage(e.to_string()))?
        } else {
            content
        };
        verify(ref_id, &checksum, &bytes)?;
        Ok(bytes)
    }

    async fn delete(&self, ref_id: &str) -> Result<(), ReferenceError> {
        let db_path = self.db_path.clone();
        let id = ref_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            let changed = conn
                .execute("DELETE FROM reference_blobs WHERE id = ?1", params![id])
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(ReferenceError::NotFound(id));
            }
            Ok(())
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))?
    }

    async fn list(&self) -> Result<Vec<Reference>, ReferenceError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, size, checksum, compressed, content_type, stored_at, ttl_ms \
                     FROM reference_blobs ORDER BY id",
                )
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            let refs = stmt
                .query_map([], row_to_reference)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            Ok(refs)
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))?
    }

    async fn stats(&self) -> Result<RefStats, ReferenceError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0), COALESCE(SUM(LENGTH(content)), 0) \
                 FROM reference_blobs",
                [],
                |row| {
                    Ok(RefStats {
                        count: row.get::<_, i64>(0)? as usize,
                        total_bytes: row.get::<_, i64>(1)? as u64,
                        stored_bytes: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .map_err(|e| ReferenceError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))?
    }

    async fn sweep(&self) -> Result<usize, ReferenceError> {
        let db_path = self.db_path.clone();
        let now = Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            let collected = conn
                .execute(
                    "DELETE FROM reference_blobs \
                     WHERE ref_count = 0 AND ttl_ms IS NOT NULL AND stored_at + ttl_ms < ?1",
                    params![now],
                )
                .map_err(|e| ReferenceError::Storage(e.to_string()))?;
            Ok(collected)
        })
        .await
        .map_err(|e| ReferenceError::Storage(e.to_string()))?
    }
}
