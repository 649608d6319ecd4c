//! SQLite-backed error store. Persistent across process restarts.

use std::path::Path;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::params;

use super::{generate_error_id, summarize, ErrorFilter, ErrorStore, ErrorStoreError, StoredError};

/// Durable error store in the process's transactional SQLite file.
pub struct SqliteErrorStore {
    db_path: std::path::PathBuf,
}

impl SqliteErrorStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ErrorStoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS error_records (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                session_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                raw_error TEXT NOT NULL,
                short_summary TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ErrorStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, ErrorStoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| ErrorStoreError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl ErrorStore for SqliteErrorStore {
    async fn store(
        &self,
        session_id: &str,
        tool_name: &str,
        raw_error: serde_json::Value,
    ) -> Result<String, ErrorStoreError> {
        let timestamp = Utc::now();
        let id = generate_error_id(timestamp);
        let summary = summarize(&raw_error);
        let raw_json =
            serde_json::to_string(&raw_error).map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
        let session_id = session_id.to_string();
        let tool_name = tool_name.to_string();
        let row_id = id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO error_records \
                 (id, timestamp, session_id, tool_name, raw_error, short_summary) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row_id,
                    timestamp.timestamp_millis(),
                    session_id,
                    tool_name,
                    raw_json,
                    summary,
                ],
            )
            .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<StoredError, ErrorStoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, timestamp, session_id, tool_name, raw_error, short_summary \
                 FROM error_records WHERE id = ?1",
                params![id],
                |row| {
                    let raw_json: String = row.get(4)?;
                    let raw_error = serde_json::from_str(&raw_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(StoredError {
                        id: row.get(0)?,
                        timestamp: Utc
                            .timestamp_millis_opt(row.get(1)?)
                            .single()
                            .unwrap_or_default(),
                        session_id: row.get(2)?,
                        tool_name: row.get(3)?,
                        raw_error,
                        short_summary: row.get(5)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ErrorStoreError::NotFound(id.clone()),
                other => ErrorStoreError::Storage(other.to_string()),
            })
        })
        .await
    }

    async fn list(&self, filter: ErrorFilter) -> Result<Vec<String>, ErrorStoreError> {
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT id FROM error_records WHERE 1 = 1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(s) = filter.session_id {
                args.push(Box::new(s));
                sql.push_str(&format!(" AND session_id = ?{}", args.len()));
            }
            if let Some(t) = filter.tool_name {
                args.push(Box::new(t));
                sql.push_str(&format!(" AND tool_name = ?{}", args.len()));
            }
            if let Some(since) = filter.since {
                args.push(Box::new(since.timestamp_millis()));
                sql.push_str(&format!(" AND timestamp >= ?{}", args.len()));
            }
            sql.push_str(" ORDER BY id");

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
            let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let ids = stmt
                .query_map(params_ref.as_slice(), |row| row.get::<_, String>(0))
                .map_err(|e| ErrorStoreError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ErrorStoreError::Storage(e.to_string()))?;
            Ok(ids)
        })
        .await
    }
}
