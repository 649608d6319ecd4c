//! SQLite-backed session saver. Persistent across process restarts.
//!
//! Messages and context are serialized as JSON text; schema evolution adds
//! columns, never removes them without a migration step.

use std::path::Path;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::params;

use super::{Session, SessionError, SessionSaver};

/// Durable session store in the process's transactional SQLite file.
pub struct SqliteSaver {
    db_path: std::path::PathBuf,
}

impl SqliteSaver {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                messages TEXT NOT NULL,
                context TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, SessionError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl SessionSaver for SqliteSaver {
    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let messages = serde_json::to_string(&session.messages)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let context = serde_json::to_string(&session.context)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let row = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions \
                 (id, agent_id, messages, context, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    row.agent_id,
                    messages,
                    context,
                    row.created_at.timestamp_millis(),
                    row.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| SessionError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let result = conn.query_row(
                "SELECT id, agent_id, messages, context, created_at, updated_at \
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    let messages_json: String = row.get(2)?;
                    let context_json: String = row.get(3)?;
                    let messages = serde_json::from_str(&messages_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    let context = serde_json::from_str(&context_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(Session {
                        id: row.get(0)?,
                        agent_id: row.get(1)?,
                        messages,
                        context,
                        created_at: Utc
                            .timestamp_millis_opt(row.get(4)?)
                            .single()
                            .unwrap_or_default(),
                        updated_at: Utc
                            .timestamp_millis_opt(row.get(5)?)
                            .single()
                            .unwrap_or_default(),
                    })
                },
            );
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(SessionError::Storage(e.to_string())),
            }
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM sessions ORDER BY id")
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| SessionError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            Ok(ids)
        })
        .await
    }
}
