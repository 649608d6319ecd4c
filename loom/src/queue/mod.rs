//! Durable point-to-point message queue.
//!
//! Backing store is a SQLite row store with indexes on `(to_agent, status)`,
//! `correlation_id`, and `expires_at`. Delivery is at-least-once: duplicates
//! are possible on a crash between ack computation and ack persistence, so
//! consumers must be idempotent on `correlation_id` when it matters.
//!
//! State machine: `pending → delivered` on receive; nack returns a delivered
//! message to `pending` with backoff until `retry_count == max_retries`, then
//! `failed`; `pending → expired` once past `expires_at`. Terminal states
//! (`delivered` after ack, `failed`, `expired`) are never mutated.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::MessagePayload;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("request timed out waiting for correlated reply ({0})")]
    RequestTimeout(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    fn as_i64(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    fn from_i64(v: i64) -> Self {
        match v {
            0 => Priority::Low,
            2 => Priority::High,
            _ => Priority::Normal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Delivered,
    Failed,
    Expired,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Delivered => "delivered",
            QueueStatus::Failed => "failed",
            QueueStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "delivered" => QueueStatus::Delivered,
            "failed" => QueueStatus::Failed,
            "expired" => QueueStatus::Expired,
            _ => QueueStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, QueueStatus::Pending)
    }
}

/// A message as stored in the queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub message_type: String,
    pub correlation_id: Option<String>,
    pub payload: MessagePayload,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: QueueStatus,
}

/// Parameters for one `send`.
#[derive(Clone, Debug)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub message_type: String,
    pub payload: MessagePayload,
    pub priority: Priority,
    pub correlation_id: Option<String>,
    pub ttl: Option<Duration>,
    pub max_retries: u32,
}

impl OutgoingMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        message_type: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message_type: message_type.into(),
            payload,
            priority: Priority::Normal,
            correlation_id: None,
            ttl: None,
            max_retries: BackoffPolicy::default().max_retries,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Narrowing predicate for `receive`.
#[derive(Clone, Debug, Default)]
pub struct ReceiveFilter {
    pub message_type: Option<String>,
    pub correlation_id: Option<String>,
}

/// Exponential backoff applied between delivery attempts after a nack.
/// Wait is `base · multiplier^attempt`, capped at `max_backoff`.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(8),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let wait = self.base.mul_f64(factor);
        wait.min(self.max_backoff)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueMessage> {
    let payload_json: String = row.get("payload")?;
    let payload: MessagePayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let expires_at: Option<i64> = row.get("expires_at")?;
    let status: String = row.get("status")?;
    Ok(QueueMessage {
        id: row.get("id")?,
        from: row.get("from_agent")?,
        to: row.get("to_agent")?,
        message_type: row.get("msg_type")?,
        correlation_id: row.get("correlation_id")?,
        payload,
        priority: Priority::from_i64(row.get("priority")?),
        created_at: millis_to_utc(row.get("created_at")?),
        expires_at: expires_at.map(millis_to_utc),
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        max_retries: row.get::<_, i64>("max_retries")? as u32,
        status: QueueStatus::parse(&status),
    })
}

/// Durable P2P queue over a SQLite row store.
///
/// **Interaction**: One instance per process, shared via `Arc`; the fabric
/// routes payloads before `send`. All SQLite work runs on the blocking pool.
pub struct MessageQueue {
    db_path: std::path::PathBuf,
    backoff: BackoffPolicy,
}

impl MessageQueue {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        Self::with_backoff(path, BackoffPolicy::default())
    }

    pub fn with_backoff(path: impl AsRef<Path>, backoff: BackoffPolicy) -> Result<Self, QueueError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| QueueError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id TEXT PRIMARY KEY,
                from_agent TEXT NOT NULL,
                to_agent TEXT NOT NULL,
                msg_type TEXT NOT NULL,
                correlation_id TEXT,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                next_attempt_at INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                delivered_at INTEGER,
                failure_reason TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_queue_to_status ON queue_messages (to_agent, status);
            CREATE INDEX IF NOT EXISTS idx_queue_correlation ON queue_messages (correlation_id);
            CREATE INDEX IF NOT EXISTS idx_queue_expires ON queue_messages (expires_at);
            "#,
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(Self { db_path, backoff })
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?
    }

    /// Enqueues a message; returns its id.
    pub async fn send(&self, message: OutgoingMessage) -> Result<String, QueueError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = message.ttl.map(|ttl| now.timestamp_millis() + ttl.as_millis() as i64);
        let payload_json =
            serde_json::to_string(&message.payload).map_err(|e| QueueError::Storage(e.to_string()))?;
        let row_id = id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO queue_messages
                    (id, from_agent, to_agent, msg_type, correlation_id, payload, priority,
                     created_at, expires_at, max_retries)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    row_id,
                    message.from,
                    message.to,
                    message.message_type,
                    message.correlation_id,
                    payload_json,
                    message.priority.as_i64(),
                    now.timestamp_millis(),
                    expires_at,
                    message.max_retries as i64,
                ],
            )
            .map_err(|e| QueueError::Storage(e.to_string()))?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    /// Receives the next pending message for `to`, marking it delivered.
    /// Higher priority first; FIFO within a priority. Returns `None` when
    /// nothing arrives within the timeout.
    pub async fn receive(
        &self,
        to: &str,
        filter: Option<ReceiveFilter>,
        timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_claim(to, filter.clone()).await? {
                return Ok(Some(message));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    async fn try_claim(
        &self,
        to: &str,
        filter: Option<ReceiveFilter>,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let to = to.to_string();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            // Promote overdue rows first so they never get claimed.
            conn.execute(
                "UPDATE queue_messages SET status = 'expired' \
                 WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < ?1",
                params![now],
            )
            .map_err(|e| QueueError::Storage(e.to_string()))?;

            let filter = filter.unwrap_or_default();
            let mut sql = String::from(
                "SELECT * FROM queue_messages \
                 WHERE to_agent = ?1 AND status = 'pending' AND next_attempt_at <= ?2",
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(to), Box::new(now)];
            if let Some(mt) = filter.message_type {
                args.push(Box::new(mt));
                sql.push_str(&format!(" AND msg_type = ?{}", args.len()));
            }
            if let Some(cid) = filter.correlation_id {
                args.push(Box::new(cid));
                sql.push_str(&format!(" AND correlation_id = ?{}", args.len()));
            }
            sql.push_str(" ORDER BY priority DESC, created_at ASC, rowid ASC LIMIT 1");

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let mut rows = stmt
                .query(params_ref.as_slice())
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            let row = match rows.next().map_err(|e| QueueError::Storage(e.to_string()))? {
                Some(r) => r,
                None => return Ok(None),
            };
            let mut message = row_to_message(row).map_err(|e| QueueError::Storage(e.to_string()))?;
            drop(rows);
            drop(stmt);

            // Optimistic claim: only a still-pending row can be delivered.
            let claimed = conn
                .execute(
                    "UPDATE queue_messages SET status = 'delivered', delivered_at = ?1 \
                     WHERE id = ?2 AND status = 'pending'",
                    params![now, message.id],
                )
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            if claimed == 0 {
                return Ok(None);
            }
            message.status = QueueStatus::Delivered;
            Ok(Some(message))
        })
        .await
    }

    /// Confirms delivery. Returns `true` when the message was in `delivered`;
    /// terminal states are left untouched (`false`).
    pub async fn ack(&self, id: &str) -> Result<bool, QueueError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let status: String = conn
                .query_row(
                    "SELECT status FROM queue_messages WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => QueueError::NotFound(id.clone()),
                    other => QueueError::Storage(other.to_string()),
                })?;
            Ok(QueueStatus::parse(&status) == QueueStatus::Delivered)
        })
        .await
    }

    /// Rejects a delivered message. Returns it to `pending` with backoff,
    /// or marks it `failed` once retries are exhausted. Terminal states are
    /// never mutated; the current status is returned either way.
    pub async fn nack(&self, id: &str, reason: &str) -> Result<QueueStatus, QueueError> {
        let id = id.to_string();
        let reason = reason.to_string();
        let backoff = self.backoff.clone();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            let (status, retry_count, max_retries): (String, i64, i64) = conn
                .query_row(
                    "SELECT status, retry_count, max_retries FROM queue_messages WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => QueueError::NotFound(id.clone()),
                    other => QueueError::Storage(other.to_string()),
                })?;

            match QueueStatus::parse(&status) {
                QueueStatus::Failed => return Ok(QueueStatus::Failed),
                QueueStatus::Expired => return Ok(QueueStatus::Expired),
                QueueStatus::Pending | QueueStatus::Delivered => {}
            }

            if retry_count >= max_retries {
                conn.execute(
                    "UPDATE queue_messages SET status = 'failed', failure_reason = ?1 \
                     WHERE id = ?2 AND status IN ('pending', 'delivered')",
                    params![reason, id],
                )
                .map_err(|e| QueueError::Storage(e.to_string()))?;
                return Ok(QueueStatus::Failed);
            }

            let delay = backoff.delay(retry_count as u32);
            let next_attempt = now + delay.as_millis() as i64;
            conn.execute(
                "UPDATE queue_messages SET status = 'pending', retry_count = retry_count + 1, \
                 next_attempt_at = ?1, failure_reason = ?2 \
                 WHERE id = ?3 AND status IN ('pending', 'delivered')",
                params![next_attempt, reason, id],
            )
            .map_err(|e| QueueError::Storage(e.to_string()))?;
            Ok(QueueStatus::Pending)
        })
        .await
    }

    /// Send + await the correlated reply addressed back to `from`.
    /// Consumers should be idempotent on the correlation id: at-least-once
    /// delivery can produce duplicate replies.
    pub async fn request(
        &self,
        mut message: OutgoingMessage,
        timeout: Duration,
    ) -> Result<QueueMessage, QueueError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        message.correlation_id = Some(correlation_id.clone());
        let requester = message.from.clone();
        self.send(message).await?;

        let filter = ReceiveFilter {
            message_type: None,
            correlation_id: Some(correlation_id.clone()),
        };
        match self.receive(&requester, Some(filter), timeout).await? {
            Some(reply) => Ok(reply),
            None => Err(QueueError::RequestTimeout(correlation_id)),
        }
    }

    /// Fetches a message by id regardless of status.
    pub async fn get(&self, id: &str) -> Result<QueueMessage, QueueError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM queue_messages WHERE id = ?1")
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            stmt.query_row(params![id], row_to_message).map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => QueueError::NotFound(id.clone()),
                other => QueueError::Storage(other.to_string()),
            })
        })
        .await
    }

    /// Number of pending messages addressed to `to` (all recipients if None).
    pub async fn pending_count(&self, to: Option<&str>) -> Result<usize, QueueError> {
        let to = to.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let count: i64 = match to {
                Some(to) => conn
                    .query_row(
                        "SELECT COUNT(*) FROM queue_messages \
                         WHERE to_agent = ?1 AND status = 'pending'",
                        params![to],
                        |row| row.get(0),
                    )
                    .map_err(|e| QueueError::Storage(e.to_string()))?,
                None => conn
                    .query_row(
                        "SELECT COUNT(*) FROM queue_messages WHERE status = 'pending'",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| QueueError::Storage(e.to_string()))?,
            };
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_queue() -> (tempfile::TempDir, MessageQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = MessageQueue::new(dir.path().join("queue.db")).unwrap();
        (dir, queue)
    }

    fn out(from: &str, to: &str, text: &str) -> OutgoingMessage {
        OutgoingMessage::new(from, to, "general", MessagePayload::text(text))
    }

    /// **Scenario**: send then receive delivers the message and marks it delivered.
    #[tokio::test]
    async fn send_receive_round_trip() {
        let (_dir, queue) = temp_queue();
        let id = queue.send(out("a", "b", "hello")).await.unwrap();

        let got = queue
            .receive("b", None, Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.status, QueueStatus::Delivered);
        assert_eq!(got.payload, MessagePayload::text("hello"));
        assert!(queue.ack(&id).await.unwrap());
    }

    /// **Scenario**: high priority is delivered before normal even when sent later;
    /// same priority preserves FIFO per (from, to).
    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let (_dir, queue) = temp_queue();
        queue.send(out("a", "b", "first-normal")).await.unwrap();
        queue.send(out("a", "b", "second-normal")).await.unwrap();
        queue
            .send(out("a", "b", "urgent").with_priority(Priority::High))
            .await
            .unwrap();

        let texts: Vec<String> = {
            let mut v = Vec::new();
            for _ in 0..3 {
                let m = queue
                    .receive("b", None, Duration::from_millis(200))
                    .await
                    .unwrap()
                    .unwrap();
                v.push(String::from_utf8(m.payload.as_value().unwrap().to_vec()).unwrap());
            }
            v
        };
        assert_eq!(texts, vec!["urgent", "first-normal", "second-normal"]);
    }

    /// **Scenario**: nack returns the message to pending with backoff until
    /// retries exhaust, then fails it; retry_count never exceeds max_retries.
    #[tokio::test]
    async fn nack_retries_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let queue = MessageQueue::with_backoff(
            dir.path().join("q.db"),
            BackoffPolicy {
                base: Duration::from_millis(1),
                multiplier: 2.0,
                max_backoff: Duration::from_millis(4),
                max_retries: 2,
            },
        )
        .unwrap();

        let id = queue.send(out("a", "b", "flaky")).await.unwrap();
        for _ in 0..2 {
            let m = queue
                .receive("b", None, Duration::from_millis(500))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(m.id, id);
            let status = queue.nack(&id, "boom").await.unwrap();
            assert_eq!(status, QueueStatus::Pending);
        }

        let m = queue
            .receive("b", None, Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.retry_count, 2);
        let status = queue.nack(&id, "boom again").await.unwrap();
        assert_eq!(status, QueueStatus::Failed);

        let stored = queue.get(&id).await.unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert!(stored.retry_count <= stored.max_retries);
    }

    /// **Scenario**: terminal states are immutable; nack on a failed message
    /// produces no change.
    #[tokio::test]
    async fn terminal_states_never_mutate() {
        let (_dir, queue) = temp_queue();
        let mut msg = out("a", "b", "doomed");
        msg.max_retries = 0;
        let id = queue.send(msg).await.unwrap();

        queue
            .receive("b", None, Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.nack(&id, "first").await.unwrap(), QueueStatus::Failed);

        let before = queue.get(&id).await.unwrap();
        assert_eq!(queue.nack(&id, "second").await.unwrap(), QueueStatus::Failed);
        assert!(!queue.ack(&id).await.unwrap());
        let after = queue.get(&id).await.unwrap();
        assert_eq!(before.status, after.status);
        assert_eq!(before.retry_count, after.retry_count);
    }

    /// **Scenario**: messages past their TTL flip to expired and are not delivered.
    #[tokio::test]
    async fn expired_messages_are_not_delivered() {
        let (_dir, queue) = temp_queue();
        let id = queue
            .send(out("a", "b", "stale").with_ttl(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let got = queue.receive("b", None, Duration::from_millis(50)).await.unwrap();
        assert!(got.is_none());
        assert_eq!(queue.get(&id).await.unwrap().status, QueueStatus::Expired);
    }

    /// **Scenario**: request blocks for the correlated reply and matches on
    /// correlation id.
    #[tokio::test]
    async fn request_reply_correlation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rr.db");
        let queue = std::sync::Arc::new(MessageQueue::new(&path).unwrap());

        let responder = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move {
                let req = queue
                    .receive("service", None, Duration::from_secs(2))
                    .await
                    .unwrap()
                    .unwrap();
                let cid = req.correlation_id.clone().unwrap();
                queue.ack(&req.id).await.unwrap();
                queue
                    .send(
                        OutgoingMessage::new(
                            "service",
                            req.from.clone(),
                            "general",
                            MessagePayload::text("pong"),
                        )
                        .with_correlation_id(cid),
                    )
                    .await
                    .unwrap();
            })
        };

        let reply = queue
            .request(out("client", "service", "ping"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.payload, MessagePayload::text("pong"));
        assert!(reply.correlation_id.is_some());
        responder.await.unwrap();
    }

    /// **Scenario**: receive filter narrows by message type.
    #[tokio::test]
    async fn receive_filter_by_type() {
        let (_dir, queue) = temp_queue();
        queue.send(out("a", "b", "noise")).await.unwrap();
        queue
            .send(OutgoingMessage::new(
                "a",
                "b",
                "control",
                MessagePayload::text("stop"),
            ))
            .await
            .unwrap();

        let filter = ReceiveFilter {
            message_type: Some("control".to_string()),
            correlation_id: None,
        };
        let got = queue
            .receive("b", Some(filter), Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.message_type, "control");
    }

    #[test]
    fn backoff_caps_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(10), Duration::from_secs(8));
    }
}
