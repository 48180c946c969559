//! Valkey-backed storage (C1).
//!
//! Each topic is a Redis/Valkey stream at key `topic:<name>:stream`, with
//! entry fields `message_id`, `payload` (JSON string), `timestamp` (ISO 8601),
//! `metadata` (JSON string, `{}` if absent) and an optional `ttl`. A separate
//! set (`pulsar:topics`) tracks which topics have been created, since a
//! Valkey stream has no durable existence until it holds an entry.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Pool, Runtime};
use serde_json::{Map, Value};

use super::{StorageBackend, StorageError, TrimPolicy};
use crate::core::constants::{STORAGE_RETRY_BASE_DELAY_MS, STORAGE_RETRY_MAX_ATTEMPTS};
use crate::domain::message::Message;
use crate::utils::retry::retry_with_backoff_async;

const REGISTERED_TOPICS_KEY: &str = "pulsar:topics";

fn stream_key(topic: &str) -> String {
    format!("topic:{topic}:stream")
}

/// Valkey-backed storage backend.
pub struct ValkeyStorage {
    pool: Pool,
}

impl ValkeyStorage {
    pub fn new(host: &str, port: u16, use_tls: bool) -> Result<Self, StorageError> {
        let scheme = if use_tls { "rediss" } else { "redis" };
        let url = format!("{scheme}://{host}:{port}");
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Retry a fallible operation with backoff, surfacing the last error as
    /// `StorageError` once attempts are exhausted.
    async fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send>>,
    ) -> Result<T, StorageError> {
        let mut last_ok: Option<T> = None;
        let mut last_err: Option<StorageError> = None;

        let outcome = retry_with_backoff_async(STORAGE_RETRY_MAX_ATTEMPTS, STORAGE_RETRY_BASE_DELAY_MS, || {
            let last_ok = &mut last_ok;
            let last_err = &mut last_err;
            let fut = op();
            async move {
                match fut.await {
                    Ok(v) => {
                        *last_ok = Some(v);
                        Ok(())
                    }
                    Err(e) => {
                        let message = e.to_string();
                        *last_err = Some(e);
                        Err(message)
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(_) => Ok(last_ok.expect("operation succeeded without recording a value")),
            Err(_) => Err(last_err.unwrap_or_else(|| StorageError::Unavailable("retry exhausted".into()))),
        }
    }
}

fn entry_to_message(topic: &str, stream_id: String, fields: Vec<(String, String)>) -> Option<Message> {
    let mut message_id = None;
    let mut payload = None;
    let mut timestamp = None;
    let mut metadata = None;
    let mut ttl = None;

    for (key, value) in fields {
        match key.as_str() {
            "message_id" => message_id = Some(value),
            "payload" => payload = serde_json::from_str::<Value>(&value).ok(),
            "timestamp" => timestamp = DateTime::parse_from_rfc3339(&value).ok().map(|t| t.with_timezone(&Utc)),
            "metadata" => {
                metadata = serde_json::from_str::<Map<String, Value>>(&value)
                    .ok()
                    .filter(|m| !m.is_empty())
            }
            "ttl" => ttl = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    Some(Message {
        message_id: message_id?,
        topic: topic.to_string(),
        payload: payload?,
        timestamp: timestamp?,
        ttl,
        metadata,
        stream_id,
    })
}

#[async_trait]
impl StorageBackend for ValkeyStorage {
    async fn create_topic(&self, topic: &str) -> Result<(), StorageError> {
        let topic = topic.to_string();
        self.with_retry(|| {
            let pool = self.pool.clone();
            let topic = topic.clone();
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let _: i64 = conn.sadd(REGISTERED_TOPICS_KEY, &topic).await?;
                Ok(())
            })
        })
        .await
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool, StorageError> {
        let topic = topic.to_string();
        self.with_retry(|| {
            let pool = self.pool.clone();
            let topic = topic.clone();
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let exists: bool = conn.sismember(REGISTERED_TOPICS_KEY, &topic).await?;
                Ok(exists)
            })
        })
        .await
    }

    async fn append(
        &self,
        topic: &str,
        message_id: &str,
        payload: Value,
        ttl: Option<u64>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(String, String), StorageError> {
        if !self.topic_exists(topic).await? {
            return Err(StorageError::TopicNotFound(topic.to_string()));
        }

        let topic = topic.to_string();
        let message_id = message_id.to_string();
        let payload_json = payload.to_string();
        let timestamp = Utc::now().to_rfc3339();
        let metadata_json = metadata.unwrap_or_default();
        let metadata_json = Value::Object(metadata_json).to_string();

        self.with_retry(|| {
            let pool = self.pool.clone();
            let key = stream_key(&topic);
            let message_id = message_id.clone();
            let payload_json = payload_json.clone();
            let timestamp = timestamp.clone();
            let metadata_json = metadata_json.clone();
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let mut cmd = redis::cmd("XADD");
                cmd.arg(&key)
                    .arg("*")
                    .arg("message_id")
                    .arg(&message_id)
                    .arg("payload")
                    .arg(&payload_json)
                    .arg("timestamp")
                    .arg(&timestamp)
                    .arg("metadata")
                    .arg(&metadata_json);
                if let Some(ttl) = ttl {
                    cmd.arg("ttl").arg(ttl);
                }
                let stream_id: String = cmd.query_async(&mut conn).await?;
                Ok((message_id.clone(), stream_id))
            })
        })
        .await
    }

    async fn read_since(
        &self,
        topic: &str,
        since: Option<&str>,
        max_count: usize,
    ) -> Result<Vec<Message>, StorageError> {
        let topic = topic.to_string();
        let since = since.map(|s| s.to_string());
        self.with_retry(|| {
            let pool = self.pool.clone();
            let key = stream_key(&topic);
            let topic = topic.clone();
            let since = since.clone();
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let start = match &since {
                    Some(cursor) => format!("({cursor}"),
                    None => "-".to_string(),
                };
                let entries: Vec<(String, Vec<(String, String)>)> = redis::cmd("XRANGE")
                    .arg(&key)
                    .arg(start)
                    .arg("+")
                    .arg("COUNT")
                    .arg(max_count)
                    .query_async(&mut conn)
                    .await?;

                let messages = entries
                    .into_iter()
                    .filter_map(|(id, fields)| entry_to_message(&topic, id, fields))
                    .collect();
                Ok(messages)
            })
        })
        .await
    }

    async fn length(&self, topic: &str) -> Result<u64, StorageError> {
        let topic = topic.to_string();
        self.with_retry(|| {
            let pool = self.pool.clone();
            let key = stream_key(&topic);
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let len: u64 = conn.xlen(&key).await?;
                Ok(len)
            })
        })
        .await
    }

    async fn trim(&self, topic: &str, policy: TrimPolicy) -> Result<(), StorageError> {
        let topic = topic.to_string();
        self.with_retry(|| {
            let pool = self.pool.clone();
            let key = stream_key(&topic);
            let policy = policy.clone();
            Box::pin(async move {
                let mut conn = pool.get().await?;
                let mut cmd = redis::cmd("XTRIM");
                cmd.arg(&key);
                match policy {
                    TrimPolicy::MaxLen(max_len) => {
                        cmd.arg("MAXLEN").arg(max_len);
                    }
                    TrimPolicy::MinStreamId(min_id) => {
                        cmd.arg("MINID").arg(min_id);
                    }
                }
                let _: i64 = cmd.query_async(&mut conn).await?;
                Ok(())
            })
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "valkey"
    }
}
