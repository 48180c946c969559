//! Storage backend (C1): append-only per-topic message log.
//!
//! Two implementations are provided: an in-memory one for development and
//! single-process deployments, and a Valkey-backed one for durability across
//! restarts. Callers depend only on the [`StorageBackend`] trait.

pub mod memory;
pub mod valkey;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::message::Message;

/// Error returned by a storage backend.
#[derive(Debug)]
pub enum StorageError {
    /// The topic has not been created; publish never auto-creates one.
    TopicNotFound(String),
    /// The backend could not complete the operation after retrying.
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::TopicNotFound(topic) => write!(f, "topic not found: {topic}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for StorageError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Trim policy applied to a topic: retain the most recent `N` entries, or
/// drop everything strictly older than a given stream-id cursor.
#[derive(Debug, Clone)]
pub enum TrimPolicy {
    MaxLen(u64),
    MinStreamId(String),
}

/// The C1 contract: append-only per-topic message log with a bounded tail.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Register a topic's stream so it can be appended to. Idempotent.
    async fn create_topic(&self, topic: &str) -> Result<(), StorageError>;

    /// Whether a topic's stream has been created.
    async fn topic_exists(&self, topic: &str) -> Result<bool, StorageError>;

    /// Append a message, returning its assigned `(message_id, stream_id)`.
    async fn append(
        &self,
        topic: &str,
        message_id: &str,
        payload: Value,
        ttl: Option<u64>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(String, String), StorageError>;

    /// Read messages strictly after `since` (a `stream_id`, or `None` for the
    /// start of the topic), up to `max_count` entries.
    async fn read_since(
        &self,
        topic: &str,
        since: Option<&str>,
        max_count: usize,
    ) -> Result<Vec<Message>, StorageError>;

    /// Current message count for a topic.
    async fn length(&self, topic: &str) -> Result<u64, StorageError>;

    /// Trim a topic per `policy`, dropping the oldest entries.
    async fn trim(&self, topic: &str, policy: TrimPolicy) -> Result<(), StorageError>;

    /// Backend name, for logging.
    fn backend_name(&self) -> &'static str;
}
