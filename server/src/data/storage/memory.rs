//! In-memory storage backend (C1).
//!
//! Each topic is an ordered `VecDeque<Message>` behind its own
//! `parking_lot::RwLock`. Trim runs synchronously on every append, matching
//! the spec's "synchronous trim-on-append" requirement.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{StorageBackend, StorageError, TrimPolicy};
use crate::core::constants::DEFAULT_MAX_MESSAGES_PER_TOPIC;
use crate::domain::message::Message;

/// Per-topic message log.
#[derive(Default)]
struct TopicStream {
    messages: VecDeque<Message>,
    last_seq: u64,
}

fn trim_to_max_len(stream: &mut TopicStream, max_len: u64) {
    while stream.messages.len() as u64 > max_len {
        stream.messages.pop_front();
    }
}

fn trim_to_min_stream_id(stream: &mut TopicStream, min_id: &str) {
    while stream.messages.front().is_some_and(|m| m.stream_id.as_str() < min_id) {
        stream.messages.pop_front();
    }
}

/// In-memory storage backend.
pub struct MemoryStorage {
    topics: RwLock<HashMap<String, TopicStream>>,
    last_ms: AtomicU64,
    max_len: u64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_MESSAGES_PER_TOPIC)
    }

    /// Builds a backend that self-enforces `max_len` on every append, rather
    /// than relying on an explicit caller-driven `trim`.
    pub fn with_max_len(max_len: u64) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            last_ms: AtomicU64::new(0),
            max_len,
        }
    }

    /// Produce a monotonic `<ms-timestamp>-<seq>` stream cursor.
    fn next_stream_id(&self, stream: &mut TopicStream) -> String {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let prev = self.last_ms.fetch_max(now_ms, Ordering::SeqCst);
        let ms = now_ms.max(prev);
        if ms == prev {
            stream.last_seq += 1;
        } else {
            stream.last_seq = 0;
        }
        format!("{}-{}", ms, stream.last_seq)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn create_topic(&self, topic: &str) -> Result<(), StorageError> {
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default();
        Ok(())
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool, StorageError> {
        Ok(self.topics.read().contains_key(topic))
    }

    async fn append(
        &self,
        topic: &str,
        message_id: &str,
        payload: Value,
        ttl: Option<u64>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(String, String), StorageError> {
        let mut topics = self.topics.write();
        let stream = topics
            .get_mut(topic)
            .ok_or_else(|| StorageError::TopicNotFound(topic.to_string()))?;

        let stream_id = self.next_stream_id(stream);
        let message = Message {
            message_id: message_id.to_string(),
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
            ttl,
            metadata,
            stream_id: stream_id.clone(),
        };
        stream.messages.push_back(message);
        trim_to_max_len(stream, self.max_len);
        Ok((message_id.to_string(), stream_id))
    }

    async fn read_since(
        &self,
        topic: &str,
        since: Option<&str>,
        max_count: usize,
    ) -> Result<Vec<Message>, StorageError> {
        let topics = self.topics.read();
        let Some(stream) = topics.get(topic) else {
            return Ok(Vec::new());
        };

        let iter = stream.messages.iter();
        let filtered: Vec<Message> = match since {
            None => iter.take(max_count).cloned().collect(),
            Some(cursor) => iter
                .skip_while(|m| m.stream_id.as_str() != cursor)
                .skip(1)
                .take(max_count)
                .cloned()
                .collect(),
        };
        Ok(filtered)
    }

    async fn length(&self, topic: &str) -> Result<u64, StorageError> {
        Ok(self
            .topics
            .read()
            .get(topic)
            .map(|s| s.messages.len() as u64)
            .unwrap_or(0))
    }

    async fn trim(&self, topic: &str, policy: TrimPolicy) -> Result<(), StorageError> {
        let mut topics = self.topics.write();
        if let Some(stream) = topics.get_mut(topic) {
            match policy {
                TrimPolicy::MaxLen(max_len) => trim_to_max_len(stream, max_len),
                TrimPolicy::MinStreamId(min_id) => trim_to_min_stream_id(stream, &min_id),
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
