//! Publish pipeline (C5): validate, authorize, persist, then fan out to
//! live WebSocket subscribers and waiting long-pollers concurrently.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::data::storage::{StorageBackend, StorageError, TrimPolicy};
use crate::domain::authz::{AuthenticatedUser, AuthzDecision, Authorizer};
use crate::domain::connections::ConnectionManager;
use crate::domain::message::{Action, Message, is_valid_topic_name};
use crate::domain::poll::PollManager;
use crate::utils::ids::generate_message_id;

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Value,
    pub ttl: Option<u64>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug)]
pub enum PublishError {
    InvalidPayload(String),
    PayloadTooLarge { limit: usize, actual: usize },
    TopicNotFound(String),
    Forbidden(String),
    Storage(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            PublishError::PayloadTooLarge { limit, actual } => {
                write!(f, "payload of {actual} bytes exceeds limit of {limit} bytes")
            }
            PublishError::TopicNotFound(t) => write!(f, "topic not found: {t}"),
            PublishError::Forbidden(t) => write!(f, "forbidden: {t}"),
            PublishError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<StorageError> for PublishError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TopicNotFound(t) => PublishError::TopicNotFound(t),
            StorageError::Unavailable(msg) => PublishError::Storage(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub message_id: String,
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum BulkStatus {
    Ok(PublishReceipt),
    Err(PublishError),
}

#[derive(Debug)]
pub struct BulkPublishResult {
    pub topic: String,
    pub status: BulkStatus,
}

pub struct PublishPipeline {
    storage: Arc<dyn StorageBackend>,
    authorizer: Arc<Authorizer>,
    connections: Arc<ConnectionManager>,
    poll: Arc<PollManager>,
    max_message_bytes: usize,
    trim_policy: TrimPolicy,
}

impl PublishPipeline {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        authorizer: Arc<Authorizer>,
        connections: Arc<ConnectionManager>,
        poll: Arc<PollManager>,
        max_message_bytes: usize,
        trim_policy: TrimPolicy,
    ) -> Self {
        Self {
            storage,
            authorizer,
            connections,
            poll,
            max_message_bytes,
            trim_policy,
        }
    }

    pub async fn publish(
        &self,
        user: &AuthenticatedUser,
        request: PublishRequest,
    ) -> Result<PublishReceipt, PublishError> {
        self.validate(&request)?;

        match self
            .authorizer
            .authorize(user, &request.topic, Action::Write)
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?
        {
            AuthzDecision::Allow => {}
            AuthzDecision::TopicNotFound => return Err(PublishError::TopicNotFound(request.topic.clone())),
            AuthzDecision::DenyNoScope | AuthzDecision::DenyNoAccess => {
                return Err(PublishError::Forbidden(request.topic.clone()));
            }
        }

        let candidate_id = generate_message_id();
        let (message_id, stream_id) = self
            .storage
            .append(
                &request.topic,
                &candidate_id,
                request.payload.clone(),
                request.ttl,
                request.metadata.clone(),
            )
            .await?;

        let message = Message {
            message_id: message_id.clone(),
            topic: request.topic.clone(),
            payload: request.payload,
            timestamp: Utc::now(),
            ttl: request.ttl,
            metadata: request.metadata,
            stream_id: stream_id.clone(),
        };

        let topic = request.topic.clone();
        tokio::join!(self.connections.broadcast(&topic, &message), async {
            self.poll.deliver(&topic, &message);
        });

        if let Err(err) = self.storage.trim(&request.topic, self.trim_policy.clone()).await {
            tracing::warn!(topic = %request.topic, error = %err, "trim after publish failed");
        }

        Ok(PublishReceipt {
            message_id,
            stream_id,
            timestamp: message.timestamp,
        })
    }

    pub async fn publish_bulk(
        &self,
        user: &AuthenticatedUser,
        requests: Vec<PublishRequest>,
    ) -> Vec<BulkPublishResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let topic = request.topic.clone();
            let status = match self.publish(user, request).await {
                Ok(receipt) => BulkStatus::Ok(receipt),
                Err(err) => BulkStatus::Err(err),
            };
            results.push(BulkPublishResult { topic, status });
        }
        results
    }

    fn validate(&self, request: &PublishRequest) -> Result<(), PublishError> {
        if !is_valid_topic_name(&request.topic) {
            return Err(PublishError::InvalidPayload(format!(
                "invalid topic name: {}",
                request.topic
            )));
        }
        let size = serde_json::to_vec(&request.payload)
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        if size > self.max_message_bytes {
            return Err(PublishError::PayloadTooLarge {
                limit: self.max_message_bytes,
                actual: size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registry::memory::MemoryRegistry;
    use crate::data::storage::memory::MemoryStorage;
    use crate::domain::message::Topic;
    use serde_json::json;

    async fn pipeline() -> (PublishPipeline, AuthenticatedUser) {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .create(Topic {
                name: "chat".to_string(),
                owner_user_id: "alice".to_string(),
                is_public: true,
                description: None,
                granted_user_ids: Vec::new(),
            })
            .await
            .unwrap();
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        storage.create_topic("chat").await.unwrap();
        let authorizer = Arc::new(Authorizer::new(registry));
        let connections = Arc::new(ConnectionManager::new(100));
        let poll = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), 100));
        let pipeline = PublishPipeline::new(storage, authorizer, connections, poll, 1024, TrimPolicy::MaxLen(100));
        let alice = AuthenticatedUser {
            user_id: "alice".to_string(),
            scopes: vec!["write".to_string()],
            is_admin: false,
        };
        (pipeline, alice)
    }

    #[tokio::test]
    async fn test_publish_returns_receipt() {
        let (pipeline, alice) = pipeline().await;
        let receipt = pipeline
            .publish(
                &alice,
                PublishRequest {
                    topic: "chat".to_string(),
                    payload: json!({"text": "hi"}),
                    ttl: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert!(receipt.message_id.starts_with("msg_"));
    }

    #[tokio::test]
    async fn test_publish_rejects_stranger() {
        let (pipeline, _alice) = pipeline().await;
        let bob = AuthenticatedUser {
            user_id: "bob".to_string(),
            scopes: vec!["write".to_string()],
            is_admin: false,
        };
        let err = pipeline
            .publish(
                &bob,
                PublishRequest {
                    topic: "chat".to_string(),
                    payload: json!({}),
                    ttl: None,
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_publish_rejects_oversized_payload() {
        let (pipeline, alice) = pipeline().await;
        let big = "x".repeat(2000);
        let err = pipeline
            .publish(
                &alice,
                PublishRequest {
                    topic: "chat".to_string(),
                    payload: json!({ "data": big }),
                    ttl: None,
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_publish_bulk_reports_per_entry_status() {
        let (pipeline, alice) = pipeline().await;
        let results = pipeline
            .publish_bulk(
                &alice,
                vec![
                    PublishRequest {
                        topic: "chat".to_string(),
                        payload: json!({"n": 1}),
                        ttl: None,
                        metadata: None,
                    },
                    PublishRequest {
                        topic: "missing-topic".to_string(),
                        payload: json!({"n": 2}),
                        ttl: None,
                        metadata: None,
                    },
                ],
            )
            .await;
        assert!(matches!(results[0].status, BulkStatus::Ok(_)));
        assert!(matches!(results[1].status, BulkStatus::Err(_)));
    }
}
