//! Shared API types: error envelope, DTOs common to multiple routes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::data::registry::RegistryError;
use crate::data::storage::StorageError;
use crate::domain::message::Message;
use crate::domain::{ConnectionError, PollError, PublishError};
use crate::utils::ids::generate_request_id;

/// The error taxonomy, one variant per documented error code. Each maps to
/// a fixed HTTP status and machine-readable code.
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    Unauthorized(String),
    Forbidden(String),
    TopicNotFound(String),
    PayloadTooLarge { limit: usize, actual: usize },
    RateLimitExceeded,
    StorageUnavailable(String),
    ServiceUnavailable(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub(crate) fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::TopicNotFound(_) => "TOPIC_NOT_FOUND",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TopicNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::InvalidRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::TopicNotFound(m)
            | ApiError::StorageUnavailable(m)
            | ApiError::ServiceUnavailable(m)
            | ApiError::Conflict(m)
            | ApiError::Internal(m) => m.clone(),
            ApiError::PayloadTooLarge { limit, actual } => {
                format!("payload of {actual} bytes exceeds limit of {limit} bytes")
            }
            ApiError::RateLimitExceeded => "rate limit exceeded".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::PayloadTooLarge { limit, actual } => {
                let mut map = Map::new();
                map.insert("limit".to_string(), Value::from(*limit));
                map.insert("actual".to_string(), Value::from(*actual));
                Some(Value::Object(map))
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), message = %self.message(), "request failed");
        } else {
            tracing::debug!(code = self.code(), message = %self.message(), "request rejected");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.message(),
            details: self.details(),
            request_id: generate_request_id(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::InvalidPayload(m) => ApiError::InvalidRequest(m),
            PublishError::PayloadTooLarge { limit, actual } => ApiError::PayloadTooLarge { limit, actual },
            PublishError::TopicNotFound(t) => ApiError::TopicNotFound(t),
            PublishError::Forbidden(t) => ApiError::Forbidden(format!("not permitted on topic: {t}")),
            PublishError::Storage(m) => ApiError::StorageUnavailable(m),
        }
    }
}

impl From<PollError> for ApiError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::InvalidRequest(m) => ApiError::InvalidRequest(m),
            PollError::TopicNotFound(t) => ApiError::TopicNotFound(t),
            PollError::Forbidden(t) => ApiError::Forbidden(format!("not permitted on topic: {t}")),
            PollError::Unavailable(m) => ApiError::ServiceUnavailable(m),
            PollError::Storage(m) => ApiError::StorageUnavailable(m),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyExists(t) => ApiError::Conflict(format!("topic already exists: {t}")),
            RegistryError::NotFound(t) => ApiError::TopicNotFound(t),
            RegistryError::Unavailable(m) => ApiError::StorageUnavailable(m),
        }
    }
}

impl From<ConnectionError> for ApiError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::CapacityExceeded => {
                ApiError::ServiceUnavailable("connection capacity exceeded".to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TopicNotFound(t) => ApiError::TopicNotFound(t),
            StorageError::Unavailable(m) => ApiError::StorageUnavailable(m),
        }
    }
}

/// Wire representation of [`Message`], shared by the poll response and the
/// push-socket `message` frame.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MessageDto {
    pub message_id: String,
    pub topic: String,
    pub payload: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub stream_id: String,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        MessageDto {
            message_id: m.message_id,
            topic: m.topic,
            payload: m.payload,
            timestamp: m.timestamp,
            ttl: m.ttl,
            metadata: m.metadata,
            stream_id: m.stream_id,
        }
    }
}
