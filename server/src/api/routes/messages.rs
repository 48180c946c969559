//! Publish and long-poll routes.

use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::api::server::AppState;
use crate::api::types::{ApiError, MessageDto};
use crate::domain::publish::{BulkStatus, PublishRequest};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishBody {
    pub topic: String,
    pub payload: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    pub message_id: String,
    pub topic: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// `POST /api/v1/messages`
#[utoipa::path(
    post,
    path = "/api/v1/messages",
    tag = "messages",
    request_body = PublishBody,
    responses((status = 201, description = "Message accepted", body = PublishResponse))
)]
pub async fn publish(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<PublishBody>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .publish_pipeline
        .publish(
            &user,
            PublishRequest {
                topic: body.topic.clone(),
                payload: body.payload,
                ttl: body.ttl,
                metadata: body.metadata,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            message_id: receipt.message_id,
            topic: body.topic,
            timestamp: receipt.timestamp,
        }),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkPublishBody {
    pub messages: Vec<PublishBody>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkPublishEntry {
    pub topic: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkPublishResponse {
    pub results: Vec<BulkPublishEntry>,
}

/// `POST /api/v1/messages/bulk`
#[utoipa::path(
    post,
    path = "/api/v1/messages/bulk",
    tag = "messages",
    request_body = BulkPublishBody,
    responses((status = 207, description = "Per-message results", body = BulkPublishResponse))
)]
pub async fn publish_bulk(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<BulkPublishBody>,
) -> impl IntoResponse {
    let requests = body
        .messages
        .into_iter()
        .map(|m| PublishRequest {
            topic: m.topic,
            payload: m.payload,
            ttl: m.ttl,
            metadata: m.metadata,
        })
        .collect();

    let results = state.publish_pipeline.publish_bulk(&user, requests).await;
    let entries = results
        .into_iter()
        .map(|r| match r.status {
            BulkStatus::Ok(receipt) => BulkPublishEntry {
                topic: r.topic,
                status: "accepted",
                message_id: Some(receipt.message_id),
                error: None,
            },
            BulkStatus::Err(err) => {
                let api_err: ApiError = err.into();
                BulkPublishEntry {
                    topic: r.topic,
                    status: "rejected",
                    message_id: None,
                    error: Some(api_err.code().to_string()),
                }
            }
        })
        .collect();

    (StatusCode::MULTI_STATUS, Json(BulkPublishResponse { results: entries }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PollBody {
    pub topics: Vec<String>,
    #[serde(default)]
    pub since: HashMap<String, String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PollResponse {
    pub messages: Vec<MessageDto>,
    pub has_more: bool,
}

/// `POST /messages/poll`
#[utoipa::path(
    post,
    path = "/messages/poll",
    tag = "messages",
    request_body = PollBody,
    responses((status = 200, description = "Messages available, or the wait timed out", body = PollResponse))
)]
pub async fn poll(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<PollBody>,
) -> Result<impl IntoResponse, ApiError> {
    let timeout = body.timeout.map(Duration::from_secs);
    let outcome = state
        .poll_manager
        .poll(&user, &body.topics, &body.since, timeout)
        .await?;

    Ok((
        StatusCode::OK,
        Json(PollResponse {
            messages: outcome.messages.into_iter().map(MessageDto::from).collect(),
            has_more: outcome.has_more,
        }),
    ))
}
