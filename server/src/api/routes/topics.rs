//! Topic registry routes: create, list, and grant permissions.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::domain::message::Topic;

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicResponse {
    pub name: String,
    pub owner_user_id: String,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub granted_user_ids: Vec<String>,
}

impl From<Topic> for TopicResponse {
    fn from(t: Topic) -> Self {
        TopicResponse {
            name: t.name,
            owner_user_id: t.owner_user_id,
            is_public: t.is_public,
            description: t.description,
            granted_user_ids: t.granted_user_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTopicBody {
    pub topic_name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// `POST /api/v1/topics`
#[utoipa::path(
    post,
    path = "/api/v1/topics",
    tag = "topics",
    request_body = CreateTopicBody,
    responses((status = 201, description = "Topic created", body = TopicResponse))
)]
pub async fn create_topic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateTopicBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !crate::domain::message::is_valid_topic_name(&body.topic_name) {
        return Err(ApiError::InvalidRequest(format!(
            "invalid topic name: {}",
            body.topic_name
        )));
    }

    let topic = state
        .registry
        .create(Topic {
            name: body.topic_name,
            owner_user_id: user.user_id.clone(),
            is_public: body.is_public,
            description: body.description,
            granted_user_ids: Vec::new(),
        })
        .await?;

    state.storage.create_topic(&topic.name).await?;

    Ok((StatusCode::CREATED, Json(TopicResponse::from(topic))))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicListResponse {
    pub topics: Vec<TopicResponse>,
}

/// `GET /api/v1/topics`
#[utoipa::path(
    get,
    path = "/api/v1/topics",
    tag = "topics",
    responses((status = 200, description = "Topics the caller can read", body = TopicListResponse))
)]
pub async fn list_topics(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let topics = state.registry.list_accessible(&user.user_id, user.is_admin).await?;
    Ok((
        StatusCode::OK,
        Json(TopicListResponse {
            topics: topics.into_iter().map(TopicResponse::from).collect(),
        }),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermissionBody {
    pub username: String,
}

/// `POST /api/v1/topics/{name}/permissions`
#[utoipa::path(
    post,
    path = "/api/v1/topics/{name}/permissions",
    tag = "topics",
    request_body = GrantPermissionBody,
    responses((status = 200, description = "Permission granted", body = TopicResponse))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
    Json(body): Json<GrantPermissionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let topic = state
        .registry
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::TopicNotFound(name.clone()))?;

    if topic.owner_user_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden(format!("only the owner may grant access to {name}")));
    }

    let topic = state.registry.grant_permission(&name, &body.username).await?;
    Ok((StatusCode::OK, Json(TopicResponse::from(topic))))
}
