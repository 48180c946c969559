//! OpenAPI document assembly. Served as JSON only; no Swagger UI page, since
//! nothing in the wire contract calls for one.

use axum::Json;
use axum::http::header;
use axum::response::IntoResponse;
use utoipa::OpenApi;

use crate::api::routes::health::HealthResponse;
use crate::api::routes::messages::{
    BulkPublishBody, BulkPublishEntry, BulkPublishResponse, PollBody, PollResponse, PublishBody, PublishResponse,
};
use crate::api::routes::topics::{CreateTopicBody, GrantPermissionBody, TopicListResponse, TopicResponse};
use crate::api::types::MessageDto;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::routes::health::health,
        crate::api::routes::health::ready,
        crate::api::routes::messages::publish,
        crate::api::routes::messages::publish_bulk,
        crate::api::routes::messages::poll,
        crate::api::routes::topics::create_topic,
        crate::api::routes::topics::list_topics,
        crate::api::routes::topics::grant_permission,
    ),
    components(schemas(
        HealthResponse,
        PublishBody,
        PublishResponse,
        BulkPublishBody,
        BulkPublishEntry,
        BulkPublishResponse,
        PollBody,
        PollResponse,
        MessageDto,
        CreateTopicBody,
        TopicResponse,
        TopicListResponse,
        GrantPermissionBody,
    )),
    tags(
        (name = "health", description = "Liveness, readiness, and metrics"),
        (name = "messages", description = "Publish and long-poll"),
        (name = "topics", description = "Topic registry"),
    )
)]
pub struct ApiDoc;

/// `GET /api/openapi.json`
pub async fn openapi_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], Json(ApiDoc::openapi()))
}
