//! End-to-end scenario coverage over the HTTP surface and the domain layer
//! it's built on: push/pull delivery, authorization boundaries, concurrent
//! broadcast fan-out, and behavior under a storage outage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use pulsar_relay_server::api::auth::create_session_token;
use pulsar_relay_server::api::middleware::AllowedOrigins;
use pulsar_relay_server::api::server::AppState;
use pulsar_relay_server::api::{self, build_router};
use pulsar_relay_server::data::registry::memory::MemoryRegistry;
use pulsar_relay_server::data::registry::TopicRegistry;
use pulsar_relay_server::data::storage::memory::MemoryStorage;
use pulsar_relay_server::data::storage::{StorageBackend, StorageError, TrimPolicy};
use pulsar_relay_server::domain::message::{Message, Topic};
use pulsar_relay_server::domain::{
    AuthenticatedUser, Authorizer, ConnectionManager, PollManager, PublishError, PublishPipeline, PublishRequest,
    PushFrame,
};

const JWT_SECRET: &[u8] = b"scenario-test-secret-key-0123456";

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn seed_topic(registry: &Arc<dyn TopicRegistry>, storage: &Arc<dyn StorageBackend>, topic: Topic) {
    let name = topic.name.clone();
    registry.create(topic).await.unwrap();
    storage.create_topic(&name).await.unwrap();
}

struct Harness {
    router: Router,
    storage: Arc<dyn StorageBackend>,
    registry: Arc<dyn TopicRegistry>,
}

async fn harness() -> Harness {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let registry: Arc<dyn TopicRegistry> = Arc::new(MemoryRegistry::new());

    seed_topic(
        &registry,
        &storage,
        Topic {
            name: "notes".to_string(),
            owner_user_id: "alice".to_string(),
            is_public: true,
            description: None,
            granted_user_ids: Vec::new(),
        },
    )
    .await;
    seed_topic(
        &registry,
        &storage,
        Topic {
            name: "alice-private".to_string(),
            owner_user_id: "alice".to_string(),
            is_public: false,
            description: None,
            granted_user_ids: Vec::new(),
        },
    )
    .await;

    let authorizer = Arc::new(Authorizer::new(registry.clone()));
    let connections = Arc::new(ConnectionManager::new(1000));
    let poll_manager = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), 1000));
    let publish_pipeline = Arc::new(PublishPipeline::new(
        storage.clone(),
        authorizer.clone(),
        connections.clone(),
        poll_manager.clone(),
        4096,
        TrimPolicy::MaxLen(10_000),
    ));

    let state = AppState {
        storage: storage.clone(),
        registry: registry.clone(),
        authorizer,
        connections,
        poll_manager,
        publish_pipeline,
        jwt_secret_key: Arc::new(JWT_SECRET.to_vec()),
    };
    let allowed_origins = AllowedOrigins::new("127.0.0.1", 8080);
    let router = build_router(state, &allowed_origins);

    Harness { router, storage, registry }
}

fn token(user_id: &str, scopes: &[&str], admin: bool) -> String {
    create_session_token(
        JWT_SECRET,
        user_id,
        scopes.iter().map(|s| s.to_string()).collect(),
        admin,
    )
    .unwrap()
}

async fn send(router: &Router, method: &str, path: &str, bearer: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

// ---------------------------------------------------------------------------
// Scenario B: pull catch-up — poll with `since` returns the existing backlog
// immediately, without waiting out the timeout.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_poll_returns_backlog_immediately() {
    let h = harness().await;
    let alice = token("alice", &["read", "write"], false);

    send(&h.router, "POST", "/api/v1/messages", &alice, json!({"topic": "notes", "payload": {"text": "first"}})).await;

    let started = std::time::Instant::now();
    let (status, body) = send(
        &h.router,
        "POST",
        "/messages/poll",
        &alice,
        json!({"topics": ["notes"], "timeout": 30}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < std::time::Duration::from_secs(5), "catch-up must not wait");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["payload"]["text"], "first");
}

// ---------------------------------------------------------------------------
// Scenario D: authorization — a read-only caller with no grant on a private
// topic is forbidden from publishing to it; the owner still can.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_d_forbidden_without_access_allowed_for_owner() {
    let h = harness().await;
    let bob = token("bob", &["read", "write"], false);
    let alice = token("alice", &["read", "write"], false);

    let (status, body) = send(
        &h.router,
        "POST",
        "/api/v1/messages",
        &bob,
        json!({"topic": "alice-private", "payload": {"text": "nope"}}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (status, _body) = send(
        &h.router,
        "POST",
        "/api/v1/messages",
        &alice,
        json!({"topic": "alice-private", "payload": {"text": "fine"}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ---------------------------------------------------------------------------
// Granting access flips a prior forbidden decision to allow, directly
// against the registry the HTTP routes are backed by.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn granting_permission_allows_a_previously_forbidden_writer() {
    let h = harness().await;
    let bob = token("bob", &["read", "write"], false);

    let (status, _) = send(
        &h.router,
        "POST",
        "/api/v1/messages",
        &bob,
        json!({"topic": "alice-private", "payload": {"text": "nope"}}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.registry.grant_permission("alice-private", "bob").await.unwrap();

    let (status, _) = send(
        &h.router,
        "POST",
        "/api/v1/messages",
        &bob,
        json!({"topic": "alice-private", "payload": {"text": "now ok"}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ---------------------------------------------------------------------------
// Boundary: poll with an empty topic list is rejected, not queued.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boundary_poll_rejects_empty_topic_list() {
    let h = harness().await;
    let alice = token("alice", &["read"], false);

    let (status, body) = send(&h.router, "POST", "/messages/poll", &alice, json!({"topics": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

// ---------------------------------------------------------------------------
// Boundary: an oversized payload is rejected and never reaches storage.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boundary_oversized_payload_rejected_and_not_persisted() {
    let h = harness().await;
    let alice = token("alice", &["write"], false);

    let before = h.storage.length("notes").await.unwrap();
    let oversized = "x".repeat(8192);
    let (status, body) = send(
        &h.router,
        "POST",
        "/api/v1/messages",
        &alice,
        json!({"topic": "notes", "payload": {"data": oversized}}),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "PAYLOAD_TOO_LARGE");
    assert!(body["details"]["limit"].is_number());
    let after = h.storage.length("notes").await.unwrap();
    assert_eq!(before, after, "a rejected publish must not append to storage");
}

// ---------------------------------------------------------------------------
// Boundary: creating a topic twice is rejected; unauthenticated requests are
// rejected before any handler logic runs.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boundary_duplicate_topic_creation_conflicts() {
    let h = harness().await;
    let alice = token("alice", &["write"], false);

    let (status, _) = send(
        &h.router,
        "POST",
        "/api/v1/topics",
        &alice,
        json!({"topic_name": "notes", "is_public": true}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn boundary_openapi_document_is_served_unauthenticated() {
    let h = harness().await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"]["/api/v1/messages"].is_object());
}

#[tokio::test]
async fn boundary_missing_bearer_token_is_unauthorized() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"topic": "notes", "payload": {}}).to_string()))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Boundary: bulk publish reports accepted/rejected per entry, with a
// taxonomy error code rather than a free-text message.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boundary_bulk_publish_reports_accepted_and_rejected_with_error_codes() {
    let h = harness().await;
    let bob = token("bob", &["read", "write"], false);

    let (status, body) = send(
        &h.router,
        "POST",
        "/api/v1/messages/bulk",
        &bob,
        json!({
            "messages": [
                {"topic": "notes", "payload": {"n": 1}},
                {"topic": "alice-private", "payload": {"n": 2}},
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "accepted");
    assert!(results[0]["message_id"].is_string());
    assert_eq!(results[1]["status"], "rejected");
    assert_eq!(results[1]["error"], "FORBIDDEN");
}

// ---------------------------------------------------------------------------
// Scenario E: broadcast under concurrency — 30 subscribers each receive all
// 50 messages published to a shared topic, in order, with zero drops.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_e_broadcast_reaches_every_subscriber_in_order() {
    const SUBSCRIBERS: usize = 30;
    const MESSAGES: usize = 50;

    let registry: Arc<dyn TopicRegistry> = Arc::new(MemoryRegistry::new());
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    seed_topic(
        &registry,
        &storage,
        Topic {
            name: "broadcast".to_string(),
            owner_user_id: "alice".to_string(),
            is_public: true,
            description: None,
            granted_user_ids: Vec::new(),
        },
    )
    .await;

    let authorizer = Arc::new(Authorizer::new(registry));
    let connections = Arc::new(ConnectionManager::new(SUBSCRIBERS + 1));
    let poll_manager = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), 10));
    let pipeline = PublishPipeline::new(
        storage,
        authorizer,
        connections.clone(),
        poll_manager,
        4096,
        TrimPolicy::MaxLen(10_000),
    );

    let mut receivers = Vec::with_capacity(SUBSCRIBERS);
    for _ in 0..SUBSCRIBERS {
        let (tx, rx) = mpsc::channel(MESSAGES + 1);
        let id = connections.register(tx).unwrap();
        connections.subscribe(id, "broadcast");
        receivers.push(rx);
    }

    let alice = AuthenticatedUser {
        user_id: "alice".to_string(),
        scopes: vec!["write".to_string()],
        is_admin: false,
    };
    for n in 0..MESSAGES {
        pipeline
            .publish(
                &alice,
                PublishRequest {
                    topic: "broadcast".to_string(),
                    payload: json!({"n": n}),
                    ttl: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
    }

    let mut total_deliveries = 0usize;
    for mut rx in receivers {
        let mut seen = Vec::with_capacity(MESSAGES);
        for _ in 0..MESSAGES {
            let frame = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
                .await
                .expect("delivery must not stall")
                .expect("channel must not close early");
            let PushFrame::Message(m) = frame else {
                panic!("expected a message frame");
            };
            seen.push(m.payload["n"].as_u64().unwrap());
        }
        let expected: Vec<u64> = (0..MESSAGES as u64).collect();
        assert_eq!(seen, expected, "deliveries to one subscriber must preserve publish order");
        total_deliveries += seen.len();
    }

    assert_eq!(total_deliveries, SUBSCRIBERS * MESSAGES);
    assert_eq!(connections.stats().dropped_sends, 0);
}

// ---------------------------------------------------------------------------
// Scenario F: storage outage — publish fails closed, no fan-out happens, and
// the error surfaces as a storage-unavailable response.
// ---------------------------------------------------------------------------

struct FailingStorage {
    calls: AtomicUsize,
}

#[async_trait]
impl StorageBackend for FailingStorage {
    async fn create_topic(&self, _topic: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn topic_exists(&self, _topic: &str) -> Result<bool, StorageError> {
        Ok(true)
    }

    async fn append(
        &self,
        _topic: &str,
        _message_id: &str,
        _payload: Value,
        _ttl: Option<u64>,
        _metadata: Option<serde_json::Map<String, Value>>,
    ) -> Result<(String, String), StorageError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StorageError::Unavailable("valkey unreachable".to_string()))
    }

    async fn read_since(&self, _topic: &str, _since: Option<&str>, _max_count: usize) -> Result<Vec<Message>, StorageError> {
        Ok(Vec::new())
    }

    async fn length(&self, _topic: &str) -> Result<u64, StorageError> {
        Ok(0)
    }

    async fn trim(&self, _topic: &str, _policy: TrimPolicy) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn scenario_f_storage_outage_fails_closed_with_no_fan_out() {
    let failing = Arc::new(FailingStorage { calls: AtomicUsize::new(0) });
    let storage: Arc<dyn StorageBackend> = failing.clone();
    let registry: Arc<dyn TopicRegistry> = Arc::new(MemoryRegistry::new());
    registry
        .create(Topic {
            name: "outage".to_string(),
            owner_user_id: "alice".to_string(),
            is_public: true,
            description: None,
            granted_user_ids: Vec::new(),
        })
        .await
        .unwrap();

    let authorizer = Arc::new(Authorizer::new(registry));
    let connections = Arc::new(ConnectionManager::new(10));
    let poll_manager = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), 10));
    let pipeline = PublishPipeline::new(
        storage,
        authorizer,
        connections.clone(),
        poll_manager,
        4096,
        TrimPolicy::MaxLen(10),
    );

    let (tx, mut rx) = mpsc::channel(8);
    let id = connections.register(tx).unwrap();
    connections.subscribe(id, "outage");

    let alice = AuthenticatedUser {
        user_id: "alice".to_string(),
        scopes: vec!["write".to_string()],
        is_admin: false,
    };
    let err = pipeline
        .publish(
            &alice,
            PublishRequest {
                topic: "outage".to_string(),
                payload: json!({"n": 1}),
                ttl: None,
                metadata: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Storage(_)));
    assert!(rx.try_recv().is_err(), "a failed publish must not reach existing subscribers");

    let api_error: api::types::ApiError = err.into();
    assert!(format!("{api_error:?}").contains("StorageUnavailable"));
    assert_eq!(failing.calls.load(Ordering::Relaxed), 1, "exactly one append attempt, no retry at this layer");
}
