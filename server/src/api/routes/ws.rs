//! Push-socket protocol: the WebSocket half of message delivery.
//!
//! Every outbound frame, including handshake acks, is sent through the same
//! `mpsc` channel and drained by one writer task, so socket writes are
//! serialised per connection regardless of which piece of server logic
//! produced them.

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::auth::AuthUser;
use crate::api::server::AppState;
use crate::api::types::MessageDto;
use crate::domain::authz::AuthzDecision;
use crate::domain::connections::PushFrame;
use crate::domain::message::Action;
use crate::domain::AuthenticatedUser;
use crate::utils::ids::generate_session_id;

const OUTBOUND_CHANNEL_CAPACITY: usize = 128;
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe {
        topics: Vec<String>,
        #[serde(default)]
        #[allow(dead_code)]
        client_id: Option<String>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    Ack {
        #[allow(dead_code)]
        message_id: String,
    },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Subscribed { topics: Vec<String>, session_id: String },
    Unsubscribed { topics: Vec<String> },
    Message(MessageDto),
    Error { code: String, message: String },
    Pong,
}

fn to_server_frame(frame: PushFrame, session_id: &str) -> ServerFrame {
    match frame {
        PushFrame::Message(m) => ServerFrame::Message(MessageDto::from(m)),
        PushFrame::Subscribed(topics) => ServerFrame::Subscribed {
            topics,
            session_id: session_id.to_string(),
        },
        PushFrame::Unsubscribed(topics) => ServerFrame::Unsubscribed { topics },
        PushFrame::Error { code, message } => ServerFrame::Error { code, message },
        PushFrame::Pong => ServerFrame::Pong,
    }
}

/// `GET /ws`
pub async fn ws_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let (mut sink, mut stream) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<PushFrame>(OUTBOUND_CHANNEL_CAPACITY);

    let connection_id = match state.connections.register(frame_tx.clone()) {
        Ok(id) => id,
        Err(_) => {
            let _ = sink
                .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                    code: CLOSE_TRY_AGAIN_LATER,
                    reason: "connection capacity exceeded".into(),
                })))
                .await;
            return;
        }
    };

    let session_id = generate_session_id();
    tracing::debug!(user_id = %user.user_id, connection_id, session_id = %session_id, "push-socket accepted");

    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let wire = to_server_frame(frame, &session_id);
            let Ok(text) = serde_json::to_string(&wire) else { continue };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut accepted = false;
    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            WsMessage::Text(t) => t,
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => continue,
        };

        let parsed: Result<ClientFrame, _> = serde_json::from_str(&text);

        if !accepted {
            match parsed {
                Ok(ClientFrame::Subscribe { topics, .. }) => {
                    accepted = true;
                    handle_subscribe(&state, &user, connection_id, &frame_tx, topics).await;
                }
                _ => {
                    let _ = frame_tx
                        .send(PushFrame::Error {
                            code: "INVALID_MESSAGE".to_string(),
                            message: "the first frame on a push-socket must be subscribe".to_string(),
                        })
                        .await;
                    break;
                }
            }
            continue;
        }

        match parsed {
            Ok(ClientFrame::Subscribe { topics, .. }) => {
                handle_subscribe(&state, &user, connection_id, &frame_tx, topics).await;
            }
            Ok(ClientFrame::Unsubscribe { topics }) => {
                for topic in &topics {
                    state.connections.unsubscribe(connection_id, topic);
                }
                let _ = frame_tx.send(PushFrame::Unsubscribed(topics)).await;
            }
            Ok(ClientFrame::Ping) => {
                let _ = frame_tx.send(PushFrame::Pong).await;
            }
            Ok(ClientFrame::Ack { .. }) => {
                // Advisory only; the relay does not track per-client delivery state.
            }
            Err(_) => {
                let _ = frame_tx
                    .send(PushFrame::Error {
                        code: "INVALID_MESSAGE".to_string(),
                        message: "could not parse frame".to_string(),
                    })
                    .await;
            }
        }
    }

    state.connections.remove(connection_id);
    drop(frame_tx);
    let _ = writer.await;
    tracing::debug!(connection_id, "push-socket closed");
}

/// Subscribes to every requested topic, or none: if any topic fails
/// authorization the whole frame is rejected rather than partially applied.
async fn handle_subscribe(
    state: &AppState,
    user: &AuthenticatedUser,
    connection_id: crate::domain::connections::ConnectionId,
    frame_tx: &mpsc::Sender<PushFrame>,
    topics: Vec<String>,
) {
    for topic in &topics {
        match state.authorizer.authorize(user, topic, Action::Read).await {
            Ok(AuthzDecision::Allow) => continue,
            Ok(AuthzDecision::TopicNotFound) => {
                let _ = frame_tx
                    .send(PushFrame::Error {
                        code: "TOPIC_NOT_FOUND".to_string(),
                        message: format!("topic not found: {topic}"),
                    })
                    .await;
                return;
            }
            Ok(AuthzDecision::DenyNoScope) | Ok(AuthzDecision::DenyNoAccess) => {
                let _ = frame_tx
                    .send(PushFrame::Error {
                        code: "FORBIDDEN".to_string(),
                        message: format!("not permitted on topic: {topic}"),
                    })
                    .await;
                return;
            }
            Err(e) => {
                let _ = frame_tx
                    .send(PushFrame::Error {
                        code: "STORAGE_UNAVAILABLE".to_string(),
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }

    for topic in &topics {
        state.connections.subscribe(connection_id, topic);
    }
    let _ = frame_tx.send(PushFrame::Subscribed(topics)).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::data::registry::memory::MemoryRegistry;
    use crate::data::registry::TopicRegistry;
    use crate::data::storage::memory::MemoryStorage;
    use crate::data::storage::{StorageBackend, TrimPolicy};
    use crate::domain::message::{Message, Topic};
    use crate::domain::{Authorizer, ConnectionManager, PollManager, PublishPipeline};

    async fn state_with_topics() -> AppState {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .create(Topic {
                name: "public".to_string(),
                owner_user_id: "alice".to_string(),
                is_public: true,
                description: None,
                granted_user_ids: Vec::new(),
            })
            .await
            .unwrap();
        registry
            .create(Topic {
                name: "private".to_string(),
                owner_user_id: "alice".to_string(),
                is_public: false,
                description: None,
                granted_user_ids: Vec::new(),
            })
            .await
            .unwrap();

        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        storage.create_topic("public").await.unwrap();
        storage.create_topic("private").await.unwrap();

        let authorizer = Arc::new(Authorizer::new(registry.clone()));
        let connections = Arc::new(ConnectionManager::new(100));
        let poll_manager = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), 100));
        let publish_pipeline = Arc::new(PublishPipeline::new(
            storage.clone(),
            authorizer.clone(),
            connections.clone(),
            poll_manager.clone(),
            1024,
            TrimPolicy::MaxLen(100),
        ));

        AppState {
            storage,
            registry,
            authorizer,
            connections,
            poll_manager,
            publish_pipeline,
            jwt_secret_key: Arc::new(vec![0u8; 32]),
        }
    }

    #[tokio::test]
    async fn test_subscribe_is_all_or_nothing() {
        let state = state_with_topics().await;
        let bob = AuthenticatedUser {
            user_id: "bob".to_string(),
            scopes: vec!["read".to_string()],
            is_admin: false,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let connection_id = state.connections.register(tx.clone()).unwrap();

        handle_subscribe(
            &state,
            &bob,
            connection_id,
            &tx,
            vec!["public".to_string(), "private".to_string()],
        )
        .await;

        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, PushFrame::Error { code, .. } if code == "FORBIDDEN"));

        let message = Message {
            message_id: "msg_x".to_string(),
            topic: "public".to_string(),
            payload: json!({}),
            timestamp: chrono::Utc::now(),
            ttl: None,
            metadata: None,
            stream_id: "1-0".to_string(),
        };
        state.connections.broadcast("public", &message).await;
        assert!(
            rx.try_recv().is_err(),
            "a rejected subscribe frame must not leave a partial subscription behind"
        );
    }

    #[tokio::test]
    async fn test_subscribe_all_allowed_acks_once() {
        let state = state_with_topics().await;
        let alice = AuthenticatedUser {
            user_id: "alice".to_string(),
            scopes: vec!["read".to_string()],
            is_admin: false,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let connection_id = state.connections.register(tx.clone()).unwrap();

        handle_subscribe(
            &state,
            &alice,
            connection_id,
            &tx,
            vec!["public".to_string(), "private".to_string()],
        )
        .await;

        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, PushFrame::Subscribed(topics) if topics.len() == 2));
    }

    #[test]
    fn test_client_frame_subscribe_ignores_optional_client_id() {
        let parsed: ClientFrame = serde_json::from_str(r#"{"type":"subscribe","topics":["chat"]}"#).unwrap();
        assert!(matches!(parsed, ClientFrame::Subscribe { topics, client_id } if topics == vec!["chat"] && client_id.is_none()));
    }

    #[test]
    fn test_server_frame_message_tag_is_internally_tagged() {
        let dto = MessageDto {
            message_id: "msg_1".to_string(),
            topic: "chat".to_string(),
            payload: json!({"n": 1}),
            timestamp: chrono::Utc::now(),
            ttl: None,
            metadata: None,
            stream_id: "1-0".to_string(),
        };
        let frame = ServerFrame::Message(dto);
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"type\":\"message\""));
        assert!(text.contains("\"message_id\":\"msg_1\""));
    }

    #[test]
    fn test_to_server_frame_stamps_session_id() {
        let wire = to_server_frame(PushFrame::Subscribed(vec!["chat".to_string()]), "sess_abc");
        assert!(matches!(wire, ServerFrame::Subscribed { session_id, .. } if session_id == "sess_abc"));
    }
}
