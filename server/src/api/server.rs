//! API server: router assembly and the shared application state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use super::middleware::{self, AllowedOrigins};
use super::openapi::openapi_json;
use super::routes::{health, messages, topics, ws};
use crate::core::CoreApp;
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::data::registry::TopicRegistry;
use crate::data::storage::StorageBackend;
use crate::domain::{Authorizer, ConnectionManager, PollManager, PublishPipeline};

/// Everything a route handler might need, cheaply cloneable and shared
/// across every connection.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub registry: Arc<dyn TopicRegistry>,
    pub authorizer: Arc<Authorizer>,
    pub connections: Arc<ConnectionManager>,
    pub poll_manager: Arc<PollManager>,
    pub publish_pipeline: Arc<PublishPipeline>,
    pub jwt_secret_key: Arc<Vec<u8>>,
}

pub struct ApiServer {
    app: CoreApp,
    allowed_origins: AllowedOrigins,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        let allowed_origins = AllowedOrigins::new(&app.config.server.host, app.config.server.port);
        Self { app, allowed_origins }
    }

    fn state(&self) -> AppState {
        AppState {
            storage: self.app.storage.clone(),
            registry: self.app.registry.clone(),
            authorizer: self.app.authorizer.clone(),
            connections: self.app.connections.clone(),
            poll_manager: self.app.poll_manager.clone(),
            publish_pipeline: self.app.publish_pipeline.clone(),
            jwt_secret_key: Arc::new(self.app.config.auth.jwt_secret_key.clone()),
        }
    }

    fn router(&self) -> Router {
        build_router(self.state(), &self.allowed_origins)
    }

    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.app.config.server.host, self.app.config.server.port).parse()?;
        let shutdown = self.app.shutdown.clone();
        let router = self.router();

        tracing::info!(%addr, "listening");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

/// Assembles the route table over a given [`AppState`], independent of
/// [`CoreApp`]. Kept separate from [`ApiServer`] so tests can build a router
/// against a hand-constructed state without going through full bootstrap.
pub fn build_router(state: AppState, allowed_origins: &AllowedOrigins) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route("/api/v1/messages", post(messages::publish))
        .route("/api/v1/messages/bulk", post(messages::publish_bulk))
        .route("/messages/poll", post(messages::poll))
        .route("/ws", get(ws::ws_handler))
        .route("/api/v1/topics", get(topics::list_topics).post(topics::create_topic))
        .route("/api/v1/topics/{name}/permissions", post(topics::grant_permission))
        .route("/api/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(middleware::cors(allowed_origins))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .fallback(middleware::handle_404)
}
