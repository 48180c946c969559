//! Application bootstrap: wires storage, authorization, connection and poll
//! managers, and the publish pipeline together, in that order, then serves
//! the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig};
use crate::core::config::{AppConfig, StorageBackend as StorageBackendKind};
use crate::core::constants::{ENV_LOG, POLL_SWEEP_INTERVAL_SECS};
use crate::core::shutdown::ShutdownService;
use crate::data::registry::TopicRegistry;
use crate::data::registry::memory::MemoryRegistry;
use crate::data::registry::valkey::ValkeyRegistry;
use crate::data::storage::memory::MemoryStorage;
use crate::data::storage::valkey::ValkeyStorage;
use crate::data::storage::{StorageBackend, TrimPolicy};
use crate::domain::{Authorizer, ConnectionManager, PollManager, PublishPipeline};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: Arc<dyn StorageBackend>,
    pub registry: Arc<dyn TopicRegistry>,
    pub authorizer: Arc<Authorizer>,
    pub connections: Arc<ConnectionManager>,
    pub poll_manager: Arc<PollManager>,
    pub publish_pipeline: Arc<PublishPipeline>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let (storage, registry): (Arc<dyn StorageBackend>, Arc<dyn TopicRegistry>) = match config.storage.backend {
            StorageBackendKind::Memory => (
                Arc::new(MemoryStorage::with_max_len(config.storage.max_messages_per_topic)),
                Arc::new(MemoryRegistry::new()),
            ),
            StorageBackendKind::Valkey => {
                let storage = ValkeyStorage::new(
                    &config.storage.valkey.host,
                    config.storage.valkey.port,
                    config.storage.valkey.use_tls,
                )?;
                let registry = ValkeyRegistry::new(
                    &config.storage.valkey.host,
                    config.storage.valkey.port,
                    config.storage.valkey.use_tls,
                )?;
                (Arc::new(storage), Arc::new(registry))
            }
        };

        let authorizer = Arc::new(Authorizer::new(registry.clone()));
        let connections = Arc::new(ConnectionManager::new(config.limits.max_connections));
        let poll_manager = Arc::new(PollManager::new(storage.clone(), authorizer.clone(), config.limits.max_waiters));
        let publish_pipeline = Arc::new(PublishPipeline::new(
            storage.clone(),
            authorizer.clone(),
            connections.clone(),
            poll_manager.clone(),
            config.storage.max_message_bytes,
            TrimPolicy::MaxLen(config.storage.max_messages_per_topic),
        ));

        let shutdown = ShutdownService::new();

        Ok(Self {
            shutdown,
            config,
            storage,
            registry,
            authorizer,
            connections,
            poll_manager,
            publish_pipeline,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=debug", crate::core::constants::APP_NAME_LOWER.replace('-', "_"));

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.start_background_tasks().await;

        banner::print_banner(
            &app.config.server.host,
            app.config.server.port,
            app.config.storage.backend.to_string().as_str(),
            true,
        );

        let server = ApiServer::new(app);
        server.serve().await
    }

    async fn start_background_tasks(&self) {
        let poll_manager = self.poll_manager.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let sweep_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(POLL_SWEEP_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = interval.tick() => poll_manager.sweep_expired(),
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        self.shutdown.register(sweep_handle).await;

        if matches!(self.config.storage.backend, StorageBackendKind::Valkey) {
            let storage = self.storage.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            let health_handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = storage.topic_exists("__health_check__").await {
                                tracing::warn!(error = %e, "storage health check failed");
                            }
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            });
            self.shutdown.register(health_handle).await;
        }

        tracing::debug!("Background tasks started");
    }
}
