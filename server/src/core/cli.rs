use clap::Parser;

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_HOST, ENV_JWT_SECRET_KEY, ENV_MAX_CONNECTIONS, ENV_MAX_MESSAGES_PER_TOPIC,
    ENV_MAX_MESSAGE_BYTES, ENV_MAX_WAITERS, ENV_PERSISTENT_TIER_RETENTION, ENV_PORT,
    ENV_STORAGE_BACKEND, ENV_VALKEY_HOST, ENV_VALKEY_PORT, ENV_VALKEY_USE_TLS,
};

#[derive(Parser)]
#[command(name = "pulsar-relay")]
#[command(version, about = "Real-time JSON message fan-out relay", long_about = None)]
pub struct Cli {
    /// Server host address
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Storage backend (memory or valkey)
    #[arg(long, env = ENV_STORAGE_BACKEND)]
    pub storage_backend: Option<String>,

    /// Valkey host (when storage backend is valkey)
    #[arg(long, env = ENV_VALKEY_HOST)]
    pub valkey_host: Option<String>,

    /// Valkey port
    #[arg(long, env = ENV_VALKEY_PORT)]
    pub valkey_port: Option<u16>,

    /// Use TLS for the Valkey connection
    #[arg(long, env = ENV_VALKEY_USE_TLS)]
    pub valkey_use_tls: Option<bool>,

    /// Persistent tier retention, in seconds
    #[arg(long, env = ENV_PERSISTENT_TIER_RETENTION)]
    pub persistent_tier_retention_secs: Option<u64>,

    /// Maximum retained messages per topic before trim
    #[arg(long, env = ENV_MAX_MESSAGES_PER_TOPIC)]
    pub max_messages_per_topic: Option<u64>,

    /// Maximum payload size in bytes
    #[arg(long, env = ENV_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: Option<usize>,

    /// Maximum concurrent push-socket connections
    #[arg(long, env = ENV_MAX_CONNECTIONS)]
    pub max_connections: Option<usize>,

    /// Maximum concurrent long-poll waiters
    #[arg(long, env = ENV_MAX_WAITERS)]
    pub max_waiters: Option<usize>,

    /// JWT HMAC signing key used to verify bearer tokens
    #[arg(long, env = ENV_JWT_SECRET_KEY)]
    pub jwt_secret_key: Option<String>,
}

/// Configuration derived from CLI arguments (and their environment fallbacks).
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub storage_backend: Option<String>,
    pub valkey_host: Option<String>,
    pub valkey_port: Option<u16>,
    pub valkey_use_tls: Option<bool>,
    pub persistent_tier_retention_secs: Option<u64>,
    pub max_messages_per_topic: Option<u64>,
    pub max_message_bytes: Option<usize>,
    pub max_connections: Option<usize>,
    pub max_waiters: Option<usize>,
    pub jwt_secret_key: Option<String>,
}

/// Parse CLI arguments into a `CliConfig`.
pub fn parse() -> CliConfig {
    let cli = Cli::parse();
    CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        storage_backend: cli.storage_backend,
        valkey_host: cli.valkey_host,
        valkey_port: cli.valkey_port,
        valkey_use_tls: cli.valkey_use_tls,
        persistent_tier_retention_secs: cli.persistent_tier_retention_secs,
        max_messages_per_topic: cli.max_messages_per_topic,
        max_message_bytes: cli.max_message_bytes,
        max_connections: cli.max_connections,
        max_waiters: cli.max_waiters,
        jwt_secret_key: cli.jwt_secret_key,
    }
}
