//! Application configuration
//!
//! Loads from environment variables (prefix `PULSAR_`), with CLI arguments
//! taking precedence (clap resolves CLI-vs-env fallback at parse time).

use std::fmt;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::*;

// =============================================================================
// Storage Backend Enum
// =============================================================================

/// Pluggable storage backend selector (C1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Valkey,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Valkey => write!(f, "valkey"),
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Valkey connection configuration (only consulted when `storage.backend = valkey`).
#[derive(Debug, Clone)]
pub struct ValkeyConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Storage configuration (C1).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub valkey: ValkeyConfig,
    pub persistent_tier_retention_secs: u64,
    pub max_messages_per_topic: u64,
    pub max_message_bytes: usize,
}

/// Authentication configuration.
///
/// Token *issuance* is an external collaborator; this crate only verifies.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret_key: Vec<u8>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret_key", &"<redacted>")
            .finish()
    }
}

/// Connection/waiter resource caps.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_connections: usize,
    pub max_waiters: usize,
}

/// Final merged application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load configuration from environment (via CLI, which resolves env fallbacks)
    /// with built-in defaults filling any gaps.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let host = cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.unwrap_or(DEFAULT_PORT);

        let backend = match cli.storage_backend.as_deref() {
            Some("memory") => StorageBackend::Memory,
            Some("valkey") => StorageBackend::Valkey,
            Some(other) => bail!(
                "Invalid {}: '{}'. Valid options: memory, valkey",
                ENV_STORAGE_BACKEND,
                other
            ),
            None => StorageBackend::default(),
        };

        let valkey = ValkeyConfig {
            host: cli
                .valkey_host
                .clone()
                .unwrap_or_else(|| DEFAULT_VALKEY_HOST.to_string()),
            port: cli.valkey_port.unwrap_or(DEFAULT_VALKEY_PORT),
            use_tls: cli.valkey_use_tls.unwrap_or(false),
        };

        let storage = StorageConfig {
            backend,
            valkey,
            persistent_tier_retention_secs: cli
                .persistent_tier_retention_secs
                .unwrap_or(DEFAULT_PERSISTENT_TIER_RETENTION_SECS),
            max_messages_per_topic: cli
                .max_messages_per_topic
                .unwrap_or(DEFAULT_MAX_MESSAGES_PER_TOPIC),
            max_message_bytes: cli
                .max_message_bytes
                .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
        };

        let jwt_secret_key = match cli.jwt_secret_key.clone() {
            Some(key) => key.into_bytes(),
            None => {
                tracing::warn!(
                    "{} not set; generating an ephemeral signing key for this process only \
                     (tokens will not be verifiable across restarts)",
                    ENV_JWT_SECRET_KEY
                );
                crate::utils::ids::generate_key(32)
            }
        };

        let limits = LimitsConfig {
            max_connections: cli.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            max_waiters: cli.max_waiters.unwrap_or(DEFAULT_MAX_WAITERS),
        };

        let config = Self {
            server: ServerConfig { host, port },
            storage,
            auth: AuthConfig { jwt_secret_key },
            limits,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server port must be nonzero");
        }
        if self.storage.max_message_bytes == 0 {
            bail!("{} must be nonzero", ENV_MAX_MESSAGE_BYTES);
        }
        if self.auth.jwt_secret_key.is_empty() {
            bail!("{} must not be empty", ENV_JWT_SECRET_KEY);
        }
        Ok(())
    }
}

/// Whether a host string binds to all network interfaces.
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
