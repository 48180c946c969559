// =============================================================================
// Application Identity
// =============================================================================

pub const APP_NAME: &str = "Pulsar Relay";
pub const APP_NAME_LOWER: &str = "pulsar-relay";

// =============================================================================
// Configuration Files
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "pulsar-relay.json";
pub const ENV_CONFIG: &str = "PULSAR_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

pub const ENV_HOST: &str = "PULSAR_HOST";
pub const ENV_PORT: &str = "PULSAR_PORT";
pub const ENV_LOG: &str = "PULSAR_LOG";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7080;

// =============================================================================
// Environment Variables - Storage
// =============================================================================

pub const ENV_STORAGE_BACKEND: &str = "PULSAR_STORAGE_BACKEND";
pub const ENV_VALKEY_HOST: &str = "PULSAR_VALKEY_HOST";
pub const ENV_VALKEY_PORT: &str = "PULSAR_VALKEY_PORT";
pub const ENV_VALKEY_USE_TLS: &str = "PULSAR_VALKEY_USE_TLS";
pub const ENV_PERSISTENT_TIER_RETENTION: &str = "PULSAR_PERSISTENT_TIER_RETENTION";
pub const ENV_MAX_MESSAGES_PER_TOPIC: &str = "PULSAR_MAX_MESSAGES_PER_TOPIC";
pub const ENV_MAX_MESSAGE_BYTES: &str = "PULSAR_MAX_MESSAGE_BYTES";

pub const DEFAULT_VALKEY_HOST: &str = "127.0.0.1";
pub const DEFAULT_VALKEY_PORT: u16 = 6379;
pub const DEFAULT_PERSISTENT_TIER_RETENTION_SECS: u64 = 86_400;
pub const DEFAULT_MAX_MESSAGES_PER_TOPIC: u64 = 1_000_000;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

// =============================================================================
// Environment Variables - Connections
// =============================================================================

pub const ENV_MAX_CONNECTIONS: &str = "PULSAR_MAX_CONNECTIONS";
pub const ENV_MAX_WAITERS: &str = "PULSAR_MAX_WAITERS";

pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;
pub const DEFAULT_MAX_WAITERS: usize = 10_000;

// =============================================================================
// Authentication
// =============================================================================

pub const ENV_JWT_SECRET_KEY: &str = "PULSAR_JWT_SECRET_KEY";

/// Default lifetime of a signed session token, for tokens this crate issues itself
/// (e.g. in tests and local tooling); token issuance in production is an external collaborator.
pub const DEFAULT_SESSION_TTL_DAYS: u64 = 30;

// =============================================================================
// Request Body Limits
// =============================================================================

pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

// =============================================================================
// Long-poll
// =============================================================================

/// Default long-poll wait timeout, in seconds, when the client omits `timeout_ms`.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a client-requested long-poll wait, in seconds.
pub const MAX_POLL_TIMEOUT_SECS: u64 = 60;

/// Interval between poll-manager safety sweeps for orphaned waiters.
pub const POLL_SWEEP_INTERVAL_SECS: u64 = 30;

// =============================================================================
// Retry
// =============================================================================

pub const STORAGE_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const STORAGE_RETRY_BASE_DELAY_MS: u64 = 50;

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
