//! Bootstrap concerns: CLI, configuration, constants, startup banner, and
//! graceful shutdown.

pub(crate) mod banner;
pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use config::{AppConfig, AuthConfig, LimitsConfig, ServerConfig, StorageBackend, StorageConfig};
pub use shutdown::ShutdownService;

pub use crate::app::CoreApp;
