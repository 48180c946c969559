//! Topic registry: where topic records (owner, visibility, grants) live.
//!
//! Not specified further by the wire contract beyond the three HTTP routes
//! that front it; grounded on the same pluggable-backend shape as storage.

pub mod memory;
pub mod valkey;

use std::fmt;

use async_trait::async_trait;

use crate::domain::message::Topic;

/// Error returned by a topic registry.
#[derive(Debug)]
pub enum RegistryError {
    AlreadyExists(String),
    NotFound(String),
    Unavailable(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists(name) => write!(f, "topic already exists: {name}"),
            RegistryError::NotFound(name) => write!(f, "topic not found: {name}"),
            RegistryError::Unavailable(msg) => write!(f, "registry unavailable: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<deadpool_redis::PoolError> for RegistryError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for RegistryError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Topic record CRUD, backing `POST/GET /api/v1/topics` and the permissions route.
#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Create a new topic record. Fails if the name is already taken.
    async fn create(&self, topic: Topic) -> Result<Topic, RegistryError>;

    /// Fetch a topic record by name.
    async fn get(&self, name: &str) -> Result<Option<Topic>, RegistryError>;

    /// List every topic a user can read (public, owned, or granted), or all
    /// topics when `is_admin` is set.
    async fn list_accessible(&self, user_id: &str, is_admin: bool) -> Result<Vec<Topic>, RegistryError>;

    /// Grant another user read/write access to a topic the caller owns.
    async fn grant_permission(&self, name: &str, grantee_user_id: &str) -> Result<Topic, RegistryError>;
}
