//! Valkey-backed topic registry.
//!
//! Each topic is a hash at `topic:<name>:meta` (owner, visibility,
//! description) plus a set at `topic:<name>:grants`. A set
//! `pulsar:topics:all` tracks every topic name for listing.

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use super::{RegistryError, TopicRegistry};
use crate::domain::message::Topic;

const ALL_TOPICS_KEY: &str = "pulsar:topics:all";

fn meta_key(name: &str) -> String {
    format!("topic:{name}:meta")
}

fn grants_key(name: &str) -> String {
    format!("topic:{name}:grants")
}

pub struct ValkeyRegistry {
    pool: Pool,
}

impl ValkeyRegistry {
    pub fn new(host: &str, port: u16, use_tls: bool) -> Result<Self, RegistryError> {
        let scheme = if use_tls { "rediss" } else { "redis" };
        let url = format!("{scheme}://{host}:{port}");
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn load(&self, name: &str) -> Result<Option<Topic>, RegistryError> {
        let mut conn = self.pool.get().await?;
        let fields: Vec<(String, String)> = conn.hgetall(meta_key(name)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let mut owner_user_id = String::new();
        let mut is_public = false;
        let mut description = None;
        for (key, value) in fields {
            match key.as_str() {
                "owner_user_id" => owner_user_id = value,
                "is_public" => is_public = value == "1",
                "description" if !value.is_empty() => description = Some(value),
                _ => {}
            }
        }
        let granted_user_ids: Vec<String> = conn.smembers(grants_key(name)).await?;
        Ok(Some(Topic {
            name: name.to_string(),
            owner_user_id,
            is_public,
            description,
            granted_user_ids,
        }))
    }
}

#[async_trait]
impl TopicRegistry for ValkeyRegistry {
    async fn create(&self, topic: Topic) -> Result<Topic, RegistryError> {
        if self.load(&topic.name).await?.is_some() {
            return Err(RegistryError::AlreadyExists(topic.name));
        }
        let mut conn = self.pool.get().await?;
        let key = meta_key(&topic.name);
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("owner_user_id", topic.owner_user_id.clone()),
                    ("is_public", if topic.is_public { "1" } else { "0" }.to_string()),
                    ("description", topic.description.clone().unwrap_or_default()),
                ],
            )
            .await?;
        let _: i64 = conn.sadd(ALL_TOPICS_KEY, &topic.name).await?;
        Ok(topic)
    }

    async fn get(&self, name: &str) -> Result<Option<Topic>, RegistryError> {
        self.load(name).await
    }

    async fn list_accessible(&self, user_id: &str, is_admin: bool) -> Result<Vec<Topic>, RegistryError> {
        let names: Vec<String> = {
            let mut conn = self.pool.get().await?;
            conn.smembers(ALL_TOPICS_KEY).await?
        };
        let mut accessible = Vec::new();
        for name in names {
            if let Some(topic) = self.load(&name).await?
                && topic.can_read(user_id, is_admin)
            {
                accessible.push(topic);
            }
        }
        Ok(accessible)
    }

    async fn grant_permission(&self, name: &str, grantee_user_id: &str) -> Result<Topic, RegistryError> {
        let topic = self
            .load(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.sadd(grants_key(name), grantee_user_id).await?;
        self.load(&topic.name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}
