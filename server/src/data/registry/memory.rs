//! In-memory topic registry.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{RegistryError, TopicRegistry};
use crate::domain::message::Topic;

#[derive(Default)]
pub struct MemoryRegistry {
    topics: RwLock<HashMap<String, Topic>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicRegistry for MemoryRegistry {
    async fn create(&self, topic: Topic) -> Result<Topic, RegistryError> {
        let mut topics = self.topics.write();
        if topics.contains_key(&topic.name) {
            return Err(RegistryError::AlreadyExists(topic.name));
        }
        topics.insert(topic.name.clone(), topic.clone());
        Ok(topic)
    }

    async fn get(&self, name: &str) -> Result<Option<Topic>, RegistryError> {
        Ok(self.topics.read().get(name).cloned())
    }

    async fn list_accessible(&self, user_id: &str, is_admin: bool) -> Result<Vec<Topic>, RegistryError> {
        Ok(self
            .topics
            .read()
            .values()
            .filter(|t| t.can_read(user_id, is_admin))
            .cloned()
            .collect())
    }

    async fn grant_permission(&self, name: &str, grantee_user_id: &str) -> Result<Topic, RegistryError> {
        let mut topics = self.topics.write();
        let topic = topics
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if !topic.granted_user_ids.iter().any(|u| u == grantee_user_id) {
            topic.granted_user_ids.push(grantee_user_id.to_string());
        }
        Ok(topic.clone())
    }
}
