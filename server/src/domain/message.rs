//! Shared data model: messages and topics (spec data model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum length of a topic name.
pub const TOPIC_NAME_MAX_LEN: usize = 256;

/// A single relayed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Monotonic per-topic stream cursor, `<ms-timestamp>-<seq>`.
    pub stream_id: String,
}

/// A topic record: name, ownership, and visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub owner_user_id: String,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub granted_user_ids: Vec<String>,
}

impl Topic {
    /// Authorization for `read`: public, owner, grantee, or admin.
    pub fn can_read(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin
            || self.is_public
            || self.owner_user_id == user_id
            || self.granted_user_ids.iter().any(|u| u == user_id)
    }

    /// Authorization for `write`: owner, grantee, or admin. Public does not imply write.
    pub fn can_write(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.owner_user_id == user_id || self.granted_user_ids.iter().any(|u| u == user_id)
    }
}

/// Action a caller is attempting against a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

/// Validate a topic name against the spec's pattern and length bound.
pub fn is_valid_topic_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= TOPIC_NAME_MAX_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(owner: &str, public: bool, grants: &[&str]) -> Topic {
        Topic {
            name: "events".to_string(),
            owner_user_id: owner.to_string(),
            is_public: public,
            description: None,
            granted_user_ids: grants.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_public_topic_readable_by_anyone() {
        let t = topic("alice", true, &[]);
        assert!(t.can_read("bob", false));
    }

    #[test]
    fn test_public_topic_not_writable_by_stranger() {
        let t = topic("alice", true, &[]);
        assert!(!t.can_write("bob", false));
    }

    #[test]
    fn test_owner_can_read_and_write() {
        let t = topic("alice", false, &[]);
        assert!(t.can_read("alice", false));
        assert!(t.can_write("alice", false));
    }

    #[test]
    fn test_grantee_can_read_and_write() {
        let t = topic("alice", false, &["bob"]);
        assert!(t.can_read("bob", false));
        assert!(t.can_write("bob", false));
    }

    #[test]
    fn test_stranger_denied_private_topic() {
        let t = topic("alice", false, &[]);
        assert!(!t.can_read("bob", false));
        assert!(!t.can_write("bob", false));
    }

    #[test]
    fn test_admin_bypasses_topic_level_checks() {
        let t = topic("alice", false, &[]);
        assert!(t.can_read("carol", true));
        assert!(t.can_write("carol", true));
    }

    #[test]
    fn test_valid_topic_name() {
        assert!(is_valid_topic_name("events"));
        assert!(is_valid_topic_name("team.chat-room_1:alerts"));
        assert!(!is_valid_topic_name(""));
        assert!(!is_valid_topic_name("has space"));
        assert!(!is_valid_topic_name(&"a".repeat(TOPIC_NAME_MAX_LEN + 1)));
    }
}
