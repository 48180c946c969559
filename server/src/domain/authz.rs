//! Authorization oracle (C2).

use std::sync::Arc;

use crate::data::registry::{RegistryError, TopicRegistry};
use crate::domain::message::Action;

/// The caller identity produced by the JWT boundary.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzDecision {
    Allow,
    DenyNoScope,
    DenyNoAccess,
    TopicNotFound,
}

/// C2: decides whether a user may perform an action against a topic.
pub struct Authorizer {
    registry: Arc<dyn TopicRegistry>,
}

impl Authorizer {
    pub fn new(registry: Arc<dyn TopicRegistry>) -> Self {
        Self { registry }
    }

    pub async fn authorize(
        &self,
        user: &AuthenticatedUser,
        topic_name: &str,
        action: Action,
    ) -> Result<AuthzDecision, RegistryError> {
        let Some(topic) = self.registry.get(topic_name).await? else {
            return Ok(AuthzDecision::TopicNotFound);
        };

        let required_scope = match action {
            Action::Read => "read",
            Action::Write => "write",
        };
        if !user.has_scope(required_scope) {
            return Ok(AuthzDecision::DenyNoScope);
        }

        let allowed = match action {
            Action::Read => topic.can_read(&user.user_id, user.is_admin),
            Action::Write => topic.can_write(&user.user_id, user.is_admin),
        };

        Ok(if allowed {
            AuthzDecision::Allow
        } else {
            AuthzDecision::DenyNoAccess
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registry::memory::MemoryRegistry;
    use crate::domain::message::Topic;

    fn user(id: &str, scopes: &[&str], admin: bool) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            is_admin: admin,
        }
    }

    async fn setup() -> Authorizer {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .create(Topic {
                name: "alice-private".to_string(),
                owner_user_id: "alice".to_string(),
                is_public: false,
                description: None,
                granted_user_ids: Vec::new(),
            })
            .await
            .unwrap();
        Authorizer::new(registry)
    }

    #[tokio::test]
    async fn test_topic_not_found_checked_first() {
        let authz = setup().await;
        let bob = user("bob", &[], false);
        let decision = authz
            .authorize(&bob, "no-such-topic", Action::Read)
            .await
            .unwrap();
        assert_eq!(decision, AuthzDecision::TopicNotFound);
    }

    #[tokio::test]
    async fn test_deny_no_scope() {
        let authz = setup().await;
        let bob = user("bob", &[], false);
        let decision = authz
            .authorize(&bob, "alice-private", Action::Read)
            .await
            .unwrap();
        assert_eq!(decision, AuthzDecision::DenyNoScope);
    }

    #[tokio::test]
    async fn test_deny_no_access_for_stranger() {
        let authz = setup().await;
        let bob = user("bob", &["read", "write"], false);
        let decision = authz
            .authorize(&bob, "alice-private", Action::Read)
            .await
            .unwrap();
        assert_eq!(decision, AuthzDecision::DenyNoAccess);
    }

    #[tokio::test]
    async fn test_owner_allowed_to_write() {
        let authz = setup().await;
        let alice = user("alice", &["write"], false);
        let decision = authz
            .authorize(&alice, "alice-private", Action::Write)
            .await
            .unwrap();
        assert_eq!(decision, AuthzDecision::Allow);
    }

    #[tokio::test]
    async fn test_admin_bypasses_access_check_but_needs_scope() {
        let authz = setup().await;
        let admin_no_scope = user("root", &[], true);
        assert_eq!(
            authz
                .authorize(&admin_no_scope, "alice-private", Action::Read)
                .await
                .unwrap(),
            AuthzDecision::DenyNoScope
        );

        let admin_with_scope = user("root", &["read"], true);
        assert_eq!(
            authz
                .authorize(&admin_with_scope, "alice-private", Action::Read)
                .await
                .unwrap(),
            AuthzDecision::Allow
        );
    }
}
