//! Poll manager (C4): long-poll waiters for clients that don't hold a
//! WebSocket open.
//!
//! A waiter is registered *before* the catch-up read runs, so a publish
//! racing the poll is never lost: if catch-up finds nothing the waiter is
//! already listening, and if catch-up finds data the waiter is torn down
//! (by `WaiterGuard`'s `Drop`) once that data is returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::constants::{DEFAULT_POLL_TIMEOUT_SECS, MAX_POLL_TIMEOUT_SECS};
use crate::data::storage::StorageBackend;
use crate::domain::authz::{AuthenticatedUser, AuthzDecision, Authorizer};
use crate::domain::message::{Action, Message};
use crate::utils::ids::generate_waiter_id;

const CATCH_UP_PAGE_SIZE: usize = 100;
const WAITER_BUFFER_CAPACITY: usize = 128;
/// Waiters older than this multiple of the max poll timeout are reclaimed
/// by the sweep even if their owning request somehow never unregistered.
const SWEEP_CEILING_MULTIPLIER: u32 = 5;

pub type WaiterId = String;

#[derive(Debug)]
pub enum PollError {
    InvalidRequest(String),
    TopicNotFound(String),
    Forbidden(String),
    Unavailable(String),
    Storage(String),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::InvalidRequest(msg) => write!(f, "invalid poll request: {msg}"),
            PollError::TopicNotFound(t) => write!(f, "topic not found: {t}"),
            PollError::Forbidden(t) => write!(f, "forbidden: {t}"),
            PollError::Unavailable(msg) => write!(f, "poll manager unavailable: {msg}"),
            PollError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for PollError {}

#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

struct Waiter {
    cursors: HashMap<String, Option<String>>,
    buffer: Vec<Message>,
    signal: Arc<Notify>,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    waiters: HashMap<WaiterId, Waiter>,
    by_topic: HashMap<String, Vec<WaiterId>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PollStats {
    pub active_waiters: usize,
    pub dropped_buffer_full: u64,
}

pub struct PollManager {
    state: Mutex<State>,
    storage: Arc<dyn StorageBackend>,
    authorizer: Arc<Authorizer>,
    max_waiters: usize,
    dropped_buffer_full: AtomicU64,
}

impl PollManager {
    pub fn new(storage: Arc<dyn StorageBackend>, authorizer: Arc<Authorizer>, max_waiters: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            storage,
            authorizer,
            max_waiters,
            dropped_buffer_full: AtomicU64::new(0),
        }
    }

    pub async fn poll(
        &self,
        user: &AuthenticatedUser,
        topics: &[String],
        since: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<PollOutcome, PollError> {
        if topics.is_empty() {
            return Err(PollError::InvalidRequest("topics must not be empty".into()));
        }
        let timeout = timeout
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS))
            .clamp(Duration::from_secs(1), Duration::from_secs(MAX_POLL_TIMEOUT_SECS));

        for topic in topics {
            match self
                .authorizer
                .authorize(user, topic, Action::Read)
                .await
                .map_err(|e| PollError::Storage(e.to_string()))?
            {
                AuthzDecision::Allow => {}
                AuthzDecision::TopicNotFound => return Err(PollError::TopicNotFound(topic.clone())),
                AuthzDecision::DenyNoScope | AuthzDecision::DenyNoAccess => {
                    return Err(PollError::Forbidden(topic.clone()));
                }
            }
        }

        let cursors: HashMap<String, Option<String>> =
            topics.iter().map(|t| (t.clone(), since.get(t).cloned())).collect();

        let waiter_id = self.register_waiter(cursors.clone())?;
        let _guard = WaiterGuard {
            manager: self,
            id: waiter_id.clone(),
        };

        let (messages, has_more) = self.catch_up(topics, &cursors).await?;
        if !messages.is_empty() {
            return Ok(PollOutcome { messages, has_more });
        }

        let signal = {
            let state = self.state.lock();
            state.waiters.get(&waiter_id).map(|w| Arc::clone(&w.signal))
        };
        let Some(signal) = signal else {
            return Ok(PollOutcome::default());
        };

        let _ = tokio::time::timeout(timeout, signal.notified()).await;

        let drained = {
            let mut state = self.state.lock();
            state
                .waiters
                .get_mut(&waiter_id)
                .map(|w| std::mem::take(&mut w.buffer))
                .unwrap_or_default()
        };

        Ok(PollOutcome {
            messages: drained,
            has_more: false,
        })
    }

    /// Wake every waiter registered on `topic` and hand it the message. Does
    /// not touch connection-manager state; C5 calls both independently.
    pub fn deliver(&self, topic: &str, message: &Message) {
        let mut state = self.state.lock();
        let Some(ids) = state.by_topic.get(topic).cloned() else {
            return;
        };
        for id in ids {
            if let Some(waiter) = state.waiters.get_mut(&id) {
                if waiter.buffer.len() >= WAITER_BUFFER_CAPACITY {
                    self.dropped_buffer_full.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let was_empty = waiter.buffer.is_empty();
                waiter.buffer.push(message.clone());
                if was_empty {
                    waiter.signal.notify_one();
                }
            }
        }
    }

    /// Reclaims waiters whose owning request never unregistered them
    /// (should only happen if a task is killed without running its drop
    /// glue). Run on a timer, not on the hot path.
    pub fn sweep_expired(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let expired: Vec<WaiterId> = state
            .waiters
            .iter()
            .filter(|(_, w)| now >= w.deadline)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            Self::remove_waiter_locked(&mut state, &id);
        }
    }

    pub fn stats(&self) -> PollStats {
        PollStats {
            active_waiters: self.state.lock().waiters.len(),
            dropped_buffer_full: self.dropped_buffer_full.load(Ordering::Relaxed),
        }
    }

    fn register_waiter(&self, cursors: HashMap<String, Option<String>>) -> Result<WaiterId, PollError> {
        let mut state = self.state.lock();
        if state.waiters.len() >= self.max_waiters {
            return Err(PollError::Unavailable("too many waiting poll requests".into()));
        }
        let id = generate_waiter_id();
        let deadline =
            Instant::now() + Duration::from_secs(MAX_POLL_TIMEOUT_SECS) * SWEEP_CEILING_MULTIPLIER;
        let topics: Vec<String> = cursors.keys().cloned().collect();
        state.waiters.insert(
            id.clone(),
            Waiter {
                cursors,
                buffer: Vec::new(),
                signal: Arc::new(Notify::new()),
                deadline,
            },
        );
        for topic in topics {
            state.by_topic.entry(topic).or_default().push(id.clone());
        }
        Ok(id)
    }

    fn unregister_waiter(&self, id: &WaiterId) {
        let mut state = self.state.lock();
        Self::remove_waiter_locked(&mut state, id);
    }

    fn remove_waiter_locked(state: &mut State, id: &WaiterId) {
        if let Some(waiter) = state.waiters.remove(id) {
            for topic in waiter.cursors.keys() {
                if let Some(list) = state.by_topic.get_mut(topic) {
                    list.retain(|w| w != id);
                }
            }
        }
    }

    async fn catch_up(
        &self,
        topics: &[String],
        cursors: &HashMap<String, Option<String>>,
    ) -> Result<(Vec<Message>, bool), PollError> {
        let mut messages = Vec::new();
        let mut has_more = false;
        for topic in topics {
            let since = cursors.get(topic).and_then(|c| c.as_deref());
            let page = self
                .storage
                .read_since(topic, since, CATCH_UP_PAGE_SIZE)
                .await
                .map_err(|e| PollError::Storage(e.to_string()))?;
            if page.len() == CATCH_UP_PAGE_SIZE {
                has_more = true;
            }
            messages.extend(page);
        }
        Ok((messages, has_more))
    }
}

/// Guarantees a waiter is torn down on every exit path, including the
/// request future being dropped mid-await on client disconnect.
struct WaiterGuard<'a> {
    manager: &'a PollManager,
    id: WaiterId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.manager.unregister_waiter(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registry::memory::MemoryRegistry;
    use crate::data::storage::memory::MemoryStorage;
    use crate::domain::message::Topic;
    use serde_json::json;

    async fn fixture() -> (PollManager, Arc<dyn StorageBackend>, AuthenticatedUser) {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .create(Topic {
                name: "chat".to_string(),
                owner_user_id: "alice".to_string(),
                is_public: true,
                description: None,
                granted_user_ids: Vec::new(),
            })
            .await
            .unwrap();
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        storage.create_topic("chat").await.unwrap();
        let authorizer = Arc::new(Authorizer::new(registry));
        let manager = PollManager::new(storage.clone(), authorizer, 100);
        let user = AuthenticatedUser {
            user_id: "bob".to_string(),
            scopes: vec!["read".to_string()],
            is_admin: false,
        };
        (manager, storage, user)
    }

    #[tokio::test]
    async fn test_catch_up_returns_immediately_when_backlog_exists() {
        let (manager, storage, user) = fixture().await;
        storage
            .append("chat", "msg_a", json!({"n": 1}), None, None)
            .await
            .unwrap();

        let outcome = manager
            .poll(&user, &["chat".to_string()], &HashMap::new(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(outcome.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_rejects_empty_topic_list() {
        let (manager, _storage, user) = fixture().await;
        let err = manager
            .poll(&user, &[], &HashMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_poll_rejects_unknown_topic() {
        let (manager, _storage, user) = fixture().await;
        let err = manager
            .poll(&user, &["nope".to_string()], &HashMap::new(), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_deliver_wakes_waiting_poll() {
        let (manager, _storage, user) = fixture().await;
        let manager = Arc::new(manager);
        let waiting = {
            let manager = manager.clone();
            let user = user.clone();
            tokio::spawn(async move {
                manager
                    .poll(&user, &["chat".to_string()], &HashMap::new(), Some(Duration::from_secs(5)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let message = Message {
            message_id: "msg_b".to_string(),
            topic: "chat".to_string(),
            payload: json!({"n": 2}),
            timestamp: chrono::Utc::now(),
            ttl: None,
            metadata: None,
            stream_id: "1-0".to_string(),
        };
        manager.deliver("chat", &message);

        let outcome = waiting.await.unwrap().unwrap();
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].message_id, "msg_b");
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_waiters() {
        let (manager, _storage, _user) = fixture().await;
        manager.register_waiter(HashMap::from([("chat".to_string(), None)])).unwrap();
        assert_eq!(manager.stats().active_waiters, 1);
        manager.sweep_expired();
        assert_eq!(manager.stats().active_waiters, 1, "not yet expired");
    }
}
