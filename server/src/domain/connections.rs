//! Connection manager (C3): tracks live WebSocket subscribers and fans
//! messages out to them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::message::Message;

pub type ConnectionId = u64;

const SEND_DEADLINE: Duration = Duration::from_millis(100);

/// A frame pushed down a WebSocket connection's outbound channel.
#[derive(Debug, Clone)]
pub enum PushFrame {
    Message(Message),
    Subscribed(Vec<String>),
    Unsubscribed(Vec<String>),
    Error { code: String, message: String },
    Pong,
}

#[derive(Debug)]
pub enum ConnectionError {
    CapacityExceeded,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::CapacityExceeded => write!(f, "connection capacity exceeded"),
        }
    }
}

impl std::error::Error for ConnectionError {}

struct ConnectionEntry {
    sender: mpsc::Sender<PushFrame>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct State {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    subscribers_by_topic: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub dropped_sends: u64,
}

/// Single shared registry of subscribers, guarded by one mutex. Broadcasts
/// snapshot the subscriber set, release the lock, then send, so a slow
/// reader never blocks the publish pipeline or other connections.
pub struct ConnectionManager {
    state: Mutex<State>,
    next_id: AtomicU64,
    max_connections: usize,
    dropped_sends: AtomicU64,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            max_connections,
            dropped_sends: AtomicU64::new(0),
        }
    }

    pub fn register(&self, sender: mpsc::Sender<PushFrame>) -> Result<ConnectionId, ConnectionError> {
        let mut state = self.state.lock();
        if state.connections.len() >= self.max_connections {
            return Err(ConnectionError::CapacityExceeded);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.connections.insert(
            id,
            ConnectionEntry {
                sender,
                topics: HashSet::new(),
            },
        );
        Ok(id)
    }

    pub fn subscribe(&self, connection_id: ConnectionId, topic: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.topics.insert(topic.to_string());
        }
        state
            .subscribers_by_topic
            .entry(topic.to_string())
            .or_default()
            .insert(connection_id);
    }

    pub fn unsubscribe(&self, connection_id: ConnectionId, topic: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.topics.remove(topic);
        }
        if let Some(subs) = state.subscribers_by_topic.get_mut(topic) {
            subs.remove(&connection_id);
        }
    }

    pub fn remove(&self, connection_id: ConnectionId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.connections.remove(&connection_id) {
            for topic in entry.topics {
                if let Some(subs) = state.subscribers_by_topic.get_mut(&topic) {
                    subs.remove(&connection_id);
                }
            }
        }
    }

    /// Snapshot subscribers for `topic`, release the lock, then push the
    /// message to each with a short deadline. Connections that miss the
    /// deadline are treated as dead and dropped.
    pub async fn broadcast(&self, topic: &str, message: &Message) {
        let snapshot: Vec<(ConnectionId, mpsc::Sender<PushFrame>)> = {
            let state = self.state.lock();
            match state.subscribers_by_topic.get(topic) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.connections.get(id).map(|e| (*id, e.sender.clone())))
                    .collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            let frame = PushFrame::Message(message.clone());
            match tokio::time::timeout(SEND_DEADLINE, sender.send(frame)).await {
                Ok(Ok(())) => {}
                _ => {
                    dead.push(id);
                    self.dropped_sends.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if !dead.is_empty() {
            let mut state = self.state.lock();
            for id in dead {
                if let Some(entry) = state.connections.remove(&id) {
                    for t in entry.topics {
                        if let Some(subs) = state.subscribers_by_topic.get_mut(&t) {
                            subs.remove(&id);
                        }
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        let state = self.state.lock();
        ConnectionStats {
            active_connections: state.connections.len(),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
        }
    }
}
