//! Active-session table shared across all connection actors.
//!
//! Keyed by the protocol session id; at most one entry per id. Connection
//! actors register themselves on accept and deregister on every exit path, so
//! the table always reflects the set of live sockets. Uses the same
//! `Arc<RwLock<HashMap>>` shape as the rest of the shared state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Metadata tracked for one registered session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub correlation_id: String,
    pub conversation_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

/// Concurrent map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted session. Replaces any stale entry with the
    /// same id; the protocol guarantees one live socket per session id.
    pub fn register(&self, session_id: &str, correlation_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                correlation_id: correlation_id.to_string(),
                conversation_id: None,
                accepted_at: Utc::now(),
            },
        );
    }

    /// Record the conversation id learned from `open`.
    pub fn set_conversation(&self, session_id: &str, conversation_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.conversation_id = Some(conversation_id.to_string());
        }
    }

    /// Remove a session on teardown. Returns the entry if one was registered.
    pub fn deregister(&self, session_id: &str) -> Option<SessionEntry> {
        let mut sessions = self.sessions.write().unwrap();
        let removed = sessions.remove(session_id);
        if removed.is_some() {
            info!("Session {} removed from active sessions", session_id);
        }
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().unwrap().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }
}
