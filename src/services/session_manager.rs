// src/services/session_manager.rs
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::message::Turn;

pub const SESSION_COOKIE_NAME: &str = "rag_session_id";

#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub last_active: Instant,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), turns: Vec::new(), last_active: Instant::now() }
    }
}

/// Server-side conversation memory, one history per browser session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    // Create a fresh session and return its id.
    pub async fn create_session(&self) -> String {
        let id = Self::new_session_id();
        let mut guard = self.inner.write().await;
        guard.insert(id.clone(), Session::new(id.clone()));
        id
    }

    // Ensure there's a session with this id.
    pub async fn ensure_session(&self, id: &str) -> String {
        {
            let guard = self.inner.read().await;
            if guard.contains_key(id) {
                return id.to_string();
            }
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id));
        id.to_string()
    }

    /// Copy of the session's turns; empty for unknown sessions.
    pub async fn get_history(&self, session_id: &str) -> Vec<Turn> {
        let guard = self.inner.read().await;
        guard
            .get(session_id)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Append a turn and touch `last_active`. Returns the new history length.
    pub async fn append_turn(&self, session_id: &str, turn: Turn) -> usize {
        let mut guard = self.inner.write().await;
        let entry = guard
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id));
        entry.turns.push(turn);
        entry.last_active = Instant::now();
        entry.turns.len()
    }

    /// Overwrite the stored history, e.g. with one the client supplied.
    pub async fn replace_history(&self, session_id: &str, turns: Vec<Turn>) {
        let mut guard = self.inner.write().await;
        let entry = guard
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id));
        entry.turns = turns;
        entry.last_active = Instant::now();
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.remove(session_id).is_some()
    }

    /// Remove sessions idle longer than ttl. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.inner.write().await;
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, s| now.duration_since(s.last_active) < self.ttl);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Periodically drop idle sessions for the lifetime of the process.
    pub fn spawn_purge_task(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let removed = manager.purge_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "purged idle sessions");
                }
            }
        })
    }
}
