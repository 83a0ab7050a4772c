//! Session store: one conversation history per client, single writer per session.
//!
//! A turn holds its session's history lock from the chat call until the reply is
//! built, so double-submits from one browser queue up instead of racing.

use crate::history::ConversationHistory;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::info;

/// Session used when the client does not identify itself.
pub const DEFAULT_SESSION_ID: &str = "default";

pub struct Session {
    pub id: String,
    history: AsyncMutex<ConversationHistory>,
    last_activity: Mutex<Instant>,
}

impl Session {
    fn new(id: impl Into<String>, history: ConversationHistory) -> Self {
        Self {
            id: id.into(),
            history: AsyncMutex::new(history),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Exclusive access to the history for the duration of a turn.
    pub async fn lock_history(&self) -> MutexGuard<'_, ConversationHistory> {
        self.touch();
        self.history.lock().await
    }

    pub fn touch(&self) {
        if let Ok(mut t) = self.last_activity.lock() {
            *t = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

/// Sessions keyed by client identifier, each seeded with the persona prompt.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    system_prompt: String,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let id = if id.trim().is_empty() { DEFAULT_SESSION_ID } else { id.trim() };
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                info!("Created session: {}", id);
                Arc::new(Session::new(id, ConversationHistory::with_persona(self.system_prompt.clone())))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle for longer than `timeout`. Returns how many were removed.
    pub fn evict_idle(&self, timeout: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, session| {
            let keep = session.idle_for() <= timeout;
            if !keep {
                info!("Expired session: {}", id);
            }
            keep
        });
        before - self.sessions.len()
    }
}
