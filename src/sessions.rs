//! In-memory chat sessions, one per participant.
//!
//! A session pairs the participant with their agent session id and a copy of
//! the transcript. Sessions are bounded in number and expire after a period of
//! inactivity; anything evicted is rebuilt from the persisted documents on the
//! next request.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::domain::ConversationEntry;

#[derive(Clone, Debug)]
pub struct ChatSession {
  pub agent_session_id: String,
  pub history: Vec<ConversationEntry>,
  last_used: Instant,
}

impl ChatSession {
  pub fn new(agent_session_id: String, history: Vec<ConversationEntry>) -> Self {
    Self { agent_session_id, history, last_used: Instant::now() }
  }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
  /// Live session for `participant`, refreshing its idle timer.
  async fn get(&self, participant: &str) -> Option<ChatSession>;
  /// Insert or replace, evicting stale or least-recently-used sessions to make room.
  async fn create(&self, participant: &str, session: ChatSession);
  async fn evict(&self, participant: &str) -> Option<ChatSession>;
  /// Append to the cached transcript; no-op when the session is not cached.
  async fn append(&self, participant: &str, entry: ConversationEntry);
  async fn clear(&self);
  /// Serializes session setup for one participant.
  async fn lock_participant(&self, participant: &str) -> OwnedMutexGuard<()>;
}

pub struct InMemorySessionStore {
  max_sessions: usize,
  idle_ttl: Duration,
  sessions: RwLock<HashMap<String, ChatSession>>,
  setup_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InMemorySessionStore {
  pub fn new(max_sessions: usize, idle_ttl: Duration) -> Self {
    Self {
      max_sessions: max_sessions.max(1),
      idle_ttl,
      sessions: RwLock::new(HashMap::new()),
      setup_locks: Mutex::new(HashMap::new()),
    }
  }

  #[cfg(test)]
  pub async fn len(&self) -> usize {
    self.sessions.read().await.len()
  }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
  async fn get(&self, participant: &str) -> Option<ChatSession> {
    let mut sessions = self.sessions.write().await;
    let expired = sessions.get(participant).map(|s| s.last_used.elapsed() > self.idle_ttl)?;
    if expired {
      sessions.remove(participant);
      debug!(target: "nfr_study", %participant, "Chat session expired");
      return None;
    }
    let s = sessions.get_mut(participant)?;
    s.last_used = Instant::now();
    Some(s.clone())
  }

  async fn create(&self, participant: &str, mut session: ChatSession) {
    let mut sessions = self.sessions.write().await;
    let ttl = self.idle_ttl;
    sessions.retain(|_, s| s.last_used.elapsed() <= ttl);

    while sessions.len() >= self.max_sessions && !sessions.contains_key(participant) {
      let oldest = sessions.iter().min_by_key(|(_, s)| s.last_used).map(|(k, _)| k.clone());
      match oldest {
        Some(k) => {
          sessions.remove(&k);
          debug!(target: "nfr_study", evicted = %k, "Chat session evicted (capacity)");
        }
        None => break,
      }
    }

    session.last_used = Instant::now();
    sessions.insert(participant.to_string(), session);
  }

  async fn evict(&self, participant: &str) -> Option<ChatSession> {
    self.sessions.write().await.remove(participant)
  }

  async fn append(&self, participant: &str, entry: ConversationEntry) {
    if let Some(s) = self.sessions.write().await.get_mut(participant) {
      s.history.push(entry);
      s.last_used = Instant::now();
    }
  }

  /// Drops cached sessions only; setup locks still held are pruned by
  /// `lock_participant` once released.
  async fn clear(&self) {
    self.sessions.write().await.clear();
  }

  async fn lock_participant(&self, participant: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.setup_locks.lock().await;
      // Drop locks nobody is holding or waiting on.
      locks.retain(|_, l| Arc::strong_count(l) > 1);
      locks.entry(participant.to_string()).or_default().clone()
    };
    lock.lock_owned().await
  }
}
