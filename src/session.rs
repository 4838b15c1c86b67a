//! Per-user chat sessions held in memory.
//!
//! The store is bounded: once `capacity` sessions exist, registering another
//! evicts the least recently active one. Evicted sessions only lose their
//! in-memory conversation; the SQLite log keeps every exchange.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::DEFAULT_MAX_SESSIONS;
use crate::conversation::{Conversation, Exchange};
use crate::error::{ChatError, Result};
use crate::llm::LlmProvider;

#[derive(Debug)]
struct Session {
    conversation: Conversation,
    // Set when the user supplied their own API key in the UI.
    provider: Option<LlmProvider>,
    // Bumped by `clear`; a turn that started earlier is not recorded.
    generation: u64,
    turn: Arc<Mutex<()>>,
    last_active: u64,
}

impl Session {
    fn new(tick: u64) -> Self {
        Self {
            conversation: Conversation::default(),
            provider: None,
            generation: 0,
            turn: Arc::new(Mutex::new(())),
            last_active: tick,
        }
    }
}

/// Exclusive hold on one session's turn. Other turns of the same session wait
/// until it is dropped, so each prompt sees the previous reply.
#[derive(Debug)]
pub struct Turn {
    pub history: Vec<Exchange>,
    generation: u64,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
    clock: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            clock: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, map: &mut HashMap<Uuid, Session>, id: Uuid) {
        if map.len() >= self.capacity {
            let oldest = map.iter().min_by_key(|(_, s)| s.last_active).map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                map.remove(&oldest);
                info!(session = %oldest, "least recently active session evicted");
            }
        }
        map.insert(id, Session::new(self.tick()));
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(&mut *self.inner.write().await, id);
        info!(session = %id, "session created");
        id
    }

    /// Reuse a known session, or register the given id (or a fresh one).
    /// Unknown ids are accepted so a browser can resume after a server restart.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> Uuid {
        match id {
            Some(id) => {
                let mut map = self.inner.write().await;
                match map.get_mut(&id) {
                    Some(session) => session.last_active = self.tick(),
                    None => {
                        self.insert(&mut map, id);
                        info!(session = %id, "session registered");
                    }
                }
                id
            }
            None => self.create().await,
        }
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of the session's exchanges, oldest first.
    pub async fn history(&self, id: Uuid) -> Result<Vec<Exchange>> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|s| s.conversation.exchanges().to_vec())
            .ok_or(ChatError::SessionNotFound(id))
    }

    /// Wait for any running turn of this session, then snapshot its history.
    pub async fn begin_turn(&self, id: Uuid) -> Result<Turn> {
        let lock = self
            .inner
            .read()
            .await
            .get(&id)
            .map(|s| s.turn.clone())
            .ok_or(ChatError::SessionNotFound(id))?;
        let guard = lock.lock_owned().await;

        let map = self.inner.read().await;
        let session = map.get(&id).ok_or(ChatError::SessionNotFound(id))?;
        Ok(Turn {
            history: session.conversation.exchanges().to_vec(),
            generation: session.generation,
            _guard: guard,
        })
    }

    /// Record the reply of `turn` unless the session was cleared or evicted
    /// meanwhile. Returns whether the exchange was added.
    pub async fn finish_turn(&self, id: Uuid, turn: &Turn, exchange: Exchange) -> bool {
        let mut map = self.inner.write().await;
        match map.get_mut(&id) {
            Some(session) if session.generation == turn.generation => {
                session.conversation.push(exchange);
                session.last_active = self.tick();
                true
            }
            _ => {
                debug!(session = %id, "session cleared during turn; reply not kept in memory");
                false
            }
        }
    }

    pub async fn record(&self, id: Uuid, exchange: Exchange) -> Result<()> {
        let mut map = self.inner.write().await;
        let session = map.get_mut(&id).ok_or(ChatError::SessionNotFound(id))?;
        session.conversation.push(exchange);
        session.last_active = self.tick();
        Ok(())
    }

    pub async fn clear(&self, id: Uuid) -> Result<()> {
        let mut map = self.inner.write().await;
        let session = map.get_mut(&id).ok_or(ChatError::SessionNotFound(id))?;
        session.conversation.clear();
        session.generation += 1;
        info!(session = %id, "conversation cleared");
        Ok(())
    }

    pub async fn export_text(&self, id: Uuid) -> Result<String> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|s| s.conversation.export_text())
            .ok_or(ChatError::SessionNotFound(id))
    }

    pub async fn set_provider(&self, id: Uuid, provider: LlmProvider) -> Result<()> {
        let mut map = self.inner.write().await;
        let session = map.get_mut(&id).ok_or(ChatError::SessionNotFound(id))?;
        session.provider = Some(provider);
        session.last_active = self.tick();
        Ok(())
    }

    pub async fn provider(&self, id: Uuid) -> Option<LlmProvider> {
        self.inner.read().await.get(&id).and_then(|s| s.provider.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::echo::EchoProvider;

    #[tokio::test]
    async fn create_and_record() {
        let store = SessionStore::new();
        let id = store.create().await;
        store.record(id, Exchange::new("hi", "hello")).await.unwrap();
        let history = store.history(id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].assistant, "hello");
    }

    #[tokio::test]
    async fn unknown_session_errors() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.history(id).await, Err(ChatError::SessionNotFound(_))));
        assert!(store.clear(id).await.is_err());
        assert!(store.record(id, Exchange::new("a", "b")).await.is_err());
    }

    #[tokio::test]
    async fn get_or_create_registers_given_id() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get_or_create(Some(id)).await, id);
        assert!(store.contains(id).await);
        let fresh = store.get_or_create(None).await;
        assert_ne!(fresh, id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn clear_keeps_session() {
        let store = SessionStore::new();
        let id = store.create().await;
        store.record(id, Exchange::new("hi", "hello")).await.unwrap();
        store.clear(id).await.unwrap();
        assert!(store.history(id).await.unwrap().is_empty());
        assert!(store.contains(id).await);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.create().await;
        let b = store.create().await;
        store.record(a, Exchange::new("for a", "ok")).await.unwrap();
        store.set_provider(a, LlmProvider::Echo(EchoProvider)).await.unwrap();
        assert!(store.history(b).await.unwrap().is_empty());
        assert!(store.provider(a).await.is_some());
        assert!(store.provider(b).await.is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_active() {
        let store = SessionStore::with_capacity(2);
        let a = store.create().await;
        let b = store.create().await;
        store.record(a, Exchange::new("keep", "me")).await.unwrap();

        let c = store.create().await;
        assert_eq!(store.len().await, 2);
        assert!(store.contains(a).await);
        assert!(!store.contains(b).await);
        assert!(store.contains(c).await);
    }

    #[tokio::test]
    async fn clear_during_turn_drops_reply() {
        let store = SessionStore::new();
        let id = store.create().await;
        let turn = store.begin_turn(id).await.unwrap();
        store.clear(id).await.unwrap();
        assert!(!store.finish_turn(id, &turn, Exchange::new("late", "reply")).await);
        assert!(store.history(id).await.unwrap().is_empty());

        drop(turn);
        let turn = store.begin_turn(id).await.unwrap();
        assert!(store.finish_turn(id, &turn, Exchange::new("next", "reply")).await);
        assert_eq!(store.history(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn turns_of_one_session_are_serialized() {
        let store = SessionStore::new();
        let id = store.create().await;
        let first = store.begin_turn(id).await.unwrap();

        let waiting = {
            let store = store.clone();
            tokio::spawn(async move { store.begin_turn(id).await.unwrap().history.len() })
        };
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        store.finish_turn(id, &first, Exchange::new("q", "a")).await;
        drop(first);
        assert_eq!(waiting.await.unwrap(), 1);
    }
}
