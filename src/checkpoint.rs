use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{ChatError, Result};
use crate::message::Message;
use crate::state::ConversationState;

/// Session-keyed storage for conversation state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the session's state, creating an empty one on first use.
    async fn get_or_create(&self, session_id: &str) -> Result<ConversationState>;
    /// Read-only snapshot; `None` when the session has never been used.
    async fn get_state(&self, session_id: &str) -> Result<Option<ConversationState>>;
    async fn append(&self, session_id: &str, message: Message) -> Result<()>;
}

struct Slot {
    state: ConversationState,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    slots: HashMap<String, Slot>,
    clock: u64,
}

impl Sessions {
    fn touch(&mut self, session_id: &str, capacity: Option<usize>) -> &mut Slot {
        self.clock += 1;
        let now = self.clock;
        if !self.slots.contains_key(session_id) {
            if let Some(cap) = capacity {
                while self.slots.len() >= cap.max(1) {
                    self.evict_oldest();
                }
            }
            tracing::debug!(session = session_id, "creating session");
        }
        let slot = self
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| Slot {
                state: ConversationState::default(),
                last_used: now,
            });
        slot.last_used = now;
        slot
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            tracing::info!(session = %id, "evicting least recently used session");
            self.slots.remove(&id);
        }
    }
}

/// Process-local checkpoint store. Sessions live until the process exits or,
/// when a capacity is set, until they become the least recently used one.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    sessions: Mutex<Sessions>,
    capacity: Option<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            capacity,
        }
    }

    pub fn session_count(&self) -> usize {
        self.lock().map(|s| s.slots.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Sessions>> {
        self.sessions
            .lock()
            .map_err(|_| ChatError::Storage("checkpoint store lock poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_or_create(&self, session_id: &str) -> Result<ConversationState> {
        let mut sessions = self.lock()?;
        Ok(sessions.touch(session_id, self.capacity).state.clone())
    }

    async fn get_state(&self, session_id: &str) -> Result<Option<ConversationState>> {
        let sessions = self.lock()?;
        Ok(sessions.slots.get(session_id).map(|slot| slot.state.clone()))
    }

    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.lock()?;
        sessions.touch(session_id, self.capacity).state.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = MemoryCheckpointStore::new();
        store.append("alpha", Message::user("one")).await.unwrap();
        store.append("beta", Message::user("two")).await.unwrap();
        store.append("alpha", Message::assistant("three")).await.unwrap();

        let alpha = store.get_state("alpha").await.unwrap().unwrap();
        let beta = store.get_state("beta").await.unwrap().unwrap();

        assert_eq!(alpha.len(), 2);
        assert_eq!(beta.len(), 1);
        assert_eq!(beta.messages[0].content, "two");
    }

    #[tokio::test]
    async fn get_state_does_not_create() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get_state("missing").await.unwrap().is_none());
        assert_eq!(store.session_count(), 0);

        let created = store.get_or_create("missing").await.unwrap();
        assert!(created.is_empty());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used_session() {
        let store = MemoryCheckpointStore::with_capacity(Some(2));
        store.append("a", Message::user("a")).await.unwrap();
        store.append("b", Message::user("b")).await.unwrap();
        store.get_or_create("a").await.unwrap();
        store.append("c", Message::user("c")).await.unwrap();

        assert_eq!(store.session_count(), 2);
        assert!(store.get_state("a").await.unwrap().is_some());
        assert!(store.get_state("b").await.unwrap().is_none());
        assert!(store.get_state("c").await.unwrap().is_some());
    }
}
