use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::session::{Session, TurnRecord};

/// Process-lifetime session store.
///
/// Each session sits behind its own mutex; callers that mutate a session hold
/// the guard for the whole operation, which serializes turns on the same id
/// while leaving other sessions free to run.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session, creating it first if needed.
    pub async fn lock_or_create(&self, id: &str) -> OwnedMutexGuard<Session> {
        loop {
            let guard = self.slot_or_create(id).await.lock_owned().await;
            // the slot may have been removed while we waited on it
            if self.is_current(id, &guard).await {
                return guard;
            }
        }
    }

    pub async fn lock(&self, id: &str) -> Option<OwnedMutexGuard<Session>> {
        loop {
            let slot = self.sessions.read().await.get(id).cloned()?;
            let guard = slot.lock_owned().await;
            if self.is_current(id, &guard).await {
                return Some(guard);
            }
        }
    }

    pub async fn history(&self, id: &str) -> Vec<TurnRecord> {
        match self.lock(id).await {
            Some(session) => session.turns.clone(),
            None => Vec::new(),
        }
    }

    /// Remove the session. Returns true if it existed.
    ///
    /// Waits for the session lock, so a turn already running commits first.
    pub async fn clear(&self, id: &str) -> bool {
        match self.lock(id).await {
            Some(guard) => {
                self.remove_slot(&guard).await;
                true
            }
            None => false,
        }
    }

    /// Drop a session that never committed a turn.
    pub async fn discard_if_fresh(&self, guard: OwnedMutexGuard<Session>) {
        if guard.is_fresh() {
            tracing::debug!(session_id = %guard.id, "discarding uncommitted session");
            self.remove_slot(&guard).await;
        }
    }

    async fn slot_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(slot) = self.sessions.read().await.get(id).cloned() {
            return slot;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = id, "creating session");
                Arc::new(Mutex::new(Session::new(id.to_string())))
            })
            .clone()
    }

    async fn is_current(&self, id: &str, guard: &OwnedMutexGuard<Session>) -> bool {
        let held = OwnedMutexGuard::mutex(guard);
        self.sessions.read().await.get(id).is_some_and(|slot| Arc::ptr_eq(slot, held))
    }

    /// Remove the map entry if it is still the slot `guard` locks.
    async fn remove_slot(&self, guard: &OwnedMutexGuard<Session>) {
        let held = OwnedMutexGuard::mutex(guard);
        let mut sessions = self.sessions.write().await;
        if sessions.get(&guard.id).is_some_and(|slot| Arc::ptr_eq(slot, held)) {
            sessions.remove(&guard.id);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
