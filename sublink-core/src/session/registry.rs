//! Registry of pending and active sessions
//!
//! Every read and write goes through one `RwLock`. Callers never get a
//! reference into the maps: reads hand out clones or values computed by a
//! closure under the lock, so nothing holds the lock across network I/O.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use super::state::Session;
use crate::error::SessionError;

#[derive(Default)]
struct Maps {
    active: HashMap<String, Session>,
    pending: HashMap<String, Session>,
    /// Ids claimed by a setup or teardown that has no map entry yet (or any more)
    reserved: HashSet<String>,
}

impl Maps {
    fn holds(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.pending.contains_key(id)
    }
}

/// Pending and active sessions indexed by id
#[derive(Default)]
pub struct SessionRegistry {
    maps: RwLock<Maps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any entry or reservation for `id`
    pub async fn exists(&self, id: &str) -> bool {
        let maps = self.maps.read().await;
        maps.holds(id) || maps.reserved.contains(id)
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.maps.read().await.active.contains_key(id)
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.maps.read().await.pending.contains_key(id)
    }

    /// Copy of the session under `id`, active or pending
    pub async fn get(&self, id: &str) -> Option<Session> {
        let maps = self.maps.read().await;
        maps.active.get(id).or_else(|| maps.pending.get(id)).cloned()
    }

    pub async fn get_active(&self, id: &str) -> Option<Session> {
        self.maps.read().await.active.get(id).cloned()
    }

    /// Snapshot of every active session
    pub async fn list_active(&self) -> Vec<Session> {
        self.maps.read().await.active.values().cloned().collect()
    }

    /// Map every active session to a plain value under the read lock
    pub async fn snapshot_active<T>(&self, f: impl Fn(&Session) -> T) -> Vec<T> {
        self.maps.read().await.active.values().map(f).collect()
    }

    pub async fn active_count(&self) -> usize {
        self.maps.read().await.active.len()
    }

    /// Every id the registry knows about, including reservations
    pub async fn tracked_ids(&self) -> HashSet<String> {
        let maps = self.maps.read().await;
        maps.active
            .keys()
            .chain(maps.pending.keys())
            .chain(maps.reserved.iter())
            .cloned()
            .collect()
    }

    /// Claim `id` for a setup that will register it later
    pub async fn reserve(&self, id: &str) -> Result<(), SessionError> {
        let mut maps = self.maps.write().await;
        if maps.active.contains_key(id) {
            return Err(SessionError::DuplicateActive(id.to_string()));
        }
        if maps.pending.contains_key(id) || maps.reserved.contains(id) {
            return Err(SessionError::DuplicatePending(id.to_string()));
        }
        maps.reserved.insert(id.to_string());
        Ok(())
    }

    /// Drop a reservation without registering anything
    pub async fn release(&self, id: &str) {
        self.maps.write().await.reserved.remove(id);
    }

    /// Register a session that is mid-pairing
    pub async fn register_pending(&self, session: Session) -> Result<(), SessionError> {
        let mut maps = self.maps.write().await;
        if maps.holds(session.id()) {
            return Err(SessionError::AlreadyExists(session.id().to_string()));
        }
        maps.reserved.remove(session.id());
        maps.pending.insert(session.id().to_string(), session);
        Ok(())
    }

    /// Register a session restored from persisted credentials
    pub async fn register_active(&self, session: Session) -> Result<(), SessionError> {
        let mut maps = self.maps.write().await;
        if maps.holds(session.id()) {
            return Err(SessionError::AlreadyExists(session.id().to_string()));
        }
        maps.reserved.remove(session.id());
        maps.active.insert(session.id().to_string(), session);
        Ok(())
    }

    /// Move `id` from pending to active, returning the promoted session
    pub async fn promote(&self, id: &str) -> Option<Session> {
        let mut maps = self.maps.write().await;
        let mut session = maps.pending.remove(id)?;
        session.set_connected(true);
        maps.active.insert(id.to_string(), session.clone());
        Some(session)
    }

    /// Take `id` out of whichever map holds it
    ///
    /// The id stays reserved so nothing can reuse it while the caller tears
    /// the session down; call [`SessionRegistry::release`] afterwards.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut maps = self.maps.write().await;
        let session = maps.active.remove(id).or_else(|| maps.pending.remove(id))?;
        maps.reserved.insert(id.to_string());
        Some(session)
    }

    /// Like [`SessionRegistry::remove`], but only if `id` is still pending
    pub async fn take_pending(&self, id: &str) -> Option<Session> {
        let mut maps = self.maps.write().await;
        let session = maps.pending.remove(id)?;
        maps.reserved.insert(id.to_string());
        Some(session)
    }

    /// Like [`SessionRegistry::remove`], but only an active session from `epoch`
    pub async fn remove_current(&self, id: &str, epoch: u64) -> Option<Session> {
        let mut maps = self.maps.write().await;
        if maps.active.get(id)?.epoch() != epoch {
            return None;
        }
        let session = maps.active.remove(id)?;
        maps.reserved.insert(id.to_string());
        Some(session)
    }

    /// Empty both maps, returning everything that was registered
    ///
    /// Unlike [`SessionRegistry::remove`] this leaves no reservations behind.
    pub async fn drain(&self) -> Vec<Session> {
        let mut maps = self.maps.write().await;
        let mut sessions: Vec<Session> = maps.active.drain().map(|(_, s)| s).collect();
        sessions.extend(maps.pending.drain().map(|(_, s)| s));
        sessions
    }

    /// Run `f` against the live active entry for `id`
    pub async fn with_active<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut maps = self.maps.write().await;
        maps.active.get_mut(id).map(f)
    }

    /// [`SessionRegistry::with_active`], skipping a session that replaced `epoch`
    pub async fn with_current<R>(
        &self,
        id: &str,
        epoch: u64,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut maps = self.maps.write().await;
        maps.active
            .get_mut(id)
            .filter(|session| session.epoch() == epoch)
            .map(f)
    }

    /// Whether the active entry for `id` is still the one from `epoch`
    pub async fn is_current(&self, id: &str, epoch: u64) -> bool {
        self.maps
            .read()
            .await
            .active
            .get(id)
            .is_some_and(|session| session.epoch() == epoch)
    }
}
