//! Registry implementation
//!
//! All maps sit behind one mutex so publisher registration, idle-player
//! bookkeeping and session removal are serialized against each other.
//! Critical sections are plain map operations and never await.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::RegistryError;
use crate::session::{SessionId, SessionShared};

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Arc<SessionShared>>,
    publishers: HashMap<String, SessionId>,
    idle: HashSet<SessionId>,
}

/// Sessions, publishers by path, and players waiting for a publisher
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
    next_session_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_session_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a process-unique session id
    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_session(&self, session: Arc<SessionShared>) {
        let id = session.id();
        self.lock().sessions.insert(id, session);
        tracing::trace!(session_id = id, "Session registered");
    }

    /// Remove a session and any idle entry it left behind
    pub fn unregister_session(&self, id: SessionId) -> Option<Arc<SessionShared>> {
        let mut inner = self.lock();
        inner.idle.remove(&id);
        inner.sessions.remove(&id)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<SessionShared>> {
        self.lock().sessions.get(&id).cloned()
    }

    /// Sessions for `ids`, skipping any that are gone
    pub fn sessions<'a, I>(&self, ids: I) -> Vec<Arc<SessionShared>>
    where
        I: IntoIterator<Item = &'a SessionId>,
    {
        let inner = self.lock();
        ids.into_iter()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    /// Claim `path` for `id`
    ///
    /// Fails if any session already publishes the path.
    pub fn register_publisher(&self, path: &str, id: SessionId) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if inner.publishers.contains_key(path) {
            return Err(RegistryError::PathAlreadyPublished(path.to_string()));
        }
        inner.publishers.insert(path.to_string(), id);
        tracing::info!(path = %path, session_id = id, "Publisher registered");
        Ok(())
    }

    /// Release `path` if `id` still owns it
    pub fn unregister_publisher(&self, path: &str, id: SessionId) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        match inner.publishers.get(path) {
            Some(owner) if *owner == id => {
                inner.publishers.remove(path);
                tracing::info!(path = %path, session_id = id, "Publisher unregistered");
                Ok(())
            }
            Some(owner) => {
                tracing::warn!(
                    path = %path,
                    expected = owner,
                    actual = id,
                    "Publisher unregister mismatch"
                );
                Err(RegistryError::PublisherMismatch)
            }
            None => Err(RegistryError::PublisherMismatch),
        }
    }

    pub fn publisher_id(&self, path: &str) -> Option<SessionId> {
        self.lock().publishers.get(path).copied()
    }

    /// The session publishing `path`
    pub fn publisher(&self, path: &str) -> Option<Arc<SessionShared>> {
        let inner = self.lock();
        let id = inner.publishers.get(path)?;
        inner.sessions.get(id).cloned()
    }

    pub fn has_publisher(&self, path: &str) -> bool {
        self.lock().publishers.contains_key(path)
    }

    pub fn add_idle(&self, id: SessionId) {
        self.lock().idle.insert(id);
    }

    /// True if `id` was waiting
    pub fn remove_idle(&self, id: SessionId) -> bool {
        self.lock().idle.remove(&id)
    }

    pub fn is_idle(&self, id: SessionId) -> bool {
        self.lock().idle.contains(&id)
    }

    /// Snapshot of the waiting players
    pub fn idle_players(&self) -> Vec<Arc<SessionShared>> {
        let inner = self.lock();
        inner
            .idle
            .iter()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn publisher_count(&self) -> usize {
        self.lock().publishers.len()
    }

    /// Published paths, sorted
    pub fn published_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().publishers.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
