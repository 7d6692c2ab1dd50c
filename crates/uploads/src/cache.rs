//! Idle-evicting registry of open upload sessions.

use crate::session::{UploadId, UploadSession};
use crate::sweeper::Sweeper;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct SessionSlot {
    session: Arc<Mutex<UploadSession>>,
    last_access: StdMutex<Instant>,
}

/// Concurrent session registry keyed by upload ID.
///
/// Sessions expire after sitting idle for the configured timeout. Expiry is
/// checked lazily on lookup and eagerly by the periodic sweep, so a session
/// is unreachable the moment its deadline passes even if the sweep has not
/// run yet. Whichever path removes a session closes it exactly once; the
/// session's own `closed` flag absorbs races between the two.
pub struct SessionCache {
    sessions: DashMap<UploadId, SessionSlot>,
    idle_timeout: Duration,
    sweeper: Sweeper,
}

impl SessionCache {
    pub fn new(idle_timeout: Duration, sweeper: Sweeper) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            sweeper,
        }
    }

    /// Register a session and return its ID.
    pub fn insert(&self, session: UploadSession) -> UploadId {
        let id = session.id();
        self.sessions.insert(
            id,
            SessionSlot {
                session: Arc::new(Mutex::new(session)),
                last_access: StdMutex::new(Instant::now()),
            },
        );
        id
    }

    /// Look up a live session, refreshing its idle deadline.
    ///
    /// An expired session is evicted on the spot and reported as absent.
    pub fn get(&self, id: UploadId) -> Option<Arc<Mutex<UploadSession>>> {
        let expired = {
            let slot = self.sessions.get(&id)?;
            let now = Instant::now();
            let mut last = slot
                .last_access
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if now.duration_since(*last) > self.idle_timeout {
                true
            } else {
                *last = now;
                return Some(slot.session.clone());
            }
        };
        if expired {
            tracing::info!(upload_id = %id, "evicting idle upload session on access");
            self.remove(id);
        }
        None
    }

    /// Remove a session, closing it if present. Returns whether it existed.
    pub fn remove(&self, id: UploadId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, slot)) => {
                self.close_slot(slot);
                true
            }
            None => false,
        }
    }

    /// Evict every session past its idle deadline. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<UploadId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let last = *entry
                    .value()
                    .last_access
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                now.duration_since(last) > self.idle_timeout
            })
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in expired {
            // Re-check under the removal so a just-refreshed session survives.
            let removed = self.sessions.remove_if(&id, |_, slot| {
                let last = *slot
                    .last_access
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                now.duration_since(last) > self.idle_timeout
            });
            if let Some((_, slot)) = removed {
                self.close_slot(slot);
                evicted += 1;
            }
        }
        evicted
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn close_slot(&self, slot: SessionSlot) {
        if let Ok(mut session) = slot.session.try_lock() {
            session.close(&self.sweeper);
            return;
        }
        // A request still holds the session; close it as soon as the
        // lock frees up.
        let sweeper = self.sweeper.clone();
        let session = slot.session;
        tokio::spawn(async move {
            session.lock().await.close(&sweeper);
        });
    }
}

/// Spawn the periodic idle-session sweep.
pub fn spawn_sweep_task(cache: Arc<SessionCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = cache.sweep();
            if evicted > 0 {
                tracing::info!(evicted, remaining = cache.len(), "evicted idle upload sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache_with(idle: Duration) -> (SessionCache, tempfile::TempDir, JoinHandle<()>) {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, handle) = Sweeper::spawn(8);
        (SessionCache::new(idle, sweeper), dir, handle)
    }

    #[tokio::test]
    async fn insert_then_get_returns_same_session() {
        let (cache, dir, _handle) = cache_with(Duration::from_secs(60)).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);

        let found = cache.get(id).expect("session should be live");
        assert_eq!(found.lock().await.id(), id);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_absent() {
        let (cache, _dir, _handle) = cache_with(Duration::from_secs(60)).await;
        assert!(cache.get(UploadId::new()).is_none());
        assert!(!cache.remove(UploadId::new()));
    }

    #[tokio::test]
    async fn expired_session_is_evicted_on_access() {
        let (cache, dir, _handle) = cache_with(Duration::ZERO).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get(id).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn sweep_closes_and_removes_scratch() {
        let (cache, dir, handle) = cache_with(Duration::ZERO).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);
        let scratch_dir = dir.path().join(id.to_string());
        assert!(scratch_dir.exists());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());

        // Dropping the cache drops the last sweeper clone; the worker then
        // drains the queue and exits.
        drop(cache);
        handle.await.unwrap();
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn fresh_session_survives_sweep() {
        let (cache, dir, _handle) = cache_with(Duration::from_secs(60)).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);

        assert_eq!(cache.sweep(), 0);
        assert!(cache.get(id).is_some());
    }

    #[tokio::test]
    async fn remove_while_session_is_locked_still_closes() {
        let (cache, dir, handle) = cache_with(Duration::from_secs(60)).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);
        let scratch_dir = dir.path().join(id.to_string());

        // A request holds the session lock while the removal happens.
        let held = cache.get(id).unwrap();
        let guard = held.lock().await;
        assert!(cache.remove(id));
        assert!(cache.get(id).is_none());

        drop(guard);
        drop(held);
        drop(cache);
        handle.await.unwrap();
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (cache, dir, _handle) = cache_with(Duration::from_secs(60)).await;
        let session = UploadSession::create(dir.path()).await.unwrap();
        let id = cache.insert(session);

        assert!(cache.remove(id));
        assert!(!cache.remove(id));
        assert!(cache.get(id).is_none());
    }
}
