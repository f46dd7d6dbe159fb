use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::Cache;
use crate::permission::Permission;
use crate::types::UserId;

/// Default entry lifetime: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// In-memory TTL cache for permission state.
///
/// Entries expire after a fixed TTL and are discarded on access once
/// expired; [`MemoryCache::sweep_expired`] removes them eagerly and can be
/// driven by [`MemoryCache::spawn_sweeper`]. Never persisted.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheState>>,
    ttl: Duration,
}

#[derive(Debug, Default)]
struct CacheState {
    permissions: HashMap<UserId, Entry<Vec<Permission>>>,
    decisions: HashMap<(UserId, Permission), Entry<bool>>,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

/// Handle to a background sweep task; dropping it leaves the task running.
#[derive(Debug)]
pub struct SweeperHandle {
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweep task.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Creates a cache with the default five-minute TTL.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            ttl: DEFAULT_TTL,
        }
    }

    /// Overrides the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn is_expired<T>(entry: &Entry<T>, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) > ttl
    }

    /// Removes every expired entry; returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock().expect("poisoned lock");
        let before = guard.permissions.len() + guard.decisions.len();
        guard
            .permissions
            .retain(|_, entry| !Self::is_expired(entry, self.ttl, now));
        guard
            .decisions
            .retain(|_, entry| !Self::is_expired(entry, self.ttl, now));
        let swept = before - (guard.permissions.len() + guard.decisions.len());
        if swept > 0 {
            tracing::debug!(swept, "permission cache sweep");
        }
        swept
    }

    /// Spawns a periodic sweep task on the current tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep_expired();
            }
        });
        SweeperHandle { task }
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("poisoned lock");
        guard.permissions.len() + guard.decisions.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_permissions(&self, user: &UserId) -> Option<Vec<Permission>> {
        let now = Instant::now();
        let mut guard = self.inner.lock().expect("poisoned lock");
        match guard.permissions.get(user) {
            Some(entry) if Self::is_expired(entry, self.ttl, now) => {
                guard.permissions.remove(user);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn set_permissions(&self, user: &UserId, perms: Vec<Permission>) {
        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.permissions.insert(
            user.clone(),
            Entry {
                value: perms,
                stored_at: Instant::now(),
            },
        );
    }

    async fn get_decision(&self, user: &UserId, permission: &Permission) -> Option<bool> {
        let key = (user.clone(), permission.clone());
        let now = Instant::now();
        let mut guard = self.inner.lock().expect("poisoned lock");
        match guard.decisions.get(&key) {
            Some(entry) if Self::is_expired(entry, self.ttl, now) => {
                guard.decisions.remove(&key);
                None
            }
            Some(entry) => Some(entry.value),
            None => None,
        }
    }

    async fn set_decision(&self, user: &UserId, permission: &Permission, allowed: bool) {
        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.decisions.insert(
            (user.clone(), permission.clone()),
            Entry {
                value: allowed,
                stored_at: Instant::now(),
            },
        );
    }

    async fn invalidate_user(&self, user: &UserId) {
        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.permissions.remove(user);
        guard.decisions.retain(|(owner, _), _| owner != user);
        tracing::debug!(user = %user, "permission cache invalidated");
    }

    async fn invalidate_all(&self) {
        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.permissions.clear();
        guard.decisions.clear();
        tracing::debug!("permission cache cleared");
    }
}
