//! Subscriber handles.

use std::sync::Weak;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::state::QueryState;
use super::{CacheInner, QueryKey, QueryValue};

/// A live view of one cache entry.
///
/// Counts as a subscriber for eviction purposes until dropped. State changes
/// may be coalesced: a slow subscriber always sees the latest state, not
/// necessarily every intermediate one.
pub struct Subscription<K: QueryKey, V: QueryValue> {
    key: K,
    entry_id: u64,
    rx: watch::Receiver<QueryState<V>>,
    cache: Weak<CacheInner<K, V>>,
}

impl<K: QueryKey, V: QueryValue> Subscription<K, V> {
    pub(super) const fn new(
        key: K,
        entry_id: u64,
        rx: watch::Receiver<QueryState<V>>,
        cache: Weak<CacheInner<K, V>>,
    ) -> Self {
        Self {
            key,
            entry_id,
            rx,
            cache,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The entry's state right now.
    #[must_use]
    pub fn current(&self) -> QueryState<V> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state transition.
    ///
    /// Returns `None` once the entry is gone (the cache was cleared).
    pub async fn changed(&mut self) -> Option<QueryState<V>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl<K: QueryKey, V: QueryValue> Drop for Subscription<K, V> {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.release(&self.key, self.entry_id);
        }
    }
}

/// Handle for a callback registered with [`QueryCache::watch`](super::QueryCache::watch).
///
/// Dropping the handle stops delivery and releases the subscription.
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub(super) const fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Stop delivery and wait until the subscription has been released.
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
