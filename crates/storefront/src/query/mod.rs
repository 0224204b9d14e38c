//! Keyed cache of remote query results.
//!
//! # Guarantees
//!
//! - At most one fetch per key is in flight. Concurrent readers of a missing
//!   or stale key share the result of that single fetch.
//! - A fresh entry (fetched within its staleness window) is returned without
//!   calling the fetcher.
//! - A failed attempt is retried once. The second failure is stored as the
//!   entry's error and returned to readers until the key is invalidated.
//! - A failure never replaces the last good value; [`QueryState::data`] keeps
//!   it for views that want to fall back.
//! - No read started after [`QueryCache::invalidate`] returns data from a fetch
//!   that started before it.
//! - Entries without subscribers for longer than
//!   [`QueryOptions::idle_timeout`] are evicted once no fetch is in flight.
//!   The idle clock starts when the entry is created or its last subscriber
//!   leaves; reads do not reset it.
//!
//! Fetches run on spawned tasks, so a reader that gives up (or a subscriber
//! that unsubscribes) does not cancel the fetch; its result is still cached.
//!
//! # Example
//!
//! ```rust,ignore
//! let cache: QueryCache<CacheKey, CacheValue> = QueryCache::new(QueryOptions::default());
//!
//! let value = cache
//!     .read(CacheKey::Books, Duration::from_secs(300), move || {
//!         let client = client.clone();
//!         async move { client.list_books().await.map(CacheValue::Books) }
//!     })
//!     .await?;
//!
//! // After a mutation
//! cache.invalidate(&CacheKey::Cart);
//! cache.refetch_active(&CacheKey::Cart);
//! ```

mod options;
mod state;
mod subscription;

pub use options::QueryOptions;
pub use state::{QueryState, QueryStatus};
pub use subscription::{Subscription, WatchHandle};

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, instrument, warn};

use crate::bookstore::{ApiError, QueryError};

/// Convenience trait for cache key requirements.
pub trait QueryKey: Debug + Clone + Hash + Eq + Send + Sync + 'static {}
impl<K> QueryKey for K where K: Debug + Clone + Hash + Eq + Send + Sync + 'static {}

/// Convenience trait for cached value requirements.
pub trait QueryValue: Send + Sync + 'static {}
impl<V> QueryValue for V where V: Send + Sync + 'static {}

/// Boxed future returned by a fetcher.
pub type FetchFuture<V> = Pin<Box<dyn Future<Output = Result<V, ApiError>> + Send>>;

type Fetcher<V> = Arc<dyn Fn() -> FetchFuture<V> + Send + Sync>;

/// Automatic retries after a failed fetch attempt.
const MAX_RETRIES: u32 = 1;

// =============================================================================
// QueryCache
// =============================================================================

/// Process-wide cache of query results, keyed by `K`.
///
/// Cheap to clone; clones share the same entries.
pub struct QueryCache<K: QueryKey, V: QueryValue> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K: QueryKey, V: QueryValue> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct CacheInner<K: QueryKey, V: QueryValue> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    options: QueryOptions,
    next_id: AtomicU64,
}

struct Entry<V> {
    /// Distinguishes this entry from a later one under the same key.
    id: u64,
    state: watch::Sender<QueryState<V>>,
    fetcher: Option<Fetcher<V>>,
    fetched_at: Option<Instant>,
    stale_time: Duration,
    invalidated: bool,
    /// Bumped by every invalidation.
    generation: u64,
    /// Id of the fetch currently running, if any.
    in_flight: Option<u64>,
    subscribers: usize,
    idle_since: Option<Instant>,
}

enum Lookup<V> {
    Fresh(Arc<V>),
    Stale(Arc<V>),
    Failed(QueryError),
    Miss,
}

impl<V> Entry<V> {
    fn new(id: u64, now: Instant) -> Self {
        let (state, _) = watch::channel(QueryState::idle());
        Self {
            id,
            state,
            fetcher: None,
            fetched_at: None,
            stale_time: Duration::ZERO,
            invalidated: false,
            generation: 0,
            in_flight: None,
            subscribers: 0,
            idle_since: Some(now),
        }
    }

    fn lookup(&self, now: Instant, serve_stale: bool) -> Lookup<V> {
        if self.invalidated {
            return Lookup::Miss;
        }

        let state = self.state.borrow();
        if state.status == QueryStatus::Error
            && self.in_flight.is_none()
            && let Some(error) = &state.error
        {
            return Lookup::Failed(Arc::clone(error));
        }

        let Some(data) = state.data.clone() else {
            return Lookup::Miss;
        };

        let fresh = self
            .fetched_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.stale_time);

        if fresh {
            Lookup::Fresh(data)
        } else if serve_stale {
            Lookup::Stale(data)
        } else {
            Lookup::Miss
        }
    }
}

impl<K: QueryKey, V: QueryValue> QueryCache<K, V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(options: QueryOptions) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                options,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    /// Read `key`, fetching it with `fetch` if it is missing, stale or
    /// invalidated.
    ///
    /// `fetch` is remembered as the key's fetcher so that
    /// [`refetch_active`](Self::refetch_active) can restart it later.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (shared by every reader of the same fetch), or
    /// the stored error of a key whose last fetch failed.
    #[instrument(skip_all, fields(key = ?key))]
    pub async fn read<F, Fut>(&self, key: K, stale_time: Duration, fetch: F) -> Result<Arc<V>, QueryError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let fetcher: Fetcher<V> = Arc::new(move || -> FetchFuture<V> { Box::pin(fetch()) });

        loop {
            let (mut rx, observed) = {
                let mut entries = self.inner.lock();
                let now = Instant::now();
                let entry = self.inner.entry(&mut entries, &key, now);
                entry.stale_time = stale_time;
                entry.fetcher = Some(Arc::clone(&fetcher));

                match entry.lookup(now, self.inner.options.refetch_in_background) {
                    Lookup::Fresh(data) => {
                        debug!("Cache hit");
                        return Ok(data);
                    }
                    Lookup::Failed(error) => {
                        debug!("Returning stored failure");
                        return Err(error);
                    }
                    Lookup::Stale(data) => {
                        if entry.in_flight.is_none() {
                            debug!("Serving stale data, refreshing in background");
                            self.inner.start_fetch(&key, entry);
                        }
                        return Ok(data);
                    }
                    Lookup::Miss => {
                        if entry.in_flight.is_none() {
                            debug!("Cache miss");
                            self.inner.start_fetch(&key, entry);
                        }
                        (entry.state.subscribe(), entry.generation)
                    }
                }
            };

            let settled = rx
                .wait_for(|state| state.status != QueryStatus::Loading)
                .await
                .map(|state| state.clone());

            match settled {
                Ok(state) if state.generation >= observed => {
                    return match (state.status, state.data, state.error) {
                        (QueryStatus::Error, _, Some(error)) => Err(error),
                        (_, Some(data), _) => Ok(data),
                        _ => Err(Arc::new(ApiError::Unexpected(
                            "query settled without a result".to_string(),
                        ))),
                    };
                }
                Ok(_) => debug!("Fetch predates invalidation, reading again"),
                Err(_) => debug!("Entry removed while loading, reading again"),
            }
        }
    }

    /// Current state of `key` without fetching.
    #[must_use]
    pub fn peek(&self, key: &K) -> QueryState<V> {
        self.inner
            .lock()
            .get(key)
            .map_or_else(QueryState::idle, |entry| entry.state.borrow().clone())
    }

    /// Mark `key` stale so the next read refetches. Performs no I/O.
    ///
    /// Subscribers are notified with `is_stale` set. Returns `false` if the
    /// key is not cached.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.inner.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };

        entry.invalidated = true;
        entry.generation += 1;
        entry.state.send_modify(|state| state.is_stale = true);
        debug!(key = ?key, generation = entry.generation, "Invalidated cache entry");
        true
    }

    /// Restart the remembered fetcher of `key` if anyone is subscribed to it.
    ///
    /// A fetch already in flight when the key was invalidated restarts itself
    /// on completion, so this only starts one when nothing is running.
    /// Must be called from within a Tokio runtime.
    pub fn refetch_active(&self, key: &K) -> bool {
        let mut entries = self.inner.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };

        if entry.subscribers == 0 || entry.in_flight.is_some() {
            return false;
        }

        self.inner.start_fetch(key, entry)
    }

    /// Subscribe to state changes of `key`, creating the entry if needed.
    #[must_use]
    pub fn subscribe(&self, key: K) -> Subscription<K, V> {
        let mut entries = self.inner.lock();
        let entry = self.inner.entry(&mut entries, &key, Instant::now());
        entry.subscribers += 1;
        entry.idle_since = None;
        let rx = entry.state.subscribe();
        let entry_id = entry.id;
        drop(entries);

        Subscription::new(key, entry_id, rx, Arc::downgrade(&self.inner))
    }

    /// Invoke `callback` on every state change of `key` until the returned
    /// handle is dropped.
    #[must_use]
    pub fn watch<F>(&self, key: K, callback: F) -> WatchHandle
    where
        F: Fn(&QueryState<V>) + Send + 'static,
    {
        let mut subscription = self.subscribe(key);
        let task = tokio::spawn(async move {
            while let Some(state) = subscription.changed().await {
                callback(&state);
            }
        });
        WatchHandle::new(task)
    }

    /// Number of live subscriptions on `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.inner
            .lock()
            .get(key)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Remove entries that have been idle longer than the idle timeout.
    ///
    /// Returns how many entries were evicted.
    pub fn evict_idle(&self) -> usize {
        self.inner.evict_idle()
    }

    /// Periodically evict idle entries until the cache is dropped.
    #[must_use]
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.evict_idle();
                if evicted > 0 {
                    debug!(evicted, "Evicted idle cache entries");
                }
            }
        })
    }

    /// Drop every entry. Readers waiting on a fetch start over.
    pub fn clear(&self) {
        let mut entries = self.inner.lock();
        let count = entries.len();
        entries.clear();
        debug!(count, "Cleared query cache");
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// CacheInner
// =============================================================================

impl<K: QueryKey, V: QueryValue> CacheInner<K, V> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry<'a>(
        &self,
        entries: &'a mut HashMap<K, Entry<V>>,
        key: &K,
        now: Instant,
    ) -> &'a mut Entry<V> {
        entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.next_id.fetch_add(1, Ordering::Relaxed), now))
    }

    /// Start a fetch for `entry` on a new task. Caller holds the entries lock.
    fn start_fetch(self: &Arc<Self>, key: &K, entry: &mut Entry<V>) -> bool {
        let Some(fetcher) = entry.fetcher.clone() else {
            return false;
        };

        let fetch_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let generation = entry.generation;
        entry.in_flight = Some(fetch_id);
        entry.state.send_modify(|state| {
            state.status = QueryStatus::Loading;
            state.generation = generation;
        });

        let cache = Arc::clone(self);
        let task_key = key.clone();
        tokio::spawn(
            async move {
                let result = cache.fetch_with_retry(&fetcher).await;
                cache.complete(&task_key, fetch_id, generation, result);
            }
            .instrument(tracing::debug_span!("query_fetch", key = ?key, fetch_id)),
        );
        true
    }

    async fn fetch_with_retry(&self, fetcher: &Fetcher<V>) -> Result<V, ApiError> {
        let mut retries = 0;
        loop {
            let result = match tokio::time::timeout(self.options.fetch_timeout, fetcher()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(self.options.fetch_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if retries < MAX_RETRIES => {
                    retries += 1;
                    warn!(error = %error, retries, "Fetch failed, retrying");
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn complete(
        self: &Arc<Self>,
        key: &K,
        fetch_id: u64,
        generation: u64,
        result: Result<V, ApiError>,
    ) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!("Entry removed before fetch completed");
            return;
        };
        if entry.in_flight != Some(fetch_id) {
            return;
        }

        entry.in_flight = None;
        let now = Instant::now();
        // An invalidation arrived while this fetch was running; its result
        // may predate the change, so the entry stays invalidated.
        let outdated = entry.generation != generation;
        entry.invalidated = outdated;

        match result {
            Ok(value) => {
                entry.fetched_at = Some(now);
                let data = Arc::new(value);
                entry.state.send_modify(|state| {
                    state.status = QueryStatus::Success;
                    state.data = Some(data);
                    state.error = None;
                    state.is_stale = outdated;
                });
            }
            Err(error) => {
                tracing::error!(key = ?key, error = %error, "Fetch failed after retry");
                let error = Arc::new(error);
                entry.state.send_modify(|state| {
                    state.status = QueryStatus::Error;
                    state.error = Some(error);
                    state.is_stale = outdated;
                });
            }
        }

        if outdated && entry.subscribers > 0 {
            self.start_fetch(key, entry);
        }
    }

    pub(crate) fn release(&self, key: &K, entry_id: u64) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key)
            && entry.id == entry_id
        {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.idle_since = Some(Instant::now());
            }
        }
    }

    fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.options.idle_timeout;
        let mut entries = self.lock();
        let before = entries.len();

        entries.retain(|key, entry| {
            let keep = entry.subscribers > 0
                || entry.in_flight.is_some()
                || entry
                    .idle_since
                    .is_none_or(|since| now.saturating_duration_since(since) < idle_timeout);
            if !keep {
                debug!(key = ?key, "Evicting idle cache entry");
            }
            keep
        });

        before - entries.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    const STALE: Duration = Duration::from_secs(30);
    const FETCH_DELAY: Duration = Duration::from_millis(50);

    fn cache() -> QueryCache<&'static str, usize> {
        QueryCache::new(QueryOptions {
            idle_timeout: Duration::from_secs(60),
            retry_delay: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(1),
            refetch_in_background: false,
        })
    }

    /// Fetcher returning how many times it has been called.
    fn counter(calls: &Arc<AtomicUsize>) -> impl Fn() -> FetchFuture<usize> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(FETCH_DELAY).await;
                Ok(n)
            })
        }
    }

    /// Fetcher failing its first `failures` calls, then counting.
    fn flaky(
        calls: &Arc<AtomicUsize>,
        failures: usize,
    ) -> impl Fn() -> FetchFuture<usize> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    Err(ApiError::Remote {
                        status: 500,
                        message: format!("failure {n}"),
                    })
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_fetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.read("books", STALE, counter(&calls)).await.unwrap();
        let second = cache.read("books", STALE, counter(&calls)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_fetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let fetch = counter(&calls);
                tokio::spawn(async move { cache.read("cart", STALE, fetch).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_of_stale_key_share_one_fetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("cart", STALE, counter(&calls)).await.unwrap();

        tokio::time::advance(STALE + Duration::from_secs(1)).await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                let fetch = counter(&calls);
                tokio::spawn(async move { cache.read("cart", STALE, fetch).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_data_served_while_refreshing_in_background() {
        let cache = QueryCache::new(QueryOptions {
            refetch_in_background: true,
            ..QueryOptions::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("books", STALE, counter(&calls)).await.unwrap();

        tokio::time::advance(STALE).await;

        let stale = cache.read("books", STALE, counter(&calls)).await.unwrap();
        assert_eq!(*stale, 1);
        assert!(cache.peek(&"books").is_loading());

        tokio::time::sleep(FETCH_DELAY * 2).await;
        let refreshed = cache.read("books", STALE, counter(&calls)).await.unwrap();
        assert_eq!(*refreshed, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_is_retried() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache.read("books", STALE, flaky(&calls, 1)).await.unwrap();

        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_failure_keeps_previous_value() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        cache.invalidate(&"cart");

        let failing = Arc::new(AtomicUsize::new(0));
        let err = cache.read("cart", STALE, flaky(&failing, 2)).await.unwrap_err();
        assert!(matches!(*err, ApiError::Remote { status: 500, .. }));
        assert_eq!(failing.load(Ordering::SeqCst), 2);

        let state = cache.peek(&"cart");
        assert!(state.is_error());
        assert_eq!(state.data.as_deref(), Some(&1));

        // No further attempts until the key is invalidated.
        assert!(cache.read("cart", STALE, flaky(&failing, 2)).await.is_err());
        assert_eq!(failing.load(Ordering::SeqCst), 2);

        cache.invalidate(&"cart");
        let value = cache.read("cart", STALE, flaky(&failing, 2)).await.unwrap();
        assert_eq!(*value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_fetch = Arc::clone(&calls);

        let err = cache
            .read("books", STALE, move || {
                let calls = Arc::clone(&calls_in_fetch);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(0)
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(*err, ApiError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("cart", STALE, counter(&calls)).await.unwrap();

        assert!(cache.invalidate(&"cart"));
        assert!(cache.peek(&"cart").is_stale);
        assert!(!cache.invalidate(&"missing"));

        let value = cache.read("cart", STALE, counter(&calls)).await.unwrap();
        assert_eq!(*value, 2);
        assert!(!cache.peek(&"cart").is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_invalidation_ignores_inflight_result() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let early = {
            let cache = cache.clone();
            let fetch = counter(&calls);
            tokio::spawn(async move { cache.read("cart", STALE, fetch).await })
        };
        tokio::time::sleep(FETCH_DELAY / 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&"cart");
        let late = cache.read("cart", STALE, counter(&calls)).await.unwrap();

        assert_eq!(*late, 2);
        assert_eq!(*early.await.unwrap().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entry_is_evicted_and_refetched_once() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("books", STALE, counter(&calls)).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.evict_idle(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.evict_idle(), 1);
        assert!(!cache.contains_key(&"books"));

        cache.read("books", STALE, counter(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_keep_failed_entry_alive() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(cache.read("books", STALE, flaky(&calls, 2)).await.is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.read("books", STALE, flaky(&calls, 2)).await.is_err());
        assert_eq!(cache.evict_idle(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.read("books", STALE, flaky(&calls, 2)).await.is_err());
        assert_eq!(cache.evict_idle(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let value = cache.read("books", STALE, flaky(&calls, 2)).await.unwrap();
        assert_eq!(*value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribed_entry_is_not_evicted() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = cache.subscribe("cart");
        cache.read("cart", STALE, counter(&calls)).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.evict_idle(), 0);
        assert_eq!(cache.subscriber_count(&"cart"), 1);

        drop(subscription);
        assert_eq!(cache.subscriber_count(&"cart"), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.evict_idle(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_active_reaches_subscribers() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut subscription = cache.subscribe("cart");
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        assert_eq!(subscription.current().data.as_deref(), Some(&1));

        cache.invalidate(&"cart");
        assert!(cache.refetch_active(&"cart"));

        let state = loop {
            let state = subscription.changed().await.unwrap();
            if state.status == QueryStatus::Success {
                break state;
            }
        };
        assert_eq!(state.data.as_deref(), Some(&2));
        assert!(!state.is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_active_without_subscribers_is_noop() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        cache.invalidate(&"cart");

        assert!(!cache.refetch_active(&"cart"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_callback_and_cancel() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = cache.watch("cart", move |state| {
            sink.lock().unwrap().push(state.data.as_deref().copied());
        });
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(seen.lock().unwrap().last().copied().flatten(), Some(1));

        handle.cancel().await;
        assert_eq!(cache.subscriber_count(&"cart"), 0);

        let delivered = seen.lock().unwrap().len();
        cache.invalidate(&"cart");
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.lock().unwrap().len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_entries() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.read("books", STALE, counter(&calls)).await.unwrap();
        cache.read("cart", STALE, counter(&calls)).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.peek(&"books").status, QueryStatus::Idle);
    }
}
