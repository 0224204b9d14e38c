//! Observable state of a cache entry.

use std::sync::Arc;

use crate::bookstore::QueryError;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Nothing has been fetched yet.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed after its retry.
    Error,
}

/// Snapshot of a cache entry as seen by readers and subscribers.
///
/// `data` always holds the last successfully fetched value, even while
/// loading or after a failed refetch.
#[derive(Debug)]
pub struct QueryState<V> {
    pub status: QueryStatus,
    pub data: Option<Arc<V>>,
    pub error: Option<QueryError>,
    /// Set once the entry is invalidated, cleared by the next fresh result.
    pub is_stale: bool,
    /// Invalidation generation the current status was produced under.
    pub(crate) generation: u64,
}

impl<V> QueryState<V> {
    pub(crate) const fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            generation: 0,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

impl<V> Clone for QueryState<V> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.is_stale,
            generation: self.generation,
        }
    }
}

impl<V> Default for QueryState<V> {
    fn default() -> Self {
        Self::idle()
    }
}
