//! Cache-wide tuning knobs.

use std::time::Duration;

/// Options shared by every entry of a [`QueryCache`](super::QueryCache).
///
/// Staleness is chosen per read; everything else applies cache-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long an entry may sit without subscribers before it is evicted.
    pub idle_timeout: Duration,
    /// Pause before the single automatic retry of a failed fetch.
    pub retry_delay: Duration,
    /// Upper bound on one fetch attempt.
    pub fetch_timeout: Duration,
    /// Serve time-stale data immediately and refresh in the background.
    /// When false, readers of a stale entry wait for the refetch.
    pub refetch_in_background: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            retry_delay: Duration::from_millis(250),
            fetch_timeout: Duration::from_secs(10),
            refetch_in_background: true,
        }
    }
}
