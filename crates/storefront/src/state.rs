//! Application state shared across handlers.

use std::sync::Arc;

use crate::bookstore::{ApiError, BookStore, BookstoreClient};
use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the one query cache
/// every request reads through.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: BookStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: StorefrontConfig) -> Result<Self, ApiError> {
        let client = BookstoreClient::new(&config.api)?;
        let store = BookStore::new(client, &config.cache);

        Ok(Self {
            inner: Arc::new(AppStateInner { config, store }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the cached bookstore service.
    #[must_use]
    pub fn store(&self) -> &BookStore {
        &self.inner.store
    }
}
