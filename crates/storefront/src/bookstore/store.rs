//! Cached bookstore reads and cart mutations.

use std::sync::Arc;
use std::time::Duration;

use bookstore_core::{Book, BookId, Cart, CartItemId};
use tracing::{debug, instrument};

use super::{ApiError, BookstoreClient, CacheKey, CacheValue, QueryError};
use crate::config::CacheConfig;
use crate::query::{QueryCache, QueryOptions, QueryState, Subscription};

/// Bookstore service: every read goes through the query cache, every
/// successful mutation invalidates the cart.
///
/// Cheap to clone; clones share the client and the cache.
#[derive(Clone)]
pub struct BookStore {
    client: BookstoreClient,
    cache: QueryCache<CacheKey, CacheValue>,
    books_stale: Duration,
    cart_stale: Duration,
}

impl BookStore {
    /// Create a store with an empty cache.
    #[must_use]
    pub fn new(client: BookstoreClient, config: &CacheConfig) -> Self {
        let options = QueryOptions {
            idle_timeout: config.idle_timeout,
            retry_delay: config.retry_delay,
            fetch_timeout: client.timeout(),
            refetch_in_background: config.background_refetch,
        };

        Self {
            client,
            cache: QueryCache::new(options),
            books_stale: config.books_stale,
            cart_stale: config.cart_stale,
        }
    }

    #[must_use]
    pub const fn client(&self) -> &BookstoreClient {
        &self.client
    }

    #[must_use]
    pub const fn cache(&self) -> &QueryCache<CacheKey, CacheValue> {
        &self.cache
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All books, cached under [`CacheKey::Books`].
    ///
    /// # Errors
    ///
    /// Returns the shared fetch error if the listing cannot be loaded.
    #[instrument(skip(self))]
    pub async fn books(&self) -> Result<Vec<Book>, QueryError> {
        let client = self.client.clone();
        let value = self
            .cache
            .read(CacheKey::Books, self.books_stale, move || {
                let client = client.clone();
                async move { client.list_books().await.map(CacheValue::Books) }
            })
            .await?;

        value
            .as_books()
            .map(<[Book]>::to_vec)
            .ok_or_else(|| mismatch(&CacheKey::Books))
    }

    /// One book, cached under [`CacheKey::Book`].
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive id without touching the cache,
    /// or the shared fetch error.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn book(&self, id: BookId) -> Result<Book, QueryError> {
        if !id.is_positive() {
            return Err(Arc::new(ApiError::Validation(format!(
                "book id must be positive (got {id})"
            ))));
        }

        let key = CacheKey::Book(id);
        let client = self.client.clone();
        let value = self
            .cache
            .read(key.clone(), self.books_stale, move || {
                let client = client.clone();
                async move {
                    client
                        .get_book(id)
                        .await
                        .map(|book| CacheValue::Book(Box::new(book)))
                }
            })
            .await?;

        value.as_book().cloned().ok_or_else(|| mismatch(&key))
    }

    /// The cart, cached under [`CacheKey::Cart`] with the short cart window.
    ///
    /// # Errors
    ///
    /// Returns the shared fetch error.
    #[instrument(skip(self))]
    pub async fn cart(&self) -> Result<Cart, QueryError> {
        let client = self.client.clone();
        let value = self
            .cache
            .read(CacheKey::Cart, self.cart_stale, move || {
                let client = client.clone();
                async move { client.get_cart().await.map(CacheValue::Cart) }
            })
            .await?;

        value
            .as_cart()
            .cloned()
            .ok_or_else(|| mismatch(&CacheKey::Cart))
    }

    /// Last known cart without fetching.
    #[must_use]
    pub fn cached_cart(&self) -> Option<Cart> {
        self.cache
            .peek(&CacheKey::Cart)
            .data
            .and_then(|value| value.as_cart().cloned())
    }

    /// Last known book listing without fetching.
    #[must_use]
    pub fn cached_books(&self) -> Option<Vec<Book>> {
        self.cache
            .peek(&CacheKey::Books)
            .data
            .and_then(|value| value.as_books().map(<[Book]>::to_vec))
    }

    #[must_use]
    pub fn cart_state(&self) -> QueryState<CacheValue> {
        self.cache.peek(&CacheKey::Cart)
    }

    /// Observe every cart transition.
    #[must_use]
    pub fn subscribe_cart(&self) -> Subscription<CacheKey, CacheValue> {
        self.cache.subscribe(CacheKey::Cart)
    }

    /// Force the next listing read to refetch.
    pub fn invalidate_books(&self) -> bool {
        self.cache.invalidate(&CacheKey::Books)
    }

    pub fn invalidate_book(&self, id: BookId) -> bool {
        self.cache.invalidate(&CacheKey::Book(id))
    }

    pub fn invalidate_cart(&self) -> bool {
        self.cache.invalidate(&CacheKey::Cart)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one copy of a book to the cart.
    ///
    /// # Errors
    ///
    /// Returns the client error; the cart entry is left untouched on failure.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn add_to_cart(&self, book_id: BookId) -> Result<Cart, ApiError> {
        let cart = self.client.add_to_cart(book_id).await?;
        self.cart_changed();
        Ok(cart)
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist; the cart entry is left
    /// untouched on failure.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_from_cart(&self, line_id: CartItemId) -> Result<Cart, ApiError> {
        let cart = self.client.remove_from_cart(line_id).await?;
        self.cart_changed();
        Ok(cart)
    }

    fn cart_changed(&self) {
        self.cache.invalidate(&CacheKey::Cart);
        let refetching = self.cache.refetch_active(&CacheKey::Cart);
        debug!(refetching, "Cart invalidated after mutation");
    }
}

fn mismatch(key: &CacheKey) -> QueryError {
    Arc::new(ApiError::Unexpected(format!(
        "cache entry {key:?} holds a different value type"
    )))
}
