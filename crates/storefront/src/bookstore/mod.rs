//! Remote bookstore API client and the cached store built on top of it.
//!
//! # Architecture
//!
//! - [`BookstoreClient`] wraps the REST endpoints with typed async functions
//! - [`BookStore`] routes reads through the [`QueryCache`](crate::query::QueryCache)
//!   and invalidates the cart after every successful mutation
//! - The remote store is the source of truth - NO local persistence
//!
//! # Endpoints
//!
//! ```text
//! GET    /books             - All books
//! GET    /books/{id}        - One book
//! GET    /cart              - Cart lines
//! POST   /cart              - Add a line (CartLineRequest, schema v1)
//! DELETE /cart/{lineId}     - Remove a line
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use bookstore_storefront::bookstore::{BookStore, BookstoreClient};
//!
//! let client = BookstoreClient::new(&config.api)?;
//! let store = BookStore::new(client, &config.cache);
//!
//! let books = store.books().await?;
//! let cart = store.add_to_cart(books[0].id).await?;
//! ```

mod cache;
mod client;
mod store;

pub use cache::{CacheKey, CacheValue};
pub use client::{BookstoreClient, SCHEMA_HEADER};
pub use store::BookStore;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the remote bookstore.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (connection refused, reset, DNS, ...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote store has no such resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was malformed or referenced something that does not exist.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The response did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The remote store rejected the mutation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success status.
    #[error("Remote returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    /// Something that should not happen inside the storefront itself.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Error type shared between every caller that observed the same fetch.
pub type QueryError = Arc<ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("book 7".to_string());
        assert_eq!(err.to_string(), "Not found: book 7");

        let err = ApiError::Remote {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "Remote returned HTTP 503: maintenance");
    }

    #[test]
    fn test_timeout_display() {
        let err = ApiError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Request timed out after 10s");
    }
}
