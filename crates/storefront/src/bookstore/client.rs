//! REST client for the remote bookstore API.
//!
//! Every call is a plain JSON request with an explicit timeout. Mutations
//! return the refreshed cart so callers never render a half-applied state.

use std::sync::Arc;
use std::time::Duration;

use bookstore_core::{Book, BookId, CART_SCHEMA_VERSION, Cart, CartItemId, CartLineRequest};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::ApiError;
use crate::config::BookstoreApiConfig;

/// Header carrying the request schema version.
pub const SCHEMA_HEADER: &str = "x-bookstore-schema";

/// How much of an error body is kept for logs and error messages.
const BODY_PREVIEW_CHARS: usize = 200;

// =============================================================================
// BookstoreClient
// =============================================================================

/// Client for the remote bookstore REST API.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct BookstoreClient {
    inner: Arc<BookstoreClientInner>,
}

struct BookstoreClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl BookstoreClient {
    /// Create a new bookstore API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be constructed.
    pub fn new(config: &BookstoreApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(BookstoreClientInner {
                client,
                base_url: config.base_url.clone(),
                token: config.token.clone(),
                timeout: config.timeout,
            }),
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ApiError::Unexpected(format!("invalid request path {path}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let mut builder = self
            .inner
            .client
            .request(method, self.url(path)?)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(SCHEMA_HEADER, CART_SCHEMA_VERSION.to_string());

        if let Some(token) = &self.inner.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        Ok(builder)
    }

    /// Send a request and read the whole body as text.
    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok((status, body))
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.inner.timeout)
        } else {
            ApiError::Network(error)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, ApiError> {
        let (status, body) = self.send(self.request(Method::GET, path)?).await?;
        if !status.is_success() {
            return Err(status_error(status, &body, what));
        }
        parse_body(&body, what)
    }

    // =========================================================================
    // Book Methods
    // =========================================================================

    /// List every book in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `Network`/`Timeout` on transport failure and `Parse` if the
    /// response is not a list of books.
    #[instrument(skip(self))]
    pub async fn list_books(&self) -> Result<Vec<Book>, ApiError> {
        let books: Vec<Book> = self.get_json("books", "books").await?;
        debug!(count = books.len(), "Fetched books");
        Ok(books)
    }

    /// Get a single book.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive id (no request is sent) and
    /// `NotFound` for any non-success status.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn get_book(&self, id: BookId) -> Result<Book, ApiError> {
        if !id.is_positive() {
            return Err(ApiError::Validation(format!(
                "book id must be positive (got {id})"
            )));
        }

        let (status, body) = self
            .send(self.request(Method::GET, &format!("books/{id}"))?)
            .await?;

        if !status.is_success() {
            debug!(status = %status, "Book lookup failed");
            return Err(ApiError::NotFound(format!("book {id}")));
        }

        parse_body(&body, "book")
    }

    // =========================================================================
    // Cart Methods (never cached here - see BookStore)
    // =========================================================================

    /// Get the current cart snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn get_cart(&self) -> Result<Cart, ApiError> {
        self.get_json("cart", "cart").await
    }

    /// Add one copy of a book to the cart and return the refreshed cart.
    ///
    /// The book is resolved first so the new line carries its current title,
    /// author and price.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the book does not exist, `Conflict` if the
    /// remote rejects the line, or any transport/parse error.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn add_to_cart(&self, book_id: BookId) -> Result<Cart, ApiError> {
        let book = match self.get_book(book_id).await {
            Ok(book) => book,
            Err(ApiError::NotFound(_)) => {
                return Err(ApiError::Validation(format!(
                    "book {book_id} does not exist"
                )));
            }
            Err(e) => return Err(e),
        };

        let line = CartLineRequest::for_book(&book);
        let (status, body) = self
            .send(self.request(Method::POST, "cart")?.json(&line))
            .await?;

        if !status.is_success() {
            return Err(status_error(status, &body, "add to cart"));
        }

        debug!("Cart line created");
        self.get_cart().await
    }

    /// Remove a cart line and return the refreshed cart.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no line has this id.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_from_cart(&self, line_id: CartItemId) -> Result<Cart, ApiError> {
        if !line_id.is_positive() {
            return Err(ApiError::NotFound(format!("cart line {line_id}")));
        }

        let (status, body) = self
            .send(self.request(Method::DELETE, &format!("cart/{line_id}"))?)
            .await?;

        if !status.is_success() {
            return Err(status_error(status, &body, &format!("cart line {line_id}")));
        }

        debug!("Cart line removed");
        self.get_cart().await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %preview(body),
            "Failed to parse bookstore response"
        );
        ApiError::Parse(format!("{what}: {e}"))
    })
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, body: &str, context: &str) -> ApiError {
    let detail = preview(body);
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(context.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::Validation(format!("{context}: {detail}"))
        }
        StatusCode::CONFLICT => ApiError::Conflict(format!("{context}: {detail}")),
        _ => {
            tracing::error!(
                status = %status,
                body = %detail,
                "Bookstore API returned non-success status"
            );
            ApiError::Remote {
                status: status.as_u16(),
                message: detail,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> BookstoreClient {
        BookstoreClient::new(&BookstoreApiConfig {
            base_url: Url::parse(base).unwrap(),
            token: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let client = client("http://localhost:5000/api/");
        assert_eq!(
            client.url("books/3").unwrap().as_str(),
            "http://localhost:5000/api/books/3"
        );
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "", "cart line 9"),
            ApiError::NotFound(ctx) if ctx == "cart line 9"
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "missing title", "add"),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "duplicate", "add"),
            ApiError::Conflict(msg) if msg.contains("duplicate")
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream", "books"),
            ApiError::Remote { status: 502, .. }
        ));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(1000);
        let ApiError::Remote { message, .. } =
            status_error(StatusCode::INTERNAL_SERVER_ERROR, &body, "books")
        else {
            panic!("expected remote error");
        };
        assert_eq!(message.len(), BODY_PREVIEW_CHARS);
    }

    #[test]
    fn test_parse_error() {
        let result: Result<Vec<Book>, _> = parse_body("<html>", "books");
        assert!(matches!(result, Err(ApiError::Parse(msg)) if msg.starts_with("books:")));
    }

    #[tokio::test]
    async fn test_get_book_rejects_non_positive_id_without_io() {
        // Nothing listens on this port; a request would fail with Network.
        let client = client("http://127.0.0.1:9/");
        let result = client.get_book(BookId::new(0)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
