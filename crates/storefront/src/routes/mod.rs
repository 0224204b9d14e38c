//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Book listing (?retry=true refetches)
//! GET  /books/{id}             - Book detail
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add a book (returns count badge, triggers cart-updated)
//! POST /cart/remove            - Remove a line (returns cart_items fragment)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout
//! GET  /checkout               - Order summary and shipping form
//! POST /checkout               - Validate shipping details, show confirmation
//! ```
//!
//! Every page renders either its data or an error page carrying the request
//! ID and, for transient failures, a retry link.

pub mod books;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod views;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::RequestId;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/books/{id}", get(books::show))
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::submit))
}

/// `?retry=true` on a page drops its cached data (and any stored failure)
/// before reading.
#[derive(Debug, Default, Deserialize)]
pub struct RetryQuery {
    #[serde(default)]
    pub retry: bool,
}

/// Whether the request was issued by HTMX (and wants a fragment back).
pub(crate) fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .is_some_and(|value| value.as_bytes() == b"true")
}

/// Full-page error template.
#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub message: String,
    pub request_id: String,
    pub retry_href: Option<String>,
}

/// An error rendered inside the site layout instead of as plain text.
pub struct ErrorPage {
    error: AppError,
    request_id: RequestId,
    retry_href: Option<String>,
}

impl ErrorPage {
    pub fn new(error: impl Into<AppError>, request_id: RequestId) -> Self {
        Self {
            error: error.into(),
            request_id,
            retry_href: None,
        }
    }

    /// Offer a retry link for upstream failures.
    #[must_use]
    pub fn retry(mut self, href: impl Into<String>) -> Self {
        self.retry_href = Some(href.into());
        self
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        self.error.report();

        let status = self.error.status();
        let retry_href = self
            .retry_href
            .filter(|_| status.is_server_error())
            .map(|href| format!("{href}?retry=true"));
        let template = ErrorTemplate {
            status: status.as_u16(),
            message: self.error.public_message(),
            request_id: self.request_id.0,
            retry_href,
        };

        (status, template).into_response()
    }
}
