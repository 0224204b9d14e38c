//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Plain form posts (no JavaScript) are redirected back to the cart page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use bookstore_core::{BookId, CartItemId};
use serde::Deserialize;
use tracing::instrument;

use super::views::CartView;
use super::{ErrorPage, RetryQuery, is_htmx};
use crate::error::{AppError, add_breadcrumb};
use crate::middleware::RequestId;
use crate::state::AppState;

/// Event HTMX listeners refresh cart widgets on.
const CART_UPDATED_TRIGGER: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub book_id: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: i64,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Display cart page.
#[instrument(skip(state, request_id))]
pub async fn show(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<RetryQuery>,
) -> Response {
    if query.retry {
        state.store().invalidate_cart();
    }

    match state.store().cart().await {
        Ok(cart) => CartShowTemplate {
            cart: CartView::from(&cart),
        }
        .into_response(),
        Err(e) => ErrorPage::new(e, request_id).retry("/cart").into_response(),
    }
}

/// Add a book to the cart (HTMX).
///
/// Returns the refreshed count badge with an HTMX trigger so other cart
/// widgets reload.
#[instrument(skip(state, headers))]
pub async fn add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Response, AppError> {
    let book_id = BookId::new(form.book_id);
    let cart = state.store().add_to_cart(book_id).await?;

    let book_id = book_id.to_string();
    add_breadcrumb("cart", "Added book to cart", Some(&[("book_id", book_id.as_str())]));

    if !is_htmx(&headers) {
        return Ok(Redirect::to("/cart").into_response());
    }

    Ok((
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartCountTemplate {
            count: cart.item_count(),
        },
    )
        .into_response())
}

/// Remove a line from the cart (HTMX).
///
/// Removal is keyed by cart line, never by book.
#[instrument(skip(state, headers))]
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response, AppError> {
    let line_id = CartItemId::new(form.line_id);
    let cart = state.store().remove_from_cart(line_id).await?;

    let line_id = line_id.to_string();
    add_breadcrumb("cart", "Removed cart line", Some(&[("line_id", line_id.as_str())]));

    if !is_htmx(&headers) {
        return Ok(Redirect::to("/cart").into_response());
    }

    Ok((
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartItemsTemplate {
            cart: CartView::from(&cart),
        },
    )
        .into_response())
}

/// Get cart count badge (HTMX).
///
/// Falls back to the last known count when the cart cannot be loaded.
#[instrument(skip(state))]
pub async fn count(State(state): State<AppState>) -> impl IntoResponse {
    let count = match state.store().cart().await {
        Ok(cart) => cart.item_count(),
        Err(e) => {
            tracing::warn!("Failed to fetch cart for count badge: {e}");
            state
                .store()
                .cached_cart()
                .map_or(0, |cart| cart.item_count())
        }
    };

    CartCountTemplate { count }
}
