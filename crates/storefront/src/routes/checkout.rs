//! Checkout route handlers.
//!
//! The remote store has no order endpoint yet, so a valid submission ends at a
//! confirmation page; the cart is left as is.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bookstore_core::{Price, ShippingInfo};
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use super::views::{CartView, format_price};
use super::{ErrorPage, RetryQuery};
use crate::error::add_breadcrumb;
use crate::middleware::RequestId;
use crate::state::AppState;

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub cart: CartView,
    pub shipping: ShippingInfo,
    pub shipping_fee: String,
    /// Validation message for the shipping form.
    pub error: Option<String>,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/confirmation.html")]
pub struct ConfirmationTemplate {
    pub reference: String,
    pub shipping: ShippingInfo,
    pub cart: CartView,
    pub placed_at: String,
}

/// Shipping is free for every order.
fn shipping_fee() -> String {
    format_price(Price::ZERO)
}

/// Short human-facing order reference.
fn order_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("BK-{}", id.get(..8).unwrap_or(&id))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Display the checkout page.
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
        Ok(cart) => CheckoutTemplate {
            cart: CartView::from(&cart),
            shipping: ShippingInfo::default(),
            shipping_fee: shipping_fee(),
            error: None,
        }
        .into_response(),
        Err(e) => ErrorPage::new(e, request_id)
            .retry("/checkout")
            .into_response(),
    }
}

/// Validate shipping details and confirm the order.
///
/// Invalid details (or an empty cart) re-render the form with 400.
#[instrument(skip(state, request_id, shipping))]
pub async fn submit(
    State(state): State<AppState>,
    request_id: RequestId,
    Form(shipping): Form<ShippingInfo>,
) -> Response {
    let cart = match state.store().cart().await {
        Ok(cart) => cart,
        Err(e) => {
            return ErrorPage::new(e, request_id)
                .retry("/checkout")
                .into_response();
        }
    };

    let error = if cart.is_empty() {
        Some("Your cart is empty.".to_string())
    } else {
        shipping.validate().err().map(|e| format!("Please fill in every field ({e})."))
    };

    if let Some(error) = error {
        tracing::debug!(%error, "Checkout rejected");
        return (
            StatusCode::BAD_REQUEST,
            CheckoutTemplate {
                cart: CartView::from(&cart),
                shipping,
                shipping_fee: shipping_fee(),
                error: Some(error),
            },
        )
            .into_response();
    }

    let reference = order_reference();
    add_breadcrumb("checkout", "Order confirmed", Some(&[("reference", reference.as_str())]));
    tracing::info!(
        %reference,
        items = cart.item_count(),
        total = %cart.total(),
        "Checkout confirmed"
    );

    ConfirmationTemplate {
        reference,
        shipping,
        cart: CartView::from(&cart),
        placed_at: format_timestamp(Utc::now()),
    }
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_order_reference_shape() {
        let reference = order_reference();
        assert_eq!(reference.len(), 11);
        assert!(reference.starts_with("BK-"));
        assert_ne!(reference, order_reference());
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        assert_eq!(format_timestamp(at), "2026-03-01 09:05 UTC");
    }

    #[test]
    fn test_shipping_fee_is_free() {
        assert_eq!(shipping_fee(), "¥0.00");
    }
}
